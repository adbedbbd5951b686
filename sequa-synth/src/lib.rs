pub mod bank;
mod channel;
pub mod chip;
mod config;
mod envelope;
mod error;
mod factory;
pub mod fm;
mod render;
mod smoother;
mod sysex;
pub mod wavetable;

pub use crate::bank::FmBank;
pub use crate::chip::{ChannelAlloc, ChipEmulator, ChipFamily, ChipSynth, VolumeModel};
pub use crate::config::{
  AdlConfig, BankKind, Callbacks, Config, MidiOutConfig, OpnConfig, PathForBank, WavetableConfig,
};
pub use crate::error::{Result, SynthError};
pub use crate::factory::{create_device, list_midi_devices};
pub use crate::fm::FmEmulator;
pub use crate::render::{render_song, Rendered};
pub use crate::wavetable::{Wavetable, WavetableSynth};
