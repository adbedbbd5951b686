use std::fmt::{Debug, Formatter};
use std::path::PathBuf;

use sequa_engine::EngineConfig;
use sequa_midi::sink::DeviceIndex;

use crate::chip::{ChannelAlloc, VolumeModel};

#[derive(Debug, Clone)]
pub struct WavetableConfig {
  /// WAV file with the waveform used by the melodic programs, built-in tables when missing
  pub soundfont: Option<String>,
  pub polyphony: usize,
  pub gain: f32,
}

impl WavetableConfig {
  pub const DEFAULT_POLYPHONY: usize = 64;
  pub const DEFAULT_GAIN: f32 = 0.5;
}

impl Default for WavetableConfig {
  fn default() -> Self {
    Self {
      soundfont: None,
      polyphony: Self::DEFAULT_POLYPHONY,
      gain: Self::DEFAULT_GAIN,
    }
  }
}

#[derive(Debug, Clone)]
pub struct AdlConfig {
  pub bank: u32,
  pub custom_bank: Option<String>,
  pub emulator_id: u32,
  pub chips: u32,
  pub volume_model: VolumeModel,
  pub channel_alloc: ChannelAlloc,
  pub full_pan: bool,
  pub run_at_pcm_rate: bool,
}

impl AdlConfig {
  pub const DEFAULT_BANK: u32 = 14;
  pub const DEFAULT_CHIPS: u32 = 6;
}

impl Default for AdlConfig {
  fn default() -> Self {
    Self {
      bank: Self::DEFAULT_BANK,
      custom_bank: None,
      emulator_id: 0,
      chips: Self::DEFAULT_CHIPS,
      volume_model: VolumeModel::Dmx,
      channel_alloc: ChannelAlloc::Auto,
      full_pan: true,
      run_at_pcm_rate: false,
    }
  }
}

#[derive(Debug, Clone)]
pub struct OpnConfig {
  pub custom_bank: Option<String>,
  pub emulator_id: u32,
  pub chips: u32,
  pub volume_model: VolumeModel,
  pub channel_alloc: ChannelAlloc,
  pub full_pan: bool,
  pub run_at_pcm_rate: bool,
}

impl OpnConfig {
  pub const DEFAULT_CHIPS: u32 = 8;
}

impl Default for OpnConfig {
  fn default() -> Self {
    Self {
      custom_bank: None,
      emulator_id: 0,
      chips: Self::DEFAULT_CHIPS,
      volume_model: VolumeModel::Auto,
      channel_alloc: ChannelAlloc::Auto,
      full_pan: true,
      run_at_pcm_rate: false,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct MidiOutConfig {
  pub device: DeviceIndex,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
  pub engine: EngineConfig,
  pub wavetable: WavetableConfig,
  pub adl: AdlConfig,
  pub opn: OpnConfig,
  pub midi_out: MidiOutConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankKind {
  Soundfont,
  Wopl,
  Wopn,
}

pub type PathForBank = Box<dyn Fn(&str, BankKind) -> Option<PathBuf> + Send + Sync>;

/// Hooks supplied by the application embedding the synths.
#[derive(Default)]
pub struct Callbacks {
  /// Maps a bank name to the file to load, `None` when it can not be found
  pub path_for_bank: Option<PathForBank>,
}

impl Callbacks {
  pub fn with_path_for_bank<F>(mut self, resolve: F) -> Self
  where
    F: Fn(&str, BankKind) -> Option<PathBuf> + Send + Sync + 'static,
  {
    self.path_for_bank = Some(Box::new(resolve));
    self
  }

  /// Resolve a bank name, used verbatim without a resolver
  pub fn resolve_bank(&self, name: &str, kind: BankKind) -> Option<String> {
    match self.path_for_bank.as_ref() {
      Some(resolve) => resolve(name, kind).map(|path| path.to_string_lossy().into_owned()),
      None => Some(name.to_string()),
    }
  }
}

impl Debug for Callbacks {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Callbacks")
      .field("path_for_bank", &self.path_for_bank.is_some())
      .finish()
  }
}
