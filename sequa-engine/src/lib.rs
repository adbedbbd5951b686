mod config;
mod error;
mod player;
mod queue;
pub mod renderer;
pub mod scheduler;
mod sink;
mod softsynth;
mod streamer;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::config::EngineConfig;
pub use crate::error::{EngineError, Result};
pub use crate::player::{Device, Player, PlayerState};
pub use crate::queue::{ConsumedCallback, StreamQueue, StreamSender};
pub use crate::renderer::{DeviceType, Renderer, SynthEngine};
pub use crate::scheduler::{Scheduler, Tick};
pub use crate::sink::SinkRenderer;
pub use crate::softsynth::SoftSynthDevice;
pub use crate::streamer::Streamer;
