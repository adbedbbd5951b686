mod clock;
mod tempo;

use thiserror::Error;

pub use clock::TickClock;
pub use tempo::{Division, Tempo};

/// Absolute time in host units (nanoseconds or samples, depending on the clock frequency).
pub type HostTime = u64;

/// Musical time in ticks (pulses).
pub type TicksTime = u32;

pub type SampleRate = u32;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum TimeError {
  #[error("Invalid time division {0}, using {default} PPQN", default = Division::DEFAULT.ppqn())]
  InvalidDivision(i64),

  #[error("Invalid tempo {0}, using {default} us per quarter note", default = Tempo::DEFAULT.micros())]
  InvalidTempo(u32),
}

pub type Result<T> = core::result::Result<T, TimeError>;
