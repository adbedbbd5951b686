use std::path::PathBuf;

use thiserror::Error;

use sequa_engine::EngineError;
use sequa_midi::MidiError;

#[derive(Debug, Error)]
pub enum SynthError {
  #[error("Error loading the bank '{path}': {reason}")]
  Bank { path: PathBuf, reason: String },

  #[error("Bank index out of range: {index} (available {available})")]
  BankIndex { index: u32, available: u32 },

  #[error("Unknown chip emulator: {0}")]
  Emulator(u32),

  #[error("No MIDI output device named '{0}'")]
  UnknownDevice(String),

  #[error("Engine: {0}")]
  Engine(#[from] EngineError),

  #[error("MIDI: {0}")]
  Midi(#[from] MidiError),

  #[error("WAV: {0}")]
  Wav(#[from] hound::Error),
}

impl SynthError {
  pub(crate) fn bank<P: Into<PathBuf>, S: ToString>(path: P, reason: S) -> Self {
    SynthError::Bank {
      path: path.into(),
      reason: reason.to_string(),
    }
  }
}

pub type Result<T> = core::result::Result<T, SynthError>;
