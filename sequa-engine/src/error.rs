use thiserror::Error;

use sequa_midi::MidiError;

use crate::player::PlayerState;

pub type Result<T> = core::result::Result<T, EngineError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
  #[error("Error opening the device: {0}")]
  Open(String),

  #[error("MIDI: {0}")]
  Midi(#[from] MidiError),

  #[error("Can not {operation} while the player is {state:?}")]
  InvalidState {
    operation: &'static str,
    state: PlayerState,
  },

  #[error("Error spawning the player thread: {0}")]
  Spawn(String),
}
