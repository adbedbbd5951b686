use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MidiError {
  #[error("Malformed input: {0}")]
  MalformedInput(String),

  #[error("Unsupported song format")]
  UnsupportedFormat,

  #[error("Event buffer full: {needed} bytes needed, {available} available")]
  BufferFull { needed: usize, available: usize },

  #[error("MIDI output device index out of range: {0}")]
  DeviceIndex(usize),

  #[error("Error connecting to the MIDI output '{0}': {1}")]
  Connect(String, String),

  #[error("Error sending a MIDI message: {0}")]
  Send(String),

  #[error("Feature not available in this build: {0}")]
  NotAvailable(&'static str),
}

impl MidiError {
  pub(crate) fn malformed<S: Into<String>>(reason: S) -> Self {
    MidiError::MalformedInput(reason.into())
  }
}

pub type Result<T> = core::result::Result<T, MidiError>;
