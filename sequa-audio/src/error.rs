use thiserror::Error;

pub type Result<T> = core::result::Result<T, AudioError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AudioError {
  #[error("No default output device available")]
  NoDefaultOutputDevice,

  #[error("No default stream config available: {0}")]
  NoDefaultStreamConfig(String),

  #[error("Error building the output stream: {0}")]
  BuildStream(String),

  #[error("Error starting the output stream: {0}")]
  PlayStream(String),
}
