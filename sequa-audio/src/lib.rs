mod config;
#[cfg(feature = "cpal")]
mod cpal;
mod error;
mod stream;

pub use crate::config::{AudioConfig, AudioOutputConfig};
#[cfg(feature = "cpal")]
pub use crate::cpal::AudioDriver;
pub use crate::error::{AudioError, Result};
pub use crate::stream::{pcm_ring, PcmStream, PcmWriter};

/// Pulled by the audio output with interleaved frames of `channels` samples.
pub trait AudioHandler: Send {
  fn process(&mut self, data: &mut [f32], channels: usize);
}

impl<H: AudioHandler + ?Sized> AudioHandler for Box<H> {
  fn process(&mut self, data: &mut [f32], channels: usize) {
    (**self).process(data, channels)
  }
}
