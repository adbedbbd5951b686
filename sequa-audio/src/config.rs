#[derive(Debug, Clone)]
pub struct AudioConfig {
  pub sample_rate: u32,
  pub buffer_size: usize,
  /// Frames of rendered audio buffered between the player and the output
  pub ring_frames: usize,
}

impl AudioConfig {
  pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
  pub const DEFAULT_BUFFER_SIZE: usize = 256;
  pub const DEFAULT_RING_FRAMES: usize = 4096;
}

impl Default for AudioConfig {
  fn default() -> Self {
    Self {
      sample_rate: AudioConfig::DEFAULT_SAMPLE_RATE,
      buffer_size: AudioConfig::DEFAULT_BUFFER_SIZE,
      ring_frames: AudioConfig::DEFAULT_RING_FRAMES,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioOutputConfig {
  pub name: String,
  pub sample_rate: u32,
  pub channels: usize,
  pub buffer_size: usize,
}
