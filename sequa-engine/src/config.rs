use sequa_audio::AudioConfig;
use sequa_midi::EventBuffer;

#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub audio: AudioConfig,
  /// Frames rendered by the soft synth per scheduling step
  pub block_frames: usize,
  pub event_buffer_size: usize,
  /// Song time the streamer writes into every buffer
  pub buffer_ahead_us: u64,
}

impl EngineConfig {
  pub const DEFAULT_BLOCK_FRAMES: usize = 256;
  pub const DEFAULT_EVENT_BUFFER_SIZE: usize = EventBuffer::DEFAULT_CAPACITY;
  pub const DEFAULT_BUFFER_AHEAD_US: u64 = 250_000;

  pub fn sample_rate(&self) -> u32 {
    self.audio.sample_rate
  }
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      audio: AudioConfig::default(),
      block_frames: Self::DEFAULT_BLOCK_FRAMES,
      event_buffer_size: Self::DEFAULT_EVENT_BUFFER_SIZE,
      buffer_ahead_us: Self::DEFAULT_BUFFER_AHEAD_US,
    }
  }
}
