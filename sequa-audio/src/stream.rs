//! Single producer, single consumer PCM ring between a renderer thread and the audio output.

use log::trace;
use ringbuf::{Consumer, Producer, RingBuffer};

pub const MAX_CHANNELS: usize = 8;

/// Create a ring holding `frames` frames of `channels` interleaved samples.
pub fn pcm_ring(frames: usize, channels: usize) -> (PcmWriter, PcmStream) {
  let channels = channels.clamp(1, MAX_CHANNELS);
  let (producer, consumer) = RingBuffer::<f32>::new(frames.max(1) * channels).split();
  (
    PcmWriter { producer, channels },
    PcmStream {
      consumer,
      channels,
      underruns: 0,
    },
  )
}

pub struct PcmWriter {
  producer: Producer<f32>,
  channels: usize,
}

impl PcmWriter {
  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn free_frames(&self) -> usize {
    self.producer.remaining() / self.channels
  }

  /// Write whole frames from `samples`, returning the number of frames written.
  pub fn write(&mut self, samples: &[f32]) -> usize {
    let frames = (samples.len() / self.channels).min(self.free_frames());
    self.producer.push_slice(&samples[..frames * self.channels]) / self.channels
  }
}

/// Consumer end, pulled by the audio output. Missing frames are played as silence.
pub struct PcmStream {
  consumer: Consumer<f32>,
  channels: usize,
  underruns: u64,
}

impl PcmStream {
  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn available_frames(&self) -> usize {
    self.consumer.len() / self.channels
  }

  /// Times the output asked for more than was buffered
  pub fn underruns(&self) -> u64 {
    self.underruns
  }

  fn pop_frame(&mut self, frame: &mut [f32]) -> bool {
    if self.consumer.len() < self.channels {
      return false;
    }
    let mut source = [0.0f32; MAX_CHANNELS];
    let count = self.consumer.pop_slice(&mut source[..self.channels]);
    for (index, sample) in frame.iter_mut().enumerate() {
      *sample = source[index.min(count - 1)];
    }
    true
  }
}

impl crate::AudioHandler for PcmStream {
  fn process(&mut self, data: &mut [f32], channels: usize) {
    let underrun = if channels == self.channels {
      let count = self.consumer.pop_slice(data);
      data[count..].iter_mut().for_each(|sample| *sample = 0.0);
      count < data.len()
    } else {
      let mut underrun = false;
      for frame in data.chunks_mut(channels.max(1)) {
        if !self.pop_frame(frame) {
          frame.iter_mut().for_each(|sample| *sample = 0.0);
          underrun = true;
        }
      }
      underrun
    };
    if underrun {
      self.underruns += 1;
      trace!("PCM stream underrun ({})", self.underruns);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::AudioHandler;

  #[test]
  fn write_whole_frames_only() {
    let (mut writer, stream) = pcm_ring(4, 2);
    assert_eq!(writer.free_frames(), 4);
    assert_eq!(writer.write(&[0.1, 0.2, 0.3, 0.4, 0.5]), 2);
    assert_eq!(writer.free_frames(), 2);
    assert_eq!(stream.available_frames(), 2);
    assert_eq!(writer.write(&[0.0; 10]), 2);
    assert_eq!(writer.free_frames(), 0);
  }

  #[test]
  fn underrun_plays_silence() {
    let (mut writer, mut stream) = pcm_ring(8, 2);
    writer.write(&[0.5, -0.5]);
    let mut data = [1.0f32; 6];
    stream.process(&mut data, 2);
    assert_eq!(data, [0.5, -0.5, 0.0, 0.0, 0.0, 0.0]);
    assert_eq!(stream.underruns(), 1);
  }

  #[test]
  fn channel_count_adaptation() {
    let (mut writer, mut stream) = pcm_ring(8, 2);
    writer.write(&[0.25, 0.75, 0.5, 1.0]);

    let mut mono = [0.0f32; 1];
    stream.process(&mut mono, 1);
    assert_eq!(mono, [0.25]);

    let mut quad = [0.0f32; 4];
    stream.process(&mut quad, 4);
    assert_eq!(quad, [0.5, 1.0, 1.0, 1.0]);
    assert_eq!(stream.underruns(), 0);
  }
}
