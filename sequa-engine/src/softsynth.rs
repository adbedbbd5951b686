//! Pull side device: a soft synth rendered on demand with sample accurate events.

use std::sync::Arc;

use log::debug;

use sequa_audio::AudioHandler;
use sequa_time::{HostTime, TickClock};

use crate::error::Result;
use crate::queue::{StreamQueue, StreamSender};
use crate::renderer::SynthEngine;
use crate::scheduler::Scheduler;

const SCRATCH_FRAMES: usize = 256;

/// Runs the scheduler with a sample clock: every event is applied at its exact frame
/// offset inside the block being rendered, and the engine renders the frames between
/// events.
pub struct SoftSynthDevice {
  engine: Box<dyn SynthEngine>,
  scheduler: Scheduler,
  position: HostTime,
  scratch: Vec<f32>,
}

impl SoftSynthDevice {
  pub fn new(engine: Box<dyn SynthEngine>) -> Self {
    Self::with_queue(engine, StreamQueue::new())
  }

  pub fn with_queue(engine: Box<dyn SynthEngine>, queue: Arc<StreamQueue>) -> Self {
    let clock = TickClock::with_sample_rate(engine.sample_rate());
    let scratch = vec![0.0; SCRATCH_FRAMES * engine.channels().max(1)];
    Self {
      engine,
      scheduler: Scheduler::new(queue, clock),
      position: 0,
      scratch,
    }
  }

  pub fn stream_sender(&self) -> StreamSender {
    StreamSender::new(self.scheduler.queue().clone())
  }

  pub fn engine(&self) -> &dyn SynthEngine {
    self.engine.as_ref()
  }

  pub fn engine_mut(&mut self) -> &mut dyn SynthEngine {
    self.engine.as_mut()
  }

  pub fn channels(&self) -> usize {
    self.engine.channels()
  }

  pub fn sample_rate(&self) -> u32 {
    self.engine.sample_rate()
  }

  /// Frames rendered since the start of playback
  pub fn position(&self) -> HostTime {
    self.position
  }

  pub fn open(&mut self) -> Result<()> {
    self.engine.open()?;
    debug!(
      "Opened {} synth at {} Hz",
      self.engine.device_type(),
      self.engine.sample_rate()
    );
    Ok(())
  }

  pub fn close(&mut self) {
    self.engine.close()
  }

  pub fn is_open(&self) -> bool {
    self.engine.is_open()
  }

  pub fn all_notes_off(&mut self) {
    self.engine.all_notes_off(self.position)
  }

  /// Nothing is being played nor waiting in the queue
  pub fn is_idle(&mut self) -> bool {
    self.scheduler.next_event_time().is_none()
  }

  /// Forget the buffer being played and rewind to frame zero
  pub fn reset(&mut self) {
    self.scheduler.reset();
    self.position = 0;
  }

  /// Render `frames` interleaved frames into `buffer`, playing every event due inside them.
  pub fn compute_output(&mut self, buffer: &mut [f32], frames: usize) {
    let channels = self.engine.channels().max(1);
    let frames = frames.min(buffer.len() / channels);
    let start = self.position;
    let end = start + frames as HostTime;
    let mut done = 0usize;

    self.scheduler.sync(self.engine.as_mut());

    while done < frames {
      match self.scheduler.next_event_time() {
        Some(at) if at < end => {
          let offset = (at.saturating_sub(start) as usize).max(done);
          if offset > done {
            self
              .engine
              .compute_output(&mut buffer[done * channels..offset * channels], offset - done);
            done = offset;
          }
          self.scheduler.play_tick(self.engine.as_mut());
        }
        next => {
          self
            .engine
            .compute_output(&mut buffer[done * channels..frames * channels], frames - done);
          done = frames;
          if next.is_none() {
            // idle: later events start from here instead of bursting out in the past
            self.scheduler.resync(end);
          }
        }
      }
    }

    self.position = end;
  }
}

impl AudioHandler for SoftSynthDevice {
  fn process(&mut self, data: &mut [f32], channels: usize) {
    let channels = channels.max(1);
    let engine_channels = self.channels().max(1);
    let total = data.len() / channels;
    if channels == engine_channels {
      self.compute_output(data, total);
      return;
    }

    let mut scratch = std::mem::take(&mut self.scratch);
    let chunk_frames = (scratch.len() / engine_channels).max(1);
    if scratch.len() < chunk_frames * engine_channels {
      scratch.resize(chunk_frames * engine_channels, 0.0);
    }
    let mut frame = 0;
    while frame < total {
      let frames = (total - frame).min(chunk_frames);
      self.compute_output(&mut scratch, frames);
      let output = &mut data[frame * channels..(frame + frames) * channels];
      for (target, source) in output
        .chunks_mut(channels)
        .zip(scratch.chunks(engine_channels))
      {
        for (index, sample) in target.iter_mut().enumerate() {
          *sample = source[index.min(engine_channels - 1)];
        }
      }
      frame += frames;
    }
    self.scratch = scratch;
  }
}
