//! Song playback: keeps a player fed from a [`MidiSource`] through rotating buffers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use sequa_midi::{EventBuffer, MidiSource};

use crate::error::Result;
use crate::player::Player;

const NUM_BUFFERS: usize = 2;

#[derive(Default)]
struct Progress {
  in_flight: AtomicUsize,
  finished: AtomicBool,
  looping: AtomicBool,
}

impl Progress {
  fn retire(&self) {
    if self.in_flight.fetch_sub(1, Ordering::SeqCst) <= 1 {
      self.finished.store(true, Ordering::SeqCst);
      debug!("Song finished");
    }
  }
}

fn refill(
  source: &mut dyn MidiSource,
  buffer: &mut EventBuffer,
  ahead_us: u64,
  looping: bool,
) -> sequa_midi::Result<bool> {
  buffer.clear();
  if source.is_done() {
    if !looping {
      return Ok(false);
    }
    debug!("Looping the song");
    source.restart();
  }
  source.make_events(buffer, ahead_us)?;
  Ok(!buffer.is_empty())
}

/// Every buffer played is refilled from the source in the consumed callback and queued
/// again, until the source is done.
pub struct Streamer {
  source: Arc<Mutex<Box<dyn MidiSource>>>,
  progress: Arc<Progress>,
}

impl Streamer {
  pub fn new(source: Box<dyn MidiSource>) -> Self {
    Self {
      source: Arc::new(Mutex::new(source)),
      progress: Arc::new(Progress::default()),
    }
  }

  pub fn with_looping(self, looping: bool) -> Self {
    self.set_looping(looping);
    self
  }

  pub fn set_looping(&self, looping: bool) {
    self.progress.looping.store(looping, Ordering::SeqCst);
  }

  pub fn is_looping(&self) -> bool {
    self.progress.looping.load(Ordering::SeqCst)
  }

  /// All the song was played, or streaming it failed
  pub fn is_finished(&self) -> bool {
    self.progress.finished.load(Ordering::SeqCst)
  }

  /// Register on the player and queue the first buffers of the song.
  pub fn attach(&self, player: &Player) -> Result<()> {
    let sender = player.stream_sender();
    let ahead_us = player.config().buffer_ahead_us;
    let capacity = player.config().event_buffer_size;

    {
      let source = self.source.lock();
      sender.set_division(source.division().ppqn() as i64);
      sender.set_tempo(source.initial_tempo().micros());
    }
    self.progress.in_flight.store(0, Ordering::SeqCst);
    self.progress.finished.store(false, Ordering::SeqCst);

    let source = self.source.clone();
    let progress = self.progress.clone();
    let callback_sender = sender.clone();
    player.on_buffer_consumed(move |mut buffer| {
      let looping = progress.looping.load(Ordering::SeqCst);
      match refill(source.lock().as_mut(), &mut buffer, ahead_us, looping) {
        Ok(true) => callback_sender.stream_out(buffer),
        Ok(false) => progress.retire(),
        Err(err) => {
          warn!("Song streaming stopped: {}", err);
          progress.retire()
        }
      }
    });

    let looping = self.is_looping();
    for _ in 0..NUM_BUFFERS {
      let mut buffer = EventBuffer::with_capacity(capacity);
      if refill(self.source.lock().as_mut(), &mut buffer, ahead_us, looping)? {
        self.progress.in_flight.fetch_add(1, Ordering::SeqCst);
        sender.stream_out(buffer);
      }
    }
    if self.progress.in_flight.load(Ordering::SeqCst) == 0 {
      self.progress.finished.store(true, Ordering::SeqCst);
    }
    Ok(())
  }

  /// Rewind the song and queue it again, for a player that was stopped.
  pub fn restart(&self, player: &Player) -> Result<()> {
    self.source.lock().restart();
    self.attach(player)
  }
}
