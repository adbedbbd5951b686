//! Walks the queued event buffers, converting deltas to absolute time and dispatching
//! every event to a renderer.

use std::sync::Arc;

use log::{debug, trace, warn};

use sequa_midi::{decode_short, EventBuffer, EventKind};
use sequa_time::{HostTime, TickClock};

use crate::queue::StreamQueue;
use crate::renderer::{route, Renderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
  /// Nothing queued
  Idle,
  /// One event was processed at this absolute time
  Played(HostTime),
}

pub struct Scheduler {
  queue: Arc<StreamQueue>,
  current: Option<EventBuffer>,
  cursor: usize,
  clock: TickClock,
}

impl Scheduler {
  pub fn new(queue: Arc<StreamQueue>, clock: TickClock) -> Self {
    Self {
      queue,
      current: None,
      cursor: 0,
      clock,
    }
  }

  pub fn queue(&self) -> &Arc<StreamQueue> {
    &self.queue
  }

  pub fn clock(&self) -> &TickClock {
    &self.clock
  }

  /// Absolute time of the last event played
  pub fn position(&self) -> HostTime {
    self.clock.position()
  }

  /// Apply tempo and division changes requested through the queue.
  pub fn sync<R: Renderer + ?Sized>(&mut self, renderer: &mut R) {
    let (tempo, division) = self.queue.take_settings();
    if let Some(micros_per_quarter) = tempo {
      self.apply_tempo(renderer, micros_per_quarter);
    }
    if let Some(ppqn) = division {
      if let Err(err) = self.clock.set_division(ppqn) {
        warn!("{}, using {}", err, self.clock.division());
      }
      renderer.set_time_division(self.clock.division().ppqn());
    }
  }

  fn apply_tempo<R: Renderer + ?Sized>(&mut self, renderer: &mut R, micros_per_quarter: u32) {
    if let Err(err) = self.clock.set_tempo(micros_per_quarter) {
      warn!("{}, using {}", err, self.clock.tempo());
    }
    renderer.set_tempo(self.clock.tempo().micros());
  }

  /// Make sure the cursor points to a readable event, releasing played buffers and
  /// taking new ones from the queue. Returns false when there is nothing to play.
  fn ensure_event(&mut self) -> bool {
    loop {
      if self.current.is_none() {
        self.current = self.queue.pop();
        self.cursor = 0;
      }
      match &self.current {
        None => return false,
        Some(buffer) if self.cursor >= buffer.len() => {}
        Some(buffer) => match buffer.read_at(self.cursor) {
          Ok(_) => return true,
          Err(err) => warn!("Dropping the rest of the buffer: {}", err),
        },
      }
      self.release_current();
    }
  }

  fn release_current(&mut self) {
    if let Some(buffer) = self.current.take() {
      trace!("Buffer of {} bytes consumed", buffer.len());
      self.queue.release(buffer);
    }
  }

  /// Absolute time of the next event at the current tempo, without playing it.
  pub fn next_event_time(&mut self) -> Option<HostTime> {
    if !self.ensure_event() {
      return None;
    }
    let buffer = self.current.as_ref()?;
    let event = buffer.read_at(self.cursor).ok()?;
    Some(self.clock.peek(event.delta))
  }

  /// Play the next event.
  pub fn play_tick<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> Tick {
    if !self.ensure_event() {
      return Tick::Idle;
    }
    let buffer = match self.current.as_ref() {
      Some(buffer) => buffer,
      None => return Tick::Idle,
    };
    let event = match buffer.read_at(self.cursor) {
      Ok(event) => event,
      Err(_) => return Tick::Idle,
    };
    self.cursor += event.footprint;
    let at = self.clock.advance(event.delta);

    match event.kind {
      EventKind::Short(bytes) => match decode_short(bytes) {
        Some(message) => route(renderer, at, message),
        None => debug!("Ignoring invalid short message {:02x?}", bytes),
      },
      EventKind::Long(data) => renderer.system_exclusive(at, data),
      EventKind::Tempo(micros_per_quarter) => {
        if let Err(err) = self.clock.set_tempo(micros_per_quarter) {
          warn!("{}, using {}", err, self.clock.tempo());
        }
        renderer.set_tempo(self.clock.tempo().micros());
      }
      EventKind::Nop => {}
      EventKind::Unknown(tag) => trace!("Skipping unknown event {:02x}", tag),
    }

    let finished = self
      .current
      .as_ref()
      .map_or(false, |buffer| self.cursor >= buffer.len());
    if finished {
      self.release_current();
    }

    Tick::Played(at)
  }

  /// Move the clock forward to `position` when it fell behind, so events queued
  /// after a starvation are not played in the past.
  pub fn resync(&mut self, position: HostTime) {
    if position > self.clock.position() {
      self.clock.set_position(position);
    }
  }

  /// Drop the buffer being played without calling back. Returns whether there was one.
  pub fn drain(&mut self) -> bool {
    self.cursor = 0;
    self.current.take().is_some()
  }

  /// Drain and rewind the clock to zero for a new playback.
  pub fn reset(&mut self) {
    self.drain();
    self.clock.reset();
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use sequa_midi::messages::channel_voice::{ChannelVoice, ChannelVoiceMessage};
  use sequa_midi::{CanonicalEvent, MidiMessage};

  use super::*;
  use crate::testing::RecordingRenderer;

  fn note_on(note: u8) -> MidiMessage {
    ChannelVoice::new(0, ChannelVoiceMessage::NoteOn { note, velocity: 100 }).into()
  }

  fn note_off(note: u8) -> MidiMessage {
    ChannelVoice::new(0, ChannelVoiceMessage::NoteOff { note, velocity: 0 }).into()
  }

  fn scheduler() -> Scheduler {
    Scheduler::new(StreamQueue::new(), TickClock::with_nanos())
  }

  fn play_all(scheduler: &mut Scheduler, renderer: &mut RecordingRenderer) {
    while scheduler.play_tick(renderer) != Tick::Idle {}
  }

  #[test]
  fn note_on_then_note_off_half_a_second_later() {
    let mut scheduler = scheduler();
    let mut renderer = RecordingRenderer::new();
    scheduler.queue().push(EventBuffer::from_events(&[
      CanonicalEvent::short(0, 0x90, 60, 100),
      CanonicalEvent::short(96, 0x80, 60, 0),
    ]));

    assert_eq!(scheduler.next_event_time(), Some(0));
    play_all(&mut scheduler, &mut renderer);

    assert_eq!(
      renderer.messages(),
      vec![(0, note_on(60)), (500_000_000, note_off(60))]
    );
  }

  #[test]
  fn tempo_change_only_affects_later_events() {
    let mut scheduler = scheduler();
    let mut renderer = RecordingRenderer::new();
    scheduler.queue().push(EventBuffer::from_events(&[
      CanonicalEvent::short(96, 0x90, 60, 100),
      CanonicalEvent::tempo(0, 250_000),
      CanonicalEvent::short(96, 0x80, 60, 0),
    ]));

    play_all(&mut scheduler, &mut renderer);

    assert_eq!(
      renderer.messages(),
      vec![(500_000_000, note_on(60)), (750_000_000, note_off(60))]
    );
    assert_eq!(renderer.tempos(), vec![250_000]);
  }

  #[test]
  fn timestamps_never_decrease_across_buffers() {
    let mut scheduler = scheduler();
    let mut renderer = RecordingRenderer::new();
    for delta in [0, 7, 0, 300, 1] {
      scheduler.queue().push(EventBuffer::from_events(&[
        CanonicalEvent::short(delta, 0x90, 60, 100),
        CanonicalEvent::tempo(0, 100_000 + delta * 1000),
        CanonicalEvent::short(delta, 0x80, 60, 0),
      ]));
    }
    play_all(&mut scheduler, &mut renderer);

    let times = renderer
      .messages()
      .iter()
      .map(|(at, _)| *at)
      .collect::<Vec<_>>();
    assert_eq!(times.len(), 10);
    assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));
  }

  #[test]
  fn buffers_are_released_once_when_played() {
    let mut scheduler = scheduler();
    let mut renderer = RecordingRenderer::new();
    let released = Arc::new(AtomicUsize::new(0));
    let released_clone = released.clone();
    scheduler
      .queue()
      .set_consumed_callback(Some(Box::new(move |_| {
        released_clone.fetch_add(1, Ordering::SeqCst);
      })));

    scheduler.queue().push(EventBuffer::from_events(&[
      CanonicalEvent::short(0, 0x90, 60, 100),
      CanonicalEvent::short(10, 0x80, 60, 0),
    ]));
    scheduler.queue().push(EventBuffer::with_capacity(64));

    assert_eq!(scheduler.play_tick(&mut renderer), Tick::Played(0));
    assert_eq!(released.load(Ordering::SeqCst), 0);
    assert!(matches!(scheduler.play_tick(&mut renderer), Tick::Played(_)));
    assert_eq!(released.load(Ordering::SeqCst), 1);
    // the empty buffer is handed back as soon as it is reached
    assert_eq!(scheduler.play_tick(&mut renderer), Tick::Idle);
    assert_eq!(released.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.play_tick(&mut renderer), Tick::Idle);
    assert_eq!(released.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn long_messages_and_unknown_events() {
    let mut scheduler = scheduler();
    let mut renderer = RecordingRenderer::new();
    scheduler.queue().push(EventBuffer::from_events(&[
      CanonicalEvent::long(0, vec![0xf0, 0x7e, 0xf7]),
      CanonicalEvent::nop(96),
      CanonicalEvent::short(0, 0x05, 0, 0),
      CanonicalEvent::short(0, 0xfa, 0, 0),
    ]));
    play_all(&mut scheduler, &mut renderer);

    assert_eq!(renderer.sysex(), vec![(0, vec![0xf0, 0x7e, 0xf7])]);
    assert_eq!(
      renderer.messages(),
      vec![(
        500_000_000,
        sequa_midi::messages::system::SystemMessage::Start.into()
      )]
    );
  }

  #[test]
  fn settings_from_the_queue() {
    let mut scheduler = scheduler();
    let mut renderer = RecordingRenderer::new();
    scheduler.queue().set_division(0);
    scheduler.queue().set_tempo(1_000_000);
    scheduler.sync(&mut renderer);

    assert_eq!(scheduler.clock().division().ppqn(), 96);
    assert_eq!(renderer.divisions(), vec![96]);
    assert_eq!(renderer.tempos(), vec![1_000_000]);

    scheduler
      .queue()
      .push(EventBuffer::from_events(&[CanonicalEvent::short(48, 0x90, 60, 1)]));
    assert_eq!(scheduler.next_event_time(), Some(500_000_000));
  }

  #[test]
  fn resync_only_moves_forward() {
    let mut scheduler = scheduler();
    scheduler.resync(1_000);
    assert_eq!(scheduler.position(), 1_000);
    scheduler.resync(10);
    assert_eq!(scheduler.position(), 1_000);
    scheduler.reset();
    assert_eq!(scheduler.position(), 0);
  }

  #[test]
  fn drain_drops_the_current_buffer() {
    let mut scheduler = scheduler();
    let mut renderer = RecordingRenderer::new();
    scheduler.queue().push(EventBuffer::from_events(&[
      CanonicalEvent::short(0, 0x90, 60, 100),
      CanonicalEvent::short(10, 0x80, 60, 0),
    ]));
    scheduler.play_tick(&mut renderer);
    assert!(scheduler.drain());
    assert_eq!(scheduler.play_tick(&mut renderer), Tick::Idle);
    assert_eq!(renderer.messages().len(), 1);
  }
}
