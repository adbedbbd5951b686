//! Pending buffer queue shared between the producer and the player thread.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use sequa_midi::EventBuffer;

/// Called from the player thread with every buffer once all its events were played.
/// It must not block: refill and enqueue, or drop the buffer to end the stream.
pub type ConsumedCallback = Box<dyn FnMut(EventBuffer) + Send + 'static>;

#[derive(Debug, Default)]
pub(crate) struct QueueState {
  pub buffers: VecDeque<EventBuffer>,
  pub paused: bool,
  pub exit: bool,
  pub pending_tempo: Option<u32>,
  pub pending_division: Option<i64>,
}

impl QueueState {
  pub fn has_settings(&self) -> bool {
    self.pending_tempo.is_some() || self.pending_division.is_some()
  }
}

/// The queue, the pause and exit flags live under one lock paired with one condition
/// variable, so a wake up is never lost between checking a flag and waiting.
#[derive(Default)]
pub struct StreamQueue {
  state: Mutex<QueueState>,
  changed: Condvar,
  consumed: Mutex<Option<ConsumedCallback>>,
}

impl StreamQueue {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Append a buffer to the tail of the queue
  pub fn push(&self, buffer: EventBuffer) {
    self.state.lock().buffers.push_back(buffer);
    self.changed.notify_all();
  }

  pub fn set_tempo(&self, micros_per_quarter: u32) {
    self.state.lock().pending_tempo = Some(micros_per_quarter);
    self.changed.notify_all();
  }

  pub fn set_division(&self, ppqn: i64) {
    self.state.lock().pending_division = Some(ppqn);
    self.changed.notify_all();
  }

  /// Buffers waiting to be played
  pub fn pending(&self) -> usize {
    self.state.lock().buffers.len()
  }

  pub fn set_consumed_callback(&self, callback: Option<ConsumedCallback>) {
    *self.consumed.lock() = callback;
  }

  pub(crate) fn pop(&self) -> Option<EventBuffer> {
    self.state.lock().buffers.pop_front()
  }

  pub(crate) fn take_settings(&self) -> (Option<u32>, Option<i64>) {
    let mut state = self.state.lock();
    (state.pending_tempo.take(), state.pending_division.take())
  }

  /// Hand a played buffer back through the consumed callback, without the queue lock held
  pub(crate) fn release(&self, buffer: EventBuffer) {
    if let Some(callback) = self.consumed.lock().as_mut() {
      callback(buffer);
    }
  }

  /// Drop every pending buffer, returning how many there were
  pub(crate) fn clear(&self) -> usize {
    let mut state = self.state.lock();
    let count = state.buffers.len();
    state.buffers.clear();
    count
  }

  pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState> {
    self.state.lock()
  }

  pub(crate) fn condvar(&self) -> &Condvar {
    &self.changed
  }

  pub(crate) fn update<F: FnOnce(&mut QueueState)>(&self, f: F) {
    f(&mut self.state.lock());
    self.changed.notify_all();
  }
}

/// Producer handle to the queue of a player, safe to use from any thread.
#[derive(Clone)]
pub struct StreamSender {
  queue: Arc<StreamQueue>,
}

impl StreamSender {
  pub(crate) fn new(queue: Arc<StreamQueue>) -> Self {
    Self { queue }
  }

  pub fn stream_out(&self, buffer: EventBuffer) {
    self.queue.push(buffer)
  }

  pub fn set_tempo(&self, micros_per_quarter: u32) {
    self.queue.set_tempo(micros_per_quarter)
  }

  pub fn set_division(&self, ppqn: i64) {
    self.queue.set_division(ppqn)
  }

  pub fn pending(&self) -> usize {
    self.queue.pending()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  #[test]
  fn fifo_order() {
    let queue = StreamQueue::new();
    let sender = StreamSender::new(queue.clone());
    for capacity in [12, 24, 36] {
      sender.stream_out(EventBuffer::with_capacity(capacity));
    }
    assert_eq!(sender.pending(), 3);
    let capacities = std::iter::from_fn(|| queue.pop())
      .map(|buffer| buffer.capacity())
      .collect::<Vec<_>>();
    assert_eq!(capacities, vec![12, 24, 36]);
  }

  #[test]
  fn settings_are_taken_once() {
    let queue = StreamQueue::new();
    queue.set_tempo(400_000);
    queue.set_division(-1);
    assert_eq!(queue.take_settings(), (Some(400_000), Some(-1)));
    assert_eq!(queue.take_settings(), (None, None));
  }

  #[test]
  fn release_calls_the_callback() {
    let queue = StreamQueue::new();
    queue.release(EventBuffer::with_capacity(12));

    let released = Arc::new(AtomicUsize::new(0));
    let released_clone = released.clone();
    queue.set_consumed_callback(Some(Box::new(move |_| {
      released_clone.fetch_add(1, Ordering::SeqCst);
    })));
    queue.release(EventBuffer::with_capacity(12));
    queue.release(EventBuffer::with_capacity(12));
    assert_eq!(released.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn clear_drops_pending() {
    let queue = StreamQueue::new();
    queue.push(EventBuffer::with_capacity(12));
    queue.push(EventBuffer::with_capacity(12));
    assert_eq!(queue.clear(), 2);
    assert_eq!(queue.pending(), 0);
  }
}
