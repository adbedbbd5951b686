use log::{debug, warn};

use sequa_midi::{encode_short, MidiMessage, MidiSink};
use sequa_time::HostTime;

use crate::error::Result;
use crate::renderer::{DeviceType, Renderer};

/// Push renderer: every message is encoded and handed to a [`MidiSink`].
///
/// Timestamps only reach sinks that schedule by themselves. For the others the player
/// waits until each event is due and the message goes out immediately, so timing is
/// as good as the thread wake up latency.
pub struct SinkRenderer<S: MidiSink> {
  sink: S,
  failures: u64,
}

impl<S: MidiSink> SinkRenderer<S> {
  pub fn new(sink: S) -> Self {
    Self { sink, failures: 0 }
  }

  pub fn sink(&self) -> &S {
    &self.sink
  }

  /// Messages the sink failed to send since it was created
  pub fn failures(&self) -> u64 {
    self.failures
  }

  fn send(&mut self, at: HostTime, bytes: &[u8]) {
    let timestamp = if self.sink.supports_scheduling() {
      Some(at)
    } else {
      None
    };
    if let Err(err) = self.sink.send(bytes, timestamp) {
      self.failures += 1;
      warn!("{}: {}", self.sink.name(), err);
    }
  }
}

impl<S: MidiSink> Renderer for SinkRenderer<S> {
  fn device_type(&self) -> DeviceType {
    DeviceType::MidiOut
  }

  fn open(&mut self) -> Result<()> {
    self.sink.open()?;
    debug!("Opened MIDI sink {}", self.sink.name());
    Ok(())
  }

  fn close(&mut self) {
    if self.sink.is_open() {
      self.sink.close();
      debug!("Closed MIDI sink {}", self.sink.name());
    }
  }

  fn is_open(&self) -> bool {
    self.sink.is_open()
  }

  fn dispatch(&mut self, at: HostTime, message: MidiMessage) {
    let (bytes, len) = encode_short(&message);
    self.send(at, &bytes[..len]);
  }

  fn system_exclusive(&mut self, at: HostTime, data: &[u8]) {
    self.send(at, data);
  }
}
