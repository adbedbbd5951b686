//! Push side outputs: sinks that take encoded MIDI bytes and forward them to a device.

mod port;

use sequa_time::HostTime;

use crate::error::Result;

pub use port::{list_output_devices, MidiPortSink};

pub type DeviceIndex = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiOutDeviceInfo {
  pub index: DeviceIndex,
  pub name: String,
}

impl MidiOutDeviceInfo {
  pub fn new(index: DeviceIndex, name: String) -> Self {
    Self { index, name }
  }
}

/// A destination for complete, encoded MIDI messages.
///
/// Timestamps are host time in nanoseconds from the start of playback. Sinks that
/// return `false` from [`MidiSink::supports_scheduling`] send immediately and the
/// caller is expected to wait until each message is due.
pub trait MidiSink: Send {
  fn name(&self) -> &str;

  fn open(&mut self) -> Result<()>;

  fn close(&mut self);

  fn is_open(&self) -> bool;

  fn supports_scheduling(&self) -> bool {
    false
  }

  fn send(&mut self, bytes: &[u8], at: Option<HostTime>) -> Result<()>;
}

impl<S: MidiSink + ?Sized> MidiSink for Box<S> {
  fn name(&self) -> &str {
    (**self).name()
  }

  fn open(&mut self) -> Result<()> {
    (**self).open()
  }

  fn close(&mut self) {
    (**self).close()
  }

  fn is_open(&self) -> bool {
    (**self).is_open()
  }

  fn supports_scheduling(&self) -> bool {
    (**self).supports_scheduling()
  }

  fn send(&mut self, bytes: &[u8], at: Option<HostTime>) -> Result<()> {
    (**self).send(bytes, at)
  }
}
