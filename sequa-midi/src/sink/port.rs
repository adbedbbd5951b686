//! OS MIDI output ports (ALSA, CoreMIDI, WinMM) through `midir`.

#[cfg(feature = "midir")]
use log::debug;
use sequa_time::HostTime;

use crate::error::{MidiError, Result};
use crate::sink::{DeviceIndex, MidiOutDeviceInfo, MidiSink};

#[cfg(feature = "midir")]
const CLIENT_NAME: &str = "sequa";

#[cfg(feature = "midir")]
fn connect_error<E: std::fmt::Display>(name: &str, err: E) -> MidiError {
  MidiError::Connect(name.to_string(), err.to_string())
}

#[cfg(feature = "midir")]
pub fn list_output_devices() -> Result<Vec<MidiOutDeviceInfo>> {
  let output = midir::MidiOutput::new(CLIENT_NAME).map_err(|err| connect_error(CLIENT_NAME, err))?;
  Ok(
    output
      .ports()
      .iter()
      .enumerate()
      .map(|(index, port)| {
        let name = output
          .port_name(port)
          .unwrap_or_else(|_| format!("MIDI output {}", index));
        MidiOutDeviceInfo::new(index, name)
      })
      .collect(),
  )
}

#[cfg(not(feature = "midir"))]
pub fn list_output_devices() -> Result<Vec<MidiOutDeviceInfo>> {
  Err(MidiError::NotAvailable("midir"))
}

/// Sink writing to the OS MIDI output port at a given index.
///
/// The OS ports have no scheduling facility, messages are sent as they arrive.
pub struct MidiPortSink {
  index: DeviceIndex,
  name: String,
  #[cfg(feature = "midir")]
  connection: Option<midir::MidiOutputConnection>,
}

impl MidiPortSink {
  pub fn new(index: DeviceIndex) -> Self {
    Self {
      index,
      name: format!("MIDI output {}", index),
      #[cfg(feature = "midir")]
      connection: None,
    }
  }

  pub fn index(&self) -> DeviceIndex {
    self.index
  }
}

#[cfg(feature = "midir")]
impl MidiSink for MidiPortSink {
  fn name(&self) -> &str {
    self.name.as_str()
  }

  fn open(&mut self) -> Result<()> {
    if self.connection.is_some() {
      return Ok(());
    }
    let output = midir::MidiOutput::new(CLIENT_NAME).map_err(|err| connect_error(&self.name, err))?;
    let ports = output.ports();
    let port = ports.get(self.index).ok_or(MidiError::DeviceIndex(self.index))?;
    if let Ok(name) = output.port_name(port) {
      self.name = name;
    }
    let connection = output
      .connect(port, CLIENT_NAME)
      .map_err(|err| connect_error(&self.name, err))?;
    debug!("Connected to MIDI output {}: {}", self.index, self.name);
    self.connection = Some(connection);
    Ok(())
  }

  fn close(&mut self) {
    if let Some(connection) = self.connection.take() {
      connection.close();
      debug!("Closed MIDI output {}", self.name);
    }
  }

  fn is_open(&self) -> bool {
    self.connection.is_some()
  }

  fn send(&mut self, bytes: &[u8], _at: Option<HostTime>) -> Result<()> {
    let connection = self
      .connection
      .as_mut()
      .ok_or_else(|| MidiError::Send(format!("{} is not open", self.name)))?;
    connection
      .send(bytes)
      .map_err(|err| MidiError::Send(err.to_string()))
  }
}

#[cfg(not(feature = "midir"))]
impl MidiSink for MidiPortSink {
  fn name(&self) -> &str {
    self.name.as_str()
  }

  fn open(&mut self) -> Result<()> {
    Err(MidiError::NotAvailable("midir"))
  }

  fn close(&mut self) {}

  fn is_open(&self) -> bool {
    false
  }

  fn send(&mut self, _bytes: &[u8], _at: Option<HostTime>) -> Result<()> {
    Err(MidiError::NotAvailable("midir"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn closed_sink_is_idle() {
    let mut sink = MidiPortSink::new(3);
    assert_eq!(sink.index(), 3);
    assert!(!sink.is_open());
    assert!(!sink.supports_scheduling());
    sink.close();
    assert!(sink.send(&[0x90, 60, 100], None).is_err());
  }

  #[cfg(not(feature = "midir"))]
  #[test]
  fn unavailable_without_midir() {
    assert_eq!(list_output_devices(), Err(MidiError::NotAvailable("midir")));
    assert_eq!(
      MidiPortSink::new(0).open(),
      Err(MidiError::NotAvailable("midir"))
    );
  }
}
