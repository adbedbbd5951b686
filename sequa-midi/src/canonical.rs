//! Canonical event encoding shared by every song format.
//!
//! Each event is three little-endian 32-bit words: the delta time in ticks, a reserved
//! stream id and the payload. The payload's high byte is the event tag and the low 24
//! bits its parameter. Long messages are followed by their raw bytes, padded to a
//! multiple of four.

use crate::error::{MidiError, Result};

pub mod tag {
  pub const SHORT_MSG: u8 = 0x00;
  pub const TEMPO: u8 = 0x01;
  pub const NOP: u8 = 0x02;
  pub const LONG_MSG: u8 = 0x80;

  /// Requests a notification when the event is played, ignored by the scheduler
  pub const CALLBACK_FLAG: u8 = 0x40;
  /// Tags with this bit set carry `parameter` bytes of inline data
  pub const LONG_FORM: u8 = 0x80;
}

pub const EVENT_HEADER_LEN: usize = 12;
pub const MAX_PARAMETER: u32 = 0x00ff_ffff;

pub fn pack_payload(event_tag: u8, parameter: u32) -> u32 {
  ((event_tag as u32) << 24) | (parameter & MAX_PARAMETER)
}

pub fn payload_tag(payload: u32) -> u8 {
  ((payload >> 24) as u8) & !tag::CALLBACK_FLAG
}

pub fn payload_parameter(payload: u32) -> u32 {
  payload & MAX_PARAMETER
}

fn padded(len: usize) -> usize {
  (len + 3) & !3
}

/// Owned event payload
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
  Short([u8; 3]),
  Tempo(u32),
  Nop,
  Long(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEvent {
  pub delta: u32,
  pub stream_id: u32,
  pub payload: EventPayload,
}

impl CanonicalEvent {
  pub fn short(delta: u32, status: u8, data1: u8, data2: u8) -> Self {
    Self::new(delta, EventPayload::Short([status, data1, data2]))
  }

  pub fn tempo(delta: u32, micros_per_quarter: u32) -> Self {
    Self::new(delta, EventPayload::Tempo(micros_per_quarter))
  }

  pub fn nop(delta: u32) -> Self {
    Self::new(delta, EventPayload::Nop)
  }

  pub fn long(delta: u32, data: Vec<u8>) -> Self {
    Self::new(delta, EventPayload::Long(data))
  }

  fn new(delta: u32, payload: EventPayload) -> Self {
    Self {
      delta,
      stream_id: 0,
      payload,
    }
  }

  /// Bytes this event takes in an [`EventBuffer`]
  pub fn footprint(&self) -> usize {
    match &self.payload {
      EventPayload::Long(data) => EVENT_HEADER_LEN + padded(data.len()),
      _ => EVENT_HEADER_LEN,
    }
  }

  pub fn payload_word(&self) -> u32 {
    match &self.payload {
      EventPayload::Short([status, data1, data2]) => {
        pack_payload(tag::SHORT_MSG, u32::from_le_bytes([*status, *data1, *data2, 0]))
      }
      EventPayload::Tempo(tempo) => pack_payload(tag::TEMPO, *tempo),
      EventPayload::Nop => pack_payload(tag::NOP, 0),
      EventPayload::Long(data) => pack_payload(tag::LONG_MSG, data.len() as u32),
    }
  }
}

/// Borrowed view of an event inside a buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind<'a> {
  Short([u8; 3]),
  Tempo(u32),
  Nop,
  Long(&'a [u8]),
  Unknown(u8),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventRef<'a> {
  pub delta: u32,
  pub stream_id: u32,
  pub kind: EventKind<'a>,
  pub footprint: usize,
}

impl<'a> EventRef<'a> {
  pub fn to_event(&self) -> Option<CanonicalEvent> {
    let payload = match self.kind {
      EventKind::Short(bytes) => EventPayload::Short(bytes),
      EventKind::Tempo(tempo) => EventPayload::Tempo(tempo),
      EventKind::Nop => EventPayload::Nop,
      EventKind::Long(data) => EventPayload::Long(data.to_vec()),
      EventKind::Unknown(_) => return None,
    };
    Some(CanonicalEvent {
      delta: self.delta,
      stream_id: self.stream_id,
      payload,
    })
  }
}

fn read_word(data: &[u8], offset: usize) -> Option<u32> {
  let bytes = data.get(offset..offset + 4)?;
  Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read the event starting at `offset`, checking that it fits completely inside `data`.
pub fn read_event(data: &[u8], offset: usize) -> Result<EventRef<'_>> {
  let truncated = || {
    MidiError::malformed(format!(
      "event at offset {} overruns the buffer of {} bytes",
      offset,
      data.len()
    ))
  };

  let delta = read_word(data, offset).ok_or_else(truncated)?;
  let stream_id = read_word(data, offset + 4).ok_or_else(truncated)?;
  let payload = read_word(data, offset + 8).ok_or_else(truncated)?;
  let parameter = payload_parameter(payload);
  let event_tag = payload_tag(payload);

  let (kind, footprint) = match event_tag {
    tag::SHORT_MSG => {
      let [status, data1, data2, _] = parameter.to_le_bytes();
      (EventKind::Short([status, data1, data2]), EVENT_HEADER_LEN)
    }
    tag::TEMPO => (EventKind::Tempo(parameter), EVENT_HEADER_LEN),
    tag::NOP => (EventKind::Nop, EVENT_HEADER_LEN),
    _ if event_tag & tag::LONG_FORM != 0 => {
      let start = offset + EVENT_HEADER_LEN;
      let len = parameter as usize;
      let footprint = EVENT_HEADER_LEN + padded(len);
      if offset + footprint > data.len() {
        return Err(truncated());
      }
      let kind = if event_tag == tag::LONG_MSG {
        EventKind::Long(&data[start..start + len])
      } else {
        EventKind::Unknown(event_tag)
      };
      (kind, footprint)
    }
    _ => (EventKind::Unknown(event_tag), EVENT_HEADER_LEN),
  };

  Ok(EventRef {
    delta,
    stream_id,
    kind,
    footprint,
  })
}

/// A block of encoded events handed from the producer to the scheduler as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBuffer {
  data: Vec<u8>,
  capacity: usize,
}

impl EventBuffer {
  pub const DEFAULT_CAPACITY: usize = 4096;

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      data: Vec::with_capacity(capacity),
      capacity,
    }
  }

  /// Build a buffer from raw little-endian bytes, validating that the first `declared_len`
  /// bytes hold complete events.
  pub fn from_le_bytes(bytes: &[u8], declared_len: usize) -> Result<Self> {
    if declared_len > bytes.len() {
      return Err(MidiError::malformed(format!(
        "declared length {} overruns the {} bytes available",
        declared_len,
        bytes.len()
      )));
    }
    let data = &bytes[..declared_len];
    let mut offset = 0;
    while offset < data.len() {
      offset += read_event(data, offset)?.footprint;
    }
    Ok(Self {
      data: data.to_vec(),
      capacity: declared_len,
    })
  }

  pub fn from_events<'a, I>(events: I) -> Self
  where
    I: IntoIterator<Item = &'a CanonicalEvent>,
  {
    let mut buffer = Self::with_capacity(0);
    for event in events {
      buffer.capacity += event.footprint();
      buffer.write(event);
    }
    buffer
  }

  /// Recorded length in bytes
  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn remaining(&self) -> usize {
    self.capacity.saturating_sub(self.data.len())
  }

  pub fn clear(&mut self) {
    self.data.clear();
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  pub fn push(&mut self, event: &CanonicalEvent) -> Result<()> {
    let needed = event.footprint();
    if needed > self.remaining() {
      return Err(MidiError::BufferFull {
        needed,
        available: self.remaining(),
      });
    }
    match &event.payload {
      EventPayload::Tempo(tempo) if *tempo > MAX_PARAMETER => Err(MidiError::malformed(format!(
        "tempo {} does not fit in 24 bits",
        tempo
      ))),
      EventPayload::Long(data) if data.len() > MAX_PARAMETER as usize => Err(MidiError::malformed(
        format!("long message of {} bytes is too large", data.len()),
      )),
      _ => {
        self.write(event);
        Ok(())
      }
    }
  }

  pub fn push_short(&mut self, delta: u32, status: u8, data1: u8, data2: u8) -> Result<()> {
    self.push(&CanonicalEvent::short(delta, status, data1, data2))
  }

  pub fn push_tempo(&mut self, delta: u32, micros_per_quarter: u32) -> Result<()> {
    self.push(&CanonicalEvent::tempo(delta, micros_per_quarter))
  }

  pub fn push_nop(&mut self, delta: u32) -> Result<()> {
    self.push(&CanonicalEvent::nop(delta))
  }

  pub fn push_long(&mut self, delta: u32, data: &[u8]) -> Result<()> {
    self.push(&CanonicalEvent::long(delta, data.to_vec()))
  }

  fn write(&mut self, event: &CanonicalEvent) {
    self.data.extend_from_slice(&event.delta.to_le_bytes());
    self.data.extend_from_slice(&event.stream_id.to_le_bytes());
    self.data.extend_from_slice(&event.payload_word().to_le_bytes());
    if let EventPayload::Long(bytes) = &event.payload {
      self.data.extend_from_slice(bytes);
      self.data.resize(self.data.len() + padded(bytes.len()) - bytes.len(), 0);
    }
  }

  pub fn read_at(&self, offset: usize) -> Result<EventRef<'_>> {
    read_event(&self.data, offset)
  }

  pub fn iter(&self) -> EventReader<'_> {
    EventReader {
      data: &self.data,
      offset: 0,
      failed: false,
    }
  }

  /// Decode every known event, failing on the first malformed one.
  pub fn events(&self) -> Result<Vec<CanonicalEvent>> {
    let mut events = Vec::new();
    for event in self.iter() {
      if let Some(event) = event?.to_event() {
        events.push(event);
      }
    }
    Ok(events)
  }
}

impl Default for EventBuffer {
  fn default() -> Self {
    Self::with_capacity(Self::DEFAULT_CAPACITY)
  }
}

pub struct EventReader<'a> {
  data: &'a [u8],
  offset: usize,
  failed: bool,
}

impl<'a> Iterator for EventReader<'a> {
  type Item = Result<EventRef<'a>>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.failed || self.offset >= self.data.len() {
      return None;
    }
    let result = read_event(self.data, self.offset);
    match &result {
      Ok(event) => self.offset += event.footprint,
      Err(_) => self.failed = true,
    }
    Some(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn short_messages_round_trip() {
    let messages = [
      (0, 0x90, 60, 100),
      (96, 0x80, 60, 0),
      (0, 0xc3, 17, 0),
      (1000, 0xe0, 0x00, 0x40),
      (0x00ff_ffff, 0xb9, 7, 127),
    ];
    let mut buffer = EventBuffer::default();
    for (delta, status, data1, data2) in messages.iter().cloned() {
      buffer.push_short(delta, status, data1, data2).unwrap();
    }
    assert_eq!(buffer.len(), messages.len() * EVENT_HEADER_LEN);

    let decoded = buffer
      .iter()
      .map(|event| {
        let event = event.unwrap();
        match event.kind {
          EventKind::Short([status, data1, data2]) => (event.delta, status, data1, data2),
          kind => panic!("Unexpected kind: {:?}", kind),
        }
      })
      .collect::<Vec<_>>();
    assert_eq!(decoded, messages.to_vec());
  }

  #[test]
  fn long_messages_are_padded() {
    let sysex = [0xf0, 0x7e, 0x7f, 0x09, 0x01, 0xf7];
    let mut buffer = EventBuffer::default();
    buffer.push_long(5, &sysex).unwrap();
    buffer.push_short(0, 0x90, 1, 2).unwrap();
    assert_eq!(buffer.len(), EVENT_HEADER_LEN + 8 + EVENT_HEADER_LEN);

    let events = buffer.events().unwrap();
    assert_eq!(
      events,
      vec![
        CanonicalEvent::long(5, sysex.to_vec()),
        CanonicalEvent::short(0, 0x90, 1, 2)
      ]
    );
  }

  #[test]
  fn tempo_and_nop_events() {
    let events = vec![CanonicalEvent::tempo(0, 600_000), CanonicalEvent::nop(12)];
    let buffer = EventBuffer::from_events(&events);
    assert_eq!(buffer.remaining(), 0);
    assert_eq!(buffer.events().unwrap(), events);
  }

  #[test]
  fn callback_flag_is_ignored() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&(0x4100_0000u32 | 400_000).to_le_bytes());
    let buffer = EventBuffer::from_le_bytes(&bytes, bytes.len()).unwrap();
    assert_eq!(buffer.read_at(0).unwrap().kind, EventKind::Tempo(400_000));
  }

  #[test]
  fn unknown_events_are_skipped_by_footprint() {
    let mut bytes = Vec::new();
    // unknown short form
    for word in [0u32, 0, 0x0700_0000] {
      bytes.extend_from_slice(&word.to_le_bytes());
    }
    // unknown long form with 5 bytes of data
    for word in [0u32, 0, 0x8200_0005] {
      bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes.extend_from_slice(&[1, 2, 3, 4, 5, 0, 0, 0]);
    for word in [3u32, 0, 0x0000_3c90] {
      bytes.extend_from_slice(&word.to_le_bytes());
    }

    let buffer = EventBuffer::from_le_bytes(&bytes, bytes.len()).unwrap();
    let kinds = buffer
      .iter()
      .map(|event| event.unwrap().kind)
      .collect::<Vec<_>>();
    assert_eq!(
      kinds,
      vec![
        EventKind::Unknown(0x07),
        EventKind::Unknown(0x82),
        EventKind::Short([0x90, 0x3c, 0x00])
      ]
    );
    assert_eq!(buffer.events().unwrap().len(), 1);
  }

  #[test]
  fn declared_length_overrun_is_malformed() {
    let mut buffer = EventBuffer::default();
    buffer.push_short(0, 0x90, 60, 100).unwrap();
    let bytes = buffer.as_bytes();
    let result = EventBuffer::from_le_bytes(bytes, bytes.len() + 4);
    assert!(
      matches!(result, Err(MidiError::MalformedInput(_))),
      "Unexpected result: {:?}",
      result
    );
  }

  #[test]
  fn buffer_ending_mid_event_is_malformed() {
    let mut buffer = EventBuffer::default();
    buffer.push_short(0, 0x90, 60, 100).unwrap();
    buffer.push_short(96, 0x80, 60, 0).unwrap();
    let bytes = &buffer.as_bytes()[..EVENT_HEADER_LEN + 8];
    let result = EventBuffer::from_le_bytes(bytes, bytes.len());
    assert!(
      matches!(result, Err(MidiError::MalformedInput(_))),
      "Unexpected result: {:?}",
      result
    );
  }

  #[test]
  fn long_message_overrun_is_malformed() {
    let mut bytes = Vec::new();
    for word in [0u32, 0, 0x8000_0010] {
      bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes.extend_from_slice(&[0xf0, 0x01, 0x02, 0xf7]);
    assert!(read_event(&bytes, 0).is_err());
    let buffer = EventBuffer {
      data: bytes,
      capacity: 16,
    };
    let mut reader = buffer.iter();
    assert!(matches!(reader.next(), Some(Err(MidiError::MalformedInput(_)))));
    assert!(reader.next().is_none());
  }

  #[test]
  fn full_buffer_rejects_events() {
    let mut buffer = EventBuffer::with_capacity(EVENT_HEADER_LEN);
    buffer.push_nop(0).unwrap();
    assert_eq!(
      buffer.push_nop(0),
      Err(MidiError::BufferFull {
        needed: EVENT_HEADER_LEN,
        available: 0
      })
    );
  }

  #[test]
  fn oversized_tempo_is_rejected() {
    let mut buffer = EventBuffer::default();
    assert!(buffer.push_tempo(0, 0x0100_0000).is_err());
    assert!(buffer.is_empty());
  }
}
