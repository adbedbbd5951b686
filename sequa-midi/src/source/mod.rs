pub mod mids;
pub mod mus;
pub mod smf;

use log::{debug, warn};
use sequa_time::{Division, Tempo};

use crate::canonical::{CanonicalEvent, EventBuffer, EventPayload};
use crate::error::{MidiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongFormat {
  Smf,
  Mus,
  Mids,
}

/// A decoded song: the canonical event sequence plus its timing information.
#[derive(Debug, Clone, PartialEq)]
pub struct Song {
  pub format: SongFormat,
  pub division: Division,
  pub initial_tempo: Tempo,
  /// Events sent at the start of every (re)start before the song itself
  pub setup: Vec<CanonicalEvent>,
  pub events: Vec<CanonicalEvent>,
}

impl Song {
  /// Initial tempo taken from the first event when it is a tempo change.
  pub(crate) fn first_tempo(events: &[CanonicalEvent]) -> Option<Tempo> {
    match events.first().map(|event| &event.payload) {
      Some(EventPayload::Tempo(micros)) => Tempo::new(*micros).ok(),
      _ => None,
    }
  }

  pub fn total_ticks(&self) -> u64 {
    self.events.iter().map(|event| event.delta as u64).sum()
  }
}

pub fn detect(data: &[u8]) -> Option<SongFormat> {
  match data.get(0..4)? {
    b"MThd" => Some(SongFormat::Smf),
    b"MUS\x1a" => Some(SongFormat::Mus),
    b"RIFF" if data.get(8..12) == Some(b"MIDS") => Some(SongFormat::Mids),
    _ => None,
  }
}

/// Decode a song choosing the decoder from its magic bytes.
pub fn load(data: &[u8]) -> Result<Song> {
  let format = detect(data).ok_or(MidiError::UnsupportedFormat)?;
  let song = match format {
    SongFormat::Smf => smf::parse(data),
    SongFormat::Mus => mus::parse(data),
    SongFormat::Mids => mids::parse(data),
  }?;
  debug!(
    "Loaded {:?} song: {} events, {}, {}",
    song.format,
    song.events.len(),
    song.division,
    song.initial_tempo
  );
  Ok(song)
}

/// Producer side of a song: fills event buffers on demand.
pub trait MidiSource: Send {
  fn division(&self) -> Division;
  fn initial_tempo(&self) -> Tempo;

  /// Append events worth up to `max_time_us` microseconds at the current tempo.
  /// Returns the number of events written.
  fn make_events(&mut self, buffer: &mut EventBuffer, max_time_us: u64) -> Result<usize>;

  fn is_done(&self) -> bool;

  /// Rewind to the start of the song
  fn restart(&mut self);
}

/// Cursor over a decoded [`Song`]
pub struct SongSource {
  song: Song,
  position: usize,
  tempo: Tempo,
  pending_start: bool,
  /// Start events written so far: the initial tempo, then the setup
  start_position: usize,
}

impl SongSource {
  pub fn new(song: Song) -> Self {
    let tempo = song.initial_tempo;
    Self {
      song,
      position: 0,
      tempo,
      pending_start: true,
      start_position: 0,
    }
  }

  pub fn song(&self) -> &Song {
    &self.song
  }

  pub fn position(&self) -> usize {
    self.position
  }

  /// Write the start events that fit, the rest goes into the next buffers.
  fn write_start(&mut self, buffer: &mut EventBuffer) -> Result<usize> {
    let tempo = CanonicalEvent::tempo(0, self.song.initial_tempo.micros());
    let mut written = 0;
    loop {
      let event = match self.start_position {
        0 => &tempo,
        position => match self.song.setup.get(position - 1) {
          Some(event) => event,
          None => break,
        },
      };
      match buffer.push(event) {
        Ok(()) => {}
        Err(MidiError::BufferFull { .. }) if written > 0 => return Ok(written),
        Err(err) => return Err(err),
      }
      if self.start_position == 0 {
        self.tempo = self.song.initial_tempo;
      }
      self.start_position += 1;
      written += 1;
    }
    self.pending_start = false;
    Ok(written)
  }
}

impl MidiSource for SongSource {
  fn division(&self) -> Division {
    self.song.division
  }

  fn initial_tempo(&self) -> Tempo {
    self.song.initial_tempo
  }

  fn make_events(&mut self, buffer: &mut EventBuffer, max_time_us: u64) -> Result<usize> {
    let mut written = 0;
    if self.pending_start {
      written += self.write_start(buffer)?;
      if self.pending_start {
        return Ok(written);
      }
    }

    let max_ticks = self.tempo.micros_to_ticks(max_time_us, self.song.division);
    let mut total_ticks = 0u64;
    while total_ticks <= max_ticks {
      let Some(event) = self.song.events.get(self.position) else {
        break;
      };
      match buffer.push(event) {
        Ok(()) => {}
        Err(MidiError::BufferFull { .. }) if written > 0 => break,
        Err(MidiError::BufferFull { needed, .. }) if needed > buffer.capacity() => {
          warn!(
            "Skipping event {} of {} bytes, larger than the buffer",
            self.position, needed
          );
          self.position += 1;
          continue;
        }
        Err(err) => return Err(err),
      }
      if let EventPayload::Tempo(micros) = event.payload {
        self.tempo = Tempo::new(micros).unwrap_or(self.tempo);
      }
      total_ticks += event.delta as u64;
      self.position += 1;
      written += 1;
    }
    Ok(written)
  }

  fn is_done(&self) -> bool {
    !self.pending_start && self.position >= self.song.events.len()
  }

  fn restart(&mut self) {
    self.position = 0;
    self.pending_start = true;
    self.start_position = 0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn song(events: Vec<CanonicalEvent>) -> Song {
    Song {
      format: SongFormat::Smf,
      division: Division::new(96).unwrap(),
      initial_tempo: Tempo::DEFAULT,
      setup: vec![CanonicalEvent::short(0, 0xb0, 7, 100)],
      events,
    }
  }

  #[test]
  fn detect_formats() {
    assert_eq!(detect(b"MThd\0\0\0\x06"), Some(SongFormat::Smf));
    assert_eq!(detect(b"MUS\x1a\0\0"), Some(SongFormat::Mus));
    assert_eq!(detect(b"RIFF\0\0\0\0MIDSfmt "), Some(SongFormat::Mids));
    assert_eq!(detect(b"RIFF\0\0\0\0WAVEfmt "), None);
    assert_eq!(detect(b"MT"), None);
    assert_eq!(load(b"garbage!"), Err(MidiError::UnsupportedFormat));
  }

  #[test]
  fn first_buffer_starts_with_tempo_and_setup() {
    let mut source = SongSource::new(song(vec![CanonicalEvent::short(0, 0x90, 60, 100)]));
    let mut buffer = EventBuffer::default();
    let written = source.make_events(&mut buffer, 100_000).unwrap();
    assert_eq!(written, 3);
    assert_eq!(
      buffer.events().unwrap(),
      vec![
        CanonicalEvent::tempo(0, 500_000),
        CanonicalEvent::short(0, 0xb0, 7, 100),
        CanonicalEvent::short(0, 0x90, 60, 100),
      ]
    );
    assert!(source.is_done());
  }

  #[test]
  fn events_are_limited_by_time() {
    // 96 ticks per quarter at 120 bpm: 100ms is 19 ticks
    let events = (0..10)
      .map(|i| CanonicalEvent::short(10, 0x90, i, 100))
      .collect::<Vec<_>>();
    let mut source = SongSource::new(song(events));
    let mut buffer = EventBuffer::default();
    source.make_events(&mut buffer, 100_000).unwrap();
    // tempo + setup, then events until more than 19 ticks were written
    assert_eq!(buffer.events().unwrap().len(), 2 + 2);
    assert!(!source.is_done());

    let mut rest = EventBuffer::default();
    while !source.is_done() {
      source.make_events(&mut rest, 1_000_000).unwrap();
    }
    assert_eq!(rest.events().unwrap().len(), 8);
  }

  #[test]
  fn events_are_limited_by_buffer_capacity() {
    let events = (0..10)
      .map(|i| CanonicalEvent::short(0, 0x90, i, 100))
      .collect::<Vec<_>>();
    let mut source = SongSource::new(song(events));
    let mut buffer = EventBuffer::with_capacity(5 * 12);
    assert_eq!(source.make_events(&mut buffer, 1_000_000).unwrap(), 5);
    assert_eq!(source.position(), 3);
  }

  #[test]
  fn start_events_span_small_buffers() {
    let mut song = song(vec![
      CanonicalEvent::short(0, 0x90, 60, 100),
      CanonicalEvent::short(24, 0x80, 60, 0),
    ]);
    song.setup = (0..16)
      .map(|channel| CanonicalEvent::short(0, 0xb0 | channel, 7, 100))
      .collect();
    let mut source = SongSource::new(song.clone());

    let mut received = Vec::new();
    let mut buffer = EventBuffer::with_capacity(120);
    let mut fills = 0;
    while !source.is_done() {
      buffer.clear();
      assert!(source.make_events(&mut buffer, 1_000_000).unwrap() > 0);
      received.extend(buffer.events().unwrap());
      fills += 1;
    }
    assert_eq!(fills, 2);

    let mut expected = vec![CanonicalEvent::tempo(0, 500_000)];
    expected.extend(song.setup);
    expected.extend(song.events);
    assert_eq!(received, expected);
  }

  #[test]
  fn restart_rewinds_and_resends_start() {
    let mut source = SongSource::new(song(vec![CanonicalEvent::short(0, 0x90, 60, 100)]));
    let mut buffer = EventBuffer::default();
    source.make_events(&mut buffer, 100_000).unwrap();
    assert!(source.is_done());
    source.restart();
    assert!(!source.is_done());
    buffer.clear();
    assert_eq!(source.make_events(&mut buffer, 100_000).unwrap(), 3);
  }

  #[test]
  fn tempo_events_change_the_fill_window() {
    let events = vec![
      CanonicalEvent::tempo(0, 1_000_000),
      CanonicalEvent::short(48, 0x90, 60, 100),
      CanonicalEvent::short(48, 0x80, 60, 0),
    ];
    let mut source = SongSource::new(song(events));
    let mut buffer = EventBuffer::default();
    // the window is computed with the tempo at the start of the fill: 38 ticks
    source.make_events(&mut buffer, 200_000).unwrap();
    assert_eq!(source.position(), 2);
    buffer.clear();
    // at 1s per quarter 500ms is 48 ticks
    source.make_events(&mut buffer, 500_000).unwrap();
    assert!(source.is_done());
  }
}
