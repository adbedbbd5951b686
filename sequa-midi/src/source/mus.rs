//! MUS: the compact score format used by id Software games.

use log::{debug, warn};
use sequa_time::{Division, Tempo};

use crate::canonical::CanonicalEvent;
use crate::error::{MidiError, Result};
use crate::source::{Song, SongFormat};

const MAGIC: &[u8; 4] = b"MUS\x1a";
const HEADER_LEN: usize = 16;

/// 140 ticks per second
pub const DIVISION: u32 = 140;
pub const TEMPO: u32 = 1_000_000;

const PERCUSSION_CHANNEL: u8 = 15;
const MIDI_PERCUSSION_CHANNEL: u8 = 9;
const INITIAL_VOLUME: u8 = 100;

mod event {
  pub const RELEASE_NOTE: u8 = 0;
  pub const PLAY_NOTE: u8 = 1;
  pub const PITCH_BEND: u8 = 2;
  pub const SYSTEM_EVENT: u8 = 3;
  pub const CONTROLLER: u8 = 4;
  pub const MEASURE_END: u8 = 5;
  pub const SCORE_END: u8 = 6;
}

/// System events 10..=14
const SYSTEM_CONTROLLERS: [u8; 5] = [120, 123, 126, 127, 121];
/// Controllers 1..=9, controller 0 is a program change
const CONTROLLERS: [u8; 9] = [0, 1, 7, 10, 11, 91, 93, 64, 67];

#[derive(Debug, Clone, Copy)]
struct Header {
  score_len: usize,
  score_start: usize,
  primary_channels: u16,
  secondary_channels: u16,
  instruments: u16,
}

impl Header {
  fn read(data: &[u8]) -> Result<Header> {
    if data.get(0..4) != Some(&MAGIC[..]) {
      return Err(MidiError::malformed("MUS magic not found"));
    }
    if data.len() < HEADER_LEN {
      return Err(MidiError::malformed("MUS header truncated"));
    }
    let word = |offset: usize| u16::from_le_bytes([data[offset], data[offset + 1]]);
    let header = Header {
      score_len: word(4) as usize,
      score_start: word(6) as usize,
      primary_channels: word(8),
      secondary_channels: word(10),
      instruments: word(12),
    };
    if header.score_start + header.score_len > data.len() {
      return Err(MidiError::malformed(format!(
        "MUS score of {} bytes at {} overruns {} bytes of data",
        header.score_len,
        header.score_start,
        data.len()
      )));
    }
    Ok(header)
  }
}

struct Score<'a> {
  data: &'a [u8],
  position: usize,
}

impl<'a> Score<'a> {
  fn next(&mut self) -> Result<u8> {
    let byte = self
      .data
      .get(self.position)
      .copied()
      .ok_or_else(|| MidiError::malformed(format!("MUS score truncated at {}", self.position)))?;
    self.position += 1;
    Ok(byte)
  }

  fn is_empty(&self) -> bool {
    self.position >= self.data.len()
  }

  fn delay(&mut self) -> Result<u32> {
    let mut delay = 0u32;
    loop {
      let byte = self.next()?;
      delay = (delay << 7) | (byte & 0x7f) as u32;
      if byte & 0x80 == 0 {
        return Ok(delay);
      }
    }
  }
}

fn midi_channel(channel: u8) -> u8 {
  match channel {
    PERCUSSION_CHANNEL => MIDI_PERCUSSION_CHANNEL,
    channel if channel >= MIDI_PERCUSSION_CHANNEL => channel + 1,
    channel => channel,
  }
}

pub fn parse(data: &[u8]) -> Result<Song> {
  let header = Header::read(data)?;
  debug!(
    "MUS score: {} bytes, {} + {} channels, {} instruments",
    header.score_len, header.primary_channels, header.secondary_channels, header.instruments
  );

  let mut score = Score {
    data: &data[header.score_start..header.score_start + header.score_len],
    position: 0,
  };
  let mut volumes = [INITIAL_VOLUME; 16];
  let mut events = Vec::new();
  let mut delta = 0u32;

  loop {
    if score.is_empty() {
      warn!("MUS score ended without an end marker");
      break;
    }
    let descriptor = score.next()?;
    let channel = midi_channel(descriptor & 0x0f);
    let kind = (descriptor >> 4) & 0x07;

    let message = match kind {
      event::RELEASE_NOTE => {
        let note = score.next()? & 0x7f;
        Some([0x80 | channel, note, 64])
      }
      event::PLAY_NOTE => {
        let note = score.next()?;
        if note & 0x80 != 0 {
          volumes[channel as usize] = score.next()?.min(127);
        }
        Some([0x90 | channel, note & 0x7f, volumes[channel as usize]])
      }
      event::PITCH_BEND => {
        let bend = (score.next()? as u16) << 6;
        Some([0xe0 | channel, (bend & 0x7f) as u8, (bend >> 7) as u8])
      }
      event::SYSTEM_EVENT => {
        let number = score.next()? & 0x7f;
        match number {
          10..=14 => {
            let controller = SYSTEM_CONTROLLERS[(number - 10) as usize];
            // mono mode takes the number of channels
            let value = if controller == 126 {
              (header.primary_channels + 1).min(16) as u8
            } else {
              0
            };
            Some([0xb0 | channel, controller, value])
          }
          _ => {
            debug!("MUS: ignoring system event {}", number);
            None
          }
        }
      }
      event::CONTROLLER => {
        let number = score.next()? & 0x7f;
        let value = score.next()?.min(127);
        match number {
          0 => Some([0xc0 | channel, value, 0]),
          1..=9 => Some([0xb0 | channel, CONTROLLERS[(number - 1) as usize], value]),
          _ => {
            debug!("MUS: ignoring controller {}", number);
            None
          }
        }
      }
      event::MEASURE_END => None,
      event::SCORE_END => break,
      _ => {
        debug!("MUS: ignoring event type {}", kind);
        None
      }
    };

    if let Some([status, data1, data2]) = message {
      events.push(CanonicalEvent::short(delta, status, data1, data2));
      delta = 0;
    }

    if descriptor & 0x80 != 0 {
      delta = delta.saturating_add(score.delay()?);
    }
  }

  if delta > 0 {
    events.push(CanonicalEvent::nop(delta));
  }

  Ok(Song {
    format: SongFormat::Mus,
    division: Division::new(DIVISION as i64).unwrap_or(Division::DEFAULT),
    initial_tempo: Tempo::new(TEMPO).unwrap_or(Tempo::DEFAULT),
    setup: Vec::new(),
    events,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn mus(score: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(MAGIC);
    data.extend_from_slice(&(score.len() as u16).to_le_bytes());
    data.extend_from_slice(&18u16.to_le_bytes());
    data.extend_from_slice(&8u16.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&30u16.to_le_bytes());
    data.extend_from_slice(score);
    data
  }

  #[test]
  fn parse_notes_and_delays() {
    let data = mus(&[
      // play note 60 with volume 90 on channel 0, then wait 140 ticks
      0x90, 0xbc, 90, 0x81, 0x0c,
      // release note 60
      0x00, 60,
      // play note 62 with the last volume
      0x10, 62,
      0x60,
    ]);
    let song = parse(&data).unwrap();
    assert_eq!(song.format, SongFormat::Mus);
    assert_eq!(song.division.ppqn(), 140);
    assert_eq!(song.initial_tempo.micros(), 1_000_000);
    assert_eq!(
      song.events,
      vec![
        CanonicalEvent::short(0, 0x90, 60, 90),
        CanonicalEvent::short(140, 0x80, 60, 64),
        CanonicalEvent::short(0, 0x90, 62, 90),
      ]
    );
  }

  #[test]
  fn default_volume_and_channel_mapping() {
    let data = mus(&[0x1f, 35, 0x19, 40, 0x60]);
    let song = parse(&data).unwrap();
    assert_eq!(
      song.events,
      vec![
        CanonicalEvent::short(0, 0x99, 35, 100),
        CanonicalEvent::short(0, 0x9a, 40, 100),
      ]
    );
  }

  #[test]
  fn pitch_bend_is_scaled_to_14_bits() {
    let data = mus(&[0x20, 128, 0x20, 255, 0x60]);
    let song = parse(&data).unwrap();
    assert_eq!(
      song.events,
      vec![
        CanonicalEvent::short(0, 0xe0, 0x00, 0x40),
        CanonicalEvent::short(0, 0xe0, 0x40, 0x7f),
      ]
    );
  }

  #[test]
  fn controllers_and_system_events() {
    let data = mus(&[
      0x41, 0, 30, // program change
      0x41, 3, 200, // volume, clamped
      0x41, 8, 127, // sustain
      0x31, 11, // all notes off
      0x31, 12, // mono mode
      0x31, 3, // ignored
      0x60,
    ]);
    let song = parse(&data).unwrap();
    assert_eq!(
      song.events,
      vec![
        CanonicalEvent::short(0, 0xc1, 30, 0),
        CanonicalEvent::short(0, 0xb1, 7, 127),
        CanonicalEvent::short(0, 0xb1, 64, 127),
        CanonicalEvent::short(0, 0xb1, 123, 0),
        CanonicalEvent::short(0, 0xb1, 126, 9),
      ]
    );
  }

  #[test]
  fn delay_carried_over_ignored_events_and_trailing() {
    let data = mus(&[0xd0, 10, 0x80, 60, 5, 0x60]);
    let song = parse(&data).unwrap();
    assert_eq!(
      song.events,
      vec![
        CanonicalEvent::short(10, 0x80, 60, 64),
        CanonicalEvent::nop(5)
      ]
    );
  }

  #[test]
  fn truncated_event_is_malformed() {
    let data = mus(&[0x90, 0xbc]);
    assert!(matches!(parse(&data), Err(MidiError::MalformedInput(_))));
  }

  #[test]
  fn score_overrun_is_malformed() {
    let mut data = mus(&[0x00, 60, 0x60]);
    data.truncate(data.len() - 1);
    assert!(matches!(parse(&data), Err(MidiError::MalformedInput(_))));
  }

  #[test]
  fn bad_magic() {
    let mut data = mus(&[0x60]);
    data[3] = 0;
    assert!(matches!(parse(&data), Err(MidiError::MalformedInput(_))));
  }
}
