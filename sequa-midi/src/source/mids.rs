//! MIDS: RIFF container holding pre-encoded stream buffers.

use log::{debug, warn};
use sequa_time::{Division, Tempo};

use crate::canonical::{payload_parameter, payload_tag, tag, CanonicalEvent, EventPayload};
use crate::error::{MidiError, Result};
use crate::source::{Song, SongFormat};
use crate::NUM_CHANNELS;

const FMT_TAG_OFFSET: usize = 12;
const DIVISION_OFFSET: usize = 20;
const FORMAT_FLAGS_OFFSET: usize = 28;
const DATA_TAG_OFFSET: usize = 32;
const BLOCK_COUNT_OFFSET: usize = 40;
const BLOCKS_OFFSET: usize = 44;

/// Events are stored as (delta, payload) without the stream id word
pub const FLAG_NO_STREAM_ID: u32 = 0x0000_0001;

const INITIAL_CHANNEL_VOLUME: u8 = 100;

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
  data
    .get(offset..offset + 4)
    .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    .ok_or_else(|| MidiError::malformed(format!("MIDS truncated at offset {}", offset)))
}

fn expect_tag(data: &[u8], offset: usize, expected: &[u8; 4]) -> Result<()> {
  if data.get(offset..offset + 4) == Some(&expected[..]) {
    Ok(())
  } else {
    Err(MidiError::malformed(format!(
      "MIDS tag '{}' not found at offset {}",
      String::from_utf8_lossy(expected),
      offset
    )))
  }
}

pub fn parse(data: &[u8]) -> Result<Song> {
  expect_tag(data, FMT_TAG_OFFSET, b"fmt ")?;
  let division = read_u32(data, DIVISION_OFFSET)?;
  let format_flags = read_u32(data, FORMAT_FLAGS_OFFSET)?;
  expect_tag(data, DATA_TAG_OFFSET, b"data")?;
  let num_blocks = read_u32(data, BLOCK_COUNT_OFFSET)?;

  let division = Division::new(division as i64).unwrap_or_else(|err| {
    warn!("MIDS: {}", err);
    Division::DEFAULT
  });

  let mut words = Vec::new();
  let mut offset = BLOCKS_OFFSET;
  for block in 0..num_blocks {
    let _tick_start = read_u32(data, offset)?;
    let len = read_u32(data, offset + 4)? as usize;
    let start = offset + 8;
    let block_data = start
      .checked_add(len)
      .and_then(|end| data.get(start..end))
      .ok_or_else(|| {
        MidiError::malformed(format!(
          "MIDS block {} of {} bytes overruns the data",
          block, len
        ))
      })?;
    if len % 4 != 0 {
      return Err(MidiError::malformed(format!(
        "MIDS block {} length {} is not word aligned",
        block, len
      )));
    }
    words.extend(
      block_data
        .chunks_exact(4)
        .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
    );
    offset = start + len;
  }

  // any flag drops the stream id word
  let event_len = if format_flags != 0 {
    2
  } else {
    3
  };
  let chunks = words.chunks_exact(event_len);
  if !chunks.remainder().is_empty() {
    warn!(
      "MIDS: ignoring {} trailing words",
      chunks.remainder().len()
    );
  }

  let events = chunks
    .map(|chunk| {
      let payload = chunk[event_len - 1];
      let parameter = payload_parameter(payload);
      let payload = match payload_tag(payload) {
        tag::SHORT_MSG => {
          let [status, data1, data2, _] = parameter.to_le_bytes();
          EventPayload::Short([status, data1, data2])
        }
        tag::TEMPO => EventPayload::Tempo(parameter),
        tag::NOP => EventPayload::Nop,
        other => {
          debug!("MIDS: event tag {:02x} replaced by a no-op", other);
          EventPayload::Nop
        }
      };
      CanonicalEvent {
        delta: chunk[0],
        stream_id: if event_len == 3 { chunk[1] } else { 0 },
        payload,
      }
    })
    .collect::<Vec<_>>();

  let setup = (0..NUM_CHANNELS)
    .map(|channel| CanonicalEvent::short(0, 0xb0 | channel, 7, INITIAL_CHANNEL_VOLUME))
    .collect();

  Ok(Song {
    format: SongFormat::Mids,
    division,
    initial_tempo: Song::first_tempo(&events).unwrap_or(Tempo::DEFAULT),
    setup,
    events,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn mids(division: u32, flags: u32, blocks: &[&[u32]]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"RIFF\0\0\0\0MIDSfmt ");
    data.extend_from_slice(&12u32.to_le_bytes());
    data.extend_from_slice(&division.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&flags.to_le_bytes());
    data.extend_from_slice(b"data");
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&(blocks.len() as u32).to_le_bytes());
    for (index, block) in blocks.iter().enumerate() {
      data.extend_from_slice(&(index as u32 * 100).to_le_bytes());
      data.extend_from_slice(&((block.len() * 4) as u32).to_le_bytes());
      for word in block.iter() {
        data.extend_from_slice(&word.to_le_bytes());
      }
    }
    data
  }

  #[test]
  fn parse_events_with_stream_id() {
    let data = mids(
      120,
      0,
      &[
        &[0, 0, 0x0107_a120, 0, 0, 0x0064_3c90],
        &[120, 0, 0x0000_3c80],
      ],
    );
    let song = parse(&data).unwrap();
    assert_eq!(song.format, SongFormat::Mids);
    assert_eq!(song.division.ppqn(), 120);
    assert_eq!(song.initial_tempo.micros(), 500_000);
    assert_eq!(
      song.events,
      vec![
        CanonicalEvent::tempo(0, 500_000),
        CanonicalEvent::short(0, 0x90, 0x3c, 0x64),
        CanonicalEvent::short(120, 0x80, 0x3c, 0x00),
      ]
    );
    assert_eq!(song.setup.len(), 16);
  }

  #[test]
  fn parse_events_without_stream_id() {
    let data = mids(96, FLAG_NO_STREAM_ID, &[&[0, 0x0000_05c0, 10, 0x0200_0000, 4, 0x8700_0010]]);
    let song = parse(&data).unwrap();
    assert_eq!(song.initial_tempo, Tempo::DEFAULT);
    assert_eq!(
      song.events,
      vec![
        CanonicalEvent::short(0, 0xc0, 0x05, 0x00),
        CanonicalEvent::nop(10),
        // unknown tags keep their delta
        CanonicalEvent::nop(4),
      ]
    );
  }

  #[test]
  fn initial_tempo_from_first_event() {
    let data = mids(96, FLAG_NO_STREAM_ID, &[&[0, 0x0109_27c0]]);
    assert_eq!(parse(&data).unwrap().initial_tempo.micros(), 600_000);
  }

  #[test]
  fn any_format_flag_drops_stream_id() {
    let data = mids(96, 0x0000_0002, &[&[0, 0x0109_27c0, 24, 0x0040_3c90]]);
    let song = parse(&data).unwrap();
    assert_eq!(song.initial_tempo.micros(), 600_000);
    assert_eq!(song.events[1], CanonicalEvent::short(24, 0x90, 0x3c, 0x40));
  }

  #[test]
  fn bad_fmt_tag() {
    let mut data = mids(96, 0, &[]);
    data[12] = b'x';
    assert!(matches!(parse(&data), Err(MidiError::MalformedInput(_))));
  }

  #[test]
  fn bad_data_tag() {
    let mut data = mids(96, 0, &[]);
    data[35] = b'A';
    assert!(matches!(parse(&data), Err(MidiError::MalformedInput(_))));
  }

  #[test]
  fn block_overrun() {
    let mut data = mids(96, 0, &[&[0, 0, 0x0000_3c90]]);
    data.truncate(data.len() - 2);
    assert!(matches!(parse(&data), Err(MidiError::MalformedInput(_))));
  }

  #[test]
  fn truncated_header() {
    let data = mids(96, 0, &[]);
    assert!(matches!(parse(&data[..30]), Err(MidiError::MalformedInput(_))));
  }

  #[test]
  fn invalid_division_uses_default() {
    let data = mids(0, 0, &[]);
    assert_eq!(parse(&data).unwrap().division, Division::DEFAULT);
  }
}
