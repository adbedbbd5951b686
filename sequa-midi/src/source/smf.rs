//! Standard MIDI Files, parsed with `midly` and flattened into one event stream.

use log::{debug, trace, warn};
use midly::{Format, MetaMessage, MidiMessage as SmfMessage, Smf, Timing, TrackEventKind};
use sequa_time::{Division, Tempo};

use crate::canonical::{CanonicalEvent, EventPayload};
use crate::error::{MidiError, Result};
use crate::source::{Song, SongFormat};

struct TimedPayload {
  tick: u64,
  payload: EventPayload,
}

fn channel_message(channel: u8, message: SmfMessage) -> [u8; 3] {
  match message {
    SmfMessage::NoteOff { key, vel } => [0x80 | channel, key.as_int(), vel.as_int()],
    SmfMessage::NoteOn { key, vel } => [0x90 | channel, key.as_int(), vel.as_int()],
    SmfMessage::Aftertouch { key, vel } => [0xa0 | channel, key.as_int(), vel.as_int()],
    SmfMessage::Controller { controller, value } => {
      [0xb0 | channel, controller.as_int(), value.as_int()]
    }
    SmfMessage::ProgramChange { program } => [0xc0 | channel, program.as_int(), 0],
    SmfMessage::ChannelAftertouch { vel } => [0xd0 | channel, vel.as_int(), 0],
    SmfMessage::PitchBend { bend } => {
      let value = bend.0.as_int();
      [0xe0 | channel, (value & 0x7f) as u8, (value >> 7) as u8]
    }
  }
}

pub fn parse(data: &[u8]) -> Result<Song> {
  let smf = Smf::parse(data).map_err(|err| MidiError::malformed(format!("SMF: {}", err)))?;

  let division = match smf.header.timing {
    Timing::Metrical(ticks) => Division::new(ticks.as_int() as i64).unwrap_or_else(|err| {
      warn!("SMF: {}", err);
      Division::DEFAULT
    }),
    Timing::Timecode(fps, subframe) => {
      return Err(MidiError::malformed(format!(
        "SMF: timecode timing ({:?}, {}) is not supported",
        fps, subframe
      )))
    }
  };

  let sequential = matches!(smf.header.format, Format::Sequential);
  let mut timeline = Vec::new();
  let mut track_start = 0u64;
  let mut end_tick = 0u64;

  for track in smf.tracks.iter() {
    let mut tick = track_start;
    for event in track.iter() {
      tick += event.delta.as_int() as u64;
      let payload = match event.kind {
        TrackEventKind::Midi { channel, message } => {
          Some(EventPayload::Short(channel_message(channel.as_int(), message)))
        }
        TrackEventKind::SysEx(bytes) => {
          let mut data = Vec::with_capacity(bytes.len() + 1);
          data.push(0xf0);
          data.extend_from_slice(bytes);
          Some(EventPayload::Long(data))
        }
        TrackEventKind::Escape(bytes) => Some(EventPayload::Long(bytes.to_vec())),
        TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
          Some(EventPayload::Tempo(tempo.as_int()))
        }
        TrackEventKind::Meta(meta) => {
          trace!("SMF: dropping meta event {:?}", meta);
          None
        }
      };
      if let Some(payload) = payload {
        timeline.push(TimedPayload { tick, payload });
      }
    }
    end_tick = end_tick.max(tick);
    if sequential {
      track_start = tick;
    }
  }

  // stable: events on the same tick keep their track order
  timeline.sort_by_key(|timed| timed.tick);

  let mut events = Vec::with_capacity(timeline.len() + 1);
  let mut last_tick = 0u64;
  for timed in timeline {
    let delta = (timed.tick - last_tick).min(u32::MAX as u64) as u32;
    last_tick = timed.tick;
    events.push(CanonicalEvent {
      delta,
      stream_id: 0,
      payload: timed.payload,
    });
  }
  if end_tick > last_tick {
    events.push(CanonicalEvent::nop(
      (end_tick - last_tick).min(u32::MAX as u64) as u32,
    ));
  }

  debug!(
    "SMF: {:?} with {} tracks merged into {} events",
    smf.header.format,
    smf.tracks.len(),
    events.len()
  );

  Ok(Song {
    format: SongFormat::Smf,
    division,
    initial_tempo: Song::first_tempo(&events).unwrap_or(Tempo::DEFAULT),
    setup: Vec::new(),
    events,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn smf(format: u16, division: [u8; 2], tracks: &[&[u8]]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"MThd");
    data.extend_from_slice(&6u32.to_be_bytes());
    data.extend_from_slice(&format.to_be_bytes());
    data.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    data.extend_from_slice(&division);
    for track in tracks {
      data.extend_from_slice(b"MTrk");
      data.extend_from_slice(&(track.len() as u32).to_be_bytes());
      data.extend_from_slice(track);
    }
    data
  }

  const END_OF_TRACK: [u8; 4] = [0x00, 0xff, 0x2f, 0x00];

  fn track(events: &[u8]) -> Vec<u8> {
    let mut track = events.to_vec();
    track.extend_from_slice(&END_OF_TRACK);
    track
  }

  #[test]
  fn parse_tempo_and_notes() {
    let conductor = track(&[0x00, 0xff, 0x51, 0x03, 0x07, 0xa1, 0x20]);
    let notes = track(&[0x00, 0x90, 0x3c, 0x64, 0x60, 0x80, 0x3c, 0x00]);
    let data = smf(1, [0x00, 0x60], &[&conductor, &notes]);

    let song = parse(&data).unwrap();
    assert_eq!(song.format, SongFormat::Smf);
    assert_eq!(song.division.ppqn(), 96);
    assert_eq!(song.initial_tempo.micros(), 500_000);
    assert_eq!(
      song.events,
      vec![
        CanonicalEvent::tempo(0, 500_000),
        CanonicalEvent::short(0, 0x90, 0x3c, 0x64),
        CanonicalEvent::short(96, 0x80, 0x3c, 0x00),
      ]
    );
  }

  #[test]
  fn tracks_are_merged_by_tick() {
    let first = track(&[0x30, 0xc0, 0x05]);
    let second = track(&[0x00, 0x91, 0x40, 0x50, 0x60, 0x81, 0x40, 0x00]);
    let data = smf(1, [0x00, 0x60], &[&first, &second]);

    let song = parse(&data).unwrap();
    assert_eq!(song.initial_tempo, Tempo::DEFAULT);
    assert_eq!(
      song.events,
      vec![
        CanonicalEvent::short(0, 0x91, 0x40, 0x50),
        CanonicalEvent::short(48, 0xc0, 0x05, 0x00),
        CanonicalEvent::short(48, 0x81, 0x40, 0x00),
      ]
    );
  }

  #[test]
  fn sequential_tracks_follow_each_other() {
    let first = track(&[0x00, 0x90, 0x3c, 0x64, 0x10, 0x80, 0x3c, 0x00]);
    let second = track(&[0x00, 0x90, 0x3e, 0x64]);
    let data = smf(2, [0x00, 0x60], &[&first, &second]);

    let song = parse(&data).unwrap();
    assert_eq!(song.events[2], CanonicalEvent::short(0, 0x90, 0x3e, 0x64));
    assert_eq!(song.total_ticks(), 16);
  }

  #[test]
  fn sysex_gets_its_status_byte() {
    let events = track(&[0x00, 0xf0, 0x03, 0x7e, 0x7f, 0xf7]);
    let data = smf(0, [0x00, 0x60], &[&events]);

    let song = parse(&data).unwrap();
    assert_eq!(
      song.events,
      vec![CanonicalEvent::long(0, vec![0xf0, 0x7e, 0x7f, 0xf7])]
    );
  }

  #[test]
  fn trailing_meta_events_keep_the_length() {
    let events = track(&[0x00, 0x90, 0x3c, 0x64, 0x20, 0xff, 0x01, 0x01, b'x']);
    let data = smf(0, [0x00, 0x60], &[&events]);

    let song = parse(&data).unwrap();
    assert_eq!(
      song.events,
      vec![
        CanonicalEvent::short(0, 0x90, 0x3c, 0x64),
        CanonicalEvent::nop(32)
      ]
    );
  }

  #[test]
  fn pitch_bend_keeps_both_bytes() {
    let events = track(&[0x00, 0xe2, 0x01, 0x40]);
    let data = smf(0, [0x00, 0x60], &[&events]);
    let song = parse(&data).unwrap();
    assert_eq!(song.events, vec![CanonicalEvent::short(0, 0xe2, 0x01, 0x40)]);
  }

  #[test]
  fn timecode_timing_is_rejected() {
    let data = smf(0, [0xe7, 0x28], &[&track(&[])]);
    assert!(matches!(parse(&data), Err(MidiError::MalformedInput(_))));
  }

  #[test]
  fn zero_division_uses_default() {
    let events = track(&[0x00, 0x90, 0x3c, 0x64]);
    let data = smf(0, [0x00, 0x00], &[&events]);
    let song = parse(&data).unwrap();
    assert_eq!(song.division, Division::DEFAULT);
    assert_eq!(song.events, vec![CanonicalEvent::short(0, 0x90, 0x3c, 0x64)]);
  }

  #[test]
  fn garbage_is_malformed() {
    assert!(matches!(
      parse(b"MThd\x00\x00"),
      Err(MidiError::MalformedInput(_))
    ));
  }
}
