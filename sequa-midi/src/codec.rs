use crate::messages::channel_voice::{ChannelMode, ChannelVoice, ChannelVoiceMessage};
use crate::messages::system::SystemMessage;
use crate::messages::MidiMessage;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const POLY_PRESSURE: u8 = 0xa0;
const CONTROL_CHANGE: u8 = 0xb0;
const PROGRAM_CHANGE: u8 = 0xc0;
const CHANNEL_PRESSURE: u8 = 0xd0;
const PITCH_BEND: u8 = 0xe0;

/// Wire length in bytes of a short message starting with `status`.
pub fn message_len(status: u8) -> usize {
  match status {
    0xf8..=0xff => 1,
    0xf1 | 0xf3 => 2,
    0xf2 => 3,
    _ => match status & 0xf0 {
      PROGRAM_CHANGE | CHANNEL_PRESSURE => 2,
      _ => 3,
    },
  }
}

pub fn decode_short(bytes: [u8; 3]) -> Option<MidiMessage> {
  let [status, data1, data2] = bytes;
  let (data1, data2) = (data1 & 0x7f, data2 & 0x7f);
  if status < 0x80 {
    return None;
  }

  if status >= 0xf0 {
    return decode_system(status, data1, data2).map(MidiMessage::System);
  }

  let channel = status & 0x0f;
  let message = match status & 0xf0 {
    NOTE_OFF => ChannelVoiceMessage::NoteOff {
      note: data1,
      velocity: data2,
    },
    NOTE_ON => ChannelVoiceMessage::NoteOn {
      note: data1,
      velocity: data2,
    },
    POLY_PRESSURE => ChannelVoiceMessage::PolyPressure {
      note: data1,
      pressure: data2,
    },
    CONTROL_CHANGE => ChannelMode::from_control(data1, data2)
      .map(ChannelVoiceMessage::ChannelMode)
      .unwrap_or(ChannelVoiceMessage::ControlChange {
        index: data1,
        data: data2,
      }),
    PROGRAM_CHANGE => ChannelVoiceMessage::ProgramChange { program: data1 },
    CHANNEL_PRESSURE => ChannelVoiceMessage::ChannelPressure { pressure: data1 },
    _ => ChannelVoiceMessage::PitchBend {
      data: ((data2 as u16) << 7) | data1 as u16,
    },
  };

  Some(MidiMessage::ChannelVoice(ChannelVoice::new(channel, message)))
}

fn decode_system(status: u8, data1: u8, data2: u8) -> Option<SystemMessage> {
  match status {
    0xf1 => Some(SystemMessage::MidiTimeCode(data1)),
    0xf2 => Some(SystemMessage::SongPositionPointer(
      ((data2 as u16) << 7) | data1 as u16,
    )),
    0xf3 => Some(SystemMessage::SongSelect(data1)),
    0xf6 => Some(SystemMessage::TuneRequest),
    0xf8 => Some(SystemMessage::TimingClock),
    0xfa => Some(SystemMessage::Start),
    0xfb => Some(SystemMessage::Continue),
    0xfc => Some(SystemMessage::Stop),
    0xfe => Some(SystemMessage::ActiveSensing),
    0xff => Some(SystemMessage::Reset),
    0xf4 | 0xf5 | 0xf9 | 0xfd => Some(SystemMessage::Undefined(status)),
    // sysex framing bytes never travel as short messages
    _ => None,
  }
}

/// Encode a message into its raw bytes, returning them with the wire length.
pub fn encode_short(message: &MidiMessage) -> ([u8; 3], usize) {
  let bytes = match message {
    MidiMessage::ChannelVoice(ChannelVoice { channel, message }) => {
      let channel = channel & 0x0f;
      match *message {
        ChannelVoiceMessage::NoteOff { note, velocity } => [NOTE_OFF | channel, note, velocity],
        ChannelVoiceMessage::NoteOn { note, velocity } => [NOTE_ON | channel, note, velocity],
        ChannelVoiceMessage::PolyPressure { note, pressure } => {
          [POLY_PRESSURE | channel, note, pressure]
        }
        ChannelVoiceMessage::ControlChange { index, data } => [CONTROL_CHANGE | channel, index, data],
        ChannelVoiceMessage::ProgramChange { program } => [PROGRAM_CHANGE | channel, program, 0],
        ChannelVoiceMessage::ChannelPressure { pressure } => [CHANNEL_PRESSURE | channel, pressure, 0],
        ChannelVoiceMessage::PitchBend { data } => [
          PITCH_BEND | channel,
          (data & 0x7f) as u8,
          ((data >> 7) & 0x7f) as u8,
        ],
        ChannelVoiceMessage::ChannelMode(mode) => {
          let (index, data) = mode.as_control();
          [CONTROL_CHANGE | channel, index, data]
        }
      }
    }
    MidiMessage::System(system) => match *system {
      SystemMessage::MidiTimeCode(data) => [0xf1, data & 0x7f, 0],
      SystemMessage::SongPositionPointer(position) => [
        0xf2,
        (position & 0x7f) as u8,
        ((position >> 7) & 0x7f) as u8,
      ],
      SystemMessage::SongSelect(song) => [0xf3, song & 0x7f, 0],
      SystemMessage::TuneRequest => [0xf6, 0, 0],
      SystemMessage::TimingClock => [0xf8, 0, 0],
      SystemMessage::Start => [0xfa, 0, 0],
      SystemMessage::Continue => [0xfb, 0, 0],
      SystemMessage::Stop => [0xfc, 0, 0],
      SystemMessage::ActiveSensing => [0xfe, 0, 0],
      SystemMessage::Reset => [0xff, 0, 0],
      SystemMessage::Undefined(status) => [status, 0, 0],
    },
  };
  (bytes, message_len(bytes[0]))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wire_lengths() {
    assert_eq!(message_len(0x90), 3);
    assert_eq!(message_len(0x8f), 3);
    assert_eq!(message_len(0xb3), 3);
    assert_eq!(message_len(0xc5), 2);
    assert_eq!(message_len(0xd0), 2);
    assert_eq!(message_len(0xe1), 3);
    assert_eq!(message_len(0xf1), 2);
    assert_eq!(message_len(0xf2), 3);
    assert_eq!(message_len(0xf3), 2);
    assert_eq!(message_len(0xf8), 1);
    assert_eq!(message_len(0xfe), 1);
  }

  #[test]
  fn decode_note_on() {
    let result = decode_short([0x92, 60, 100]);
    assert_eq!(
      result,
      Some(MidiMessage::ChannelVoice(ChannelVoice::new(
        2,
        ChannelVoiceMessage::NoteOn {
          note: 60,
          velocity: 100
        }
      )))
    );
  }

  #[test]
  fn decode_channel_mode() {
    let result = decode_short([0xb0, 123, 0]);
    assert_eq!(
      result,
      Some(MidiMessage::ChannelVoice(ChannelVoice::channel_mode(
        0,
        ChannelMode::AllNotesOff
      )))
    );
  }

  #[test]
  fn decode_plain_controller_below_channel_modes() {
    let result = decode_short([0xb1, 7, 100]);
    assert_eq!(
      result,
      Some(MidiMessage::ChannelVoice(ChannelVoice::new(
        1,
        ChannelVoiceMessage::ControlChange {
          index: 7,
          data: 100
        }
      )))
    );
  }

  #[test]
  fn decode_pitch_bend() {
    let result = decode_short([0xe0, 0x00, 0x40]);
    assert!(
      matches!(
        result,
        Some(MidiMessage::ChannelVoice(ChannelVoice {
          channel: 0,
          message: ChannelVoiceMessage::PitchBend { data: 0x2000 }
        }))
      ),
      "Unexpected result: {:?}",
      result
    );
  }

  #[test]
  fn decode_rejects_data_bytes_and_sysex() {
    assert_eq!(decode_short([0x40, 0, 0]), None);
    assert_eq!(decode_short([0xf0, 0, 0]), None);
    assert_eq!(decode_short([0xf7, 0, 0]), None);
  }

  #[test]
  fn decode_system_real_time() {
    assert_eq!(
      decode_short([0xf8, 0, 0]),
      Some(MidiMessage::System(SystemMessage::TimingClock))
    );
    assert_eq!(
      decode_short([0xf2, 0x01, 0x01]),
      Some(MidiMessage::System(SystemMessage::SongPositionPointer(129)))
    );
  }

  #[test]
  fn encode_matches_wire_length() {
    let program = MidiMessage::ChannelVoice(ChannelVoice::new(
      9,
      ChannelVoiceMessage::ProgramChange { program: 5 },
    ));
    assert_eq!(encode_short(&program), ([0xc9, 5, 0], 2));

    let bend = MidiMessage::ChannelVoice(ChannelVoice::new(
      3,
      ChannelVoiceMessage::PitchBend { data: 0x3fff },
    ));
    assert_eq!(encode_short(&bend), ([0xe3, 0x7f, 0x7f], 3));

    let mode = MidiMessage::ChannelVoice(ChannelVoice::channel_mode(
      15,
      ChannelMode::ResetAllControllers,
    ));
    assert_eq!(encode_short(&mode), ([0xbf, 121, 0], 3));

    assert_eq!(
      encode_short(&MidiMessage::System(SystemMessage::Stop)),
      ([0xfc, 0, 0], 1)
    );
  }
}
