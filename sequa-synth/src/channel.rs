//! Per channel controller state shared by the soft synths.

use sequa_midi::NUM_CHANNELS;

pub const PERCUSSION_CHANNEL: u8 = 9;

const CC_DATA_ENTRY_MSB: u8 = 6;
const CC_VOLUME: u8 = 7;
const CC_PAN: u8 = 10;
const CC_EXPRESSION: u8 = 11;
const CC_DATA_ENTRY_LSB: u8 = 38;
const CC_SUSTAIN: u8 = 64;
const CC_RPN_LSB: u8 = 100;
const CC_RPN_MSB: u8 = 101;

const RPN_PITCH_BEND_RANGE: (u8, u8) = (0, 0);
const RPN_NULL: u8 = 127;

/// Frequency in Hz of a (possibly fractional) MIDI note
pub fn note_frequency(note: f32) -> f32 {
  440.0 * 2f32.powf((note - 69.0) / 12.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
  pub program: u8,
  pub volume: u8,
  pub expression: u8,
  pub pan: u8,
  pub sustain: bool,
  pub pressure: u8,
  /// Centred at 0x2000
  pub pitch_bend: u16,
  /// Semitones covered by a full pitch bend
  pub bend_range: f32,
  rpn: (u8, u8),
}

impl Default for ChannelState {
  fn default() -> Self {
    Self {
      program: 0,
      volume: 100,
      expression: 127,
      pan: 64,
      sustain: false,
      pressure: 0,
      pitch_bend: 0x2000,
      bend_range: 2.0,
      rpn: (RPN_NULL, RPN_NULL),
    }
  }
}

impl ChannelState {
  pub fn channels() -> [ChannelState; NUM_CHANNELS as usize] {
    Default::default()
  }

  /// Apply a controller, returns false when it is not tracked here
  pub fn control_change(&mut self, index: u8, data: u8) -> bool {
    match index {
      CC_VOLUME => self.volume = data,
      CC_PAN => self.pan = data,
      CC_EXPRESSION => self.expression = data,
      CC_SUSTAIN => self.sustain = data >= 64,
      CC_RPN_MSB => self.rpn.0 = data,
      CC_RPN_LSB => self.rpn.1 = data,
      CC_DATA_ENTRY_MSB if self.rpn == RPN_PITCH_BEND_RANGE => {
        let cents = self.bend_range.fract();
        self.bend_range = data as f32 + cents;
      }
      CC_DATA_ENTRY_LSB if self.rpn == RPN_PITCH_BEND_RANGE => {
        self.bend_range = self.bend_range.trunc() + data.min(99) as f32 / 100.0;
      }
      _ => return false,
    }
    true
  }

  pub fn reset_controllers(&mut self) {
    let program = self.program;
    *self = ChannelState {
      program,
      ..Default::default()
    };
  }

  /// Pitch bend offset in semitones
  pub fn bend_semitones(&self) -> f32 {
    (self.pitch_bend as f32 - 8192.0) / 8192.0 * self.bend_range
  }

  /// Volume times expression in 0..=1
  pub fn level(&self) -> f32 {
    (self.volume as f32 / 127.0) * (self.expression as f32 / 127.0)
  }

  /// Constant power gains for the left and right channels
  pub fn pan_gains(&self) -> (f32, f32) {
    let position = (self.pan as f32 / 127.0).clamp(0.0, 1.0) * std::f32::consts::FRAC_PI_2;
    (position.cos(), position.sin())
  }
}

#[cfg(test)]
mod tests {
  use assert_approx_eq::assert_approx_eq;

  use super::*;

  #[test]
  fn frequency_of_notes() {
    assert_approx_eq!(note_frequency(69.0), 440.0, 1e-3);
    assert_approx_eq!(note_frequency(81.0), 880.0, 1e-3);
    assert_approx_eq!(note_frequency(60.0), 261.6256, 1e-3);
  }

  #[test]
  fn pitch_bend_range_from_rpn() {
    let mut channel = ChannelState::default();
    channel.pitch_bend = 0x3fff;
    assert_approx_eq!(channel.bend_semitones(), 2.0, 1e-3);

    assert!(channel.control_change(CC_RPN_MSB, 0));
    assert!(channel.control_change(CC_RPN_LSB, 0));
    assert!(channel.control_change(CC_DATA_ENTRY_MSB, 12));
    assert_approx_eq!(channel.bend_semitones(), 12.0, 1e-2);

    channel.control_change(CC_RPN_MSB, RPN_NULL);
    channel.control_change(CC_DATA_ENTRY_MSB, 1);
    assert_approx_eq!(channel.bend_range, 12.0);
  }

  #[test]
  fn reset_keeps_the_program() {
    let mut channel = ChannelState {
      program: 33,
      ..Default::default()
    };
    channel.control_change(CC_VOLUME, 10);
    channel.control_change(CC_SUSTAIN, 127);
    channel.reset_controllers();
    assert_eq!(channel.program, 33);
    assert_eq!(channel.volume, 100);
    assert!(!channel.sustain);
    assert!(!channel.control_change(1, 10));
  }
}
