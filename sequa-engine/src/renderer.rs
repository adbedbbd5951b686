//! The dispatch surface shared by every output backend.

use std::fmt::{Display, Formatter};

use sequa_midi::messages::channel_voice::{ChannelMode, ChannelVoice, ChannelVoiceMessage};
use sequa_midi::messages::system::SystemMessage;
use sequa_midi::{MidiMessage, NUM_CHANNELS};
use sequa_time::HostTime;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
  Wavetable,
  Adl,
  Opn,
  MidiOut,
}

impl Display for DeviceType {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      DeviceType::Wavetable => "wavetable",
      DeviceType::Adl => "adl",
      DeviceType::Opn => "opn",
      DeviceType::MidiOut => "midi-out",
    };
    f.write_str(name)
  }
}

/// Receives the events played by the scheduler.
///
/// `at` is the absolute time of the event in the clock units of the caller:
/// nanoseconds since the start of playback for devices that push messages out,
/// samples for soft synths. Only [`Renderer::dispatch`] and
/// [`Renderer::system_exclusive`] are required, the per message methods route there
/// unless an implementation wants them separately.
pub trait Renderer: Send {
  fn device_type(&self) -> DeviceType;

  fn open(&mut self) -> Result<()>;

  fn close(&mut self);

  fn is_open(&self) -> bool;

  fn set_tempo(&mut self, _micros_per_quarter: u32) {}

  fn set_time_division(&mut self, _ppqn: u32) {}

  fn dispatch(&mut self, at: HostTime, message: MidiMessage);

  fn system_exclusive(&mut self, at: HostTime, data: &[u8]);

  fn note_on(&mut self, at: HostTime, channel: u8, note: u8, velocity: u8) {
    let message = ChannelVoiceMessage::NoteOn { note, velocity };
    self.dispatch(at, ChannelVoice::new(channel, message).into())
  }

  fn note_off(&mut self, at: HostTime, channel: u8, note: u8, velocity: u8) {
    let message = ChannelVoiceMessage::NoteOff { note, velocity };
    self.dispatch(at, ChannelVoice::new(channel, message).into())
  }

  fn key_pressure(&mut self, at: HostTime, channel: u8, note: u8, pressure: u8) {
    let message = ChannelVoiceMessage::PolyPressure { note, pressure };
    self.dispatch(at, ChannelVoice::new(channel, message).into())
  }

  fn control_change(&mut self, at: HostTime, channel: u8, index: u8, data: u8) {
    self.dispatch(at, ChannelVoice::control(channel, index, data).into())
  }

  fn program_change(&mut self, at: HostTime, channel: u8, program: u8) {
    let message = ChannelVoiceMessage::ProgramChange { program };
    self.dispatch(at, ChannelVoice::new(channel, message).into())
  }

  fn channel_pressure(&mut self, at: HostTime, channel: u8, pressure: u8) {
    let message = ChannelVoiceMessage::ChannelPressure { pressure };
    self.dispatch(at, ChannelVoice::new(channel, message).into())
  }

  /// `value` is 14 bits centred at 0x2000
  fn pitch_bend(&mut self, at: HostTime, channel: u8, value: u16) {
    let message = ChannelVoiceMessage::PitchBend {
      data: value & 0x3fff,
    };
    self.dispatch(at, ChannelVoice::new(channel, message).into())
  }

  fn system(&mut self, at: HostTime, message: SystemMessage) {
    self.dispatch(at, message.into())
  }

  /// All notes off and reset all controllers on every channel
  fn all_notes_off(&mut self, at: HostTime) {
    for channel in 0..NUM_CHANNELS {
      self.control_change(at, channel, ChannelMode::ALL_NOTES_OFF, 0);
      self.control_change(at, channel, ChannelMode::RESET_ALL_CONTROLLERS, 0);
    }
  }
}

/// Route a decoded message through the per message methods of a renderer.
pub fn route<R: Renderer + ?Sized>(renderer: &mut R, at: HostTime, message: MidiMessage) {
  match message {
    MidiMessage::ChannelVoice(ChannelVoice { channel, message }) => match message {
      ChannelVoiceMessage::NoteOff { note, velocity } => {
        renderer.note_off(at, channel, note, velocity)
      }
      ChannelVoiceMessage::NoteOn { note, velocity } => renderer.note_on(at, channel, note, velocity),
      ChannelVoiceMessage::PolyPressure { note, pressure } => {
        renderer.key_pressure(at, channel, note, pressure)
      }
      ChannelVoiceMessage::ControlChange { index, data } => {
        renderer.control_change(at, channel, index, data)
      }
      ChannelVoiceMessage::ProgramChange { program } => {
        renderer.program_change(at, channel, program)
      }
      ChannelVoiceMessage::ChannelPressure { pressure } => {
        renderer.channel_pressure(at, channel, pressure)
      }
      ChannelVoiceMessage::PitchBend { data } => renderer.pitch_bend(at, channel, data),
      ChannelVoiceMessage::ChannelMode(mode) => {
        let (index, data) = mode.as_control();
        renderer.control_change(at, channel, index, data)
      }
    },
    MidiMessage::System(system) => renderer.system(at, system),
  }
}

/// A renderer producing PCM, pulled block by block.
pub trait SynthEngine: Renderer {
  fn channels(&self) -> usize {
    2
  }

  fn sample_rate(&self) -> u32;

  /// Render `frames` interleaved frames into `buffer`, overwriting its content
  fn compute_output(&mut self, buffer: &mut [f32], frames: usize);
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
  fn device_type(&self) -> DeviceType {
    (**self).device_type()
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

  fn set_tempo(&mut self, micros_per_quarter: u32) {
    (**self).set_tempo(micros_per_quarter)
  }

  fn set_time_division(&mut self, ppqn: u32) {
    (**self).set_time_division(ppqn)
  }

  fn dispatch(&mut self, at: HostTime, message: MidiMessage) {
    (**self).dispatch(at, message)
  }

  fn system_exclusive(&mut self, at: HostTime, data: &[u8]) {
    (**self).system_exclusive(at, data)
  }

  fn note_on(&mut self, at: HostTime, channel: u8, note: u8, velocity: u8) {
    (**self).note_on(at, channel, note, velocity)
  }

  fn note_off(&mut self, at: HostTime, channel: u8, note: u8, velocity: u8) {
    (**self).note_off(at, channel, note, velocity)
  }

  fn key_pressure(&mut self, at: HostTime, channel: u8, note: u8, pressure: u8) {
    (**self).key_pressure(at, channel, note, pressure)
  }

  fn control_change(&mut self, at: HostTime, channel: u8, index: u8, data: u8) {
    (**self).control_change(at, channel, index, data)
  }

  fn program_change(&mut self, at: HostTime, channel: u8, program: u8) {
    (**self).program_change(at, channel, program)
  }

  fn channel_pressure(&mut self, at: HostTime, channel: u8, pressure: u8) {
    (**self).channel_pressure(at, channel, pressure)
  }

  fn pitch_bend(&mut self, at: HostTime, channel: u8, value: u16) {
    (**self).pitch_bend(at, channel, value)
  }

  fn system(&mut self, at: HostTime, message: SystemMessage) {
    (**self).system(at, message)
  }

  fn all_notes_off(&mut self, at: HostTime) {
    (**self).all_notes_off(at)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::RecordingRenderer;

  #[test]
  fn canonical_methods_default_to_dispatch() {
    let mut renderer = RecordingRenderer::new();
    renderer.note_on(10, 1, 60, 100);
    renderer.pitch_bend(20, 2, 0xffff);
    renderer.control_change(30, 3, 123, 0);

    assert_eq!(
      renderer.messages(),
      vec![
        (10, ChannelVoice::new(1, ChannelVoiceMessage::NoteOn { note: 60, velocity: 100 }).into()),
        (20, ChannelVoice::new(2, ChannelVoiceMessage::PitchBend { data: 0x3fff }).into()),
        (30, ChannelVoice::channel_mode(3, ChannelMode::AllNotesOff).into()),
      ]
    );
  }

  #[test]
  fn all_notes_off_on_every_channel() {
    let mut renderer = RecordingRenderer::new();
    renderer.all_notes_off(5);
    let messages = renderer.messages();
    assert_eq!(messages.len(), 32);
    assert_eq!(
      messages[30],
      (5, ChannelVoice::channel_mode(15, ChannelMode::AllNotesOff).into())
    );
    assert_eq!(
      messages[31],
      (5, ChannelVoice::channel_mode(15, ChannelMode::ResetAllControllers).into())
    );
  }

  #[test]
  fn route_uses_the_message_methods() {
    let mut renderer = RecordingRenderer::new();
    let mode = ChannelVoice::channel_mode(4, ChannelMode::ResetAllControllers);
    route(&mut renderer, 7, mode.into());
    route(&mut renderer, 8, SystemMessage::Start.into());
    assert_eq!(
      renderer.messages(),
      vec![(7, mode.into()), (8, SystemMessage::Start.into())]
    );
  }
}
