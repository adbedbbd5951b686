pub mod channel_voice;
pub mod system;

use crate::messages::channel_voice::ChannelVoice;
use crate::messages::system::SystemMessage;

/// A MIDI 1.0 short message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidiMessage {
  ChannelVoice(ChannelVoice),
  System(SystemMessage),
}

impl MidiMessage {
  pub fn channel(&self) -> Option<u8> {
    match self {
      MidiMessage::ChannelVoice(channel_voice) => Some(channel_voice.channel),
      MidiMessage::System(_) => None,
    }
  }
}

impl From<ChannelVoice> for MidiMessage {
  fn from(channel_voice: ChannelVoice) -> Self {
    MidiMessage::ChannelVoice(channel_voice)
  }
}

impl From<SystemMessage> for MidiMessage {
  fn from(system: SystemMessage) -> Self {
    MidiMessage::System(system)
  }
}
