/// Channel Voice and Channel Mode message on one of the 16 channels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelVoice {
  pub channel: u8,
  pub message: ChannelVoiceMessage,
}

impl ChannelVoice {
  pub fn new(channel: u8, message: ChannelVoiceMessage) -> Self {
    Self {
      channel: channel & 0x0f,
      message,
    }
  }

  pub fn channel_mode(channel: u8, mode: ChannelMode) -> Self {
    Self::new(channel, ChannelVoiceMessage::ChannelMode(mode))
  }

  /// Control change, or the channel mode message it carries for controllers 120..=127
  pub fn control(channel: u8, index: u8, data: u8) -> Self {
    let message = match ChannelMode::from_control(index, data) {
      Some(mode) => ChannelVoiceMessage::ChannelMode(mode),
      None => ChannelVoiceMessage::ControlChange { index, data },
    };
    Self::new(channel, message)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelVoiceMessage {
  NoteOff {
    note: u8,
    velocity: u8,
  },
  NoteOn {
    note: u8,
    velocity: u8,
  },
  PolyPressure {
    note: u8,
    pressure: u8,
  },
  ControlChange {
    index: u8,
    data: u8,
  },
  ProgramChange {
    program: u8,
  },
  ChannelPressure {
    pressure: u8,
  },
  PitchBend {
    /// 14 bits value centered at 0x2000
    data: u16,
  },
  ChannelMode(ChannelMode),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelMode {
  AllSoundOff,
  ResetAllControllers,
  LocalControl(bool),
  AllNotesOff,
  OmniMode(bool),
  MonoModeOn(u8),
  PolyModeOn,
}

impl ChannelMode {
  pub const ALL_SOUND_OFF: u8 = 120;
  pub const RESET_ALL_CONTROLLERS: u8 = 121;
  pub const LOCAL_CONTROL: u8 = 122;
  pub const ALL_NOTES_OFF: u8 = 123;
  pub const OMNI_MODE_OFF: u8 = 124;
  pub const OMNI_MODE_ON: u8 = 125;
  pub const MONO_MODE_ON: u8 = 126;
  pub const POLY_MODE_ON: u8 = 127;

  pub fn from_control(index: u8, data: u8) -> Option<Self> {
    match index {
      Self::ALL_SOUND_OFF if data == 0 => Some(ChannelMode::AllSoundOff),
      Self::RESET_ALL_CONTROLLERS if data == 0 => Some(ChannelMode::ResetAllControllers),
      Self::LOCAL_CONTROL if data == 0 || data == 127 => Some(ChannelMode::LocalControl(data == 127)),
      Self::ALL_NOTES_OFF if data == 0 => Some(ChannelMode::AllNotesOff),
      Self::OMNI_MODE_OFF if data == 0 => Some(ChannelMode::OmniMode(false)),
      Self::OMNI_MODE_ON if data == 0 => Some(ChannelMode::OmniMode(true)),
      Self::MONO_MODE_ON if data <= 16 => Some(ChannelMode::MonoModeOn(data)),
      Self::POLY_MODE_ON if data == 0 => Some(ChannelMode::PolyModeOn),
      _ => None,
    }
  }

  /// The controller index and value carrying this mode
  pub fn as_control(&self) -> (u8, u8) {
    match *self {
      ChannelMode::AllSoundOff => (Self::ALL_SOUND_OFF, 0),
      ChannelMode::ResetAllControllers => (Self::RESET_ALL_CONTROLLERS, 0),
      ChannelMode::LocalControl(on) => (Self::LOCAL_CONTROL, if on { 127 } else { 0 }),
      ChannelMode::AllNotesOff => (Self::ALL_NOTES_OFF, 0),
      ChannelMode::OmniMode(false) => (Self::OMNI_MODE_OFF, 0),
      ChannelMode::OmniMode(true) => (Self::OMNI_MODE_ON, 0),
      ChannelMode::MonoModeOn(channels) => (Self::MONO_MODE_ON, channels),
      ChannelMode::PolyModeOn => (Self::POLY_MODE_ON, 0),
    }
  }
}
