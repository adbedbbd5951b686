/// System Common and Real Time messages
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SystemMessage {
  // System Common
  /// MIDI Time Code quarter frame (type nibble and value nibble)
  MidiTimeCode(u8),

  /// Song Position Pointer (14 bits)
  SongPositionPointer(u16),

  /// Song Select (7 bits)
  SongSelect(u8),

  /// Tune Request
  TuneRequest,

  // System Real Time
  /// Timing Clock
  TimingClock,

  /// Start
  Start,

  /// Continue
  Continue,

  /// Stop
  Stop,

  /// Active Sensing
  ActiveSensing,

  /// Reset
  Reset,

  /// Undefined status bytes (0xF4, 0xF5, 0xF9, 0xFD)
  Undefined(u8),
}
