const GM_SYSTEM_ON: &[u8] = &[0xf0, 0x7e, 0x7f, 0x09, 0x01, 0xf7];
const GM2_SYSTEM_ON: &[u8] = &[0xf0, 0x7e, 0x7f, 0x09, 0x03, 0xf7];
const GS_RESET: &[u8] = &[0xf0, 0x41, 0x10, 0x42, 0x12, 0x40, 0x00, 0x7f, 0x00, 0x41, 0xf7];
const XG_SYSTEM_ON: &[u8] = &[0xf0, 0x43, 0x10, 0x4c, 0x00, 0x00, 0x7e, 0x00, 0xf7];

/// GM, GS or XG messages asking the synth to return to its power on state.
/// The device id of the GS and XG messages is not checked.
pub fn is_reset(data: &[u8]) -> bool {
  if data.first() != Some(&0xf0) {
    return false;
  }
  if data == GM_SYSTEM_ON || data == GM2_SYSTEM_ON {
    return true;
  }
  let same_ignoring_device = |expected: &[u8]| {
    data.len() == expected.len()
      && data
        .iter()
        .zip(expected)
        .enumerate()
        .all(|(index, (byte, expected))| index == 2 || byte == expected)
  };
  same_ignoring_device(GS_RESET) || same_ignoring_device(XG_SYSTEM_ON)
}
