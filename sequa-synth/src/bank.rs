//! FM instrument banks: the built-in ones and WOPL/WOPN bank files.

use std::path::Path;

use log::debug;

use crate::chip::ChipFamily;
use crate::envelope::EnvelopeShape;
use crate::error::{Result, SynthError};

pub const NUM_BUILTIN_BANKS: u32 = 16;
pub const NUM_PROGRAMS: usize = 128;

const WOPL_MAGIC: &[u8] = b"WOPL3-BANK\0";
const WOPN_MAGIC_V1: &[u8] = b"WOPN2-BANK\0";
const WOPN_MAGIC_V2: &[u8] = b"WOPN2-B2NK\0";
const BANK_META_LEN: usize = 34;
const NAME_LEN: usize = 32;

const WOPL_BLANK: u8 = 0x04;
const WOPL_CARRIER: usize = 0;
const WOPL_MODULATOR: usize = 1;

/// OPL frequency multipliers
const OPL_MULTIPLIERS: [f32; 16] = [
  0.5, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 10.0, 12.0, 12.0, 15.0, 15.0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
  Sine,
  HalfSine,
  AbsSine,
  QuarterSine,
}

impl Waveform {
  fn from_opl(select: u8) -> Self {
    match select & 0x07 {
      1 => Waveform::HalfSine,
      2 => Waveform::AbsSine,
      3 => Waveform::QuarterSine,
      _ => Waveform::Sine,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operator {
  pub ratio: f32,
  /// Linear output level
  pub level: f32,
  pub envelope: EnvelopeShape,
  pub waveform: Waveform,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FmPatch {
  pub modulator: Operator,
  pub carrier: Operator,
  /// Part of its own output fed back into the modulator phase
  pub feedback: f32,
  /// Both operators heard instead of the modulator driving the carrier
  pub additive: bool,
  pub note_offset: i16,
  /// Note played by percussion instruments regardless of the key
  pub fixed_note: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FmBank {
  pub name: String,
  pub melodic: Vec<FmPatch>,
  /// Indexed by key
  pub percussion: Vec<FmPatch>,
}

impl FmBank {
  /// Built-in bank variations, from mellow to bright
  pub fn builtin(index: u32) -> Option<Self> {
    if index >= NUM_BUILTIN_BANKS {
      return None;
    }
    let brightness = [0.6, 1.0, 1.5, 2.2][(index % 4) as usize];
    let speed = [1.0, 0.7, 1.4, 0.5][(index / 4) as usize];
    let melodic = (0..NUM_PROGRAMS as u8)
      .map(|program| builtin_melodic(program, brightness, speed))
      .collect();
    let percussion = (0..NUM_PROGRAMS as u8)
      .map(|key| builtin_percussion(key, brightness))
      .collect();
    Some(Self {
      name: format!("built-in {}", index),
      melodic,
      percussion,
    })
  }

  pub fn load<P: AsRef<Path>>(path: P, family: ChipFamily) -> Result<Self> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|err| SynthError::bank(path, err))?;
    let name = path
      .file_stem()
      .map(|stem| stem.to_string_lossy().into_owned())
      .unwrap_or_default();
    let bank = match family {
      ChipFamily::Opl3 => Self::parse_wopl(name, &data),
      ChipFamily::Opn2 => Self::parse_wopn(name, &data),
    }
    .map_err(|reason| SynthError::bank(path, reason))?;
    debug!("Loaded FM bank {:?}", path);
    Ok(bank)
  }

  /// First melodic and percussion banks of a WOPL file
  pub fn parse_wopl(name: String, data: &[u8]) -> core::result::Result<Self, String> {
    let mut reader = Reader::new(data);
    if reader.bytes(WOPL_MAGIC.len())? != WOPL_MAGIC {
      return Err("not a WOPL bank".to_string());
    }
    let version = reader.u16_le()?;
    let melodic_banks = reader.u16_be()? as usize;
    let percussion_banks = reader.u16_be()? as usize;
    reader.skip(2)?;
    if version >= 2 {
      reader.skip((melodic_banks + percussion_banks) * BANK_META_LEN)?;
    }
    let instrument_len = if version >= 3 { 66 } else { 62 };

    let mut read_bank = |count: usize, percussion: bool| -> core::result::Result<_, String> {
      let mut patches = Vec::with_capacity(NUM_PROGRAMS);
      for bank in 0..count {
        for _ in 0..NUM_PROGRAMS {
          let instrument = reader.bytes(instrument_len)?;
          if bank == 0 {
            patches.push(wopl_instrument(instrument, percussion));
          }
        }
      }
      Ok(patches)
    };
    let melodic = read_bank(melodic_banks, false)?;
    let percussion = read_bank(percussion_banks, true)?;
    Ok(Self::with_defaults(name, melodic, percussion))
  }

  /// First melodic and percussion banks of a WOPN file
  pub fn parse_wopn(name: String, data: &[u8]) -> core::result::Result<Self, String> {
    let mut reader = Reader::new(data);
    let version = match reader.bytes(WOPN_MAGIC_V1.len())? {
      magic if magic == WOPN_MAGIC_V1 => 1,
      magic if magic == WOPN_MAGIC_V2 => reader.u16_le()?,
      _ => return Err("not a WOPN bank".to_string()),
    };
    let melodic_banks = reader.u16_be()? as usize;
    let percussion_banks = reader.u16_be()? as usize;
    reader.skip(1)?;
    if version >= 2 {
      reader.skip((melodic_banks + percussion_banks) * BANK_META_LEN)?;
    }
    let instrument_len = if version >= 2 { 69 } else { 65 };

    let mut read_bank = |count: usize, percussion: bool| -> core::result::Result<_, String> {
      let mut patches = Vec::with_capacity(NUM_PROGRAMS);
      for bank in 0..count {
        for _ in 0..NUM_PROGRAMS {
          let instrument = reader.bytes(instrument_len)?;
          if bank == 0 {
            patches.push(wopn_instrument(instrument, percussion));
          }
        }
      }
      Ok(patches)
    };
    let melodic = read_bank(melodic_banks, false)?;
    let percussion = read_bank(percussion_banks, true)?;
    Ok(Self::with_defaults(name, melodic, percussion))
  }

  /// Fill missing banks from the default built-in one
  fn with_defaults(name: String, mut melodic: Vec<FmPatch>, mut percussion: Vec<FmPatch>) -> Self {
    let defaults = Self::builtin(0).map(|bank| (bank.melodic, bank.percussion));
    if let Some((default_melodic, default_percussion)) = defaults {
      if melodic.is_empty() {
        melodic = default_melodic;
      }
      if percussion.is_empty() {
        percussion = default_percussion;
      }
    }
    Self {
      name,
      melodic,
      percussion,
    }
  }

  pub fn melodic(&self, program: u8) -> Option<&FmPatch> {
    self.melodic.get(program as usize)
  }

  pub fn percussion(&self, key: u8) -> Option<&FmPatch> {
    self.percussion.get(key as usize)
  }
}

struct Reader<'a> {
  data: &'a [u8],
  offset: usize,
}

impl<'a> Reader<'a> {
  fn new(data: &'a [u8]) -> Self {
    Self { data, offset: 0 }
  }

  fn bytes(&mut self, len: usize) -> core::result::Result<&'a [u8], String> {
    let bytes = self
      .data
      .get(self.offset..self.offset + len)
      .ok_or_else(|| format!("truncated at offset {}", self.offset))?;
    self.offset += len;
    Ok(bytes)
  }

  fn skip(&mut self, len: usize) -> core::result::Result<(), String> {
    self.bytes(len).map(|_| ())
  }

  fn u16_le(&mut self) -> core::result::Result<u16, String> {
    self.bytes(2).map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
  }

  fn u16_be(&mut self) -> core::result::Result<u16, String> {
    self.bytes(2).map(|bytes| u16::from_be_bytes([bytes[0], bytes[1]]))
  }
}

/// Level from an attenuation in decibels
fn attenuation(db: f32) -> f32 {
  10f32.powf(-db / 20.0)
}

/// Approximate duration of an envelope stage from its 4 bits rate
fn opl_rate_seconds(rate: u8, slowest: f32) -> f32 {
  match rate & 0x0f {
    0 => slowest * 4.0,
    rate => slowest / 2f32.powi(rate as i32 - 1),
  }
}

fn opl_operator(registers: &[u8]) -> Operator {
  let (avekf, ksl_level, attack_decay, sustain_release, waveform) = (
    registers[0],
    registers[1],
    registers[2],
    registers[3],
    registers[4],
  );
  let sustaining = avekf & 0x20 != 0;
  let sustain = match sustain_release >> 4 {
    15 => 0.0,
    level => attenuation(level as f32 * 3.0),
  };
  let release = opl_rate_seconds(sustain_release & 0x0f, 20.0);
  Operator {
    ratio: OPL_MULTIPLIERS[(avekf & 0x0f) as usize],
    level: attenuation((ksl_level & 0x3f) as f32 * 0.75),
    envelope: EnvelopeShape::new(
      opl_rate_seconds(attack_decay >> 4, 1.4),
      opl_rate_seconds(attack_decay & 0x0f, 20.0),
      if sustaining { sustain } else { 0.0 },
      release,
    ),
    waveform: Waveform::from_opl(waveform),
  }
}

fn wopl_instrument(data: &[u8], percussion: bool) -> FmPatch {
  let note_offset = i16::from_be_bytes([data[32], data[33]]);
  let key = data[38];
  let flags = data[39];
  let feedback_connection = data[40];
  let operators = &data[42..62];
  let operator = |index: usize| opl_operator(&operators[index * 5..index * 5 + 5]);

  let mut patch = FmPatch {
    modulator: operator(WOPL_MODULATOR),
    carrier: operator(WOPL_CARRIER),
    feedback: ((feedback_connection >> 1) & 0x07) as f32 / 7.0,
    additive: feedback_connection & 0x01 != 0,
    note_offset,
    fixed_note: (percussion && key > 0).then_some(key),
  };
  if flags & WOPL_BLANK != 0 {
    patch.carrier.level = 0.0;
    patch.modulator.level = 0.0;
  }
  patch
}

fn opn_operator(registers: &[u8]) -> Operator {
  let (detune_multiple, level, rate_attack, decay1, _decay2, sustain_release) = (
    registers[0],
    registers[1],
    registers[2],
    registers[3],
    registers[4],
    registers[5],
  );
  let ratio = match detune_multiple & 0x0f {
    0 => 0.5,
    multiple => multiple as f32,
  };
  // 5 bits rates, halved to the 4 bits scale of the envelope times
  let attack = opl_rate_seconds((rate_attack & 0x1f) >> 1, 1.4);
  let decay = opl_rate_seconds((decay1 & 0x1f) >> 1, 20.0);
  let sustain = match sustain_release >> 4 {
    15 => 0.0,
    level => attenuation(level as f32 * 3.0),
  };
  Operator {
    ratio,
    level: attenuation((level & 0x7f) as f32 * 0.75),
    envelope: EnvelopeShape::new(
      attack,
      decay,
      sustain,
      opl_rate_seconds(sustain_release & 0x0f, 20.0),
    ),
    waveform: Waveform::Sine,
  }
}

fn wopn_instrument(data: &[u8], percussion: bool) -> FmPatch {
  let note_offset = i16::from_be_bytes([data[32], data[33]]);
  let key = data[34];
  let feedback_algorithm = data[35];
  let operators = &data[37..65];
  let operator = |index: usize| opn_operator(&operators[index * 7..index * 7 + 7]);
  let algorithm = feedback_algorithm & 0x07;

  FmPatch {
    modulator: operator(0),
    carrier: operator(3),
    feedback: ((feedback_algorithm >> 3) & 0x07) as f32 / 7.0,
    // the last algorithms sum most of their operators
    additive: algorithm >= 5,
    note_offset,
    fixed_note: (percussion && key > 0).then_some(key),
  }
}

fn builtin_melodic(program: u8, brightness: f32, speed: f32) -> FmPatch {
  const RATIOS: [f32; 8] = [1.0, 2.0, 1.0, 3.0, 0.5, 4.0, 1.0, 7.0];
  let family = program / 8;
  let (index, envelope) = match family {
    0 | 1 => (0.5, EnvelopeShape::new(0.002, 1.2, 0.0, 0.3)),
    2 => (0.2, EnvelopeShape::new(0.01, 0.1, 0.9, 0.05)),
    3 | 4 => (0.4, EnvelopeShape::new(0.002, 0.6, 0.1, 0.2)),
    5 | 6 => (0.3, EnvelopeShape::new(0.05, 0.2, 0.8, 0.3)),
    7 | 8 | 9 => (0.6, EnvelopeShape::new(0.03, 0.1, 0.8, 0.1)),
    10 | 11 | 12 => (0.2, EnvelopeShape::new(0.3, 0.5, 0.7, 0.8)),
    _ => (0.8, EnvelopeShape::new(0.005, 0.4, 0.2, 0.3)),
  };
  let envelope = EnvelopeShape::new(
    envelope.attack * speed,
    envelope.decay * speed,
    envelope.sustain,
    envelope.release * speed,
  );
  FmPatch {
    modulator: Operator {
      ratio: RATIOS[(program % 8) as usize],
      level: (index * brightness).min(1.0),
      envelope,
      waveform: Waveform::Sine,
    },
    carrier: Operator {
      ratio: 1.0,
      level: 1.0,
      envelope,
      waveform: Waveform::Sine,
    },
    feedback: if family == 2 { 0.3 } else { 0.0 },
    additive: family == 2,
    note_offset: 0,
    fixed_note: None,
  }
}

fn builtin_percussion(key: u8, brightness: f32) -> FmPatch {
  let (note, ratio, noise) = match key {
    35 | 36 => (36, 1.0, 0.0),
    37..=40 => (60, 7.3, 1.0),
    41 | 43 | 45 | 47 | 48 | 50 => (key, 1.0, 0.2),
    42 | 44 | 46 | 49..=59 => (96, 11.7, 1.0),
    _ => (key, 3.1, 0.6),
  };
  let envelope = EnvelopeShape::new(0.001, 0.08 + (key % 12) as f32 * 0.02, 0.0, 0.05);
  FmPatch {
    modulator: Operator {
      ratio,
      level: (noise * brightness).min(1.0),
      envelope,
      waveform: Waveform::Sine,
    },
    carrier: Operator {
      ratio: 1.0,
      level: 1.0,
      envelope,
      waveform: Waveform::Sine,
    },
    feedback: noise,
    additive: false,
    note_offset: 0,
    fixed_note: Some(note),
  }
}
