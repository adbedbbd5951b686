//! FM chip synths driven through an emulator, the ADL (OPL3) and OPN (OPN2) devices.

use std::path::Path;

use log::{debug, trace, warn};

use sequa_engine::renderer::route;
use sequa_engine::{DeviceType, Renderer, SynthEngine};
use sequa_midi::MidiMessage;
use sequa_time::HostTime;

use crate::config::{AdlConfig, OpnConfig};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipFamily {
  Opl3,
  Opn2,
}

impl ChipFamily {
  pub fn voices_per_chip(&self) -> usize {
    match self {
      ChipFamily::Opl3 => 18,
      ChipFamily::Opn2 => 6,
    }
  }

  /// Rate the real chip generates samples at
  pub fn native_rate(&self) -> u32 {
    match self {
      ChipFamily::Opl3 => 49_716,
      ChipFamily::Opn2 => 53_267,
    }
  }

  pub fn device_type(&self) -> DeviceType {
    match self {
      ChipFamily::Opl3 => DeviceType::Adl,
      ChipFamily::Opn2 => DeviceType::Opn,
    }
  }
}

/// How note velocity and channel volume turn into output level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeModel {
  Auto,
  Generic,
  NativeOpl3,
  Dmx,
  Apogee,
  Win9x,
  DmxFixed,
  ApogeeFixed,
  Ail,
  Win9xGenericFm,
  Hmi,
  HmiOld,
}

impl VolumeModel {
  const ALL: [VolumeModel; 12] = [
    VolumeModel::Auto,
    VolumeModel::Generic,
    VolumeModel::NativeOpl3,
    VolumeModel::Dmx,
    VolumeModel::Apogee,
    VolumeModel::Win9x,
    VolumeModel::DmxFixed,
    VolumeModel::ApogeeFixed,
    VolumeModel::Ail,
    VolumeModel::Win9xGenericFm,
    VolumeModel::Hmi,
    VolumeModel::HmiOld,
  ];

  pub fn from_index(index: u32) -> Option<Self> {
    Self::ALL.get(index as usize).copied()
  }

  pub fn index(&self) -> u32 {
    Self::ALL
      .iter()
      .position(|model| model == self)
      .unwrap_or_default() as u32
  }

  /// Output gain of the OPL3 synth, compensating how loud each model plays
  pub fn opl_gain(&self) -> f32 {
    match self {
      VolumeModel::Generic | VolumeModel::Win9x | VolumeModel::Win9xGenericFm => 2.0,
      VolumeModel::Hmi | VolumeModel::HmiOld => 2.5,
      VolumeModel::NativeOpl3 => 3.8,
      VolumeModel::Auto
      | VolumeModel::Dmx
      | VolumeModel::DmxFixed
      | VolumeModel::Apogee
      | VolumeModel::ApogeeFixed
      | VolumeModel::Ail => 3.5,
    }
  }

  /// Linear amplitude from the note velocity and the channel level in 0..=1
  pub fn amplitude(&self, velocity: u8, level: f32) -> f32 {
    let velocity = velocity.min(127) as f32 / 127.0;
    let level = level.clamp(0.0, 1.0);
    match self {
      VolumeModel::Auto | VolumeModel::Generic | VolumeModel::Win9x | VolumeModel::Win9xGenericFm => {
        velocity * level
      }
      VolumeModel::NativeOpl3 => (velocity * level).powi(2),
      VolumeModel::Hmi | VolumeModel::HmiOld => velocity.powf(1.5) * level,
      VolumeModel::Dmx
      | VolumeModel::DmxFixed
      | VolumeModel::Apogee
      | VolumeModel::ApogeeFixed
      | VolumeModel::Ail => (velocity * level).powf(1.5),
    }
  }
}

/// Which voice gets a new note when all of them are busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAlloc {
  Auto,
  /// The releasing voice closest to silence
  OffDelay,
  /// A releasing voice that played the same instrument
  SameInstrument,
  /// The oldest releasing voice
  AnyReleased,
}

impl ChannelAlloc {
  pub fn from_index(index: i32) -> Option<Self> {
    match index {
      -1 => Some(ChannelAlloc::Auto),
      0 => Some(ChannelAlloc::OffDelay),
      1 => Some(ChannelAlloc::SameInstrument),
      2 => Some(ChannelAlloc::AnyReleased),
      _ => None,
    }
  }
}

/// Real time interface of an FM chip emulator with its General MIDI layer.
pub trait ChipEmulator: Send {
  fn family(&self) -> ChipFamily;

  fn sample_rate(&self) -> u32;

  fn switch_emulator(&mut self, id: u32) -> Result<()>;

  fn set_run_at_pcm_rate(&mut self, enabled: bool);

  fn num_banks(&self) -> u32;

  fn set_bank(&mut self, index: u32) -> Result<()>;

  fn load_bank_file(&mut self, path: &Path) -> Result<()>;

  fn set_num_chips(&mut self, chips: u32);

  fn set_volume_model(&mut self, model: VolumeModel);

  fn set_channel_alloc(&mut self, mode: ChannelAlloc);

  fn set_soft_pan(&mut self, enabled: bool);

  /// Silence every voice and return the channels to their initial state
  fn reset_state(&mut self);

  fn note_on(&mut self, channel: u8, note: u8, velocity: u8);

  fn note_off(&mut self, channel: u8, note: u8);

  fn note_aftertouch(&mut self, channel: u8, note: u8, pressure: u8);

  fn channel_aftertouch(&mut self, channel: u8, pressure: u8);

  fn controller_change(&mut self, channel: u8, index: u8, data: u8);

  fn patch_change(&mut self, channel: u8, program: u8);

  fn pitch_bend_ml(&mut self, channel: u8, msb: u8, lsb: u8);

  fn system_exclusive(&mut self, data: &[u8]);

  /// Render interleaved stereo frames, overwriting the buffer
  fn generate(&mut self, buffer: &mut [f32], frames: usize);
}

pub struct ChipSynth<E: ChipEmulator> {
  emulator: E,
  gain: f32,
  open: bool,
}

impl<E: ChipEmulator> ChipSynth<E> {
  /// OPL3 synth. A custom bank that fails to load falls back to the bank index.
  pub fn adl(mut emulator: E, config: &AdlConfig) -> Result<Self> {
    emulator.switch_emulator(config.emulator_id)?;
    emulator.set_run_at_pcm_rate(config.run_at_pcm_rate);
    if !load_custom_bank(&mut emulator, config.custom_bank.as_deref()) {
      select_bank(&mut emulator, config.bank);
    }
    emulator.set_num_chips(config.chips);
    emulator.set_volume_model(config.volume_model);
    emulator.set_channel_alloc(config.channel_alloc);
    emulator.set_soft_pan(config.full_pan);

    Ok(Self {
      emulator,
      gain: config.volume_model.opl_gain(),
      open: false,
    })
  }

  /// OPN2 synth. Without a custom bank the first built-in one is used.
  pub fn opn(mut emulator: E, config: &OpnConfig) -> Result<Self> {
    if !load_custom_bank(&mut emulator, config.custom_bank.as_deref()) {
      select_bank(&mut emulator, 0);
    }
    emulator.switch_emulator(config.emulator_id)?;
    emulator.set_run_at_pcm_rate(config.run_at_pcm_rate);
    emulator.set_num_chips(config.chips);
    emulator.set_volume_model(config.volume_model);
    emulator.set_channel_alloc(config.channel_alloc);
    emulator.set_soft_pan(config.full_pan);

    Ok(Self {
      emulator,
      gain: 1.0,
      open: false,
    })
  }

  pub fn emulator(&self) -> &E {
    &self.emulator
  }

  pub fn gain(&self) -> f32 {
    self.gain
  }
}

fn load_custom_bank<E: ChipEmulator>(emulator: &mut E, bank: Option<&str>) -> bool {
  let path = match bank {
    Some(path) if !path.is_empty() => path,
    _ => return false,
  };
  match emulator.load_bank_file(Path::new(path)) {
    Ok(()) => {
      debug!("Loaded custom bank {}", path);
      true
    }
    Err(err) => {
      warn!("{}", err);
      false
    }
  }
}

fn select_bank<E: ChipEmulator>(emulator: &mut E, index: u32) {
  if let Err(err) = emulator.set_bank(index) {
    warn!("{}, keeping the current bank", err);
  }
}

impl<E: ChipEmulator> Renderer for ChipSynth<E> {
  fn device_type(&self) -> DeviceType {
    self.emulator.family().device_type()
  }

  fn open(&mut self) -> sequa_engine::Result<()> {
    self.emulator.reset_state();
    self.open = true;
    Ok(())
  }

  fn close(&mut self) {
    self.open = false;
  }

  fn is_open(&self) -> bool {
    self.open
  }

  fn dispatch(&mut self, at: HostTime, message: MidiMessage) {
    route(self, at, message)
  }

  fn system_exclusive(&mut self, _at: HostTime, data: &[u8]) {
    self.emulator.system_exclusive(data)
  }

  fn note_on(&mut self, _at: HostTime, channel: u8, note: u8, velocity: u8) {
    self.emulator.note_on(channel, note, velocity)
  }

  fn note_off(&mut self, _at: HostTime, channel: u8, note: u8, _velocity: u8) {
    self.emulator.note_off(channel, note)
  }

  fn key_pressure(&mut self, _at: HostTime, channel: u8, note: u8, pressure: u8) {
    self.emulator.note_aftertouch(channel, note, pressure)
  }

  fn control_change(&mut self, _at: HostTime, channel: u8, index: u8, data: u8) {
    self.emulator.controller_change(channel, index, data)
  }

  fn program_change(&mut self, _at: HostTime, channel: u8, program: u8) {
    self.emulator.patch_change(channel, program)
  }

  fn channel_pressure(&mut self, _at: HostTime, channel: u8, pressure: u8) {
    self.emulator.channel_aftertouch(channel, pressure)
  }

  fn pitch_bend(&mut self, _at: HostTime, channel: u8, value: u16) {
    let msb = ((value >> 7) & 0x7f) as u8;
    let lsb = (value & 0x7f) as u8;
    self.emulator.pitch_bend_ml(channel, msb, lsb)
  }

  fn system(&mut self, _at: HostTime, message: sequa_midi::messages::system::SystemMessage) {
    trace!("Ignoring system message {:?}", message);
  }
}

impl<E: ChipEmulator> SynthEngine for ChipSynth<E> {
  fn sample_rate(&self) -> u32 {
    self.emulator.sample_rate()
  }

  fn compute_output(&mut self, buffer: &mut [f32], frames: usize) {
    let frames = frames.min(buffer.len() / 2);
    self.emulator.generate(buffer, frames);
    if self.gain != 1.0 {
      let gain = self.gain;
      buffer[..frames * 2].iter_mut().for_each(|sample| *sample *= gain);
    }
  }
}
