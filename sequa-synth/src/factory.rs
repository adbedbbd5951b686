//! Builds the playback devices from their type, a bank or port argument and the config.

use log::debug;

use sequa_engine::{Device, DeviceType, SinkRenderer};
use sequa_midi::sink::DeviceIndex;
use sequa_midi::{list_output_devices, MidiOutDeviceInfo, MidiPortSink};

use crate::chip::ChipSynth;
use crate::config::{
  AdlConfig, BankKind, Callbacks, Config, MidiOutConfig, OpnConfig, WavetableConfig,
};
use crate::error::{Result, SynthError};
use crate::fm::FmEmulator;
use crate::wavetable::WavetableSynth;

/// Create a device. `args` selects the bank, soundfont or output port depending on the type.
pub fn create_device(
  device_type: DeviceType,
  args: Option<&str>,
  config: &Config,
  callbacks: &Callbacks,
) -> Result<Device> {
  let sample_rate = config.engine.sample_rate();
  let device = match device_type {
    DeviceType::Wavetable => {
      let config = wavetable_config(args, &config.wavetable, callbacks)?;
      Device::SoftSynth(Box::new(WavetableSynth::new(config, sample_rate)?))
    }
    DeviceType::Adl => {
      let config = adl_config(args, &config.adl, callbacks);
      let synth = ChipSynth::adl(FmEmulator::opl3(sample_rate), &config)?;
      Device::SoftSynth(Box::new(synth))
    }
    DeviceType::Opn => {
      let config = opn_config(args, &config.opn, callbacks);
      let synth = ChipSynth::opn(FmEmulator::opn2(sample_rate), &config)?;
      Device::SoftSynth(Box::new(synth))
    }
    DeviceType::MidiOut => {
      let index = midi_out_device(args, &config.midi_out)?;
      Device::Stream(Box::new(SinkRenderer::new(MidiPortSink::new(index))))
    }
  };
  debug!("Created {} device", device_type);
  Ok(device)
}

pub fn list_midi_devices() -> Result<Vec<MidiOutDeviceInfo>> {
  Ok(list_output_devices()?)
}

fn requested<'a>(args: Option<&'a str>, configured: Option<&'a str>) -> Option<&'a str> {
  args
    .filter(|args| !args.is_empty())
    .or(configured)
    .filter(|bank| !bank.is_empty())
}

/// Value of the leading decimal digits, saturating
fn leading_number(text: &str) -> u32 {
  text
    .chars()
    .map_while(|c| c.to_digit(10))
    .fold(0u32, |value, digit| value.saturating_mul(10).saturating_add(digit))
}

fn wavetable_config(
  args: Option<&str>,
  config: &WavetableConfig,
  callbacks: &Callbacks,
) -> Result<WavetableConfig> {
  let mut config = config.clone();
  if let Some(name) = requested(args, config.soundfont.as_deref()) {
    let path = callbacks
      .resolve_bank(name, BankKind::Soundfont)
      .ok_or_else(|| SynthError::bank(name, "soundfont not found"))?;
    config.soundfont = Some(path);
  }
  Ok(config)
}

/// A bank starting with a digit is the index of a built-in bank, anything else names
/// a bank file.
pub(crate) fn adl_config(args: Option<&str>, config: &AdlConfig, callbacks: &Callbacks) -> AdlConfig {
  let mut config = config.clone();
  match requested(args, config.custom_bank.as_deref()) {
    Some(bank) if bank.starts_with(|c: char| c.is_ascii_digit()) => {
      config.bank = leading_number(bank);
      config.custom_bank = None;
    }
    Some(bank) => config.custom_bank = callbacks.resolve_bank(bank, BankKind::Wopl),
    None => {}
  }
  config
}

pub(crate) fn opn_config(args: Option<&str>, config: &OpnConfig, callbacks: &Callbacks) -> OpnConfig {
  let mut config = config.clone();
  if let Some(bank) = requested(args, config.custom_bank.as_deref()) {
    config.custom_bank = callbacks.resolve_bank(bank, BankKind::Wopn);
  }
  config
}

/// A port number, or the name of a port
fn midi_out_device(args: Option<&str>, config: &MidiOutConfig) -> Result<DeviceIndex> {
  match args.map(str::trim).filter(|args| !args.is_empty()) {
    None => Ok(config.device),
    Some(args) => match args.parse::<DeviceIndex>() {
      Ok(index) => Ok(index),
      Err(_) => list_output_devices()?
        .into_iter()
        .find(|device| device.name == args)
        .map(|device| device.index)
        .ok_or_else(|| SynthError::UnknownDevice(args.to_string())),
    },
  }
}
