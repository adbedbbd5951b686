//! Built-in two operator FM emulator for the OPL3 and OPN2 synths.

use std::path::Path;

use log::{debug, trace};

use sequa_midi::messages::channel_voice::ChannelMode;

use crate::bank::{FmBank, FmPatch, Waveform, NUM_BUILTIN_BANKS};
use crate::channel::{note_frequency, ChannelState, PERCUSSION_CHANNEL};
use crate::chip::{ChannelAlloc, ChipEmulator, ChipFamily, VolumeModel};
use crate::envelope::Envelope;
use crate::error::{Result, SynthError};
use crate::sysex;

/// Sine from the math library, or its parabolic approximation
pub const NUM_EMULATORS: u32 = 2;
const FAST_EMULATOR: u32 = 1;

/// Phase deviation in cycles of a modulator at full level
const MODULATION_DEPTH: f32 = 1.0;
const FEEDBACK_DEPTH: f32 = 0.25;
const VOICE_LEVEL: f32 = 0.2;

fn parabolic_sine(phase: f32) -> f32 {
  const B: f32 = 4.0 / std::f32::consts::PI;
  const C: f32 = -4.0 / (std::f32::consts::PI * std::f32::consts::PI);
  const P: f32 = 0.225;
  let x = std::f32::consts::PI - phase * std::f32::consts::TAU;
  let y = B * x + C * x * x.abs();
  P * (y * y.abs() - y) + y
}

fn wave(waveform: Waveform, phase: f32, fast: bool) -> f32 {
  let phase = phase.rem_euclid(1.0);
  let sine = if fast {
    parabolic_sine(phase)
  } else {
    (phase * std::f32::consts::TAU).sin()
  };
  match waveform {
    Waveform::Sine => sine,
    Waveform::HalfSine => sine.max(0.0),
    Waveform::AbsSine => sine.abs(),
    Waveform::QuarterSine if phase % 0.5 < 0.25 => sine.abs(),
    Waveform::QuarterSine => 0.0,
  }
}

struct FmVoice {
  channel: u8,
  key: u8,
  note: f32,
  velocity: u8,
  program: u8,
  pressure: u8,
  patch: FmPatch,
  modulator_phase: f32,
  carrier_phase: f32,
  modulator_increment: f32,
  carrier_increment: f32,
  amplitude: f32,
  pan: (f32, f32),
  feedback: [f32; 2],
  modulator_envelope: Envelope,
  carrier_envelope: Envelope,
  held: bool,
  age: u64,
}

impl FmVoice {
  fn release(&mut self) {
    self.held = false;
    self.modulator_envelope.note_off();
    self.carrier_envelope.note_off();
  }

  fn kill(&mut self) {
    self.held = false;
    self.modulator_envelope.kill();
    self.carrier_envelope.kill();
  }

  fn is_releasing(&self) -> bool {
    self.carrier_envelope.is_releasing()
  }

  fn is_complete(&self) -> bool {
    self.carrier_envelope.is_complete()
      && (!self.patch.additive || self.modulator_envelope.is_complete())
  }

  fn next_sample(&mut self, fast: bool) -> f32 {
    let patch = &self.patch;
    let feedback = (self.feedback[0] + self.feedback[1]) * 0.5 * patch.feedback * FEEDBACK_DEPTH;
    let brightness = 1.0 + self.pressure as f32 / 254.0;
    let modulator = wave(
      patch.modulator.waveform,
      self.modulator_phase + feedback,
      fast,
    ) * patch.modulator.level
      * brightness
      * self.modulator_envelope.next_value();
    self.feedback = [self.feedback[1], modulator];

    let carrier_level = patch.carrier.level * self.carrier_envelope.next_value();
    let output = if patch.additive {
      wave(patch.carrier.waveform, self.carrier_phase, fast) * carrier_level + modulator
    } else {
      let phase = self.carrier_phase + modulator * MODULATION_DEPTH;
      wave(patch.carrier.waveform, phase, fast) * carrier_level
    };

    self.modulator_phase = (self.modulator_phase + self.modulator_increment).fract();
    self.carrier_phase = (self.carrier_phase + self.carrier_increment).fract();
    output * self.amplitude
  }
}

/// Linear interpolation from the chip rate to the output rate
#[derive(Debug, Clone, Default)]
struct Resampler {
  position: f64,
  previous: [f32; 2],
  current: [f32; 2],
}

pub struct FmEmulator {
  family: ChipFamily,
  sample_rate: u32,
  emulator: u32,
  run_at_pcm_rate: bool,
  bank: FmBank,
  chips: u32,
  volume_model: VolumeModel,
  channel_alloc: ChannelAlloc,
  soft_pan: bool,
  channels: [ChannelState; 16],
  voices: Vec<FmVoice>,
  next_age: u64,
  resampler: Resampler,
}

impl FmEmulator {
  pub fn new(family: ChipFamily, sample_rate: u32) -> Self {
    Self {
      family,
      sample_rate,
      emulator: 0,
      run_at_pcm_rate: false,
      bank: FmBank::builtin(0).unwrap_or_else(|| FmBank {
        name: String::new(),
        melodic: Vec::new(),
        percussion: Vec::new(),
      }),
      chips: 1,
      volume_model: VolumeModel::Auto,
      channel_alloc: ChannelAlloc::Auto,
      soft_pan: true,
      channels: ChannelState::channels(),
      voices: Vec::new(),
      next_age: 0,
      resampler: Resampler::default(),
    }
  }

  pub fn opl3(sample_rate: u32) -> Self {
    Self::new(ChipFamily::Opl3, sample_rate)
  }

  pub fn opn2(sample_rate: u32) -> Self {
    Self::new(ChipFamily::Opn2, sample_rate)
  }

  pub fn bank(&self) -> &FmBank {
    &self.bank
  }

  pub fn set_bank_data(&mut self, bank: FmBank) {
    self.bank = bank;
  }

  pub fn max_voices(&self) -> usize {
    self.chips.max(1) as usize * self.family.voices_per_chip()
  }

  pub fn active_voices(&self) -> usize {
    self.voices.len()
  }

  fn render_rate(&self) -> u32 {
    if self.run_at_pcm_rate {
      self.sample_rate
    } else {
      self.family.native_rate()
    }
  }

  fn allocate(&self, channel: u8, program: u8) -> Option<usize> {
    if self.voices.len() < self.max_voices() {
      return None;
    }
    let releasing = || {
      self
        .voices
        .iter()
        .enumerate()
        .filter(|(_, voice)| voice.is_releasing())
    };
    let quietest = || {
      releasing().min_by(|(_, a), (_, b)| {
        let a = a.carrier_envelope.amplitude();
        a.total_cmp(&b.carrier_envelope.amplitude())
      })
    };
    let chosen = match self.channel_alloc {
      ChannelAlloc::SameInstrument => releasing()
        .filter(|(_, voice)| voice.channel == channel && voice.program == program)
        .min_by_key(|(_, voice)| voice.age)
        .or_else(quietest),
      ChannelAlloc::AnyReleased => releasing().min_by_key(|(_, voice)| voice.age),
      ChannelAlloc::Auto | ChannelAlloc::OffDelay => quietest(),
    };
    chosen
      .or_else(|| self.voices.iter().enumerate().min_by_key(|(_, voice)| voice.age))
      .map(|(index, _)| index)
  }

  fn prepare_block(&mut self) {
    let rate = self.render_rate() as f32;
    let soft_pan = self.soft_pan;
    let volume_model = self.volume_model;
    for voice in self.voices.iter_mut() {
      let channel = &self.channels[voice.channel as usize];
      let frequency = note_frequency(voice.note + channel.bend_semitones());
      voice.modulator_increment = frequency * voice.patch.modulator.ratio / rate;
      voice.carrier_increment = frequency * voice.patch.carrier.ratio / rate;
      voice.amplitude = volume_model.amplitude(voice.velocity, channel.level()) * VOICE_LEVEL;
      voice.pressure = voice.pressure.max(channel.pressure);
      voice.pan = match (soft_pan, channel.pan) {
        (true, _) => channel.pan_gains(),
        (false, pan) if pan < 48 => (1.0, 0.0),
        (false, pan) if pan > 80 => (0.0, 1.0),
        (false, _) => (1.0, 1.0),
      };
    }
  }

  fn render_frame(&mut self) -> [f32; 2] {
    let fast = self.emulator == FAST_EMULATOR;
    let mut frame = [0.0f32; 2];
    for voice in self.voices.iter_mut() {
      let sample = voice.next_sample(fast);
      frame[0] += sample * voice.pan.0;
      frame[1] += sample * voice.pan.1;
    }
    frame
  }

  fn release_voices<F: Fn(&FmVoice) -> bool>(&mut self, matches: F) {
    self
      .voices
      .iter_mut()
      .filter(|voice| matches(voice))
      .for_each(FmVoice::release);
  }

  fn channel_mode(&mut self, channel: u8, mode: ChannelMode) {
    match mode {
      ChannelMode::AllSoundOff => self.voices.retain(|voice| voice.channel != channel),
      ChannelMode::AllNotesOff => self.release_voices(|voice| voice.channel == channel),
      ChannelMode::ResetAllControllers => {
        self.channels[channel as usize].reset_controllers();
        self.release_voices(|voice| voice.channel == channel && !voice.held);
      }
      _ => trace!("Ignoring channel mode {:?} on channel {}", mode, channel),
    }
  }
}

impl ChipEmulator for FmEmulator {
  fn family(&self) -> ChipFamily {
    self.family
  }

  fn sample_rate(&self) -> u32 {
    self.sample_rate
  }

  fn switch_emulator(&mut self, id: u32) -> Result<()> {
    if id >= NUM_EMULATORS {
      return Err(SynthError::Emulator(id));
    }
    self.emulator = id;
    Ok(())
  }

  fn set_run_at_pcm_rate(&mut self, enabled: bool) {
    self.run_at_pcm_rate = enabled;
  }

  fn num_banks(&self) -> u32 {
    NUM_BUILTIN_BANKS
  }

  fn set_bank(&mut self, index: u32) -> Result<()> {
    self.bank = FmBank::builtin(index).ok_or(SynthError::BankIndex {
      index,
      available: NUM_BUILTIN_BANKS,
    })?;
    Ok(())
  }

  fn load_bank_file(&mut self, path: &Path) -> Result<()> {
    self.bank = FmBank::load(path, self.family)?;
    Ok(())
  }

  fn set_num_chips(&mut self, chips: u32) {
    self.chips = chips.max(1);
    let max_voices = self.max_voices();
    self.voices.truncate(max_voices);
  }

  fn set_volume_model(&mut self, model: VolumeModel) {
    self.volume_model = model;
  }

  fn set_channel_alloc(&mut self, mode: ChannelAlloc) {
    self.channel_alloc = mode;
  }

  fn set_soft_pan(&mut self, enabled: bool) {
    self.soft_pan = enabled;
  }

  fn reset_state(&mut self) {
    self.voices.clear();
    self.channels = ChannelState::channels();
    self.resampler = Resampler::default();
  }

  fn note_on(&mut self, channel: u8, key: u8, velocity: u8) {
    let channel = channel & 0x0f;
    if velocity == 0 {
      return self.note_off(channel, key);
    }

    let program = self.channels[channel as usize].program;
    let (patch, note) = if channel == PERCUSSION_CHANNEL {
      match self.bank.percussion(key) {
        Some(patch) => (*patch, patch.fixed_note.unwrap_or(key) as f32),
        None => return,
      }
    } else {
      match self.bank.melodic(program) {
        Some(patch) => (*patch, key as f32 + patch.note_offset as f32),
        None => return,
      }
    };
    if patch.carrier.level == 0.0 && patch.modulator.level == 0.0 {
      trace!("Blank instrument {} on channel {}", program, channel);
      return;
    }

    for voice in self.voices.iter_mut() {
      if voice.channel == channel && voice.key == key {
        voice.kill();
      }
    }

    let rate = self.render_rate();
    let voice = FmVoice {
      channel,
      key,
      note,
      velocity,
      program,
      pressure: 0,
      patch,
      modulator_phase: 0.0,
      carrier_phase: 0.0,
      modulator_increment: 0.0,
      carrier_increment: 0.0,
      amplitude: 0.0,
      pan: (1.0, 1.0),
      feedback: [0.0; 2],
      modulator_envelope: Envelope::new(patch.modulator.envelope, rate),
      carrier_envelope: Envelope::new(patch.carrier.envelope, rate),
      held: true,
      age: self.next_age,
    };
    self.next_age += 1;

    match self.allocate(channel, program) {
      Some(index) => {
        trace!("Reusing voice {} for note {}", index, key);
        self.voices[index] = voice;
      }
      None => self.voices.push(voice),
    }
  }

  fn note_off(&mut self, channel: u8, key: u8) {
    let channel = channel & 0x0f;
    let sustain = self.channels[channel as usize].sustain;
    for voice in self.voices.iter_mut() {
      if voice.channel == channel && voice.key == key && voice.held {
        if sustain {
          voice.held = false;
        } else {
          voice.release();
        }
      }
    }
  }

  fn note_aftertouch(&mut self, channel: u8, key: u8, pressure: u8) {
    let channel = channel & 0x0f;
    for voice in self.voices.iter_mut() {
      if voice.channel == channel && voice.key == key {
        voice.pressure = pressure;
      }
    }
  }

  fn channel_aftertouch(&mut self, channel: u8, pressure: u8) {
    self.channels[(channel & 0x0f) as usize].pressure = pressure;
  }

  fn controller_change(&mut self, channel: u8, index: u8, data: u8) {
    let channel = channel & 0x0f;
    if let Some(mode) = ChannelMode::from_control(index, data) {
      return self.channel_mode(channel, mode);
    }
    let state = &mut self.channels[channel as usize];
    let was_sustained = state.sustain;
    if !state.control_change(index, data) {
      trace!("Ignoring controller {} on channel {}", index, channel);
      return;
    }
    if was_sustained && !state.sustain {
      self.release_voices(|voice| voice.channel == channel && !voice.held);
    }
  }

  fn patch_change(&mut self, channel: u8, program: u8) {
    self.channels[(channel & 0x0f) as usize].program = program & 0x7f;
  }

  fn pitch_bend_ml(&mut self, channel: u8, msb: u8, lsb: u8) {
    let value = ((msb as u16 & 0x7f) << 7) | (lsb as u16 & 0x7f);
    self.channels[(channel & 0x0f) as usize].pitch_bend = value;
  }

  fn system_exclusive(&mut self, data: &[u8]) {
    if sysex::is_reset(data) {
      debug!("Reset requested by system exclusive");
      self.reset_state();
    }
  }

  fn generate(&mut self, buffer: &mut [f32], frames: usize) {
    let frames = frames.min(buffer.len() / 2);
    self.prepare_block();

    if self.run_at_pcm_rate {
      for frame in buffer[..frames * 2].chunks_mut(2) {
        let [left, right] = self.render_frame();
        frame[0] = left;
        frame[1] = right;
      }
    } else {
      let step = self.family.native_rate() as f64 / self.sample_rate.max(1) as f64;
      for frame in buffer[..frames * 2].chunks_mut(2) {
        self.resampler.position += step;
        while self.resampler.position >= 1.0 {
          self.resampler.previous = self.resampler.current;
          self.resampler.current = self.render_frame();
          self.resampler.position -= 1.0;
        }
        let fraction = self.resampler.position as f32;
        let Resampler {
          previous, current, ..
        } = &self.resampler;
        frame[0] = previous[0] + (current[0] - previous[0]) * fraction;
        frame[1] = previous[1] + (current[1] - previous[1]) * fraction;
      }
    }

    self.voices.retain(|voice| !voice.is_complete());
  }
}
