//! Wavetable synth: single cycle waveforms played through per voice envelopes.

use std::path::Path;
use std::sync::Arc;

use log::{debug, trace};

use sequa_engine::renderer::route;
use sequa_engine::{DeviceType, Renderer, SynthEngine};
use sequa_midi::messages::channel_voice::ChannelMode;
use sequa_midi::messages::system::SystemMessage;
use sequa_midi::MidiMessage;
use sequa_time::HostTime;

use crate::channel::{note_frequency, ChannelState, PERCUSSION_CHANNEL};
use crate::config::WavetableConfig;
use crate::envelope::{Envelope, EnvelopeShape};
use crate::error::{Result, SynthError};
use crate::smoother::LinearSmoother;
use crate::sysex;

pub const TABLE_SIZE: usize = 2048;

const LEVEL_SMOOTHING_SECONDS: f32 = 0.005;

/// One cycle of a waveform read with linear interpolation.
#[derive(Debug, Clone, PartialEq)]
pub struct Wavetable {
  samples: Vec<f32>,
}

impl Wavetable {
  /// Additive waveform from the amplitudes of the first harmonics
  pub fn from_harmonics(amplitudes: &[f32]) -> Self {
    let norm = amplitudes.iter().map(|amplitude| amplitude.abs()).sum::<f32>().max(1.0);
    let samples = (0..TABLE_SIZE)
      .map(|index| {
        let phase = index as f32 / TABLE_SIZE as f32 * std::f32::consts::TAU;
        amplitudes
          .iter()
          .enumerate()
          .map(|(harmonic, amplitude)| amplitude * (phase * (harmonic + 1) as f32).sin())
          .sum::<f32>()
          / norm
      })
      .collect();
    Self { samples }
  }

  pub fn from_samples(samples: Vec<f32>) -> Option<Self> {
    (!samples.is_empty()).then(|| Self { samples })
  }

  /// Load a WAV file as one cycle of a waveform, mixing its channels down
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let mut reader = hound::WavReader::open(path).map_err(|err| SynthError::bank(path, err))?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
      hound::SampleFormat::Float => reader
        .samples::<f32>()
        .collect::<core::result::Result<_, _>>()
        .map_err(|err| SynthError::bank(path, err))?,
      hound::SampleFormat::Int => {
        let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
        reader
          .samples::<i32>()
          .map(|sample| sample.map(|value| value as f32 / scale))
          .collect::<core::result::Result<_, _>>()
          .map_err(|err| SynthError::bank(path, err))?
      }
    };

    let channels = spec.channels.max(1) as usize;
    let mono = samples
      .chunks(channels)
      .map(|frame| frame.iter().sum::<f32>() / channels as f32)
      .collect();
    debug!(
      "Loaded wavetable {:?}: {} Hz, {} channels",
      path, spec.sample_rate, spec.channels
    );
    Self::from_samples(mono).ok_or_else(|| SynthError::bank(path, "no samples"))
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }

  /// `phase` in 0..1
  pub fn sample(&self, phase: f32) -> f32 {
    let position = phase.rem_euclid(1.0) * self.samples.len() as f32;
    let index = position as usize % self.samples.len();
    let next = (index + 1) % self.samples.len();
    let fraction = position.fract();
    self.samples[index] + (self.samples[next] - self.samples[index]) * fraction
  }
}

/// Waveform and envelope of each of the 16 program families
fn family(program: u8) -> (usize, EnvelopeShape) {
  const PIANO: EnvelopeShape = EnvelopeShape::new(0.002, 1.5, 0.0, 0.3);
  const PLUCK: EnvelopeShape = EnvelopeShape::new(0.002, 0.8, 0.1, 0.2);
  const SUSTAINED: EnvelopeShape = EnvelopeShape::new(0.02, 0.2, 0.8, 0.2);
  const PAD: EnvelopeShape = EnvelopeShape::new(0.3, 0.5, 0.7, 0.8);
  const BLOWN: EnvelopeShape = EnvelopeShape::new(0.03, 0.1, 0.9, 0.1);
  match program / 8 {
    0 | 1 => (1, PIANO),
    2 => (3, SUSTAINED),
    3 | 4 | 13 => (2, PLUCK),
    5 | 6 => (2, SUSTAINED),
    7 | 8 | 9 => (4, BLOWN),
    10 | 11 => (2, PAD),
    12 => (3, PAD),
    _ => (0, PLUCK),
  }
}

fn builtin_tables() -> Vec<Arc<Wavetable>> {
  let saw: Vec<f32> = (1..=24).map(|harmonic| 1.0 / harmonic as f32).collect();
  let square: Vec<f32> = (1..=24)
    .map(|harmonic| if harmonic % 2 == 1 { 1.0 / harmonic as f32 } else { 0.0 })
    .collect();
  vec![
    Arc::new(Wavetable::from_harmonics(&[1.0])),
    Arc::new(Wavetable::from_harmonics(&[1.0, 0.5, 0.25, 0.12, 0.06])),
    Arc::new(Wavetable::from_harmonics(&saw)),
    Arc::new(Wavetable::from_harmonics(&[1.0, 1.0, 0.0, 0.8, 0.0, 0.0, 0.0, 0.6])),
    Arc::new(Wavetable::from_harmonics(&square)),
  ]
}

enum Source {
  Table(Arc<Wavetable>),
  Noise(u32),
}

struct Voice {
  channel: u8,
  note: u8,
  velocity: f32,
  source: Source,
  phase: f32,
  increment: f32,
  pan: (f32, f32),
  envelope: Envelope,
  held: bool,
  age: u64,
}

impl Voice {
  fn next_sample(&mut self) -> f32 {
    let sample = match &mut self.source {
      Source::Table(table) => table.sample(self.phase),
      Source::Noise(state) => {
        *state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (*state >> 8) as f32 / (1u32 << 23) as f32 - 1.0
      }
    };
    self.phase = (self.phase + self.increment).fract();
    sample * self.envelope.next_value() * self.velocity
  }
}

pub struct WavetableSynth {
  config: WavetableConfig,
  sample_rate: u32,
  tables: Vec<Arc<Wavetable>>,
  custom: Option<Arc<Wavetable>>,
  channels: [ChannelState; 16],
  levels: Vec<LinearSmoother>,
  voices: Vec<Voice>,
  next_age: u64,
  open: bool,
}

impl WavetableSynth {
  pub fn new(config: WavetableConfig, sample_rate: u32) -> Result<Self> {
    let custom = match config.soundfont.as_deref() {
      Some(path) => Some(Arc::new(Wavetable::load(path)?)),
      None => None,
    };
    let levels = (0..16)
      .map(|_| LinearSmoother::from_time(sample_rate, LEVEL_SMOOTHING_SECONDS))
      .collect();
    let mut synth = Self {
      voices: Vec::with_capacity(config.polyphony),
      config,
      sample_rate,
      tables: builtin_tables(),
      custom,
      channels: ChannelState::channels(),
      levels,
      next_age: 0,
      open: false,
    };
    synth.reset();
    Ok(synth)
  }

  pub fn active_voices(&self) -> usize {
    self.voices.len()
  }

  pub fn channel(&self, channel: u8) -> &ChannelState {
    &self.channels[(channel & 0x0f) as usize]
  }

  fn reset(&mut self) {
    self.voices.clear();
    self.channels = ChannelState::channels();
    for (level, channel) in self.levels.iter_mut().zip(self.channels.iter()) {
      level.reset(channel.level());
    }
  }

  fn update_level(&mut self, channel: u8) {
    let index = channel as usize;
    self.levels[index].set_target(self.channels[index].level());
  }

  fn allocate(&self) -> Option<usize> {
    if self.voices.len() < self.config.polyphony {
      return None;
    }
    let releasing = self
      .voices
      .iter()
      .enumerate()
      .filter(|(_, voice)| voice.envelope.is_releasing())
      .min_by_key(|(_, voice)| voice.age);
    let victim = releasing.or_else(|| self.voices.iter().enumerate().min_by_key(|(_, v)| v.age));
    victim.map(|(index, _)| index)
  }

  fn start_voice(&mut self, channel: u8, note: u8, velocity: u8) {
    let state = &self.channels[channel as usize];
    let (source, shape) = if channel == PERCUSSION_CHANNEL {
      let shape = EnvelopeShape::new(0.001, 0.05 + (note % 12) as f32 * 0.02, 0.0, 0.05);
      match note {
        35 | 36 => (Source::Table(self.tables[0].clone()), shape),
        _ => (Source::Noise(note as u32 * 7919 + 1), shape),
      }
    } else {
      let (table, shape) = family(state.program);
      let table = self.custom.clone().unwrap_or_else(|| self.tables[table].clone());
      (Source::Table(table), shape)
    };

    let voice = Voice {
      channel,
      note,
      velocity: velocity as f32 / 127.0,
      source,
      phase: 0.0,
      increment: 0.0,
      pan: (1.0, 1.0),
      envelope: Envelope::new(shape, self.sample_rate),
      held: true,
      age: self.next_age,
    };
    self.next_age += 1;

    match self.allocate() {
      Some(index) => {
        trace!("Stealing voice {} for note {}", index, note);
        self.voices[index] = voice;
      }
      None => self.voices.push(voice),
    }
  }

  fn release_voices<F: Fn(&Voice) -> bool>(&mut self, matches: F) {
    for voice in self.voices.iter_mut().filter(|voice| matches(voice)) {
      voice.held = false;
      voice.envelope.note_off();
    }
  }

  fn channel_mode(&mut self, channel: u8, mode: ChannelMode) {
    match mode {
      ChannelMode::AllSoundOff => self.voices.retain(|voice| voice.channel != channel),
      ChannelMode::AllNotesOff => self.release_voices(|voice| voice.channel == channel),
      ChannelMode::ResetAllControllers => {
        self.channels[channel as usize].reset_controllers();
        self.update_level(channel);
        self.release_voices(|voice| voice.channel == channel && !voice.held);
      }
      _ => trace!("Ignoring channel mode {:?} on channel {}", mode, channel),
    }
  }
}

impl Renderer for WavetableSynth {
  fn device_type(&self) -> DeviceType {
    DeviceType::Wavetable
  }

  fn open(&mut self) -> sequa_engine::Result<()> {
    self.reset();
    self.open = true;
    Ok(())
  }

  fn close(&mut self) {
    self.voices.clear();
    self.open = false;
  }

  fn is_open(&self) -> bool {
    self.open
  }

  fn dispatch(&mut self, at: HostTime, message: MidiMessage) {
    route(self, at, message)
  }

  fn system_exclusive(&mut self, _at: HostTime, data: &[u8]) {
    if sysex::is_reset(data) {
      debug!("Reset requested by system exclusive");
      self.reset();
    }
  }

  fn note_on(&mut self, at: HostTime, channel: u8, note: u8, velocity: u8) {
    let channel = channel & 0x0f;
    if velocity == 0 {
      return self.note_off(at, channel, note, 0);
    }
    // a repeated note restarts instead of stacking voices
    for voice in self.voices.iter_mut() {
      if voice.channel == channel && voice.note == note {
        voice.held = false;
        voice.envelope.kill();
      }
    }
    self.start_voice(channel, note, velocity);
  }

  fn note_off(&mut self, _at: HostTime, channel: u8, note: u8, _velocity: u8) {
    let channel = channel & 0x0f;
    let sustain = self.channels[channel as usize].sustain;
    for voice in self.voices.iter_mut() {
      if voice.channel == channel && voice.note == note && voice.held {
        voice.held = false;
        if !sustain {
          voice.envelope.note_off();
        }
      }
    }
  }

  fn key_pressure(&mut self, _at: HostTime, channel: u8, note: u8, pressure: u8) {
    trace!("Ignoring key pressure {} {} {}", channel, note, pressure);
  }

  fn control_change(&mut self, _at: HostTime, channel: u8, index: u8, data: u8) {
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
    self.update_level(channel);
  }

  fn program_change(&mut self, _at: HostTime, channel: u8, program: u8) {
    self.channels[(channel & 0x0f) as usize].program = program & 0x7f;
  }

  fn channel_pressure(&mut self, _at: HostTime, channel: u8, pressure: u8) {
    self.channels[(channel & 0x0f) as usize].pressure = pressure;
  }

  fn pitch_bend(&mut self, _at: HostTime, channel: u8, value: u16) {
    self.channels[(channel & 0x0f) as usize].pitch_bend = value & 0x3fff;
  }

  fn system(&mut self, _at: HostTime, message: SystemMessage) {
    if message == SystemMessage::Reset {
      self.reset();
    }
  }
}

impl SynthEngine for WavetableSynth {
  fn sample_rate(&self) -> u32 {
    self.sample_rate
  }

  fn compute_output(&mut self, buffer: &mut [f32], frames: usize) {
    let frames = frames.min(buffer.len() / 2);
    let output = &mut buffer[..frames * 2];
    output.iter_mut().for_each(|sample| *sample = 0.0);

    let sample_rate = self.sample_rate as f32;
    for voice in self.voices.iter_mut() {
      let channel = &self.channels[voice.channel as usize];
      voice.increment = note_frequency(voice.note as f32 + channel.bend_semitones()) / sample_rate;
      voice.pan = channel.pan_gains();
    }

    let gain = self.config.gain;
    let mut levels = [0.0f32; 16];
    for frame in output.chunks_mut(2) {
      for (level, smoother) in levels.iter_mut().zip(self.levels.iter_mut()) {
        *level = smoother.next_value() * gain;
      }
      for voice in self.voices.iter_mut() {
        let sample = voice.next_sample() * levels[voice.channel as usize];
        frame[0] += sample * voice.pan.0;
        frame[1] += sample * voice.pan.1;
      }
    }
    self.voices.retain(|voice| !voice.envelope.is_complete());
  }
}
