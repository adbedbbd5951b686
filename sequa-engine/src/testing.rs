use std::sync::Arc;

use parking_lot::Mutex;

use sequa_midi::messages::channel_voice::{ChannelVoice, ChannelVoiceMessage};
use sequa_midi::MidiMessage;
use sequa_time::HostTime;

use crate::error::{EngineError, Result};
use crate::renderer::{DeviceType, Renderer, SynthEngine};

#[derive(Debug, Default)]
pub struct Recording {
  pub messages: Vec<(HostTime, MidiMessage)>,
  pub sysex: Vec<(HostTime, Vec<u8>)>,
  pub tempos: Vec<u32>,
  pub divisions: Vec<u32>,
  pub opened: usize,
  pub closed: usize,
}

/// Renderer keeping everything it receives, shared with its clones.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
  recording: Arc<Mutex<Recording>>,
  open: bool,
  fail_open: bool,
}

impl RecordingRenderer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn failing() -> Self {
    Self {
      fail_open: true,
      ..Self::default()
    }
  }

  pub fn messages(&self) -> Vec<(HostTime, MidiMessage)> {
    self.recording.lock().messages.clone()
  }

  pub fn sysex(&self) -> Vec<(HostTime, Vec<u8>)> {
    self.recording.lock().sysex.clone()
  }

  pub fn tempos(&self) -> Vec<u32> {
    self.recording.lock().tempos.clone()
  }

  pub fn divisions(&self) -> Vec<u32> {
    self.recording.lock().divisions.clone()
  }

  pub fn opened(&self) -> usize {
    self.recording.lock().opened
  }

  pub fn closed(&self) -> usize {
    self.recording.lock().closed
  }

  pub fn notes(&self) -> Vec<(HostTime, u8, bool)> {
    self
      .messages()
      .into_iter()
      .filter_map(|(at, message)| match message {
        MidiMessage::ChannelVoice(ChannelVoice {
          message: ChannelVoiceMessage::NoteOn { note, .. },
          ..
        }) => Some((at, note, true)),
        MidiMessage::ChannelVoice(ChannelVoice {
          message: ChannelVoiceMessage::NoteOff { note, .. },
          ..
        }) => Some((at, note, false)),
        _ => None,
      })
      .collect()
  }
}

impl Renderer for RecordingRenderer {
  fn device_type(&self) -> DeviceType {
    DeviceType::MidiOut
  }

  fn open(&mut self) -> Result<()> {
    if self.fail_open {
      return Err(EngineError::Open("recording renderer set to fail".to_string()));
    }
    self.open = true;
    self.recording.lock().opened += 1;
    Ok(())
  }

  fn close(&mut self) {
    if self.open {
      self.open = false;
      self.recording.lock().closed += 1;
    }
  }

  fn is_open(&self) -> bool {
    self.open
  }

  fn set_tempo(&mut self, micros_per_quarter: u32) {
    self.recording.lock().tempos.push(micros_per_quarter);
  }

  fn set_time_division(&mut self, ppqn: u32) {
    self.recording.lock().divisions.push(ppqn);
  }

  fn dispatch(&mut self, at: HostTime, message: MidiMessage) {
    self.recording.lock().messages.push((at, message));
  }

  fn system_exclusive(&mut self, at: HostTime, data: &[u8]) {
    self.recording.lock().sysex.push((at, data.to_vec()));
  }
}

/// Mono synth outputting the number of held notes as a constant level.
#[derive(Clone)]
pub struct LevelSynth {
  pub renderer: RecordingRenderer,
  sample_rate: u32,
  held: usize,
}

impl LevelSynth {
  pub fn new(sample_rate: u32) -> Self {
    Self {
      renderer: RecordingRenderer::new(),
      sample_rate,
      held: 0,
    }
  }
}

impl Renderer for LevelSynth {
  fn device_type(&self) -> DeviceType {
    DeviceType::Wavetable
  }

  fn open(&mut self) -> Result<()> {
    self.renderer.open()
  }

  fn close(&mut self) {
    self.renderer.close()
  }

  fn is_open(&self) -> bool {
    self.renderer.is_open()
  }

  fn dispatch(&mut self, at: HostTime, message: MidiMessage) {
    if let MidiMessage::ChannelVoice(ChannelVoice { message, .. }) = message {
      match message {
        ChannelVoiceMessage::NoteOn { velocity, .. } if velocity > 0 => self.held += 1,
        ChannelVoiceMessage::NoteOn { .. } | ChannelVoiceMessage::NoteOff { .. } => {
          self.held = self.held.saturating_sub(1)
        }
        _ => {}
      }
    }
    self.renderer.dispatch(at, message)
  }

  fn system_exclusive(&mut self, at: HostTime, data: &[u8]) {
    self.renderer.system_exclusive(at, data)
  }
}

impl SynthEngine for LevelSynth {
  fn channels(&self) -> usize {
    1
  }

  fn sample_rate(&self) -> u32 {
    self.sample_rate
  }

  fn compute_output(&mut self, buffer: &mut [f32], frames: usize) {
    let level = self.held as f32;
    buffer[..frames].iter_mut().for_each(|sample| *sample = level);
  }
}
