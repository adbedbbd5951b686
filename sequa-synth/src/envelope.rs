//! Linear ADSR amplitude envelope, advanced one sample at a time.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Attack,
  Decay,
  Sustain,
  Release,
  Complete,
}

/// Envelope times in seconds and the sustain level in 0..=1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeShape {
  pub attack: f32,
  pub decay: f32,
  pub sustain: f32,
  pub release: f32,
}

impl EnvelopeShape {
  pub const fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
    Self {
      attack,
      decay,
      sustain,
      release,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Envelope {
  attack_samples: usize,
  decay_samples: usize,
  sustain_level: f32,
  release_samples: usize,
  stage: Stage,
  position: usize,
  amplitude: f32,
  release_start: f32,
}

impl Envelope {
  pub fn new(shape: EnvelopeShape, sample_rate: u32) -> Self {
    let samples =
      |seconds: f32| ((seconds.max(0.0) * sample_rate as f32).round() as usize).max(1);
    Self {
      attack_samples: samples(shape.attack),
      decay_samples: samples(shape.decay),
      sustain_level: shape.sustain.clamp(0.0, 1.0),
      release_samples: samples(shape.release),
      stage: Stage::Attack,
      position: 0,
      amplitude: 0.0,
      release_start: 0.0,
    }
  }

  pub fn stage(&self) -> Stage {
    self.stage
  }

  pub fn amplitude(&self) -> f32 {
    self.amplitude
  }

  pub fn is_releasing(&self) -> bool {
    matches!(self.stage, Stage::Release | Stage::Complete)
  }

  pub fn is_complete(&self) -> bool {
    self.stage == Stage::Complete
  }

  pub fn note_off(&mut self) {
    if !self.is_releasing() {
      self.stage = Stage::Release;
      self.release_start = self.amplitude;
      self.position = 0;
    }
  }

  /// Fast fade used when a voice is taken for another note
  pub fn kill(&mut self) {
    self.release_samples = self.release_samples.min(32);
    self.note_off();
  }

  pub fn next_value(&mut self) -> f32 {
    let ramp = |from: f32, to: f32, position: usize, total: usize| {
      from + (to - from) * (position as f32 / total as f32)
    };

    self.amplitude = match self.stage {
      Stage::Attack => ramp(0.0, 1.0, self.position, self.attack_samples),
      Stage::Decay => ramp(1.0, self.sustain_level, self.position, self.decay_samples),
      Stage::Sustain => self.sustain_level,
      Stage::Release => ramp(self.release_start, 0.0, self.position, self.release_samples),
      Stage::Complete => 0.0,
    };

    self.position += 1;
    let (limit, next) = match self.stage {
      Stage::Attack => (self.attack_samples, Stage::Decay),
      Stage::Decay => (self.decay_samples, Stage::Sustain),
      Stage::Release => (self.release_samples, Stage::Complete),
      Stage::Sustain | Stage::Complete => (usize::MAX, self.stage),
    };
    if self.position >= limit {
      self.stage = next;
      self.position = 0;
    }
    if self.stage == Stage::Sustain && self.sustain_level <= 0.0 {
      self.stage = Stage::Complete;
    }

    self.amplitude
  }
}
