//! Offline rendering of a song through a soft synth, without an audio device.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use log::{debug, info};

use sequa_engine::{EngineConfig, SoftSynthDevice, SynthEngine};
use sequa_midi::{EventBuffer, MidiSource, Song, SongSource};

use crate::error::Result;

const QUEUED_BUFFERS: usize = 2;

/// Time rendered after the last event for the releases to fade out
const TAIL_SECONDS: f64 = 1.0;

pub struct Rendered {
  pub sample_rate: u32,
  pub channels: usize,
  /// Interleaved frames
  pub samples: Vec<f32>,
}

impl Rendered {
  pub fn frames(&self) -> usize {
    self.samples.len() / self.channels.max(1)
  }

  pub fn seconds(&self) -> f64 {
    self.frames() as f64 / self.sample_rate as f64
  }

  pub fn peak(&self) -> f32 {
    self.samples.iter().fold(0.0f32, |peak, sample| peak.max(sample.abs()))
  }

  /// Write as a 32 bit float WAV file
  pub fn write_wav<P: AsRef<Path>>(&self, path: P) -> Result<()> {
    let spec = WavSpec {
      channels: self.channels as u16,
      sample_rate: self.sample_rate,
      bits_per_sample: 32,
      sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    for &sample in self.samples.iter() {
      writer.write_sample(sample)?;
    }
    writer.finalize()?;
    info!(
      "Wrote {:.2}s of audio to {}",
      self.seconds(),
      path.as_ref().display()
    );
    Ok(())
  }
}

/// Play the whole song through the engine as fast as it renders.
pub fn render_song(engine: Box<dyn SynthEngine>, song: Song, config: &EngineConfig) -> Result<Rendered> {
  let mut device = SoftSynthDevice::new(engine);
  device.open()?;
  let sender = device.stream_sender();
  let mut source = SongSource::new(song);
  sender.set_division(source.division().ppqn() as i64);
  sender.set_tempo(source.initial_tempo().micros());

  let sample_rate = device.sample_rate();
  let channels = device.channels().max(1);
  let block_frames = config.block_frames.max(1);
  let mut block = vec![0.0f32; block_frames * channels];
  let mut samples = Vec::new();

  loop {
    while sender.pending() < QUEUED_BUFFERS && !source.is_done() {
      let mut buffer = EventBuffer::with_capacity(config.event_buffer_size);
      source.make_events(&mut buffer, config.buffer_ahead_us)?;
      sender.stream_out(buffer);
    }
    if source.is_done() && device.is_idle() {
      break;
    }
    device.compute_output(&mut block, block_frames);
    samples.extend_from_slice(&block);
  }

  let tail_blocks = (TAIL_SECONDS * sample_rate as f64 / block_frames as f64).ceil() as usize;
  for _ in 0..tail_blocks {
    device.compute_output(&mut block, block_frames);
    samples.extend_from_slice(&block);
  }
  device.close();

  debug!("Rendered {} frames", samples.len() / channels);
  Ok(Rendered {
    sample_rate,
    channels,
    samples,
  })
}

#[cfg(test)]
mod tests {
  use sequa_midi::{CanonicalEvent, SongFormat};
  use sequa_time::{Division, Tempo};

  use super::*;
  use crate::config::WavetableConfig;
  use crate::wavetable::WavetableSynth;

  const SAMPLE_RATE: u32 = 8000;

  fn song() -> Song {
    Song {
      format: SongFormat::Smf,
      division: Division::new(96).unwrap(),
      initial_tempo: Tempo::DEFAULT,
      setup: vec![],
      events: vec![
        CanonicalEvent::short(0, 0xc0, 0, 0),
        CanonicalEvent::short(0, 0x90, 60, 110),
        CanonicalEvent::short(192, 0x80, 60, 0),
      ],
    }
  }

  fn engine() -> Box<dyn SynthEngine> {
    Box::new(WavetableSynth::new(WavetableConfig::default(), SAMPLE_RATE).unwrap())
  }

  #[test]
  fn renders_the_song_and_a_tail() {
    let config = EngineConfig::default();
    let rendered = render_song(engine(), song(), &config).unwrap();
    assert_eq!(rendered.channels, 2);
    assert_eq!(rendered.sample_rate, SAMPLE_RATE);
    // a second of notes plus the tail
    assert!(rendered.seconds() >= 2.0);
    assert!(rendered.seconds() < 2.2);
    assert!(rendered.peak() > 0.01);

    let tail_start = rendered.samples.len() - 400 * rendered.channels;
    assert!(rendered.samples[tail_start..].iter().all(|s| s.abs() < 1e-3));
  }

  #[test]
  fn empty_song_renders_the_tail() {
    let mut empty = song();
    empty.events.clear();
    let rendered = render_song(engine(), empty, &EngineConfig::default()).unwrap();
    assert!(rendered.seconds() >= TAIL_SECONDS);
    assert_eq!(rendered.peak(), 0.0);
  }

  #[test]
  fn writes_float_wav() {
    let rendered = render_song(engine(), song(), &EngineConfig::default()).unwrap();
    let path = std::env::temp_dir().join(format!("sequa-render-{}.wav", std::process::id()));
    rendered.write_wav(&path).unwrap();

    let reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.sample_format, SampleFormat::Float);
    assert_eq!(reader.len() as usize, rendered.samples.len());
    std::fs::remove_file(path).unwrap();
  }
}
