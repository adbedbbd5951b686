use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
  BufferSize, Device, OutputCallbackInfo, SampleRate, Stream, StreamConfig, SupportedStreamConfig,
};
use log::{debug, error, info};

use crate::{AudioConfig, AudioError, AudioHandler, AudioOutputConfig, Result};

pub struct AudioDriver {
  _device: Device,
  output_config: StreamConfig,
  output_stream: Stream,
}

impl AudioDriver {
  pub fn new<Handler: AudioHandler + 'static>(
    config: &AudioConfig,
    mut handler: Handler,
  ) -> Result<Self> {
    let device = Self::default_device()?;
    info!(
      "Using default output device: '{}'",
      device.name().unwrap_or_else(|_| "unknown".to_string())
    );

    let mut output_config: StreamConfig = device
      .default_output_config()
      .map_err(|err| AudioError::NoDefaultStreamConfig(err.to_string()))?
      .into();

    let channels = output_config.channels as usize;

    output_config.sample_rate = SampleRate(config.sample_rate);
    output_config.buffer_size = BufferSize::Fixed(config.buffer_size as u32);
    debug!("Using output stream config: {:?}", output_config);

    let output_stream = device
      .build_output_stream(
        &output_config,
        move |data: &mut [f32], _: &OutputCallbackInfo| handler.process(data, channels),
        move |err| error!("An error occurred on the output stream: {}", err),
        None,
      )
      .map_err(|err| AudioError::BuildStream(err.to_string()))?;

    Ok(AudioDriver {
      _device: device,
      output_config,
      output_stream,
    })
  }

  pub fn output_config(config: &AudioConfig) -> Result<AudioOutputConfig> {
    let device = Self::default_device()?;

    let output_config: SupportedStreamConfig = device
      .default_output_config()
      .map_err(|err| AudioError::NoDefaultStreamConfig(err.to_string()))?;

    Ok(AudioOutputConfig {
      name: device
        .name()
        .unwrap_or_else(|_| "Default output".to_string()),
      sample_rate: config.sample_rate,
      channels: output_config.channels() as usize,
      buffer_size: config.buffer_size,
    })
  }

  pub fn sample_rate(&self) -> u32 {
    self.output_config.sample_rate.0
  }

  pub fn num_output_channels(&self) -> usize {
    self.output_config.channels as usize
  }

  pub fn start(&self) -> Result<()> {
    self
      .output_stream
      .play()
      .map_err(|err| AudioError::PlayStream(err.to_string()))
  }

  pub fn pause(&self) -> Result<()> {
    self
      .output_stream
      .pause()
      .map_err(|err| AudioError::PlayStream(err.to_string()))
  }

  fn default_device() -> Result<Device> {
    cpal::default_host()
      .default_output_device()
      .ok_or(AudioError::NoDefaultOutputDevice)
  }
}
