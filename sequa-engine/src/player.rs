//! Device lifecycle and the consumer thread playing the queued buffers.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, trace};

use sequa_audio::{pcm_ring, PcmStream, PcmWriter};
use sequa_midi::EventBuffer;
use sequa_time::{HostTime, TickClock};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::queue::{StreamQueue, StreamSender};
use crate::renderer::{DeviceType, Renderer, SynthEngine};
use crate::scheduler::Scheduler;
use crate::softsynth::SoftSynthDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
  Idle,
  Open,
  Playing,
  Paused,
  Stopped,
  Closed,
}

pub enum Device {
  /// Messages pushed to the renderer when due, timed in nanoseconds
  Stream(Box<dyn Renderer>),
  /// PCM rendered ahead into a ring read by the audio output
  SoftSynth(Box<dyn SynthEngine>),
}

enum Core {
  Stream {
    scheduler: Scheduler,
    renderer: Box<dyn Renderer>,
  },
  SoftSynth {
    device: SoftSynthDevice,
    writer: PcmWriter,
  },
}

impl Core {
  fn open(&mut self) -> Result<()> {
    match self {
      Core::Stream { renderer, .. } => renderer.open(),
      Core::SoftSynth { device, .. } => device.open(),
    }
  }

  fn close(&mut self) {
    match self {
      Core::Stream { renderer, .. } => renderer.close(),
      Core::SoftSynth { device, .. } => device.close(),
    }
  }

  fn is_open(&self) -> bool {
    match self {
      Core::Stream { renderer, .. } => renderer.is_open(),
      Core::SoftSynth { device, .. } => device.is_open(),
    }
  }

  fn all_notes_off(&mut self) {
    match self {
      Core::Stream {
        scheduler,
        renderer,
      } => renderer.all_notes_off(scheduler.position()),
      Core::SoftSynth { device, .. } => device.all_notes_off(),
    }
  }

  fn drain(&mut self) {
    match self {
      Core::Stream { scheduler, .. } => {
        scheduler.drain();
      }
      Core::SoftSynth { device, .. } => device.reset(),
    }
  }

  fn reset(&mut self) {
    match self {
      Core::Stream { scheduler, .. } => scheduler.reset(),
      Core::SoftSynth { device, .. } => device.reset(),
    }
  }

  fn run(self, queue: Arc<StreamQueue>, block_frames: usize) -> Self {
    debug!("Player thread started");
    let core = match self {
      Core::Stream {
        mut scheduler,
        mut renderer,
      } => {
        run_stream(&mut scheduler, renderer.as_mut(), &queue);
        Core::Stream {
          scheduler,
          renderer,
        }
      }
      Core::SoftSynth {
        mut device,
        mut writer,
      } => {
        run_soft_synth(&mut device, &mut writer, &queue, block_frames);
        Core::SoftSynth { device, writer }
      }
    };
    debug!("Player thread finished");
    core
  }
}

fn elapsed_nanos(origin: Instant) -> HostTime {
  origin.elapsed().as_nanos() as HostTime
}

/// Play every event when it is due. Waits are done on the queue condition variable so
/// new buffers, pause, tempo changes and exit requests wake the thread up.
fn run_stream(scheduler: &mut Scheduler, renderer: &mut dyn Renderer, queue: &StreamQueue) {
  let mut origin = Instant::now();
  let mut paused_at: Option<Instant> = None;
  let mut starved = false;

  loop {
    {
      let mut state = queue.lock();
      while state.paused && !state.exit {
        paused_at.get_or_insert_with(Instant::now);
        queue.condvar().wait(&mut state);
      }
      if state.exit {
        break;
      }
    }
    // events keep their distance to the playback origin across a pause
    if let Some(paused_at) = paused_at.take() {
      origin += paused_at.elapsed();
    }

    scheduler.sync(renderer);

    let at = match scheduler.next_event_time() {
      Some(at) => at,
      None => {
        starved = true;
        let mut state = queue.lock();
        while state.buffers.is_empty() && !state.exit && !state.paused && !state.has_settings() {
          queue.condvar().wait(&mut state);
        }
        continue;
      }
    };

    if starved {
      starved = false;
      scheduler.resync(elapsed_nanos(origin));
      trace!("Stream resumed after starving at {} ns", scheduler.position());
      continue;
    }

    let deadline = origin + Duration::from_nanos(at);
    {
      let mut state = queue.lock();
      while !state.exit && !state.paused && !state.has_settings() && Instant::now() < deadline {
        queue.condvar().wait_until(&mut state, deadline);
      }
      if state.exit || state.paused || state.has_settings() {
        continue;
      }
    }

    scheduler.play_tick(renderer);
  }
}

/// Render blocks ahead into the PCM ring, waiting while it is full.
fn run_soft_synth(
  device: &mut SoftSynthDevice,
  writer: &mut PcmWriter,
  queue: &StreamQueue,
  block_frames: usize,
) {
  let block_frames = block_frames.max(1);
  let mut block = vec![0.0f32; block_frames * writer.channels()];
  let block_duration =
    Duration::from_secs_f64(block_frames as f64 / device.sample_rate().max(1) as f64);

  loop {
    let frames = {
      let mut state = queue.lock();
      while state.paused && !state.exit {
        queue.condvar().wait(&mut state);
      }
      if state.exit {
        break;
      }
      let frames = writer.free_frames().min(block_frames);
      if frames == 0 {
        queue.condvar().wait_for(&mut state, block_duration / 2);
        continue;
      }
      frames
    };

    device.compute_output(&mut block, frames);
    writer.write(&block[..frames * writer.channels()]);
  }
}

/// Owns a device and the thread playing the buffers streamed to it.
pub struct Player {
  config: EngineConfig,
  device_type: DeviceType,
  state: PlayerState,
  queue: Arc<StreamQueue>,
  core: Option<Core>,
  worker: Option<JoinHandle<Core>>,
  pcm_stream: Option<PcmStream>,
}

impl Player {
  pub fn new(device: Device, config: EngineConfig) -> Self {
    let queue = StreamQueue::new();
    let (device_type, core, pcm_stream) = match device {
      Device::Stream(renderer) => {
        let scheduler = Scheduler::new(queue.clone(), TickClock::with_nanos());
        let device_type = renderer.device_type();
        (
          device_type,
          Core::Stream {
            scheduler,
            renderer,
          },
          None,
        )
      }
      Device::SoftSynth(engine) => {
        let device_type = engine.device_type();
        let (writer, stream) = pcm_ring(config.audio.ring_frames, engine.channels());
        let device = SoftSynthDevice::with_queue(engine, queue.clone());
        (
          device_type,
          Core::SoftSynth { device, writer },
          Some(stream),
        )
      }
    };

    Self {
      config,
      device_type,
      state: PlayerState::Idle,
      queue,
      core: Some(core),
      worker: None,
      pcm_stream,
    }
  }

  pub fn state(&self) -> PlayerState {
    self.state
  }

  pub fn device_type(&self) -> DeviceType {
    self.device_type
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  fn invalid(&self, operation: &'static str) -> EngineError {
    EngineError::InvalidState {
      operation,
      state: self.state,
    }
  }

  pub fn open(&mut self) -> Result<()> {
    if !matches!(self.state, PlayerState::Idle | PlayerState::Closed) {
      return Err(self.invalid("open"));
    }
    let core = match self.core.as_mut() {
      Some(core) => core,
      None => return Err(self.invalid("open")),
    };
    core.open()?;
    debug!("Opened {} device", self.device_type);
    self.state = PlayerState::Open;
    Ok(())
  }

  /// Start playing, or resume when paused.
  pub fn start(&mut self) -> Result<()> {
    match self.state {
      PlayerState::Playing => Ok(()),
      PlayerState::Paused => {
        self.queue.update(|state| state.paused = false);
        self.state = PlayerState::Playing;
        debug!("Resumed");
        Ok(())
      }
      PlayerState::Open | PlayerState::Stopped => self.spawn(),
      _ => Err(self.invalid("start")),
    }
  }

  fn spawn(&mut self) -> Result<()> {
    let mut core = match self.core.take() {
      Some(core) => core,
      None => return Err(self.invalid("start")),
    };
    core.reset();
    self.queue.update(|state| {
      state.exit = false;
      state.paused = false;
    });

    let queue = self.queue.clone();
    let block_frames = self.config.block_frames;
    let worker = thread::Builder::new()
      .name("sequa-player".to_string())
      .spawn(move || core.run(queue, block_frames))
      .map_err(|err| EngineError::Spawn(err.to_string()));

    match worker {
      Ok(worker) => {
        self.worker = Some(worker);
        self.state = PlayerState::Playing;
        Ok(())
      }
      Err(err) => {
        self.state = PlayerState::Closed;
        Err(err)
      }
    }
  }

  pub fn pause(&mut self) -> Result<()> {
    match self.state {
      PlayerState::Paused => Ok(()),
      PlayerState::Playing => {
        self.queue.update(|state| state.paused = true);
        self.state = PlayerState::Paused;
        debug!("Paused");
        Ok(())
      }
      _ => Err(self.invalid("pause")),
    }
  }

  pub fn resume(&mut self) -> Result<()> {
    match self.state {
      PlayerState::Playing | PlayerState::Paused => self.start(),
      _ => Err(self.invalid("resume")),
    }
  }

  /// Stop the thread and wait for it to finish, dropping everything still queued.
  pub fn stop(&mut self) {
    if let Some(worker) = self.worker.take() {
      self.queue.update(|state| state.exit = true);
      match worker.join() {
        Ok(core) => self.core = Some(core),
        Err(_) => error!("The player thread panicked"),
      }
    }

    let dropped = self.queue.clear();
    if dropped > 0 {
      debug!("Dropped {} pending buffers", dropped);
    }

    if matches!(self.state, PlayerState::Playing | PlayerState::Paused) {
      match self.core.as_mut() {
        Some(core) => {
          core.drain();
          core.all_notes_off();
          self.state = PlayerState::Stopped;
        }
        None => self.state = PlayerState::Closed,
      }
      debug!("Stopped");
    }
  }

  /// Release the device. Safe to call in any state and more than once.
  pub fn close(&mut self) {
    if self.state == PlayerState::Closed {
      return;
    }
    // stopping a running player already silenced the device
    let silenced = matches!(self.state, PlayerState::Playing | PlayerState::Paused);
    self.stop();
    if let Some(core) = self.core.as_mut() {
      if core.is_open() {
        if !silenced {
          core.all_notes_off();
        }
        core.close();
        debug!("Closed {} device", self.device_type);
      }
    }
    self.state = PlayerState::Closed;
  }

  pub fn stream_out(&self, buffer: EventBuffer) {
    self.queue.push(buffer)
  }

  pub fn stream_sender(&self) -> StreamSender {
    StreamSender::new(self.queue.clone())
  }

  pub fn set_tempo(&self, micros_per_quarter: u32) {
    self.queue.set_tempo(micros_per_quarter)
  }

  pub fn set_division(&self, ppqn: i64) {
    self.queue.set_division(ppqn)
  }

  /// Register the callback receiving every buffer once played.
  /// It is called from the player thread and must not call back into the player.
  pub fn on_buffer_consumed<F>(&self, callback: F)
  where
    F: FnMut(EventBuffer) + Send + 'static,
  {
    self.queue.set_consumed_callback(Some(Box::new(callback)))
  }

  /// The rendered PCM of a soft synth device, for the audio output to pull.
  pub fn pcm_stream(&mut self) -> Option<PcmStream> {
    self.pcm_stream.take()
  }

  pub fn pending(&self) -> usize {
    self.queue.pending()
  }
}

impl Drop for Player {
  fn drop(&mut self) {
    self.close()
  }
}
