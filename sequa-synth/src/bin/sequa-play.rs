use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use log::info;

use sequa_engine::{Device, DeviceType, Player, Streamer};
use sequa_midi::{source, Song, SongSource};
use sequa_synth::{create_device, list_midi_devices, render_song, BankKind, Callbacks, Config};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const RELEASE_TAIL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DeviceArg {
  Wavetable,
  Adl,
  Opn,
  MidiOut,
}

impl From<DeviceArg> for DeviceType {
  fn from(device: DeviceArg) -> Self {
    match device {
      DeviceArg::Wavetable => DeviceType::Wavetable,
      DeviceArg::Adl => DeviceType::Adl,
      DeviceArg::Opn => DeviceType::Opn,
      DeviceArg::MidiOut => DeviceType::MidiOut,
    }
  }
}

#[derive(Debug, Parser)]
#[command(name = "sequa-play", about = "Plays MIDI, MUS and MIDS songs")]
struct Opt {
  /// Song to play
  song: Option<PathBuf>,

  #[arg(short, long, value_enum, default_value_t = DeviceArg::Wavetable)]
  device: DeviceArg,

  /// Bank number or file for the FM synths, waveform file for the wavetable synth,
  /// or port number or name for midi-out
  #[arg(short, long, alias = "port")]
  bank: Option<String>,

  /// List the MIDI output ports and exit
  #[arg(long)]
  list: bool,

  #[arg(short, long = "loop")]
  looping: bool,

  /// Render into a WAV file instead of playing
  #[arg(short, long)]
  render: Option<PathBuf>,

  #[arg(long, default_value_t = 44100)]
  sample_rate: u32,

  #[arg(short, long, action = ArgAction::Count)]
  verbose: u8,
}

/// Bank names are looked up as given, then next to the song with the extension of their kind
fn bank_resolver(song_dir: Option<PathBuf>) -> Callbacks {
  Callbacks::default().with_path_for_bank(move |name, kind| {
    let path = PathBuf::from(name);
    if path.is_file() {
      return Some(path);
    }
    let extension = match kind {
      BankKind::Soundfont => "wav",
      BankKind::Wopl => "wopl",
      BankKind::Wopn => "wopn",
    };
    let candidate = song_dir.as_ref()?.join(name).with_extension(extension);
    candidate.is_file().then_some(candidate)
  })
}

fn list_ports() -> Result<()> {
  let devices = list_midi_devices()?;
  if devices.is_empty() {
    println!("No MIDI output ports");
  }
  for device in devices {
    println!("{:>3}: {}", device.index, device.name);
  }
  Ok(())
}

fn play(device: Device, song: Song, config: &Config, looping: bool) -> Result<()> {
  let mut player = Player::new(device, config.engine.clone());
  player.open()?;

  #[cfg(feature = "cpal")]
  let _driver = match player.pcm_stream() {
    Some(stream) => {
      let driver = sequa_audio::AudioDriver::new(&config.engine.audio, stream)?;
      driver.start()?;
      Some(driver)
    }
    None => None,
  };
  #[cfg(not(feature = "cpal"))]
  if player.pcm_stream().is_some() {
    bail!("Built without audio output, use --render or the midi-out device");
  }

  let streamer = Streamer::new(Box::new(SongSource::new(song))).with_looping(looping);
  streamer.attach(&player)?;
  player.start()?;
  info!("Playing on the {} device", player.device_type());

  while !streamer.is_finished() {
    thread::sleep(POLL_INTERVAL);
  }
  thread::sleep(RELEASE_TAIL);

  player.stop();
  player.close();
  Ok(())
}

fn render(device: Device, song: Song, config: &Config, path: &Path) -> Result<()> {
  let engine = match device {
    Device::SoftSynth(engine) => engine,
    Device::Stream(_) => bail!("Only the synth devices can render into a file"),
  };
  let rendered = render_song(engine, song, &config.engine)?;
  rendered.write_wav(path)?;
  Ok(())
}

fn main() -> Result<()> {
  let opt = Opt::parse();

  let level = match opt.verbose {
    0 => log::Level::Info,
    1 => log::Level::Debug,
    _ => log::Level::Trace,
  };
  simple_logger::init_with_level(level)?;

  if opt.list {
    return list_ports();
  }

  let song_path = match opt.song.as_ref() {
    Some(path) => path,
    None => bail!("No song given"),
  };
  let data = std::fs::read(song_path)
    .with_context(|| format!("Reading {}", song_path.display()))?;
  let song = source::load(&data).with_context(|| format!("Decoding {}", song_path.display()))?;

  let mut config = Config::default();
  config.engine.audio.sample_rate = opt.sample_rate;
  let callbacks = bank_resolver(song_path.parent().map(Path::to_path_buf));
  let device = create_device(opt.device.into(), opt.bank.as_deref(), &config, &callbacks)?;

  match opt.render.as_ref() {
    Some(path) => render(device, song, &config, path),
    None => play(device, song, &config, opt.looping),
  }
}
