use crate::{Division, HostTime, SampleRate, Tempo, TicksTime, TimeError};

/// Converts musical ticks into host time units and keeps the absolute playback position.
///
/// The host units are defined by the clock frequency: nanoseconds for device clocks,
/// samples for software synthesis. `units_per_tick` always matches the last applied
/// tempo and division.
#[derive(Debug, Clone)]
pub struct TickClock {
  tempo: Tempo,
  division: Division,
  clock_frequency: f64,
  units_per_tick: f64,
  position: f64,
}

impl TickClock {
  pub const NANOS_FREQUENCY: f64 = 1_000_000_000.0;

  pub fn new(clock_frequency: f64) -> Self {
    let mut clock = Self {
      tempo: Tempo::DEFAULT,
      division: Division::DEFAULT,
      clock_frequency,
      units_per_tick: 0.0,
      position: 0.0,
    };
    clock.recompute();
    clock
  }

  pub fn with_nanos() -> Self {
    Self::new(Self::NANOS_FREQUENCY)
  }

  pub fn with_sample_rate(sample_rate: SampleRate) -> Self {
    Self::new(sample_rate as f64)
  }

  pub fn tempo(&self) -> Tempo {
    self.tempo
  }

  pub fn division(&self) -> Division {
    self.division
  }

  pub fn clock_frequency(&self) -> f64 {
    self.clock_frequency
  }

  pub fn units_per_tick(&self) -> f64 {
    self.units_per_tick
  }

  /// Zero tempo falls back to the default tempo, the error is only a report.
  pub fn set_tempo(&mut self, micros_per_quarter: u32) -> Result<(), TimeError> {
    let result = Tempo::new(micros_per_quarter).map(|tempo| self.tempo = tempo);
    if result.is_err() {
      self.tempo = Tempo::DEFAULT;
    }
    self.recompute();
    result
  }

  /// Zero or negative divisions fall back to the default division, the error is only a report.
  pub fn set_division(&mut self, ticks_per_quarter: i64) -> Result<(), TimeError> {
    let result = Division::new(ticks_per_quarter).map(|division| self.division = division);
    if result.is_err() {
      self.division = Division::DEFAULT;
    }
    self.recompute();
    result
  }

  pub fn ticks_to_host_units(&self, ticks: TicksTime) -> f64 {
    ticks as f64 * self.units_per_tick
  }

  /// Absolute time of an event `ticks` after the current position, without moving.
  pub fn peek(&self, ticks: TicksTime) -> HostTime {
    (self.position + self.ticks_to_host_units(ticks)).round() as HostTime
  }

  /// Move the position `ticks` forward and return the new absolute time.
  pub fn advance(&mut self, ticks: TicksTime) -> HostTime {
    self.position += self.ticks_to_host_units(ticks);
    self.position()
  }

  pub fn position(&self) -> HostTime {
    self.position.round() as HostTime
  }

  /// Move the position to an absolute time, used to re-anchor after the stream starved.
  pub fn set_position(&mut self, position: HostTime) {
    self.position = position as f64;
  }

  pub fn reset(&mut self) {
    self.position = 0.0;
  }

  fn recompute(&mut self) {
    self.units_per_tick = (self.tempo.micros() as f64 / self.division.ppqn() as f64)
      * (self.clock_frequency / 1_000_000.0);
  }
}

impl Default for TickClock {
  fn default() -> Self {
    Self::with_nanos()
  }
}
