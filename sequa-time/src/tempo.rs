use std::fmt::{Display, Formatter};

use crate::{TicksTime, TimeError};

/// Tempo as microseconds per quarter note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tempo(u32);

impl Tempo {
  /// 120 BPM
  pub const DEFAULT: Tempo = Tempo(500_000);

  pub fn new(micros_per_quarter: u32) -> Result<Self, TimeError> {
    if micros_per_quarter == 0 {
      Err(TimeError::InvalidTempo(micros_per_quarter))
    } else {
      Ok(Self(micros_per_quarter))
    }
  }

  pub fn from_bpm(bpm: f64) -> Self {
    let micros = (60_000_000.0 / bpm.max(f64::EPSILON)).round();
    Self(micros.clamp(1.0, u32::MAX as f64) as u32)
  }

  pub fn micros(&self) -> u32 {
    self.0
  }

  pub fn bpm(&self) -> f64 {
    60_000_000.0 / self.0 as f64
  }

  /// How many ticks fit in `micros` at this tempo and the given division.
  pub fn micros_to_ticks(&self, micros: u64, division: Division) -> u64 {
    micros * division.ppqn() as u64 / self.0 as u64
  }

  pub fn ticks_to_micros(&self, ticks: TicksTime, division: Division) -> f64 {
    ticks as f64 * self.0 as f64 / division.ppqn() as f64
  }
}

impl Default for Tempo {
  fn default() -> Self {
    Self::DEFAULT
  }
}

impl Display for Tempo {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} us/qn ({:.2} bpm)", self.0, self.bpm())
  }
}

/// Time division in ticks per quarter note (PPQN).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Division(u32);

impl Division {
  pub const DEFAULT: Division = Division(96);

  /// Zero or negative divisions are rejected, the caller decides whether to fall back to the default.
  pub fn new(ppqn: i64) -> Result<Self, TimeError> {
    if ppqn <= 0 || ppqn > u32::MAX as i64 {
      Err(TimeError::InvalidDivision(ppqn))
    } else {
      Ok(Self(ppqn as u32))
    }
  }

  pub fn ppqn(&self) -> u32 {
    self.0
  }
}

impl Default for Division {
  fn default() -> Self {
    Self::DEFAULT
  }
}

impl Display for Division {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} ppqn", self.0)
  }
}

#[cfg(test)]
mod tests {
  use assert_approx_eq::assert_approx_eq;

  use super::*;

  #[test]
  fn tempo_from_bpm() {
    assert_eq!(Tempo::from_bpm(120.0), Tempo::DEFAULT);
    assert_eq!(Tempo::from_bpm(60.0).micros(), 1_000_000);
    assert_approx_eq!(Tempo::DEFAULT.bpm(), 120.0);
  }

  #[test]
  fn zero_tempo_is_rejected() {
    assert_eq!(Tempo::new(0), Err(TimeError::InvalidTempo(0)));
  }

  #[test]
  fn invalid_divisions_are_rejected() {
    assert_eq!(Division::new(0), Err(TimeError::InvalidDivision(0)));
    assert_eq!(Division::new(-5), Err(TimeError::InvalidDivision(-5)));
    assert_eq!(Division::new(480).map(|d| d.ppqn()), Ok(480));
  }

  #[test]
  fn micros_to_ticks() {
    let division = Division::new(96).unwrap();
    assert_eq!(Tempo::DEFAULT.micros_to_ticks(500_000, division), 96);
    assert_eq!(Tempo::DEFAULT.micros_to_ticks(100_000, division), 19);
    assert_approx_eq!(Tempo::DEFAULT.ticks_to_micros(48, division), 250_000.0);
  }
}
