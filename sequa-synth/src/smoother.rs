/// Moves linearly towards a target in a fixed number of steps.
#[derive(Debug, Clone)]
pub struct LinearSmoother {
  value: f32,
  target: f32,
  num_steps: usize,
  current_step: usize,
  value_delta: f32,
}

impl LinearSmoother {
  pub fn new(value: f32, num_steps: usize) -> Self {
    Self {
      value,
      target: value,
      num_steps,
      current_step: num_steps,
      value_delta: 0.0,
    }
  }

  pub fn from_time(sample_rate: u32, time: f32) -> Self {
    Self::new(0.0, (sample_rate as f32 * time).floor() as usize)
  }

  pub fn reset(&mut self, value: f32) {
    self.value = value;
    self.target = value;
    self.current_step = self.num_steps;
  }

  pub fn target(&self) -> f32 {
    self.target
  }

  pub fn set_target(&mut self, target: f32) {
    if target == self.target {
      return;
    }
    self.target = target;
    self.current_step = 0;
    self.value_delta = (target - self.value) / self.num_steps.max(1) as f32;
  }

  pub fn next_value(&mut self) -> f32 {
    if self.current_step < self.num_steps {
      self.current_step += 1;
      self.value += self.value_delta;
    } else {
      self.value = self.target;
    }
    self.value
  }
}

#[cfg(test)]
mod tests {
  use assert_approx_eq::assert_approx_eq;

  use super::*;

  #[test]
  fn reaches_the_target_in_steps() {
    let mut smoother = LinearSmoother::new(0.0, 4);
    smoother.set_target(1.0);
    assert_approx_eq!(smoother.next_value(), 0.25);
    assert_approx_eq!(smoother.next_value(), 0.5);
    assert_approx_eq!(smoother.next_value(), 0.75);
    assert_approx_eq!(smoother.next_value(), 1.0);
    assert_approx_eq!(smoother.next_value(), 1.0);
  }

  #[test]
  fn reset_jumps() {
    let mut smoother = LinearSmoother::from_time(1000, 0.01);
    smoother.set_target(1.0);
    smoother.reset(0.5);
    assert_approx_eq!(smoother.next_value(), 0.5);
    assert_approx_eq!(smoother.target(), 0.5);
  }
}
