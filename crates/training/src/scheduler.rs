use serde::{Deserialize, Serialize};

/// Learning-rate schedule driven by completed optimizer steps.
pub trait LRScheduler {
    /// Advance by one completed optimizer step and return the new rate.
    fn step(&mut self) -> f64;
    /// Rate for the current step count without advancing.
    fn current_lr(&self) -> f64;
    fn steps_taken(&self) -> usize;
    fn snapshot(&self) -> SchedulerState;
    fn load_snapshot(&mut self, state: &SchedulerState);
}

/// Serialized scheduler progress, stored alongside the optimizer state in a
/// checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub steps_taken: usize,
    pub warmup_steps: f64,
    pub total_steps: usize,
    pub base_lr: f64,
}

/// Linear warmup to the base rate, then linear decay to zero at
/// `total_steps`. Warmup length is fractional so a 10% warmup over 20 steps
/// lands exactly at 2.0 steps.
#[derive(Debug, Clone)]
pub struct WarmupLinearSchedule {
    base_lr: f64,
    warmup_steps: f64,
    total_steps: usize,
    steps_taken: usize,
}

impl WarmupLinearSchedule {
    pub fn new(base_lr: f64, warmup_steps: f64, total_steps: usize) -> Self {
        Self {
            base_lr,
            warmup_steps,
            total_steps,
            steps_taken: 0,
        }
    }

    fn multiplier(&self, step: usize) -> f64 {
        let step = step as f64;
        if step < self.warmup_steps {
            step / self.warmup_steps.max(1.0)
        } else {
            let total = self.total_steps as f64;
            ((total - step) / (total - self.warmup_steps).max(1.0)).max(0.0)
        }
    }
}

impl LRScheduler for WarmupLinearSchedule {
    fn step(&mut self) -> f64 {
        self.steps_taken += 1;
        self.current_lr()
    }

    fn current_lr(&self) -> f64 {
        self.base_lr * self.multiplier(self.steps_taken)
    }

    fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    fn snapshot(&self) -> SchedulerState {
        SchedulerState {
            steps_taken: self.steps_taken,
            warmup_steps: self.warmup_steps,
            total_steps: self.total_steps,
            base_lr: self.base_lr,
        }
    }

    fn load_snapshot(&mut self, state: &SchedulerState) {
        self.steps_taken = state.steps_taken;
        self.warmup_steps = state.warmup_steps;
        self.total_steps = state.total_steps;
        self.base_lr = state.base_lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_rises_linearly_from_zero() {
        let mut schedule = WarmupLinearSchedule::new(1.0, 4.0, 20);
        assert_eq!(schedule.current_lr(), 0.0);
        assert!((schedule.step() - 0.25).abs() < 1e-12);
        assert!((schedule.step() - 0.5).abs() < 1e-12);
        assert!((schedule.step() - 0.75).abs() < 1e-12);
        assert!((schedule.step() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn decay_reaches_zero_at_total_steps() {
        let mut schedule = WarmupLinearSchedule::new(2e-5, 2.0, 10);
        for _ in 0..10 {
            schedule.step();
        }
        assert_eq!(schedule.current_lr(), 0.0);
        // Past the horizon the rate stays clamped at zero.
        assert_eq!(schedule.step(), 0.0);
    }

    #[test]
    fn fractional_warmup_is_honored() {
        let mut schedule = WarmupLinearSchedule::new(1.0, 2.5, 10);
        schedule.step();
        schedule.step();
        // Step 2 of a 2.5-step warmup is still warming up.
        assert!((schedule.current_lr() - 0.8).abs() < 1e-12);
        schedule.step();
        // Step 3 has crossed into decay: (10 - 3) / (10 - 2.5).
        assert!((schedule.current_lr() - 7.0 / 7.5).abs() < 1e-12);
    }

    #[test]
    fn snapshot_round_trips_progress() {
        let mut schedule = WarmupLinearSchedule::new(3e-4, 5.0, 50);
        for _ in 0..7 {
            schedule.step();
        }
        let state = schedule.snapshot();

        let mut restored = WarmupLinearSchedule::new(0.0, 0.0, 0);
        restored.load_snapshot(&state);
        assert_eq!(restored.steps_taken(), 7);
        assert!((restored.current_lr() - schedule.current_lr()).abs() < 1e-15);
    }
}
