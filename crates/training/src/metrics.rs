use serde::Serialize;

/// Exponential moving average of the training loss, reported in progress
/// lines so single noisy batches do not dominate.
#[derive(Debug, Clone)]
pub struct LossEma {
    decay: f64,
    value: Option<f64>,
}

impl LossEma {
    pub fn new(decay: f64) -> Self {
        Self { decay, value: None }
    }

    pub fn update(&mut self, loss: f64) -> f64 {
        let next = match self.value {
            Some(current) => self.decay * current + (1.0 - self.decay) * loss,
            None => loss,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// Aggregate result of an evaluation pass.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSummary {
    pub mean_loss: f64,
    pub accuracy: f64,
    pub examples: usize,
}
