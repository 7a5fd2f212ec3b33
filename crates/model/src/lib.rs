pub mod bag_of_words;
pub mod config;
pub mod encoder;
pub mod fully_connected;

pub use bag_of_words::BagOfWordsClassifier;
pub use config::EncoderConfig;
pub use encoder::EncoderClassifier;
pub use fully_connected::FeedForwardNet;

use candle_core::{Result, Tensor};

/// Output of a classifier forward pass. The loss is present only when labels
/// were supplied alongside the batch.
#[derive(Debug, Clone)]
pub struct ClassifierOutput {
    pub loss: Option<Tensor>,
    pub logits: Tensor,
}

impl ClassifierOutput {
    pub fn logits_only(logits: Tensor) -> Self {
        Self { loss: None, logits }
    }

    pub fn with_loss(loss: Tensor, logits: Tensor) -> Self {
        Self {
            loss: Some(loss),
            logits,
        }
    }
}

/// Capability contract shared by every classifier the training crate can
/// drive: a forward pass with optional labels and a train/eval mode flag.
pub trait SequenceClassifier {
    /// Produces logits shaped `(batch, num_labels)` for the provided token
    /// ids, and a scalar loss when `labels` is given.
    fn forward(&self, input_ids: &Tensor, labels: Option<&Tensor>) -> Result<ClassifierOutput>;

    fn set_training(&mut self, training: bool);

    fn is_training(&self) -> bool;
}
