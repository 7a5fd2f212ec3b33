use candle_core::{DType, Error, Result, Tensor};
use candle_nn::{embedding, linear, loss, Embedding, Linear, Module, VarBuilder};

use crate::{ClassifierOutput, SequenceClassifier};

const HIDDEN_UNITS: usize = 128;

/// Small from-scratch classifier: embed tokens, average over the sequence,
/// then a single 128-wide ReLU layer feeding the label head.
pub struct FeedForwardNet {
    embeddings: Embedding,
    hidden: Linear,
    head: Linear,
    training: bool,
}

impl FeedForwardNet {
    pub fn new(
        vocab_size: usize,
        embedding_size: usize,
        num_labels: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        if vocab_size == 0 || embedding_size == 0 || num_labels == 0 {
            return Err(Error::Msg(
                "feed-forward net dimensions must be greater than zero".into(),
            ));
        }
        Ok(Self {
            embeddings: embedding(vocab_size, embedding_size, vb.pp("embeddings"))?,
            hidden: linear(embedding_size, HIDDEN_UNITS, vb.pp("hidden"))?,
            head: linear(HIDDEN_UNITS, num_labels, vb.pp("head"))?,
            training: false,
        })
    }
}

impl SequenceClassifier for FeedForwardNet {
    fn forward(&self, input_ids: &Tensor, labels: Option<&Tensor>) -> Result<ClassifierOutput> {
        let embedded = self.embeddings.forward(input_ids)?;
        let averaged = embedded.mean(1)?;
        let activated = self.hidden.forward(&averaged)?.relu()?;
        let logits = self.head.forward(&activated)?;

        match labels {
            Some(labels) => {
                let labels = labels.to_dtype(DType::U32)?;
                let loss = loss::cross_entropy(&logits, &labels)?;
                Ok(ClassifierOutput::with_loss(loss, logits))
            }
            None => Ok(ClassifierOutput::logits_only(logits)),
        }
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }
}
