use candle_core::{DType, Result, Tensor, D};
use candle_nn::{embedding, linear, loss, ops, Embedding, Linear, Module, VarBuilder};

use crate::{ClassifierOutput, SequenceClassifier};

const HIDDEN_UNITS: usize = 10;
const NUM_LABELS: usize = 2;

/// Averaging classifier: embedding mean, a 10-unit hidden layer, and a binary
/// output layer with a softmax non-linearity. Forward-pass only; nothing in
/// the training loop drives it yet.
pub struct BagOfWordsClassifier {
    embeddings: Embedding,
    fc1: Linear,
    fc2: Linear,
    training: bool,
}

impl BagOfWordsClassifier {
    pub fn new(vocab_size: usize, embedding_size: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            embeddings: embedding(vocab_size, embedding_size, vb.pp("embeddings"))?,
            fc1: linear(embedding_size, HIDDEN_UNITS, vb.pp("fc1"))?,
            fc2: linear(HIDDEN_UNITS, NUM_LABELS, vb.pp("fc2"))?,
            training: false,
        })
    }
}

impl SequenceClassifier for BagOfWordsClassifier {
    fn forward(&self, input_ids: &Tensor, labels: Option<&Tensor>) -> Result<ClassifierOutput> {
        let embedded = self.embeddings.forward(input_ids)?;
        let averaged = embedded.mean(1)?;
        let hidden = self.fc1.forward(&averaged)?;
        let scores = self.fc2.forward(&hidden)?;
        let logits = ops::softmax(&scores, D::Minus1)?;

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
