use std::{fs, path::Path};

use candle_core::{Device, Tensor};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::TrainingError;

const PAD_ID: u32 = 0;

/// One tokenized note with its label.
#[derive(Debug, Clone)]
pub struct LabeledExample {
    pub input_ids: Vec<u32>,
    pub label: u32,
}

/// A batch ready for the forward pass: `(batch, seq_len)` token ids and
/// `(batch,)` labels, both on the target device.
pub struct LabeledBatch {
    pub input_ids: Tensor,
    pub labels: Tensor,
}

/// Dataset small enough to hold in memory, padded to a fixed length.
pub struct InMemoryDataset {
    examples: Vec<LabeledExample>,
    sequence_length: usize,
}

impl InMemoryDataset {
    pub fn new(examples: Vec<LabeledExample>, sequence_length: usize) -> Self {
        Self {
            examples,
            sequence_length,
        }
    }

    /// Load a dataset from a CSV file with lines of the form
    /// `label,tok tok tok ...` where tokens are integer ids. Sequences are
    /// truncated or padded with id 0 to the configured length.
    pub fn from_csv(
        path: impl AsRef<Path>,
        sequence_length: usize,
    ) -> Result<Self, TrainingError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let mut examples = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (label, tokens) = line.split_once(',').ok_or_else(|| {
                TrainingError::runtime(format!(
                    "{}:{}: expected 'label,tokens'",
                    path.as_ref().display(),
                    line_no + 1
                ))
            })?;
            let label: u32 = label.trim().parse().map_err(|_| {
                TrainingError::runtime(format!(
                    "{}:{}: label '{}' is not an integer",
                    path.as_ref().display(),
                    line_no + 1,
                    label
                ))
            })?;
            let input_ids = tokens
                .split_whitespace()
                .map(|tok| {
                    tok.parse::<u32>().map_err(|_| {
                        TrainingError::runtime(format!(
                            "{}:{}: token '{}' is not an integer",
                            path.as_ref().display(),
                            line_no + 1,
                            tok
                        ))
                    })
                })
                .collect::<Result<Vec<u32>, TrainingError>>()?;
            examples.push(LabeledExample { input_ids, label });
        }
        Ok(Self::new(examples, sequence_length))
    }

    /// Random dataset for smoke runs. Deterministic for a given seed.
    pub fn synthetic(
        num_examples: usize,
        sequence_length: usize,
        vocab_size: usize,
        num_labels: usize,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let examples = (0..num_examples)
            .map(|_| LabeledExample {
                input_ids: (0..sequence_length)
                    .map(|_| rng.gen_range(0..vocab_size as u32))
                    .collect(),
                label: rng.gen_range(0..num_labels as u32),
            })
            .collect();
        Self::new(examples, sequence_length)
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Full batches in dataset order; a trailing partial batch is dropped,
    /// matching the floor in the step arithmetic.
    pub fn batches<'a>(
        &'a self,
        batch_size: usize,
        device: &'a Device,
    ) -> impl Iterator<Item = candle_core::Result<LabeledBatch>> + 'a {
        self.examples
            .chunks_exact(batch_size)
            .map(move |chunk| self.build_batch(chunk, device))
    }

    /// Every example in dataset order; the final batch may be short. For
    /// evaluation, where there is no step arithmetic to respect.
    pub fn all_batches<'a>(
        &'a self,
        batch_size: usize,
        device: &'a Device,
    ) -> impl Iterator<Item = candle_core::Result<LabeledBatch>> + 'a {
        self.examples
            .chunks(batch_size)
            .map(move |chunk| self.build_batch(chunk, device))
    }

    fn build_batch(
        &self,
        chunk: &[LabeledExample],
        device: &Device,
    ) -> candle_core::Result<LabeledBatch> {
        let mut ids = Vec::with_capacity(chunk.len() * self.sequence_length);
        let mut labels = Vec::with_capacity(chunk.len());
        for example in chunk {
            let mut row = example.input_ids.clone();
            row.truncate(self.sequence_length);
            row.resize(self.sequence_length, PAD_ID);
            ids.extend_from_slice(&row);
            labels.push(example.label);
        }
        Ok(LabeledBatch {
            input_ids: Tensor::from_vec(ids, (chunk.len(), self.sequence_length), device)?,
            labels: Tensor::from_vec(labels, (chunk.len(),), device)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_final_batch_is_dropped() {
        let dataset = InMemoryDataset::synthetic(23, 4, 16, 2, 7);
        let batches: Vec<_> = dataset.batches(10, &Device::Cpu).collect();
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn all_batches_keeps_the_trailing_short_batch() {
        let dataset = InMemoryDataset::synthetic(23, 4, 16, 2, 7);
        let batches: Vec<_> = dataset
            .all_batches(10, &Device::Cpu)
            .collect::<candle_core::Result<_>>()
            .unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].input_ids.dims(), &[3, 4]);
    }

    #[test]
    fn batches_pad_and_truncate_to_length() {
        let examples = vec![
            LabeledExample {
                input_ids: vec![1, 2],
                label: 0,
            },
            LabeledExample {
                input_ids: vec![3, 4, 5, 6, 7],
                label: 1,
            },
        ];
        let dataset = InMemoryDataset::new(examples, 4);
        let batch = dataset
            .batches(2, &Device::Cpu)
            .next()
            .unwrap()
            .unwrap();
        let rows = batch.input_ids.to_vec2::<u32>().unwrap();
        assert_eq!(rows[0], vec![1, 2, 0, 0]);
        assert_eq!(rows[1], vec![3, 4, 5, 6]);
        assert_eq!(batch.labels.to_vec1::<u32>().unwrap(), vec![0, 1]);
    }

    #[test]
    fn synthetic_is_deterministic_per_seed() {
        let a = InMemoryDataset::synthetic(5, 3, 16, 2, 42);
        let b = InMemoryDataset::synthetic(5, 3, 16, 2, 42);
        for (x, y) in a.examples.iter().zip(b.examples.iter()) {
            assert_eq!(x.input_ids, y.input_ids);
            assert_eq!(x.label, y.label);
        }
    }
}
