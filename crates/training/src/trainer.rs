use candle_core::{backprop::GradStore, Var, D};

use crate::{
    classifier::TrainableClassifier,
    config::{TrainingConfig, TrainingError},
    data::InMemoryDataset,
    logging::Logger,
    metrics::{EvaluationSummary, LossEma},
};

const LOSS_EMA_DECAY: f64 = 0.98;

/// Drives a classifier through the full run: epochs of accumulated gradient
/// steps, a checkpoint after every epoch, and optional resume.
pub struct Trainer<C: TrainableClassifier> {
    classifier: C,
    config: TrainingConfig,
    logger: Logger,
}

impl<C: TrainableClassifier> Trainer<C> {
    /// Wrap a classifier. When the config names a checkpoint to resume from,
    /// it is restored here, before any training step.
    pub fn new(
        mut classifier: C,
        config: TrainingConfig,
        logger: Logger,
    ) -> Result<Self, TrainingError> {
        if let Some(name) = config.load_from_checkpoint.as_deref() {
            classifier.load_from_checkpoint(name)?;
        }
        Ok(Self {
            classifier,
            config,
            logger,
        })
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn classifier_mut(&mut self) -> &mut C {
        &mut self.classifier
    }

    /// Run the remaining epochs. Each epoch walks the dataset in full
    /// batches, applies an optimizer step every `gradient_accumulation_steps`
    /// batches, and ends with a checkpoint before the epoch counter moves on.
    /// A resumed run picks up at the restored counter.
    pub fn train(&mut self, dataset: &InMemoryDataset) -> Result<(), TrainingError> {
        let accumulation = self.config.gradient_accumulation_steps;
        let device = self.classifier.device().clone();
        let params = self.classifier.parameters();
        let mut ema = LossEma::new(LOSS_EMA_DECAY);

        while self.classifier.epoch() < self.config.epochs {
            self.classifier.set_train_mode();
            let mut accumulated: Option<GradStore> = None;
            let mut pending = 0usize;

            for batch in dataset.batches(self.config.train_batch_size, &device) {
                let batch = batch
                    .map_err(|err| TrainingError::runtime(format!("bad batch: {}", err)))?;
                let output = self
                    .classifier
                    .forward_pass(&batch.input_ids, Some(&batch.labels))?;
                let loss = output
                    .loss
                    .ok_or_else(|| TrainingError::runtime("no loss for labeled batch"))?;

                let loss_value = loss
                    .to_scalar::<f32>()
                    .map_err(|err| TrainingError::runtime(format!("loss read failed: {}", err)))?
                    as f64;
                self.logger.batch_loss(loss_value)?;

                let scaled = if accumulation > 1 {
                    (&loss / accumulation as f64).map_err(|err| {
                        TrainingError::runtime(format!("loss scaling failed: {}", err))
                    })?
                } else {
                    loss
                };
                let grads = scaled
                    .backward()
                    .map_err(|err| TrainingError::runtime(format!("backward failed: {}", err)))?;
                merge_gradients(&mut accumulated, grads, &params).map_err(|err| {
                    TrainingError::runtime(format!("gradient accumulation failed: {}", err))
                })?;
                pending += 1;

                if pending == accumulation {
                    let mut grads = accumulated.take().ok_or_else(|| {
                        TrainingError::runtime("accumulated gradients went missing")
                    })?;
                    self.classifier.update_gradients(&mut grads)?;
                    ema.update(loss_value);
                    pending = 0;
                }
            }
            // Micro-batches short of a full accumulation window are dropped,
            // the same way a trailing partial batch is.

            let checkpoint_dir = self.classifier.save()?;
            self.classifier.advance_epoch();
            self.logger.info(format!(
                "epoch {}/{} done, loss-ema {:.4}, lr {:.3e}, checkpoint {}",
                self.classifier.epoch(),
                self.config.epochs,
                ema.value().unwrap_or(f64::NAN),
                self.classifier.learning_rate(),
                checkpoint_dir.display()
            ));
        }
        Ok(())
    }

    /// One pass over a dataset in eval mode: mean loss and argmax accuracy.
    pub fn evaluate(
        &mut self,
        dataset: &InMemoryDataset,
    ) -> Result<EvaluationSummary, TrainingError> {
        self.classifier.set_eval_mode();
        let device = self.classifier.device().clone();

        let mut loss_sum = 0.0;
        let mut correct = 0usize;
        let mut examples = 0usize;

        for batch in dataset.all_batches(self.config.train_batch_size, &device) {
            let batch =
                batch.map_err(|err| TrainingError::runtime(format!("bad batch: {}", err)))?;
            let output = self
                .classifier
                .forward_pass(&batch.input_ids, Some(&batch.labels))?;
            let loss = output
                .loss
                .ok_or_else(|| TrainingError::runtime("no loss for labeled batch"))?;
            let batch_size = batch.input_ids.dims()[0];

            loss_sum += loss
                .to_scalar::<f32>()
                .map_err(|err| TrainingError::runtime(format!("loss read failed: {}", err)))?
                as f64
                * batch_size as f64;

            let predictions = output
                .logits
                .argmax(D::Minus1)
                .and_then(|preds| preds.to_vec1::<u32>())
                .map_err(|err| TrainingError::runtime(format!("argmax failed: {}", err)))?;
            let labels = batch
                .labels
                .to_vec1::<u32>()
                .map_err(|err| TrainingError::runtime(format!("label read failed: {}", err)))?;
            correct += predictions
                .iter()
                .zip(labels.iter())
                .filter(|(p, l)| p == l)
                .count();
            examples += batch_size;
        }

        if examples == 0 {
            return Err(TrainingError::runtime("evaluation dataset is empty"));
        }
        Ok(EvaluationSummary {
            mean_loss: loss_sum / examples as f64,
            accuracy: correct as f64 / examples as f64,
            examples,
        })
    }
}

/// Sum a fresh gradient store into the running accumulation, per parameter.
fn merge_gradients(
    accumulated: &mut Option<GradStore>,
    fresh: GradStore,
    params: &[Var],
) -> candle_core::Result<()> {
    match accumulated {
        None => *accumulated = Some(fresh),
        Some(store) => {
            for var in params {
                if let Some(new_grad) = fresh.get(var) {
                    let merged = match store.remove(var) {
                        Some(previous) => (previous + new_grad)?,
                        None => new_grad.clone(),
                    };
                    store.insert(var, merged);
                }
            }
        }
    }
    Ok(())
}
