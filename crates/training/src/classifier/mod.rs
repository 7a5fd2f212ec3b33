pub mod fully_connected;
pub mod pretrained;
pub mod random_init;

use std::path::{Path, PathBuf};

use candle_core::{backprop::GradStore, Device, Tensor, Var};
use candle_nn::VarMap;
use model::{ClassifierOutput, SequenceClassifier};

use crate::{
    checkpoint::{self, sha256_bytes},
    config::{OptimizerSettings, TrainingConfig, TrainingError},
    optimizer::{named_parameters, AdamW},
    scheduler::{LRScheduler, WarmupLinearSchedule},
};

/// The full training contract a classifier exposes to the trainer: forward
/// passes, mode switching, gradient application, and epoch-keyed
/// checkpointing.
pub trait TrainableClassifier {
    fn forward_pass(
        &self,
        input_ids: &Tensor,
        labels: Option<&Tensor>,
    ) -> Result<ClassifierOutput, TrainingError>;

    fn set_train_mode(&mut self);
    fn set_eval_mode(&mut self);
    fn is_training(&self) -> bool;

    /// Trainable parameters in a stable order.
    fn parameters(&self) -> Vec<Var>;

    /// Apply accumulated gradients: one optimizer step, then one scheduler
    /// step whose new rate is fed back into the optimizer. Consumes the
    /// gradients it applies.
    fn update_gradients(&mut self, grads: &mut GradStore) -> Result<(), TrainingError>;

    /// Persist a checkpoint under `<output>/<experiment>/checkpoints/<epoch>`
    /// and return that directory. The stored manifest carries `epoch + 1`,
    /// the epoch a resumed run continues from.
    fn save(&self) -> Result<PathBuf, TrainingError>;

    /// Restore weights, optimizer, and scheduler from a named checkpoint
    /// directory. The epoch counter resumes at the manifest's stored value.
    fn load_from_checkpoint(&mut self, name: &str) -> Result<(), TrainingError>;

    fn epoch(&self) -> usize;
    fn advance_epoch(&mut self);

    fn learning_rate(&self) -> f64;
    fn device(&self) -> &Device;
}

/// Plumbing shared by every classifier variant: the parameter store, the
/// optimizer, an optional warmup schedule, and the epoch counter.
pub struct TrainState {
    config: TrainingConfig,
    config_sha256: String,
    device: Device,
    varmap: VarMap,
    optimizer: AdamW,
    scheduler: Option<WarmupLinearSchedule>,
    epoch: usize,
}

impl TrainState {
    pub fn new(
        config: &TrainingConfig,
        device: Device,
        varmap: VarMap,
        settings: OptimizerSettings,
        with_schedule: bool,
    ) -> Result<Self, TrainingError> {
        let mut optimizer = AdamW::new(&varmap, config.learning_rate, settings).map_err(|err| {
            TrainingError::initialization(format!("failed to build optimizer: {}", err))
        })?;
        let scheduler = if with_schedule {
            let scheduler = WarmupLinearSchedule::new(
                config.learning_rate,
                config.warmup_steps(),
                config.total_optimization_steps(),
            );
            // Seed the step-0 warmup rate, not the raw base rate.
            optimizer.set_learning_rate(scheduler.current_lr());
            Some(scheduler)
        } else {
            None
        };
        let config_sha256 = sha256_bytes(&serde_json::to_vec(config).map_err(|err| {
            TrainingError::initialization(format!("failed to fingerprint config: {}", err))
        })?);
        Ok(Self {
            config: config.clone(),
            config_sha256,
            device,
            varmap,
            optimizer,
            scheduler,
            epoch: 0,
        })
    }

    fn update_gradients(&mut self, grads: &mut GradStore) -> Result<(), TrainingError> {
        self.optimizer
            .step(grads)
            .map_err(|err| TrainingError::runtime(format!("optimizer step failed: {}", err)))?;
        if let Some(scheduler) = self.scheduler.as_mut() {
            let lr = scheduler.step();
            self.optimizer.set_learning_rate(lr);
        }
        Ok(())
    }

    fn save(&self) -> Result<PathBuf, TrainingError> {
        let dir = self.config.checkpoints_dir().join(self.epoch.to_string());
        checkpoint::save_checkpoint(
            &dir,
            self.epoch + 1,
            &self.varmap,
            &self.optimizer,
            self.scheduler.as_ref().map(|s| s as &dyn LRScheduler),
            &self.config_sha256,
        )?;
        Ok(dir)
    }

    fn load_from_checkpoint(&mut self, name: &str) -> Result<(), TrainingError> {
        let dir = self.config.checkpoints_dir().join(name);
        let manifest = checkpoint::load_checkpoint(
            &dir,
            &mut self.varmap,
            &mut self.optimizer,
            self.scheduler.as_mut().map(|s| s as &mut dyn LRScheduler),
        )?;
        self.epoch = manifest.epoch;
        // State deserializes onto the CPU; put it back next to the weights.
        self.optimizer
            .rehome(&self.device)
            .map_err(|err| TrainingError::runtime(format!("failed to re-home optimizer: {}", err)))?;
        Ok(())
    }
}

/// A model bound to its training state. The variant modules below pick the
/// architecture, the weight source, and whether a warmup schedule applies.
pub struct Classifier<M: SequenceClassifier> {
    model: M,
    state: TrainState,
}

impl<M: SequenceClassifier> Classifier<M> {
    pub fn new(model: M, state: TrainState) -> Self {
        Self { model, state }
    }
}

impl<M: SequenceClassifier> TrainableClassifier for Classifier<M> {
    fn forward_pass(
        &self,
        input_ids: &Tensor,
        labels: Option<&Tensor>,
    ) -> Result<ClassifierOutput, TrainingError> {
        self.model
            .forward(input_ids, labels)
            .map_err(|err| TrainingError::runtime(format!("forward pass failed: {}", err)))
    }

    fn set_train_mode(&mut self) {
        self.model.set_training(true);
    }

    fn set_eval_mode(&mut self) {
        self.model.set_training(false);
    }

    fn is_training(&self) -> bool {
        self.model.is_training()
    }

    fn parameters(&self) -> Vec<Var> {
        named_parameters(&self.state.varmap)
            .into_iter()
            .map(|(_, var)| var)
            .collect()
    }

    fn update_gradients(&mut self, grads: &mut GradStore) -> Result<(), TrainingError> {
        self.state.update_gradients(grads)
    }

    fn save(&self) -> Result<PathBuf, TrainingError> {
        self.state.save()
    }

    fn load_from_checkpoint(&mut self, name: &str) -> Result<(), TrainingError> {
        self.state.load_from_checkpoint(name)
    }

    fn epoch(&self) -> usize {
        self.state.epoch
    }

    fn advance_epoch(&mut self) {
        self.state.epoch += 1;
    }

    fn learning_rate(&self) -> f64 {
        self.state.optimizer.learning_rate()
    }

    fn device(&self) -> &Device {
        &self.state.device
    }
}

/// Copy tensors from a pretrained `model.safetensors` into matching var map
/// entries. Parameters absent from the file (the classifier head of a
/// freshly attached model) keep their random initialization. Returns how
/// many tensors were copied.
pub fn load_pretrained_weights(
    varmap: &VarMap,
    path: &Path,
    device: &Device,
) -> Result<usize, TrainingError> {
    let tensors = candle_core::safetensors::load(path, device).map_err(|err| {
        TrainingError::initialization(format!(
            "failed to read pretrained weights {}: {}",
            path.display(),
            err
        ))
    })?;
    let mut copied = 0;
    for (name, var) in named_parameters(varmap) {
        if let Some(tensor) = tensors.get(&name) {
            var.set(tensor).map_err(|err| {
                TrainingError::initialization(format!(
                    "pretrained tensor '{}' does not fit: {}",
                    name, err
                ))
            })?;
            copied += 1;
        }
    }
    if copied == 0 {
        return Err(TrainingError::initialization(format!(
            "no tensor in {} matches the model",
            path.display()
        )));
    }
    Ok(copied)
}
