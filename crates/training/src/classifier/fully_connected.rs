use candle_core::DType;
use candle_nn::{VarBuilder, VarMap};
use model::FeedForwardNet;

use crate::{
    classifier::{Classifier, TrainState},
    config::{OptimizerSettings, TrainingConfig, TrainingError},
    device::select_device,
};

pub type FullyConnectedClassifier = Classifier<FeedForwardNet>;

/// Small feed-forward baseline. Sized from the `[model]` overrides, trained
/// with plain bias-corrected Adam at a constant rate: no pretrained weights,
/// no warmup schedule, no weight decay.
pub fn build(config: &TrainingConfig) -> Result<FullyConnectedClassifier, TrainingError> {
    let device = select_device(&config.device)?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = FeedForwardNet::new(
        config.model.vocab_size,
        config.model.embedding_size,
        config.model.num_labels,
        vb,
    )
    .map_err(|err| TrainingError::initialization(err.to_string()))?;

    let settings = OptimizerSettings {
        weight_decay: 0.0,
        correct_bias: true,
        ..config.optimizer.clone()
    };
    let state = TrainState::new(config, device, varmap, settings, false)?;
    Ok(Classifier::new(model, state))
}
