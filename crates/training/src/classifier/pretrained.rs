use candle_core::DType;
use candle_nn::{VarBuilder, VarMap};
use model::{EncoderClassifier, EncoderConfig};

use crate::{
    classifier::{load_pretrained_weights, Classifier, TrainState},
    config::{TrainingConfig, TrainingError},
    device::select_device,
};

pub type PretrainedClassifier = Classifier<EncoderClassifier>;

/// Encoder classifier warm-started from `pretrained_model`: the architecture
/// comes from its `config.json`, encoder weights from `model.safetensors`,
/// and the label head starts fresh. Uses the warmup-linear schedule.
pub fn build(config: &TrainingConfig) -> Result<PretrainedClassifier, TrainingError> {
    let device = select_device(&config.device)?;
    let encoder_config = EncoderConfig::from_file(config.pretrained_model.join("config.json"))
        .map_err(|err| TrainingError::initialization(err.to_string()))?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = EncoderClassifier::new(encoder_config, vb)
        .map_err(|err| TrainingError::initialization(err.to_string()))?;
    load_pretrained_weights(
        &varmap,
        &config.pretrained_model.join("model.safetensors"),
        &device,
    )?;

    let state = TrainState::new(config, device, varmap, config.optimizer.clone(), true)?;
    Ok(Classifier::new(model, state))
}
