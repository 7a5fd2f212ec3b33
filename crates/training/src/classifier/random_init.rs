use candle_core::DType;
use candle_nn::{VarBuilder, VarMap};
use model::{EncoderClassifier, EncoderConfig};

use crate::{
    classifier::{Classifier, TrainState},
    config::{TrainingConfig, TrainingError},
    device::select_device,
    logging::Logger,
};

pub type RandomInitClassifier = Classifier<EncoderClassifier>;

/// Encoder classifier with the same architecture as the pretrained variant
/// (read from the pretrained directory's `config.json`) but every weight
/// randomly initialized. The ablation baseline for warm-starting.
pub fn build(
    config: &TrainingConfig,
    logger: &Logger,
) -> Result<RandomInitClassifier, TrainingError> {
    let device = select_device(&config.device)?;
    let encoder_config = EncoderConfig::from_file(config.pretrained_model.join("config.json"))
        .map_err(|err| TrainingError::initialization(err.to_string()))?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = EncoderClassifier::new(encoder_config, vb)
        .map_err(|err| TrainingError::initialization(err.to_string()))?;
    logger.warn("encoder weights are randomly initialized, not pretrained");

    let state = TrainState::new(config, device, varmap, config.optimizer.clone(), true)?;
    Ok(Classifier::new(model, state))
}
