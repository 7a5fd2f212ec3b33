use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// Configuration for one training experiment. Every field without a
/// `#[serde(default)]` is required; a missing key fails at parse time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Directory holding `config.json` and `model.safetensors` for the
    /// encoder variants. The fully-connected variant ignores it.
    pub pretrained_model: PathBuf,
    pub learning_rate: f64,
    pub num_train_examples: usize,
    pub train_batch_size: usize,
    pub gradient_accumulation_steps: usize,
    pub epochs: usize,
    pub warmup_proportion: f64,
    pub output_dir: PathBuf,
    pub experiment_name: String,
    pub device: String,
    #[serde(default)]
    pub load_from_checkpoint: Option<String>,
    #[serde(default)]
    pub variant: ClassifierVariant,
    #[serde(default)]
    pub model: ModelOverrides,
    #[serde(default)]
    pub optimizer: OptimizerSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TrainingConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TrainingError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: TrainingConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | Some("tml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(TrainingError::ConfigFormat(format!(
                    "unsupported configuration extension '{}'",
                    other
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TrainingError> {
        Self::from_path(path)
    }

    pub fn validate(&self) -> Result<(), TrainingError> {
        let mut errors = Vec::new();

        if self.learning_rate <= 0.0 {
            errors.push("learning_rate must be greater than 0".to_string());
        }

        if self.train_batch_size == 0 {
            errors.push("train_batch_size must be greater than 0".to_string());
        }

        if self.gradient_accumulation_steps == 0 {
            errors.push("gradient_accumulation_steps must be greater than 0".to_string());
        }

        if self.num_train_examples < self.train_batch_size {
            errors.push(
                "num_train_examples must be at least one full batch".to_string(),
            );
        }

        if !(0.0..=1.0).contains(&self.warmup_proportion) {
            errors.push("warmup_proportion must be in [0, 1]".to_string());
        }

        if self.experiment_name.is_empty() {
            errors.push("experiment_name must not be empty".to_string());
        }

        if self.output_dir.as_os_str().is_empty() {
            errors.push("output_dir must not be empty".to_string());
        }

        if self.device.is_empty() {
            errors.push("device must not be empty".to_string());
        }

        if !(0.0 < self.optimizer.beta1 && self.optimizer.beta1 < 1.0) {
            errors.push("optimizer.beta1 must be in (0, 1)".to_string());
        }

        if !(0.0 < self.optimizer.beta2 && self.optimizer.beta2 < 1.0) {
            errors.push("optimizer.beta2 must be in (0, 1)".to_string());
        }

        if self.optimizer.weight_decay < 0.0 {
            errors.push("optimizer.weight_decay must be >= 0".to_string());
        }

        if self.optimizer.epsilon <= 0.0 {
            errors.push("optimizer.epsilon must be greater than 0".to_string());
        }

        if self.model.vocab_size == 0 {
            errors.push("model.vocab_size must be greater than 0".to_string());
        }

        if self.model.embedding_size == 0 {
            errors.push("model.embedding_size must be greater than 0".to_string());
        }

        if self.model.num_labels == 0 {
            errors.push("model.num_labels must be greater than 0".to_string());
        }

        if self.model.max_sequence_length == 0 {
            errors.push("model.max_sequence_length must be greater than 0".to_string());
        }

        if !errors.is_empty() {
            return Err(TrainingError::validation(errors));
        }

        Ok(())
    }

    /// Total optimizer steps across the whole run:
    /// `floor(num_train_examples / train_batch_size /
    /// gradient_accumulation_steps) * epochs`.
    pub fn total_optimization_steps(&self) -> usize {
        self.num_train_examples / self.train_batch_size / self.gradient_accumulation_steps
            * self.epochs
    }

    /// Warmup length in steps. Kept fractional: a 10% warmup over 20 steps is
    /// exactly 2.0 steps, not 2.
    pub fn warmup_steps(&self) -> f64 {
        self.total_optimization_steps() as f64 * self.warmup_proportion
    }

    pub fn experiment_dir(&self) -> PathBuf {
        self.output_dir.join(&self.experiment_name)
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.experiment_dir().join("checkpoints")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierVariant {
    Pretrained,
    RandomInit,
    FullyConnected,
}

impl Default for ClassifierVariant {
    fn default() -> Self {
        Self::Pretrained
    }
}

/// Architecture knobs for the from-scratch variants; the encoder variants
/// read theirs from the pretrained directory instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOverrides {
    #[serde(default = "default_vocab_size")]
    pub vocab_size: usize,
    #[serde(default = "default_embedding_size")]
    pub embedding_size: usize,
    #[serde(default = "default_num_labels")]
    pub num_labels: usize,
    #[serde(default = "default_max_sequence_length")]
    pub max_sequence_length: usize,
}

impl Default for ModelOverrides {
    fn default() -> Self {
        Self {
            vocab_size: default_vocab_size(),
            embedding_size: default_embedding_size(),
            num_labels: default_num_labels(),
            max_sequence_length: default_max_sequence_length(),
        }
    }
}

/// Adam hyperparameters. `correct_bias` defaults off to reproduce the
/// BertAdam-style update the encoder variants were tuned with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerSettings {
    #[serde(default)]
    pub weight_decay: f64,
    #[serde(default = "default_beta1")]
    pub beta1: f64,
    #[serde(default = "default_beta2")]
    pub beta2: f64,
    #[serde(default = "default_adam_eps")]
    pub epsilon: f64,
    #[serde(default)]
    pub correct_bias: bool,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            weight_decay: 0.0,
            beta1: default_beta1(),
            beta2: default_beta2(),
            epsilon: default_adam_eps(),
            correct_bias: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub enable_stdout: bool,
    #[serde(default = "default_true")]
    pub batch_loss_csv: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_stdout: true,
            batch_loss_csv: true,
        }
    }
}

fn default_vocab_size() -> usize {
    30_522
}

fn default_embedding_size() -> usize {
    128
}

fn default_num_labels() -> usize {
    2
}

fn default_max_sequence_length() -> usize {
    128
}

fn default_beta1() -> f64 {
    0.9
}

fn default_beta2() -> f64 {
    0.999
}

fn default_adam_eps() -> f64 {
    1e-6
}

fn default_true() -> bool {
    true
}

#[derive(Debug)]
pub enum TrainingError {
    Io(std::io::Error),
    ConfigFormat(String),
    Validation(Vec<String>),
    Initialization(String),
    Runtime(String),
}

impl TrainingError {
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization(message.into())
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    pub fn validation(messages: Vec<String>) -> Self {
        Self::Validation(messages)
    }
}

impl fmt::Display for TrainingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingError::Io(err) => write!(f, "failed to read config: {}", err),
            TrainingError::ConfigFormat(err) => write!(f, "failed to parse config: {}", err),
            TrainingError::Validation(messages) => {
                write!(f, "invalid configuration: {}", messages.join("; "))
            }
            TrainingError::Initialization(msg) => {
                write!(f, "classifier initialization failed: {}", msg)
            }
            TrainingError::Runtime(msg) => write!(f, "training failed: {}", msg),
        }
    }
}

impl std::error::Error for TrainingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrainingError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TrainingError {
    fn from(value: std::io::Error) -> Self {
        TrainingError::Io(value)
    }
}

impl From<toml::de::Error> for TrainingError {
    fn from(value: toml::de::Error) -> Self {
        TrainingError::ConfigFormat(value.to_string())
    }
}

impl From<serde_json::Error> for TrainingError {
    fn from(value: serde_json::Error) -> Self {
        TrainingError::ConfigFormat(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> TrainingConfig {
        TrainingConfig {
            pretrained_model: PathBuf::from("pretrained"),
            learning_rate: 5e-5,
            num_train_examples: 100,
            train_batch_size: 10,
            gradient_accumulation_steps: 1,
            epochs: 2,
            warmup_proportion: 0.1,
            output_dir: PathBuf::from("out"),
            experiment_name: "exp".to_string(),
            device: "cpu".to_string(),
            load_from_checkpoint: None,
            variant: ClassifierVariant::default(),
            model: ModelOverrides::default(),
            optimizer: OptimizerSettings::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn step_arithmetic_matches_documented_scenario() {
        let config = base_config();
        assert_eq!(config.total_optimization_steps(), 20);
        assert!((config.warmup_steps() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn step_count_floors_partial_batches() {
        let mut config = base_config();
        config.num_train_examples = 105;
        config.train_batch_size = 10;
        config.gradient_accumulation_steps = 2;
        config.epochs = 3;
        // floor(105 / 10 / 2) * 3 = 5 * 3
        assert_eq!(config.total_optimization_steps(), 15);
    }

    #[test]
    fn missing_required_key_fails_to_parse() {
        let toml_without_lr = r#"
            pretrained_model = "pretrained"
            num_train_examples = 100
            train_batch_size = 10
            gradient_accumulation_steps = 1
            epochs = 2
            warmup_proportion = 0.1
            output_dir = "out"
            experiment_name = "exp"
            device = "cpu"
        "#;
        assert!(toml::from_str::<TrainingConfig>(toml_without_lr).is_err());
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut config = base_config();
        config.learning_rate = 0.0;
        config.train_batch_size = 0;
        config.experiment_name.clear();
        match config.validate() {
            Err(TrainingError::Validation(messages)) => assert!(messages.len() >= 3),
            other => panic!("expected validation failure, got {:?}", other.err()),
        }
    }

    #[test]
    fn checkpoint_paths_nest_under_experiment() {
        let config = base_config();
        assert_eq!(
            config.checkpoints_dir(),
            PathBuf::from("out").join("exp").join("checkpoints")
        );
    }
}
