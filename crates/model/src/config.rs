use std::{fs, path::Path};

use candle_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Hyperparameters for the transformer encoder classifier. Pretrained model
/// directories carry these as a `config.json` next to the weight file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub max_position_embeddings: usize,
    #[serde(default = "default_num_labels")]
    pub num_labels: usize,
    #[serde(default = "default_hidden_dropout")]
    pub hidden_dropout: f32,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
}

impl EncoderConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| {
            Error::Msg(format!(
                "failed to read encoder config {}: {err}",
                path.display()
            ))
        })?;
        let config: EncoderConfig = serde_json::from_str(&contents).map_err(|err| {
            Error::Msg(format!(
                "failed to parse encoder config {}: {err}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants before any tensor is allocated.
    pub fn validate(&self) -> Result<()> {
        if self.vocab_size == 0 {
            return Err(Error::Msg("vocab_size must be greater than zero".into()));
        }
        if self.hidden_size == 0 {
            return Err(Error::Msg("hidden_size must be greater than zero".into()));
        }
        if self.num_layers == 0 {
            return Err(Error::Msg("num_layers must be greater than zero".into()));
        }
        if self.num_attention_heads == 0 {
            return Err(Error::Msg(
                "num_attention_heads must be greater than zero".into(),
            ));
        }
        if self.hidden_size % self.num_attention_heads != 0 {
            return Err(Error::Msg(format!(
                "hidden_size ({}) must be divisible by num_attention_heads ({})",
                self.hidden_size, self.num_attention_heads
            )));
        }
        if self.intermediate_size == 0 {
            return Err(Error::Msg(
                "intermediate_size must be greater than zero".into(),
            ));
        }
        if self.max_position_embeddings == 0 {
            return Err(Error::Msg(
                "max_position_embeddings must be greater than zero".into(),
            ));
        }
        if self.num_labels == 0 {
            return Err(Error::Msg("num_labels must be greater than zero".into()));
        }
        if !(0.0..1.0).contains(&self.hidden_dropout) {
            return Err(Error::Msg("hidden_dropout must be in [0, 1)".into()));
        }
        Ok(())
    }

    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }
}

fn default_num_labels() -> usize {
    2
}

fn default_hidden_dropout() -> f32 {
    0.1
}

fn default_layer_norm_eps() -> f64 {
    1e-12
}
