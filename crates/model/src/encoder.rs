use candle_core::{DType, Error, Result, Tensor, D};
use candle_nn::{
    embedding, layer_norm, linear, loss, ops, Dropout, Embedding, LayerNorm, LayerNormConfig,
    Linear, Module, VarBuilder,
};

use crate::{ClassifierOutput, EncoderConfig, SequenceClassifier};

/// Bidirectional transformer encoder with a pooled classification head.
///
/// The parameter layout (`embeddings.*`, `encoder.layer.N.*`, `pooler`,
/// `classifier`) is stable so pretrained safetensors files map one-to-one
/// onto a freshly constructed instance.
pub struct EncoderClassifier {
    config: EncoderConfig,
    embeddings: Embeddings,
    layers: Vec<EncoderLayer>,
    pooler: Linear,
    classifier: Linear,
    dropout: Dropout,
    training: bool,
}

impl EncoderClassifier {
    pub fn new(config: EncoderConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;

        let embeddings = Embeddings::new(&config, vb.pp("embeddings"))?;
        let encoder_vb = vb.pp("encoder").pp("layer");
        let mut layers = Vec::with_capacity(config.num_layers);
        for index in 0..config.num_layers {
            layers.push(EncoderLayer::new(&config, encoder_vb.pp(index))?);
        }
        let pooler = linear(config.hidden_size, config.hidden_size, vb.pp("pooler"))?;
        let classifier = linear(config.hidden_size, config.num_labels, vb.pp("classifier"))?;
        let dropout = Dropout::new(config.hidden_dropout);

        Ok(Self {
            config,
            embeddings,
            layers,
            pooler,
            classifier,
            dropout,
            training: false,
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    fn pooled_output(&self, input_ids: &Tensor) -> Result<Tensor> {
        let dims = input_ids.dims();
        if dims.len() != 2 {
            return Err(Error::Msg(format!(
                "encoder expects input ids shaped [batch, seq], got {:?}",
                dims
            )));
        }
        let seq_len = dims[1];
        if seq_len == 0 || seq_len > self.config.max_position_embeddings {
            return Err(Error::Msg(format!(
                "sequence length {} outside supported range 1..={}",
                seq_len, self.config.max_position_embeddings
            )));
        }

        let mut hidden = self.embeddings.forward(input_ids, self.training)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, self.training)?;
        }

        // First-token pooling, tanh activated.
        let first_token = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        self.pooler.forward(&first_token)?.tanh()
    }
}

impl SequenceClassifier for EncoderClassifier {
    fn forward(&self, input_ids: &Tensor, labels: Option<&Tensor>) -> Result<ClassifierOutput> {
        let pooled = self.pooled_output(input_ids)?;
        let pooled = self.dropout.forward(&pooled, self.training)?;
        let logits = self.classifier.forward(&pooled)?;

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

struct Embeddings {
    word_embeddings: Embedding,
    position_embeddings: Embedding,
    norm: LayerNorm,
    dropout: Dropout,
}

impl Embeddings {
    fn new(config: &EncoderConfig, vb: VarBuilder) -> Result<Self> {
        let word_embeddings = embedding(
            config.vocab_size,
            config.hidden_size,
            vb.pp("word_embeddings"),
        )?;
        let position_embeddings = embedding(
            config.max_position_embeddings,
            config.hidden_size,
            vb.pp("position_embeddings"),
        )?;
        let norm = layer_norm(
            config.hidden_size,
            LayerNormConfig {
                eps: config.layer_norm_eps,
                ..Default::default()
            },
            vb.pp("layer_norm"),
        )?;
        Ok(Self {
            word_embeddings,
            position_embeddings,
            norm,
            dropout: Dropout::new(config.hidden_dropout),
        })
    }

    fn forward(&self, input_ids: &Tensor, training: bool) -> Result<Tensor> {
        let (_, seq_len) = input_ids.dims2()?;
        let positions = Tensor::arange(0u32, seq_len as u32, input_ids.device())?.unsqueeze(0)?;

        let tokens = self.word_embeddings.forward(input_ids)?;
        let positions = self.position_embeddings.forward(&positions)?;
        let summed = tokens.broadcast_add(&positions)?;
        let normalized = self.norm.forward(&summed)?;
        self.dropout.forward(&normalized, training)
    }
}

struct EncoderLayer {
    attention: SelfAttention,
    attention_norm: LayerNorm,
    ff_in: Linear,
    ff_out: Linear,
    ff_norm: LayerNorm,
    dropout: Dropout,
}

impl EncoderLayer {
    fn new(config: &EncoderConfig, vb: VarBuilder) -> Result<Self> {
        let norm_cfg = LayerNormConfig {
            eps: config.layer_norm_eps,
            ..Default::default()
        };
        Ok(Self {
            attention: SelfAttention::new(config, vb.pp("attention"))?,
            attention_norm: layer_norm(config.hidden_size, norm_cfg, vb.pp("attention_norm"))?,
            ff_in: linear(
                config.hidden_size,
                config.intermediate_size,
                vb.pp("ff_in"),
            )?,
            ff_out: linear(
                config.intermediate_size,
                config.hidden_size,
                vb.pp("ff_out"),
            )?,
            ff_norm: layer_norm(config.hidden_size, norm_cfg, vb.pp("ff_norm"))?,
            dropout: Dropout::new(config.hidden_dropout),
        })
    }

    fn forward(&self, hidden: &Tensor, training: bool) -> Result<Tensor> {
        let attended = self.attention.forward(hidden)?;
        let attended = self.dropout.forward(&attended, training)?;
        let hidden = self.attention_norm.forward(&(hidden + attended)?)?;

        let transformed = self.ff_in.forward(&hidden)?.gelu()?;
        let transformed = self.ff_out.forward(&transformed)?;
        let transformed = self.dropout.forward(&transformed, training)?;
        self.ff_norm.forward(&(&hidden + transformed)?)
    }
}

struct SelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    output: Linear,
    num_heads: usize,
    head_dim: usize,
    scale: f64,
}

impl SelfAttention {
    fn new(config: &EncoderConfig, vb: VarBuilder) -> Result<Self> {
        let hidden = config.hidden_size;
        let head_dim = config.head_dim();
        Ok(Self {
            query: linear(hidden, hidden, vb.pp("query"))?,
            key: linear(hidden, hidden, vb.pp("key"))?,
            value: linear(hidden, hidden, vb.pp("value"))?,
            output: linear(hidden, hidden, vb.pp("output"))?,
            num_heads: config.num_attention_heads,
            head_dim,
            scale: 1.0 / (head_dim as f64).sqrt(),
        })
    }

    fn forward(&self, hidden: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, hidden_size) = hidden.dims3()?;

        let q = self.split_heads(&self.query.forward(hidden)?, batch, seq_len)?;
        let k = self.split_heads(&self.key.forward(hidden)?, batch, seq_len)?;
        let v = self.split_heads(&self.value.forward(hidden)?, batch, seq_len)?;

        // No mask: the encoder attends bidirectionally over the full sequence.
        let scores = (q.matmul(&k.t()?)? * self.scale)?;
        let weights = ops::softmax(&scores, D::Minus1)?;
        let context = weights.matmul(&v)?;

        let context = context
            .transpose(1, 2)?
            .reshape((batch, seq_len, hidden_size))?;
        self.output.forward(&context)
    }

    fn split_heads(&self, tensor: &Tensor, batch: usize, seq_len: usize) -> Result<Tensor> {
        tensor
            .reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }
}
