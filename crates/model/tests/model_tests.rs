use std::fs;

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use model::{
    BagOfWordsClassifier, EncoderClassifier, EncoderConfig, FeedForwardNet, SequenceClassifier,
};

fn tiny_encoder_config() -> EncoderConfig {
    EncoderConfig {
        vocab_size: 32,
        hidden_size: 16,
        num_layers: 2,
        num_attention_heads: 4,
        intermediate_size: 32,
        max_position_embeddings: 8,
        num_labels: 2,
        hidden_dropout: 0.0,
        layer_norm_eps: 1e-12,
    }
}

fn token_batch(device: &Device, batch: usize, seq_len: usize) -> Tensor {
    let ids: Vec<u32> = (0..batch * seq_len).map(|i| (i % 32) as u32).collect();
    Tensor::from_vec(ids, (batch, seq_len), device).unwrap()
}

#[test]
fn encoder_produces_label_logits() {
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let encoder = EncoderClassifier::new(tiny_encoder_config(), vb).unwrap();

    let input_ids = token_batch(&device, 3, 6);
    let output = encoder.forward(&input_ids, None).unwrap();

    assert!(output.loss.is_none());
    assert_eq!(output.logits.dims(), &[3, 2]);
}

#[test]
fn encoder_returns_loss_only_with_labels() {
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let encoder = EncoderClassifier::new(tiny_encoder_config(), vb).unwrap();

    let input_ids = token_batch(&device, 4, 5);
    let labels = Tensor::from_vec(vec![0u32, 1, 0, 1], (4,), &device).unwrap();

    let with_labels = encoder.forward(&input_ids, Some(&labels)).unwrap();
    let loss = with_labels.loss.expect("loss expected with labels");
    assert_eq!(loss.dims(), &[] as &[usize]);
    assert!(loss.to_vec0::<f32>().unwrap().is_finite());

    let without_labels = encoder.forward(&input_ids, None).unwrap();
    assert!(without_labels.loss.is_none());
}

#[test]
fn encoder_rejects_overlong_sequences() {
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let encoder = EncoderClassifier::new(tiny_encoder_config(), vb).unwrap();

    // max_position_embeddings is 8; a 9-token sequence must be refused.
    let input_ids = token_batch(&device, 1, 9);
    assert!(encoder.forward(&input_ids, None).is_err());
}

#[test]
fn encoder_config_validation_catches_bad_head_split() {
    let mut config = tiny_encoder_config();
    config.num_attention_heads = 3;
    assert!(config.validate().is_err());

    let mut config = tiny_encoder_config();
    config.vocab_size = 0;
    assert!(config.validate().is_err());
}

#[test]
fn feed_forward_net_classifies_batches() {
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let net = FeedForwardNet::new(32, 8, 2, vb).unwrap();

    let input_ids = token_batch(&device, 2, 4);
    let labels = Tensor::from_vec(vec![1u32, 0], (2,), &device).unwrap();
    let output = net.forward(&input_ids, Some(&labels)).unwrap();

    assert_eq!(output.logits.dims(), &[2, 2]);
    assert!(output.loss.is_some());
}

#[test]
fn bag_of_words_outputs_probabilities() {
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let classifier = BagOfWordsClassifier::new(32, 8, vb).unwrap();

    let input_ids = token_batch(&device, 2, 4);
    let output = classifier.forward(&input_ids, None).unwrap();
    assert_eq!(output.logits.dims(), &[2, 2]);

    let rows = output.logits.to_vec2::<f32>().unwrap();
    for row in rows {
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "softmax rows must sum to 1");
    }
}

#[test]
fn encoder_config_loads_from_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, serde_json::to_string(&tiny_encoder_config()).unwrap()).unwrap();

    let loaded = EncoderConfig::from_file(&path).unwrap();
    assert_eq!(loaded.hidden_size, 16);
    assert_eq!(loaded.num_labels, 2);

    assert!(EncoderConfig::from_file(dir.path().join("missing.json")).is_err());
}

#[test]
fn training_flag_round_trips() {
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let mut encoder = EncoderClassifier::new(tiny_encoder_config(), vb).unwrap();

    assert!(!encoder.is_training());
    encoder.set_training(true);
    assert!(encoder.is_training());
    encoder.set_training(false);
    assert!(!encoder.is_training());
}
