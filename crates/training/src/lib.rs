//! Training lifecycle for the note classifiers: configuration, device
//! selection, the optimizer and warmup schedule, epoch-keyed checkpointing,
//! and the epoch loop itself.

pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod data;
pub mod device;
pub mod logging;
pub mod metrics;
pub mod optimizer;
pub mod scheduler;
pub mod trainer;

pub use classifier::TrainableClassifier;
pub use config::{ClassifierVariant, TrainingConfig, TrainingError};
pub use trainer::Trainer;
