use std::path::PathBuf;

use clap::Parser;

use training::{
    classifier::{fully_connected, pretrained, random_init, TrainableClassifier},
    config::{ClassifierVariant, TrainingConfig, TrainingError},
    data::InMemoryDataset,
    logging::Logger,
    trainer::Trainer,
};

#[derive(Debug, Parser)]
#[command(name = "train", about = "Train a note classifier from a config file")]
struct Args {
    /// Path to the training config (TOML or JSON).
    #[arg(long)]
    config: PathBuf,

    /// Training set as CSV lines of `label,tok tok ...`. Without it a
    /// synthetic dataset of `num_train_examples` is generated.
    #[arg(long)]
    train_data: Option<PathBuf>,

    /// Optional held-out set, evaluated once after training.
    #[arg(long)]
    eval_data: Option<PathBuf>,

    /// Seed for the synthetic dataset.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() {
    if let Err(err) = run(Args::parse()) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), TrainingError> {
    let config = TrainingConfig::from_path(&args.config)?;

    let sequence_length = config.model.max_sequence_length;
    let train_set = match args.train_data.as_deref() {
        Some(path) => InMemoryDataset::from_csv(path, sequence_length)?,
        None => InMemoryDataset::synthetic(
            config.num_train_examples,
            sequence_length,
            config.model.vocab_size,
            config.model.num_labels,
            args.seed,
        ),
    };
    let eval_set = match args.eval_data.as_deref() {
        Some(path) => Some(InMemoryDataset::from_csv(path, sequence_length)?),
        None => None,
    };

    let logger = Logger::new(&config.experiment_dir(), &config.logging)?;
    match config.variant {
        ClassifierVariant::Pretrained => {
            let classifier = pretrained::build(&config)?;
            drive(classifier, config, logger, &train_set, eval_set.as_ref())
        }
        ClassifierVariant::RandomInit => {
            let classifier = random_init::build(&config, &logger)?;
            drive(classifier, config, logger, &train_set, eval_set.as_ref())
        }
        ClassifierVariant::FullyConnected => {
            let classifier = fully_connected::build(&config)?;
            drive(classifier, config, logger, &train_set, eval_set.as_ref())
        }
    }
}

fn drive<C: TrainableClassifier>(
    classifier: C,
    config: TrainingConfig,
    logger: Logger,
    train_set: &InMemoryDataset,
    eval_set: Option<&InMemoryDataset>,
) -> Result<(), TrainingError> {
    let mut trainer = Trainer::new(classifier, config, logger)?;
    trainer.train(train_set)?;

    if let Some(eval_set) = eval_set {
        let summary = trainer.evaluate(eval_set)?;
        println!(
            "eval: loss {:.4}, accuracy {:.2}% over {} examples",
            summary.mean_loss,
            summary.accuracy * 100.0,
            summary.examples
        );
    }
    Ok(())
}
