use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::Path,
};

use crate::config::{LoggingConfig, TrainingError};

/// Run logger: progress lines on stdout plus a `batch_loss.csv` under the
/// experiment directory with one raw loss value per line.
pub struct Logger {
    stdout: bool,
    batch_loss: Option<File>,
}

impl Logger {
    pub fn new(experiment_dir: &Path, config: &LoggingConfig) -> Result<Self, TrainingError> {
        let batch_loss = if config.batch_loss_csv {
            fs::create_dir_all(experiment_dir)?;
            Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(experiment_dir.join("batch_loss.csv"))?,
            )
        } else {
            None
        };
        Ok(Self {
            stdout: config.enable_stdout,
            batch_loss,
        })
    }

    /// Logger that writes nowhere; handy in tests.
    pub fn disabled() -> Self {
        Self {
            stdout: false,
            batch_loss: None,
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        if self.stdout {
            println!("{}", message.as_ref());
        }
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        if self.stdout {
            eprintln!("warning: {}", message.as_ref());
        }
    }

    pub fn batch_loss(&mut self, loss: f64) -> Result<(), TrainingError> {
        if let Some(file) = self.batch_loss.as_mut() {
            writeln!(file, "{}", loss)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn batch_losses_append_one_per_line() {
        let dir = tempdir().unwrap();
        let config = LoggingConfig {
            enable_stdout: false,
            batch_loss_csv: true,
        };
        let mut logger = Logger::new(dir.path(), &config).unwrap();
        logger.batch_loss(0.5).unwrap();
        logger.batch_loss(0.25).unwrap();
        drop(logger);

        let contents = fs::read_to_string(dir.path().join("batch_loss.csv")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["0.5", "0.25"]);
    }

    #[test]
    fn disabled_logger_writes_nothing() {
        let dir = tempdir().unwrap();
        let config = LoggingConfig {
            enable_stdout: false,
            batch_loss_csv: false,
        };
        let mut logger = Logger::new(dir.path(), &config).unwrap();
        logger.batch_loss(1.0).unwrap();
        assert!(!dir.path().join("batch_loss.csv").exists());
    }
}
