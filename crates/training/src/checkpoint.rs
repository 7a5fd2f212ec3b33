use std::{
    fs,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    config::TrainingError,
    optimizer::{AdamW, OptimizerState},
    scheduler::{LRScheduler, SchedulerState},
};

pub const MANIFEST_VERSION: u32 = 1;

pub const MODEL_FILE: &str = "model.safetensors";
pub const OPTIMIZER_FILE: &str = "optimizer.json";
pub const SCHEDULER_FILE: &str = "scheduler.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Integrity record for one file inside a checkpoint directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// `manifest.json`, written last so a complete manifest implies a complete
/// checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub created_unix_secs: u64,
    /// Epoch to resume from. One past the epoch counter the checkpoint
    /// directory is named after.
    pub epoch: usize,
    pub config_sha256: String,
    pub files: Vec<FileRecord>,
}

/// Write a full checkpoint into `dir`, creating it if needed. Saving twice
/// into the same directory overwrites in place.
pub fn save_checkpoint(
    dir: &Path,
    epoch: usize,
    varmap: &VarMap,
    optimizer: &AdamW,
    scheduler: Option<&dyn LRScheduler>,
    config_sha256: &str,
) -> Result<Manifest, TrainingError> {
    fs::create_dir_all(dir)?;

    let model_path = dir.join(MODEL_FILE);
    varmap
        .save(&model_path)
        .map_err(|err| TrainingError::runtime(format!("failed to save model weights: {}", err)))?;

    let optimizer_state = optimizer
        .state()
        .map_err(|err| TrainingError::runtime(format!("failed to snapshot optimizer: {}", err)))?;
    let optimizer_path = dir.join(OPTIMIZER_FILE);
    fs::write(&optimizer_path, serde_json::to_string_pretty(&optimizer_state)?)?;

    let mut files = vec![record_for(dir, MODEL_FILE)?, record_for(dir, OPTIMIZER_FILE)?];

    if let Some(scheduler) = scheduler {
        let scheduler_path = dir.join(SCHEDULER_FILE);
        fs::write(
            &scheduler_path,
            serde_json::to_string_pretty(&scheduler.snapshot())?,
        )?;
        files.push(record_for(dir, SCHEDULER_FILE)?);
    }

    let manifest = Manifest {
        version: MANIFEST_VERSION,
        created_unix_secs: unix_now(),
        epoch,
        config_sha256: config_sha256.to_string(),
        files,
    };
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?)?;
    Ok(manifest)
}

/// Restore model weights, optimizer state, and (when present) scheduler
/// progress from `dir`. Every file named by the manifest is checksummed
/// before anything is loaded.
pub fn load_checkpoint(
    dir: &Path,
    varmap: &mut VarMap,
    optimizer: &mut AdamW,
    scheduler: Option<&mut dyn LRScheduler>,
) -> Result<Manifest, TrainingError> {
    let manifest = read_manifest(dir)?;
    verify_files(dir, &manifest)?;

    varmap
        .load(dir.join(MODEL_FILE))
        .map_err(|err| TrainingError::runtime(format!("failed to load model weights: {}", err)))?;

    let optimizer_state: OptimizerState =
        serde_json::from_str(&fs::read_to_string(dir.join(OPTIMIZER_FILE))?)?;
    optimizer
        .load_state(&optimizer_state)
        .map_err(|err| TrainingError::runtime(format!("failed to load optimizer: {}", err)))?;

    if let Some(scheduler) = scheduler {
        let scheduler_path = dir.join(SCHEDULER_FILE);
        if scheduler_path.exists() {
            let state: SchedulerState =
                serde_json::from_str(&fs::read_to_string(scheduler_path)?)?;
            scheduler.load_snapshot(&state);
        }
    }

    Ok(manifest)
}

pub fn read_manifest(dir: &Path) -> Result<Manifest, TrainingError> {
    let path = dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Err(TrainingError::runtime(format!(
            "no checkpoint manifest at {}",
            path.display()
        )));
    }
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn verify_files(dir: &Path, manifest: &Manifest) -> Result<(), TrainingError> {
    if manifest.version != MANIFEST_VERSION {
        return Err(TrainingError::runtime(format!(
            "unsupported checkpoint version {}",
            manifest.version
        )));
    }
    for record in &manifest.files {
        let path = dir.join(&record.path);
        let digest = sha256_file(&path)?;
        if digest != record.sha256 {
            return Err(TrainingError::runtime(format!(
                "checksum mismatch for {}: expected {}, found {}",
                record.path, record.sha256, digest
            )));
        }
    }
    Ok(())
}

fn record_for(dir: &Path, name: &str) -> Result<FileRecord, TrainingError> {
    let path = dir.join(name);
    Ok(FileRecord {
        path: name.to_string(),
        sha256: sha256_file(&path)?,
        bytes: fs::metadata(&path)?.len(),
    })
}

pub fn sha256_file(path: &Path) -> Result<String, TrainingError> {
    Ok(sha256_bytes(&fs::read(path)?))
}

pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_stable() {
        assert_eq!(
            sha256_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
