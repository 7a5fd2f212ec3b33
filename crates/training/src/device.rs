use candle_core::Device;

use crate::config::TrainingError;

/// Resolve a device string from the config. Accepts `cpu`, `cuda`,
/// `cuda:<ordinal>`, and `metal`.
pub fn select_device(spec: &str) -> Result<Device, TrainingError> {
    match spec {
        "cpu" => Ok(Device::Cpu),
        "cuda" => Device::new_cuda(0)
            .map_err(|err| TrainingError::initialization(format!("cuda unavailable: {}", err))),
        "metal" => Device::new_metal(0)
            .map_err(|err| TrainingError::initialization(format!("metal unavailable: {}", err))),
        other => {
            if let Some(ordinal) = other.strip_prefix("cuda:") {
                let ordinal: usize = ordinal.parse().map_err(|_| {
                    TrainingError::initialization(format!("bad cuda ordinal in '{}'", other))
                })?;
                Device::new_cuda(ordinal).map_err(|err| {
                    TrainingError::initialization(format!("cuda:{} unavailable: {}", ordinal, err))
                })
            } else {
                Err(TrainingError::initialization(format!(
                    "unknown device '{}'",
                    other
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_is_always_available() {
        assert!(matches!(select_device("cpu"), Ok(Device::Cpu)));
    }

    #[test]
    fn unknown_device_is_rejected() {
        assert!(select_device("tpu").is_err());
        assert!(select_device("cuda:x").is_err());
    }
}
