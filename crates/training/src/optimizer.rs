use std::collections::HashMap;

use candle_core::{backprop::GradStore, DType, Device, Result, Tensor, Var};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};

use crate::config::OptimizerSettings;

/// One trainable tensor together with its Adam moment estimates.
struct ParameterSlot {
    name: String,
    var: Var,
    exp_avg: Tensor,
    exp_avg_sq: Tensor,
}

/// Adam with decoupled weight decay. With `correct_bias` off the update skips
/// the bias-correction terms, matching the BertAdam-style rule the encoder
/// classifiers expect; with it on this is standard Adam.
pub struct AdamW {
    slots: Vec<ParameterSlot>,
    learning_rate: f64,
    settings: OptimizerSettings,
    steps: usize,
}

impl AdamW {
    pub fn new(varmap: &VarMap, learning_rate: f64, settings: OptimizerSettings) -> Result<Self> {
        let slots = named_parameters(varmap)
            .into_iter()
            .map(|(name, var)| {
                let zeros = Tensor::zeros(var.shape(), DType::F32, var.device())?;
                Ok(ParameterSlot {
                    name,
                    exp_avg: zeros.clone(),
                    exp_avg_sq: zeros,
                    var,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            slots,
            learning_rate,
            settings,
            steps: 0,
        })
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    pub fn steps_taken(&self) -> usize {
        self.steps
    }

    /// Apply one update, consuming the gradient of every tracked parameter
    /// from the store. Parameters without a gradient are left untouched.
    pub fn step(&mut self, grads: &mut GradStore) -> Result<()> {
        self.steps += 1;
        let beta1 = self.settings.beta1;
        let beta2 = self.settings.beta2;

        let step_size = if self.settings.correct_bias {
            let bias1 = 1.0 - beta1.powi(self.steps as i32);
            let bias2 = 1.0 - beta2.powi(self.steps as i32);
            self.learning_rate * bias2.sqrt() / bias1
        } else {
            self.learning_rate
        };

        for slot in self.slots.iter_mut() {
            let grad = match grads.remove(&slot.var) {
                Some(grad) => grad,
                None => continue,
            };

            slot.exp_avg = ((&slot.exp_avg * beta1)? + (&grad * (1.0 - beta1))?)?;
            slot.exp_avg_sq = ((&slot.exp_avg_sq * beta2)? + (grad.sqr()? * (1.0 - beta2))?)?;

            let denom = slot.exp_avg_sq.sqrt()?.affine(1.0, self.settings.epsilon)?;
            let mut update = (&slot.exp_avg / &denom)?;
            if self.settings.weight_decay > 0.0 {
                update = (update + (slot.var.as_tensor() * self.settings.weight_decay)?)?;
            }

            let next = (slot.var.as_tensor() - (update * step_size)?)?;
            slot.var.set(&next)?;
        }
        Ok(())
    }

    /// Move the moment estimates to `device`. Required after restoring a
    /// checkpoint onto an accelerator: the state deserializes onto the CPU.
    pub fn rehome(&mut self, device: &Device) -> Result<()> {
        for slot in self.slots.iter_mut() {
            slot.exp_avg = slot.exp_avg.to_device(device)?;
            slot.exp_avg_sq = slot.exp_avg_sq.to_device(device)?;
        }
        Ok(())
    }

    pub fn state(&self) -> Result<OptimizerState> {
        let slots = self
            .slots
            .iter()
            .map(|slot| {
                Ok(SlotState {
                    name: slot.name.clone(),
                    shape: slot.var.dims().to_vec(),
                    exp_avg: slot.exp_avg.flatten_all()?.to_vec1::<f32>()?,
                    exp_avg_sq: slot.exp_avg_sq.flatten_all()?.to_vec1::<f32>()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(OptimizerState {
            learning_rate: self.learning_rate,
            steps: self.steps,
            settings: self.settings.clone(),
            slots,
        })
    }

    pub fn load_state(&mut self, state: &OptimizerState) -> Result<()> {
        self.learning_rate = state.learning_rate;
        self.steps = state.steps;
        self.settings = state.settings.clone();

        let by_name: HashMap<&str, &SlotState> = state
            .slots
            .iter()
            .map(|slot| (slot.name.as_str(), slot))
            .collect();

        for slot in self.slots.iter_mut() {
            let saved = by_name.get(slot.name.as_str()).ok_or_else(|| {
                candle_core::Error::Msg(format!(
                    "optimizer state has no entry for parameter '{}'",
                    slot.name
                ))
            })?;
            if saved.shape != slot.var.dims() {
                return Err(candle_core::Error::Msg(format!(
                    "optimizer state shape mismatch for '{}': saved {:?}, live {:?}",
                    slot.name,
                    saved.shape,
                    slot.var.dims()
                )));
            }
            let device = slot.var.device();
            slot.exp_avg =
                Tensor::from_vec(saved.exp_avg.clone(), saved.shape.as_slice(), device)?;
            slot.exp_avg_sq =
                Tensor::from_vec(saved.exp_avg_sq.clone(), saved.shape.as_slice(), device)?;
        }
        Ok(())
    }
}

/// Serializable optimizer snapshot written into each checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerState {
    pub learning_rate: f64,
    pub steps: usize,
    pub settings: OptimizerSettings,
    pub slots: Vec<SlotState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotState {
    pub name: String,
    pub shape: Vec<usize>,
    pub exp_avg: Vec<f32>,
    pub exp_avg_sq: Vec<f32>,
}

/// All trainable parameters of a var map, sorted by name so that slot order
/// is stable across runs.
pub fn named_parameters(varmap: &VarMap) -> Vec<(String, Var)> {
    let data = varmap.data().lock().expect("varmap mutex poisoned");
    let mut params: Vec<(String, Var)> = data
        .iter()
        .map(|(name, var)| (name.clone(), var.clone()))
        .collect();
    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}
