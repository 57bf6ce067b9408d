//! Experience batch read by the SAC update.
//!
//! An [`AgentBuffer`] stores per-step rows under named fields. Steps are
//! grouped into sequences of a fixed length, consecutive in the buffer, so
//! row `i * sequence_length` is the first step of sequence `i`.
//!
//! Field names used by [`SacOptimizer`](crate::SacOptimizer):
//!
//! | key                     | row width                               |
//! |-------------------------|-----------------------------------------|
//! | `<stream>_rewards`      | 1                                       |
//! | `vector_obs`            | sum of vector observation sizes         |
//! | `next_vector_in`        | sum of vector observation sizes         |
//! | `visual_obs<i>`         | `c * h * w` of camera `i`               |
//! | `next_visual_obs<i>`    | `c * h * w` of camera `i`               |
//! | `actions`               | action dim, or number of branches       |
//! | `action_mask`           | sum of branch sizes (discrete only)     |
//! | `memory`                | memory size (recurrent policies only)   |
//! | `masks`                 | 1                                       |
//! | `done`                  | 1                                       |
use crate::SacError;
use anyhow::{ensure, Result};
use candle_core::{Device, Tensor};
use std::collections::HashMap;

/// Vector observations at step `t`.
pub const VECTOR_OBS: &str = "vector_obs";
/// Vector observations at step `t + 1`.
pub const NEXT_VECTOR_OBS: &str = "next_vector_in";
/// Actions taken at step `t`.
pub const ACTIONS: &str = "actions";
/// Masks of available discrete actions.
pub const ACTION_MASK: &str = "action_mask";
/// Recurrent memories of the policy.
pub const MEMORY: &str = "memory";
/// Loss masks, zero on padded steps.
pub const MASKS: &str = "masks";
/// Termination flags.
pub const DONE: &str = "done";

/// Key of the rewards of a reward stream.
pub fn rewards_key(stream: &str) -> String {
    format!("{}_rewards", stream)
}

/// Key of the observations of camera `ix` at step `t`.
pub fn visual_obs_key(ix: usize) -> String {
    format!("visual_obs{}", ix)
}

/// Key of the observations of camera `ix` at step `t + 1`.
pub fn next_visual_obs_key(ix: usize) -> String {
    format!("next_visual_obs{}", ix)
}

/// Keyed collection of per-step rows.
#[derive(Debug, Clone, Default)]
pub struct AgentBuffer {
    fields: HashMap<String, Vec<Vec<f32>>>,
}

impl AgentBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rows of a field, replacing existing rows.
    pub fn insert(&mut self, key: impl Into<String>, rows: Vec<Vec<f32>>) {
        self.fields.insert(key.into(), rows);
    }

    /// Sets a field whose rows hold a single value.
    pub fn insert_scalars(&mut self, key: impl Into<String>, values: &[f32]) {
        self.insert(key, values.iter().map(|v| vec![*v]).collect());
    }

    /// Appends a row to a field.
    pub fn append(&mut self, key: impl Into<String>, row: Vec<f32>) {
        self.fields.entry(key.into()).or_default().push(row);
    }

    /// Returns `true` if the field exists and is not empty.
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.get(key).map_or(false, |rows| !rows.is_empty())
    }

    /// Returns the rows of a field.
    pub fn get(&self, key: &str) -> Result<&[Vec<f32>]> {
        match self.fields.get(key) {
            Some(rows) => Ok(rows),
            None => Err(SacError::MissingBatchKey(key.to_string()).into()),
        }
    }

    /// Number of steps, taken from the longest field.
    pub fn len(&self) -> usize {
        self.fields.values().map(Vec::len).max().unwrap_or(0)
    }

    /// Returns `true` if no field holds a row.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a field as a tensor of shape `[n_rows, row_width]`.
    pub fn tensor(&self, key: &str, device: &Device) -> Result<Tensor> {
        rows_to_tensor(key, self.get(key)?, device)
    }

    /// Returns a field of width 1 as a tensor of shape `[n_rows]`.
    pub fn scalar_tensor(&self, key: &str, device: &Device) -> Result<Tensor> {
        let t = self.tensor(key, device)?;
        ensure!(
            t.dim(1)? == 1,
            "Field {} has rows of width {}, expected 1",
            key,
            t.dim(1)?
        );
        Ok(t.squeeze(1)?)
    }

    /// Returns every `stride`-th row of a field, starting at the first one.
    ///
    /// Used to take the memory at the start of each sequence.
    pub fn strided_tensor(&self, key: &str, stride: usize, device: &Device) -> Result<Tensor> {
        ensure!(stride > 0, "Stride must be positive");
        let rows: Vec<Vec<f32>> = self.get(key)?.iter().step_by(stride).cloned().collect();
        rows_to_tensor(key, &rows, device)
    }
}

fn rows_to_tensor(key: &str, rows: &[Vec<f32>], device: &Device) -> Result<Tensor> {
    ensure!(!rows.is_empty(), "Field {} is empty", key);
    let width = rows[0].len();
    ensure!(
        rows.iter().all(|row| row.len() == width),
        "Field {} has rows of different widths",
        key
    );
    let data: Vec<f32> = rows.iter().flatten().copied().collect();
    Ok(Tensor::from_vec(data, (rows.len(), width), device)?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_missing_key() {
        let buffer = AgentBuffer::new();
        let err = buffer.tensor("extrinsic_rewards", &Device::Cpu).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SacError>(),
            Some(&SacError::MissingBatchKey("extrinsic_rewards".to_string()))
        );
    }

    #[test]
    fn test_tensors() -> Result<()> {
        let mut buffer = AgentBuffer::new();
        buffer.insert_scalars(rewards_key("extrinsic"), &[1.0, 2.0, 3.0, 4.0]);
        for i in 0..4 {
            buffer.append(VECTOR_OBS, vec![i as f32, 10.0 * i as f32]);
            buffer.append(MEMORY, vec![i as f32; 3]);
        }

        let r = buffer.scalar_tensor("extrinsic_rewards", &Device::Cpu)?;
        assert_eq!(r.to_vec1::<f32>()?, vec![1.0, 2.0, 3.0, 4.0]);

        let obs = buffer.tensor(VECTOR_OBS, &Device::Cpu)?;
        assert_eq!(obs.dims(), &[4, 2]);
        assert!(buffer.scalar_tensor(VECTOR_OBS, &Device::Cpu).is_err());

        // Memory at the start of sequences of length 2
        let mem = buffer.strided_tensor(MEMORY, 2, &Device::Cpu)?;
        assert_eq!(
            mem.to_vec2::<f32>()?,
            vec![vec![0.0, 0.0, 0.0], vec![2.0, 2.0, 2.0]]
        );
        assert_eq!(buffer.len(), 4);

        Ok(())
    }
}
