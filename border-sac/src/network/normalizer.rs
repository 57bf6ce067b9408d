//! Running normalization of vector observations.
use anyhow::{ensure, Result};
use candle_core::{DType, Device, Tensor};

/// Bound of normalized observations.
const CLIP: f64 = 5.0;

/// Running mean and variance of a vector observation.
///
/// The statistics are not trainable. They change only through
/// [`Normalizer::update`] on the policy side, and are copied into critics with
/// [`Normalizer::copy_from`] so that all networks see identically scaled inputs.
#[derive(Debug, Clone)]
pub struct Normalizer {
    size: usize,
    steps: f64,
    running_mean: Tensor,
    running_variance: Tensor,
}

impl Normalizer {
    /// Creates a normalizer with zero mean and unit variance.
    pub fn new(size: usize, device: &Device) -> Result<Self> {
        Ok(Self {
            size,
            steps: 1.0,
            running_mean: Tensor::zeros(size, DType::F32, device)?,
            running_variance: Tensor::ones(size, DType::F32, device)?,
        })
    }

    /// Normalizes `xs` of shape `[batch_size, size]`, clipped to `[-5, 5]`.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let std = (&self.running_variance / self.steps)?.sqrt()?;
        Ok(xs
            .broadcast_sub(&self.running_mean)?
            .broadcast_div(&std)?
            .clamp(-CLIP, CLIP)?)
    }

    /// Folds a batch of observations into the running statistics.
    pub fn update(&mut self, xs: &Tensor) -> Result<()> {
        let xs = xs.detach();
        ensure!(
            xs.dim(1)? == self.size,
            "Observation size {} does not match normalizer size {}",
            xs.dim(1)?,
            self.size
        );
        let total_steps = self.steps + xs.dim(0)? as f64;
        let to_old_mean = xs.broadcast_sub(&self.running_mean)?;
        let new_mean = (&self.running_mean + (to_old_mean.sum(0)? / total_steps)?)?;
        let to_new_mean = xs.broadcast_sub(&new_mean)?;
        let new_variance = (&self.running_variance + (to_new_mean * to_old_mean)?.sum(0)?)?;

        self.running_mean = new_mean;
        self.running_variance = new_variance;
        self.steps = total_steps;
        Ok(())
    }

    /// Overwrites the statistics with those of `other`.
    pub fn copy_from(&mut self, other: &Normalizer) -> Result<()> {
        ensure!(
            self.size == other.size,
            "Cannot copy normalizer of size {} into size {}",
            other.size,
            self.size
        );
        self.steps = other.steps;
        self.running_mean = other.running_mean.copy()?;
        self.running_variance = other.running_variance.copy()?;
        Ok(())
    }

    /// Number of observations seen, starting from 1.
    pub fn steps(&self) -> f64 {
        self.steps
    }

    /// Running mean.
    pub fn mean(&self) -> &Tensor {
        &self.running_mean
    }
}
