//! Shared trunk of policy and critic networks.
use super::{Normalizer, NetworkSettings, ObservationSpec, SimpleVisualEncoder};
use crate::mlp::{Mlp, MlpConfig};
use anyhow::{ensure, Context, Result};
use candle_core::Tensor;
use candle_nn::VarBuilder;

/// Encodes observations, and optionally actions, into a hidden vector.
///
/// Vector observations pass through their [`Normalizer`] when normalization
/// is enabled, camera observations through a [`SimpleVisualEncoder`] each.
/// The encodings and the action input are concatenated and fed to an MLP with
/// `num_layers` layers of `hidden_units` units.
pub struct NetworkBody {
    normalizers: Vec<Normalizer>,
    vector_sizes: Vec<usize>,
    visual_encoders: Vec<SimpleVisualEncoder>,
    action_size: usize,
    mlp: Mlp,
}

impl NetworkBody {
    /// Builds the body.
    ///
    /// `action_size` is the width of the action input, 0 for bodies without one.
    pub fn build(
        vb: VarBuilder,
        obs_spec: &ObservationSpec,
        settings: &NetworkSettings,
        action_size: usize,
    ) -> Result<Self> {
        ensure!(settings.num_layers > 0, "num_layers must be positive");
        let device = vb.device().clone();
        let h = settings.hidden_units;

        let normalizers = match settings.normalize {
            true => obs_spec
                .vector_sizes
                .iter()
                .map(|size| Normalizer::new(*size, &device))
                .collect::<Result<Vec<_>>>()?,
            false => vec![],
        };
        let visual_encoders = obs_spec
            .camera_resolutions
            .iter()
            .enumerate()
            .map(|(i, res)| {
                SimpleVisualEncoder::build(vb.pp(format!("visual{}", i)), *res, h)
                    .with_context(|| format!("Failed to build encoder of camera {}", i))
            })
            .collect::<Result<Vec<_>>>()?;

        let in_dim = obs_spec.vector_sizes.iter().sum::<usize>()
            + h * visual_encoders.len()
            + action_size;
        ensure!(in_dim > 0, "Network body has no input");
        let mlp_config = MlpConfig::new(in_dim, vec![h; settings.num_layers - 1], h, true);
        let mlp = Mlp::build(vb.clone(), mlp_config)?;

        Ok(Self {
            normalizers,
            vector_sizes: obs_spec.vector_sizes.clone(),
            visual_encoders,
            action_size,
            mlp,
        })
    }

    /// Returns the hidden vector of shape `[batch_size, hidden_units]`.
    ///
    /// `vec_inputs[i]` is `[batch_size, vector_sizes[i]]`, `vis_inputs[i]` is
    /// `[batch_size, c, h, w]`. `actions` must be given iff the body was built
    /// with an action input.
    pub fn forward(
        &self,
        vec_inputs: &[Tensor],
        vis_inputs: &[Tensor],
        actions: Option<&Tensor>,
    ) -> Result<Tensor> {
        ensure!(
            vec_inputs.len() == self.vector_sizes.len(),
            "Expected {} vector observations, got {}",
            self.vector_sizes.len(),
            vec_inputs.len()
        );
        ensure!(
            vis_inputs.len() == self.visual_encoders.len(),
            "Expected {} visual observations, got {}",
            self.visual_encoders.len(),
            vis_inputs.len()
        );

        let mut encodes = Vec::with_capacity(vec_inputs.len() + vis_inputs.len() + 1);
        for (i, xs) in vec_inputs.iter().enumerate() {
            match self.normalizers.get(i) {
                Some(normalizer) => encodes.push(normalizer.forward(xs)?),
                None => encodes.push(xs.clone()),
            }
        }
        for (encoder, xs) in self.visual_encoders.iter().zip(vis_inputs) {
            encodes.push(encoder.forward(xs)?);
        }
        match (self.action_size, actions) {
            (0, None) => {}
            (0, Some(_)) => anyhow::bail!("Network body takes no action input"),
            (_, Some(act)) => encodes.push(act.clone()),
            (_, None) => anyhow::bail!("Network body requires an action input"),
        }

        let xs = Tensor::cat(&encodes, 1)?;
        self.mlp.forward(&xs)
    }

    /// Folds vector observations into the running statistics.
    ///
    /// Does nothing if normalization is disabled.
    pub fn update_normalization(&mut self, vec_inputs: &[Tensor]) -> Result<()> {
        for (normalizer, xs) in self.normalizers.iter_mut().zip(vec_inputs) {
            normalizer.update(xs)?;
        }
        Ok(())
    }

    /// Copies the running statistics of `other`.
    pub fn copy_normalization(&mut self, other: &NetworkBody) -> Result<()> {
        ensure!(
            self.normalizers.len() == other.normalizers.len(),
            "Normalization settings of the network bodies differ"
        );
        for (dest, src) in self.normalizers.iter_mut().zip(&other.normalizers) {
            dest.copy_from(src)?;
        }
        Ok(())
    }

    /// Normalizers of the vector observations, empty without normalization.
    pub fn normalizers(&self) -> &[Normalizer] {
        &self.normalizers
    }

    /// Output dimension.
    pub fn out_dim(&self) -> usize {
        self.mlp.config().out_dim()
    }
}
