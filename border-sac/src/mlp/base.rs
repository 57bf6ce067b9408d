use super::{mlp_forward, MlpConfig};
use anyhow::Result;
use candle_core::Tensor;
use candle_nn::{linear, Linear, VarBuilder};

/// Returns vector of linear modules from [`MlpConfig`].
fn create_linear_layers(prefix: &str, vb: VarBuilder, config: &MlpConfig) -> Result<Vec<Linear>> {
    let dims: Vec<usize> = std::iter::once(config.in_dim)
        .chain(config.units.iter().copied())
        .chain(std::iter::once(config.out_dim))
        .collect();
    let vb = vb.pp(prefix);

    dims.windows(2)
        .enumerate()
        .map(|(i, w)| Ok(linear(w[0], w[1], vb.pp(format!("ln{}", i)))?))
        .collect()
}

/// Multilayer perceptron with ReLU activation function.
pub struct Mlp {
    config: MlpConfig,
    layers: Vec<Linear>,
}

impl Mlp {
    /// Builds the layers under the `mlp` prefix of `vb`.
    pub fn build(vb: VarBuilder, config: MlpConfig) -> Result<Self> {
        let layers = create_linear_layers("mlp", vb, &config)?;
        Ok(Self { config, layers })
    }

    /// Applies the layers to `xs` of shape `[batch_size, in_dim]`.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        Ok(mlp_forward(
            xs.clone(),
            &self.layers,
            self.config.activation_out,
        )?)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &MlpConfig {
        &self.config
    }
}
