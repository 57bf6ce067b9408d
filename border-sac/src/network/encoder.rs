//! Encoder of camera observations.
use super::CameraResolution;
use anyhow::{ensure, Result};
use candle_core::Tensor;
use candle_nn::{
    conv::Conv2dConfig,
    conv2d, linear,
    sequential::{seq, Sequential},
    Module, VarBuilder,
};

/// Spatial size after a convolution without padding.
fn conv_output_size(size: usize, kernel: usize, stride: usize) -> usize {
    (size - kernel) / stride + 1
}

fn stride(s: usize) -> Conv2dConfig {
    Conv2dConfig {
        stride: s,
        ..Default::default()
    }
}

/// Two strided convolutions followed by a dense layer.
///
/// Input is `[batch_size, c, h, w]`, output is `[batch_size, out_dim]`.
/// Both `h` and `w` must be at least 20.
pub struct SimpleVisualEncoder {
    resolution: CameraResolution,
    out_dim: usize,
    seq: Sequential,
}

impl SimpleVisualEncoder {
    /// Smallest supported height and width.
    pub const MIN_RESOLUTION: usize = 20;

    /// Builds the encoder.
    pub fn build(vb: VarBuilder, resolution: CameraResolution, out_dim: usize) -> Result<Self> {
        ensure!(
            resolution.height >= Self::MIN_RESOLUTION && resolution.width >= Self::MIN_RESOLUTION,
            "Camera resolution {}x{} is smaller than {}x{}",
            resolution.height,
            resolution.width,
            Self::MIN_RESOLUTION,
            Self::MIN_RESOLUTION
        );
        let h = conv_output_size(conv_output_size(resolution.height, 8, 4), 4, 2);
        let w = conv_output_size(conv_output_size(resolution.width, 8, 4), 4, 2);
        let seq = seq()
            .add(conv2d(resolution.num_channels, 16, 8, stride(4), vb.pp("c1"))?)
            .add_fn(|xs| xs.relu())
            .add(conv2d(16, 32, 4, stride(2), vb.pp("c2"))?)
            .add_fn(|xs| xs.relu()?.flatten_from(1))
            .add(linear(32 * h * w, out_dim, vb.pp("l1"))?)
            .add_fn(|xs| xs.relu());

        Ok(Self {
            resolution,
            out_dim,
            seq,
        })
    }

    /// Encodes a batch of camera observations.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        Ok(self.seq.forward(xs)?)
    }

    /// Output dimension.
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Resolution of the camera.
    pub fn resolution(&self) -> CameraResolution {
        self.resolution
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_encoder_shape() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let resolution = CameraResolution {
            height: 36,
            width: 24,
            num_channels: 3,
        };
        let encoder = SimpleVisualEncoder::build(vb, resolution, 10)?;
        let xs = Tensor::zeros((2, 3, 36, 24), DType::F32, &Device::Cpu)?;
        assert_eq!(encoder.forward(&xs)?.dims(), &[2, 10]);
        Ok(())
    }

    #[test]
    fn test_encoder_rejects_small_camera() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let resolution = CameraResolution {
            height: 16,
            width: 32,
            num_channels: 1,
        };
        assert!(SimpleVisualEncoder::build(vb, resolution, 4).is_err());
    }
}
