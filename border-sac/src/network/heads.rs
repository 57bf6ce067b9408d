//! Output heads of the reward streams.
use super::StreamValues;
use anyhow::{ensure, Result};
use candle_core::{Tensor, D};
use candle_nn::{linear, Linear, Module, VarBuilder};
use std::collections::BTreeMap;

/// One linear output per reward stream.
///
/// With `out_dim == 1` the outputs are squeezed to `[batch_size]`, otherwise
/// they are `[batch_size, out_dim]`.
pub struct ValueHeads {
    heads: BTreeMap<String, Linear>,
    out_dim: usize,
}

impl ValueHeads {
    /// Builds a head for each stream under `vb`, named after the stream.
    pub fn build(vb: VarBuilder, stream_names: &[String], in_dim: usize, out_dim: usize) -> Result<Self> {
        ensure!(!stream_names.is_empty(), "No reward stream");
        let heads = stream_names
            .iter()
            .map(|name| Ok((name.clone(), linear(in_dim, out_dim, vb.pp(name))?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self { heads, out_dim })
    }

    /// Applies every head to `hidden`.
    pub fn forward(&self, hidden: &Tensor) -> Result<StreamValues> {
        self.heads
            .iter()
            .map(|(name, head)| {
                let v = head.forward(hidden)?;
                let v = match self.out_dim {
                    1 => v.squeeze(D::Minus1)?,
                    _ => v,
                };
                Ok((name.clone(), v))
            })
            .collect()
    }

    /// Names of the streams in sorted order.
    pub fn stream_names(&self) -> Vec<String> {
        self.heads.keys().cloned().collect()
    }
}
