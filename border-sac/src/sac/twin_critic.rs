//! Pair of Q networks.
use crate::network::{ActionSpec, NetworkBody, NetworkSettings, ObservationSpec, QNetwork, StreamValues};
use anyhow::Result;
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};

/// Two independently initialized [`QNetwork`]s sharing one [`VarMap`].
///
/// Variables of the networks are named under the `q1` and `q2` prefixes.
pub struct TwinQNetwork {
    varmap: VarMap,
    q1: QNetwork,
    q2: QNetwork,
}

impl TwinQNetwork {
    /// Constructs [`TwinQNetwork`].
    pub fn build(
        stream_names: &[String],
        obs_spec: &ObservationSpec,
        settings: &NetworkSettings,
        action_spec: &ActionSpec,
        device: &Device,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let q1 = QNetwork::build(vb.pp("q1"), stream_names, obs_spec, settings, action_spec)?;
        let q2 = QNetwork::build(vb.pp("q2"), stream_names, obs_spec, settings, action_spec)?;

        Ok(Self { varmap, q1, q2 })
    }

    /// Returns the outputs of both networks.
    pub fn forward(
        &self,
        vec_inputs: &[Tensor],
        vis_inputs: &[Tensor],
        actions: Option<&Tensor>,
    ) -> Result<(StreamValues, StreamValues)> {
        let q1 = self.q1.forward(vec_inputs, vis_inputs, actions)?;
        let q2 = self.q2.forward(vec_inputs, vis_inputs, actions)?;
        Ok((q1, q2))
    }

    /// Copies the normalization statistics of `body` into both networks.
    pub fn copy_normalization(&mut self, body: &NetworkBody) -> Result<()> {
        self.q1.copy_normalization(body)?;
        self.q2.copy_normalization(body)
    }

    /// First network.
    pub fn q1(&self) -> &QNetwork {
        &self.q1
    }

    /// Second network.
    pub fn q2(&self) -> &QNetwork {
        &self.q2
    }

    /// Variables of both networks.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// All trainable variables.
    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }
}
