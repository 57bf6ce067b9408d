//! Action-value network.
use super::{ActionSpec, NetworkBody, NetworkSettings, ObservationSpec, StreamValues, ValueHeads};
use anyhow::Result;
use candle_core::Tensor;
use candle_nn::VarBuilder;

/// Action-value network with one output per reward stream.
///
/// For continuous actions the action is an input of the body and each stream
/// gets a value of shape `[batch_size]`. For discrete actions there is no
/// action input; each stream gets `[batch_size, sum(branch_sizes)]`, one value
/// per choice of each branch.
pub struct QNetwork {
    body: NetworkBody,
    heads: ValueHeads,
    action_spec: ActionSpec,
}

impl QNetwork {
    /// Builds the network with variables under `vb`.
    pub fn build(
        vb: VarBuilder,
        stream_names: &[String],
        obs_spec: &ObservationSpec,
        settings: &NetworkSettings,
        action_spec: &ActionSpec,
    ) -> Result<Self> {
        let (action_size, out_dim) = match action_spec {
            ActionSpec::Continuous(dim) => (*dim, 1),
            ActionSpec::Discrete(_) => (0, action_spec.total_size()),
        };
        let body = NetworkBody::build(vb.pp("body"), obs_spec, settings, action_size)?;
        let heads = ValueHeads::build(vb.pp("q_heads"), stream_names, body.out_dim(), out_dim)?;

        Ok(Self {
            body,
            heads,
            action_spec: action_spec.clone(),
        })
    }

    /// Returns action values for each stream.
    ///
    /// `actions` is required for continuous actions and must be `None` for
    /// discrete actions.
    pub fn forward(
        &self,
        vec_inputs: &[Tensor],
        vis_inputs: &[Tensor],
        actions: Option<&Tensor>,
    ) -> Result<StreamValues> {
        let hidden = self.body.forward(vec_inputs, vis_inputs, actions)?;
        self.heads.forward(&hidden)
    }

    /// Copies observation statistics from the body of a policy.
    pub fn copy_normalization(&mut self, other: &NetworkBody) -> Result<()> {
        self.body.copy_normalization(other)
    }

    /// Network body.
    pub fn network_body(&self) -> &NetworkBody {
        &self.body
    }

    /// Action space the network was built for.
    pub fn action_spec(&self) -> &ActionSpec {
        &self.action_spec
    }
}
