use crate::network::{ActionSpec, Critic, NetworkBody, NetworkSettings, ObservationSpec, StreamValues};
use anyhow::Result;
use candle_core::{Device, Tensor, Var};

/// Outputs of [`SacPolicy::sample_actions`].
pub struct SampledActions {
    /// Sampled actions.
    ///
    /// `[batch_size, dim]` in `[-1, 1]` for continuous actions, `[batch_size, n_branches]`
    /// of type U32 for discrete actions.
    pub actions: Tensor,

    /// Log probabilities.
    ///
    /// `[batch_size, dim]` for continuous actions. For discrete actions,
    /// `[batch_size, sum(branch_sizes)]` with the log probability of every choice
    /// if all log probabilities were requested, `[batch_size, n_branches]` of the
    /// sampled choices otherwise.
    pub log_probs: Tensor,

    /// Entropies of the action distributions, `[batch_size]`.
    pub entropies: Tensor,

    /// State values of the policy critic for each reward stream, `[batch_size]`.
    pub values: StreamValues,

    /// Recurrent memories after the forward pass, if the policy has any.
    pub memories: Option<Tensor>,
}

/// Interface of the policy trained by [`SacOptimizer`](crate::SacOptimizer).
///
/// The optimizer samples actions through this trait, reads the live network
/// body to share its normalization statistics with the critics, and uses the
/// policy critic as the source of the target network.
pub trait SacPolicy {
    /// Action space.
    fn action_spec(&self) -> &ActionSpec;

    /// Observations consumed by the policy.
    fn observation_spec(&self) -> &ObservationSpec;

    /// Sizing of the networks, reused for the critics of the optimizer.
    fn network_settings(&self) -> &NetworkSettings;

    /// Device of the parameters.
    fn device(&self) -> &Device;

    /// Number of steps in a sequence.
    fn sequence_length(&self) -> usize {
        self.network_settings().sequence_length()
    }

    /// Samples actions with the reparametrization trick.
    ///
    /// `masks` are the masks of available discrete actions,
    /// `[batch_size, sum(branch_sizes)]`. `memories` holds one memory per
    /// sequence, `[1, n_sequences, memory_size]`.
    fn sample_actions(
        &self,
        vec_obs: &[Tensor],
        vis_obs: &[Tensor],
        masks: Option<&Tensor>,
        memories: Option<&Tensor>,
        seq_len: usize,
        all_log_probs: bool,
    ) -> Result<SampledActions>;

    /// Body of the policy network holding the observation normalizers.
    fn network_body(&self) -> &NetworkBody;

    /// State-value critic of the policy.
    fn critic(&self) -> &Critic;

    /// Trainable variables of the policy, excluding its critic.
    fn policy_vars(&self) -> Vec<Var>;
}
