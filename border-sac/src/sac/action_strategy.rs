//! Continuous and discrete variants of the SAC losses.
use crate::{
    network::StreamValues,
    util::{actions_to_onehot, break_into_branches},
};
use anyhow::Result;
use candle_core::{Tensor, D};

/// Computations of the SAC losses that depend on the type of the action space.
///
/// `log_probs` is `[batch_size, dim]` for continuous actions and
/// `[batch_size, sum(branch_sizes)]` (log probabilities of all choices) for
/// discrete actions. `alpha` and `log_ent_coef` have one entry per entropy
/// coefficient, see [`ActionStrategy::target_entropy`].
pub trait ActionStrategy {
    /// Target entropy, one entry per entropy coefficient.
    fn target_entropy(&self) -> &[f32];

    /// Reduces Q outputs to the values of the batch actions, `[batch_size]` per stream.
    fn condense_q(&self, q_out: &StreamValues, actions: &Tensor) -> Result<StreamValues>;

    /// Expected value of a Q output under the current policy, `[batch_size]`.
    fn policy_q(&self, q_out: &Tensor, log_probs: &Tensor) -> Result<Tensor>;

    /// Entropy bonus `alpha * log_prob` per sample, `[batch_size]`.
    fn entropy_bonus(&self, log_probs: &Tensor, alpha: &Tensor) -> Result<Tensor>;

    /// Policy objective per sample, `[batch_size]`.
    ///
    /// `mean_q1` is the mean of the first Q network over streams at the
    /// current policy.
    fn policy_objective(&self, log_probs: &Tensor, alpha: &Tensor, mean_q1: &Tensor) -> Result<Tensor>;

    /// `log_ent_coef * (log_prob + target_entropy)` per sample, `[batch_size]`.
    ///
    /// Gradient flows into `log_ent_coef` only.
    fn entropy_objective(&self, log_probs: &Tensor, log_ent_coef: &Tensor) -> Result<Tensor>;
}

/// Real-valued actions with a single entropy coefficient.
pub struct ContinuousStrategy {
    target_entropy: Vec<f32>,
}

impl ContinuousStrategy {
    /// Target entropy is `-scale * dim`.
    pub fn new(dim: usize, scale: f64) -> Self {
        Self {
            target_entropy: vec![(-scale * dim as f64) as f32],
        }
    }
}

impl ActionStrategy for ContinuousStrategy {
    fn target_entropy(&self) -> &[f32] {
        &self.target_entropy
    }

    fn condense_q(&self, q_out: &StreamValues, _actions: &Tensor) -> Result<StreamValues> {
        Ok(q_out.clone())
    }

    fn policy_q(&self, q_out: &Tensor, _log_probs: &Tensor) -> Result<Tensor> {
        Ok(q_out.clone())
    }

    fn entropy_bonus(&self, log_probs: &Tensor, alpha: &Tensor) -> Result<Tensor> {
        Ok(log_probs.broadcast_mul(alpha)?.sum(D::Minus1)?)
    }

    fn policy_objective(&self, log_probs: &Tensor, alpha: &Tensor, mean_q1: &Tensor) -> Result<Tensor> {
        Ok(log_probs
            .broadcast_mul(alpha)?
            .broadcast_sub(&mean_q1.unsqueeze(1)?)?
            .mean(D::Minus1)?)
    }

    fn entropy_objective(&self, log_probs: &Tensor, log_ent_coef: &Tensor) -> Result<Tensor> {
        let diff = (log_probs + self.target_entropy[0] as f64)?
            .sum(D::Minus1)?
            .detach();
        Ok(diff.broadcast_mul(&log_ent_coef.mean_all()?)?)
    }
}

/// Independent categorical branches with an entropy coefficient each.
pub struct DiscreteStrategy {
    branch_sizes: Vec<usize>,
    target_entropy: Vec<f32>,
}

impl DiscreteStrategy {
    /// Target entropy of a branch with `n` choices is `scale * ln(n)`.
    pub fn new(branch_sizes: &[usize], scale: f64) -> Self {
        Self {
            branch_sizes: branch_sizes.to_vec(),
            target_entropy: branch_sizes
                .iter()
                .map(|n| (scale * (*n as f64).ln()) as f32)
                .collect(),
        }
    }

    /// Sums `xs` within each branch, `[n_branches, batch_size]`.
    fn branch_sums(&self, xs: &Tensor) -> Result<Tensor> {
        let sums = break_into_branches(xs, &self.branch_sizes)?
            .iter()
            .map(|b| b.sum(D::Minus1))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Tensor::stack(&sums, 0)?)
    }

    /// Coefficient of branch `i`, shape `[1]`.
    fn coef(coefs: &Tensor, i: usize) -> Result<Tensor> {
        Ok(coefs.narrow(0, i, 1)?)
    }
}

impl ActionStrategy for DiscreteStrategy {
    fn target_entropy(&self) -> &[f32] {
        &self.target_entropy
    }

    fn condense_q(&self, q_out: &StreamValues, actions: &Tensor) -> Result<StreamValues> {
        let onehot = actions_to_onehot(actions, &self.branch_sizes)?;
        q_out
            .iter()
            .map(|(name, q)| {
                let only_action_qs = break_into_branches(q, &self.branch_sizes)?
                    .iter()
                    .zip(onehot.iter())
                    .map(|(q, act)| Ok((q * act)?.sum(D::Minus1)?))
                    .collect::<Result<Vec<_>>>()?;
                let condensed = Tensor::stack(&only_action_qs, 0)?.mean(0)?;
                Ok((name.clone(), condensed))
            })
            .collect()
    }

    fn policy_q(&self, q_out: &Tensor, log_probs: &Tensor) -> Result<Tensor> {
        let probs = log_probs.exp()?;
        Ok(self.branch_sums(&(q_out * probs)?)?.mean(0)?)
    }

    fn entropy_bonus(&self, log_probs: &Tensor, alpha: &Tensor) -> Result<Tensor> {
        let per_action_ent = (log_probs * log_probs.exp()?)?;
        let bonus = break_into_branches(&per_action_ent, &self.branch_sizes)?
            .iter()
            .enumerate()
            .map(|(i, lp)| Ok(lp.broadcast_mul(&Self::coef(alpha, i)?)?.sum(D::Minus1)?))
            .collect::<Result<Vec<_>>>()?;
        Ok(Tensor::stack(&bonus, 0)?.mean(0)?)
    }

    fn policy_objective(&self, log_probs: &Tensor, alpha: &Tensor, mean_q1: &Tensor) -> Result<Tensor> {
        let probs = log_probs.exp()?;
        let per_action_ent = break_into_branches(&(log_probs * &probs)?, &self.branch_sizes)?;
        let q_term = break_into_branches(&(mean_q1 * &probs)?, &self.branch_sizes)?;
        let losses = per_action_ent
            .iter()
            .zip(q_term.iter())
            .enumerate()
            .map(|(i, (ent, q))| {
                let ent = ent.broadcast_mul(&Self::coef(alpha, i)?)?;
                Ok((ent - q)?.sum(D::Minus1)?)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Tensor::stack(&losses, 0)?.mean(0)?)
    }

    fn entropy_objective(&self, log_probs: &Tensor, log_ent_coef: &Tensor) -> Result<Tensor> {
        let target_entropy = Tensor::from_slice(
            &self.target_entropy,
            self.target_entropy.len(),
            log_probs.device(),
        )?;
        let per_action_ent = (log_probs * log_probs.exp()?)?;
        let diff = self
            .branch_sums(&per_action_ent)?
            .t()?
            .broadcast_add(&target_entropy)?
            .detach();
        Ok(diff.broadcast_mul(log_ent_coef)?.mean(D::Minus1)?)
    }
}
