//! Losses of SAC.
//!
//! Every loss takes `loss_masks` of shape `[batch_size]` and averages only
//! over steps with non-zero mask, see [`masked_mean`].
use super::{ActionStrategy, RewardSignalConfig};
use crate::{network::StreamValues, SacError};
use anyhow::{anyhow, Result};
use candle_core::Tensor;
use std::collections::BTreeMap;

fn stream<'a>(values: &'a StreamValues, name: &str) -> Result<&'a Tensor> {
    values
        .get(name)
        .ok_or_else(|| anyhow!("No output for reward stream {}", name))
}

fn mean_over_streams(losses: &[Tensor]) -> Result<Tensor> {
    Ok(Tensor::stack(losses, 0)?.mean(0)?)
}

/// Mean of `xs` over the steps with non-zero mask.
///
/// Returns `sum(masks * xs) / max(sum(masks), 1)`.
pub fn masked_mean(xs: &Tensor, masks: &Tensor) -> Result<Tensor> {
    let n = masks.sum_all()?.to_scalar::<f32>()?.max(1.0);
    Ok(((xs * masks)?.sum_all()? / n as f64)?)
}

/// Returns `(q1_loss, q2_loss)`.
///
/// The backup of stream `i` is `r_i + (1 - u_i * done) * gamma_i * V_target_i`,
/// where `u_i` is 1 if the stream uses terminal states. No gradient flows
/// through the backup.
pub fn sac_q_loss(
    q1_out: &StreamValues,
    q2_out: &StreamValues,
    target_values: &StreamValues,
    dones: &Tensor,
    rewards: &StreamValues,
    reward_signals: &BTreeMap<String, RewardSignalConfig>,
    loss_masks: &Tensor,
) -> Result<(Tensor, Tensor)> {
    let mut q1_losses = Vec::with_capacity(q1_out.len());
    let mut q2_losses = Vec::with_capacity(q1_out.len());

    for (name, q1) in q1_out.iter() {
        let signal = reward_signals
            .get(name)
            .ok_or_else(|| anyhow!("Reward stream {} is not configured", name))?;
        let use_dones = match signal.use_terminal_states {
            true => 1.0,
            false => 0.0,
        };
        let not_done = dones.affine(-use_dones, 1.0)?;
        let discounted = (not_done * stream(target_values, name)?)?.affine(signal.gamma as f64, 0.0)?;
        let backup = (stream(rewards, name)? + discounted)?.detach();

        let q2 = stream(q2_out, name)?;
        q1_losses.push((masked_mean(&(&backup - q1)?.sqr()?, loss_masks)? * 0.5)?);
        q2_losses.push((masked_mean(&(&backup - q2)?.sqr()?, loss_masks)? * 0.5)?);
    }

    Ok((
        mean_over_streams(&q1_losses)?,
        mean_over_streams(&q2_losses)?,
    ))
}

/// Loss of the state-value critic of the policy.
///
/// The backup is the smaller of the two Q estimates at the current policy minus
/// the entropy bonus, without gradient. Returns
/// [`SacError::NonFiniteValueLoss`] if the loss is NaN or infinite.
pub fn sac_value_loss(
    strategy: &dyn ActionStrategy,
    log_probs: &Tensor,
    values: &StreamValues,
    q1p_out: &StreamValues,
    q2p_out: &StreamValues,
    alpha: &Tensor,
    loss_masks: &Tensor,
) -> Result<Tensor> {
    let ent_bonus = strategy.entropy_bonus(log_probs, alpha)?;
    let mut value_losses = Vec::with_capacity(values.len());

    for (name, v) in values.iter() {
        let q1p = strategy.policy_q(stream(q1p_out, name)?, log_probs)?;
        let q2p = strategy.policy_q(stream(q2p_out, name)?, log_probs)?;
        let v_backup = (q1p.minimum(&q2p)? - &ent_bonus)?.detach();
        value_losses.push((masked_mean(&(v - v_backup)?.sqr()?, loss_masks)? * 0.5)?);
    }

    let value_loss = mean_over_streams(&value_losses)?;
    let v = value_loss.to_scalar::<f32>()?;
    if !v.is_finite() {
        return Err(SacError::NonFiniteValueLoss(v).into());
    }
    Ok(value_loss)
}

/// Loss of the policy.
///
/// `q1p_out` is the first Q network at the sampled actions. Its mean over
/// streams enters the loss; gradients reaching the Q network through it are
/// not applied since the Q network is not in the policy parameter group.
pub fn sac_policy_loss(
    strategy: &dyn ActionStrategy,
    log_probs: &Tensor,
    q1p_out: &StreamValues,
    alpha: &Tensor,
    loss_masks: &Tensor,
) -> Result<Tensor> {
    let q1p: Vec<Tensor> = q1p_out.values().cloned().collect();
    let mean_q1 = Tensor::stack(&q1p, 0)?.mean(0)?;
    let batch_policy_loss = strategy.policy_objective(log_probs, alpha, &mean_q1)?;
    masked_mean(&batch_policy_loss, loss_masks)
}

/// Loss of the entropy coefficients.
pub fn sac_entropy_loss(
    strategy: &dyn ActionStrategy,
    log_probs: &Tensor,
    log_ent_coef: &Tensor,
    loss_masks: &Tensor,
) -> Result<Tensor> {
    let objective = strategy.entropy_objective(log_probs, log_ent_coef)?;
    Ok((masked_mean(&objective, loss_masks)? * -1.0)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sac::{ContinuousStrategy, DiscreteStrategy};
    use candle_core::{Device, Var};

    fn t(xs: &[f32]) -> Result<Tensor> {
        Ok(Tensor::from_slice(xs, xs.len(), &Device::Cpu)?)
    }

    fn single(xs: &[f32]) -> Result<StreamValues> {
        let mut values = StreamValues::new();
        values.insert("extrinsic".to_string(), t(xs)?);
        Ok(values)
    }

    fn signals() -> BTreeMap<String, RewardSignalConfig> {
        let mut signals = BTreeMap::new();
        signals.insert("extrinsic".to_string(), RewardSignalConfig::new(0.5));
        signals
    }

    fn scalar(x: &Tensor) -> Result<f32> {
        Ok(x.to_scalar::<f32>()?)
    }

    #[test]
    fn test_masked_mean() -> Result<()> {
        let xs = t(&[1.0, 2.0, 3.0, 6.0])?;
        assert_eq!(scalar(&masked_mean(&xs, &t(&[1.0; 4])?)?)?, 3.0);
        assert_eq!(scalar(&masked_mean(&xs, &t(&[1.0, 0.0, 1.0, 0.0])?)?)?, 2.0);
        assert_eq!(scalar(&masked_mean(&xs, &t(&[0.0; 4])?)?)?, 0.0);
        Ok(())
    }

    #[test]
    fn test_q_loss() -> Result<()> {
        let q1 = single(&[1.0, 2.0, 0.0])?;
        let q2 = single(&[0.0, 0.0, 0.0])?;
        let target = single(&[2.0, 2.0, 2.0])?;
        let rewards = single(&[1.0, 1.0, 1.0])?;
        let dones = t(&[0.0, 1.0, 0.0])?;

        // Backup: 1 + 0.5 * 2 = 2 for running steps, 1 for the terminal step
        let (l1, l2) = sac_q_loss(&q1, &q2, &target, &dones, &rewards, &signals(), &t(&[1.0; 3])?)?;
        assert!((scalar(&l1)? - 0.5 * (1.0 + 1.0 + 4.0) / 3.0).abs() < 1e-6);
        assert!((scalar(&l2)? - 0.5 * (4.0 + 1.0 + 4.0) / 3.0).abs() < 1e-6);

        // Without terminal states the terminal step bootstraps too
        let mut signals = signals();
        signals.insert(
            "extrinsic".to_string(),
            RewardSignalConfig::new(0.5).use_terminal_states(false),
        );
        let (l1, _) = sac_q_loss(&q1, &q2, &target, &dones, &rewards, &signals, &t(&[1.0; 3])?)?;
        assert!((scalar(&l1)? - 0.5 * (1.0 + 0.0 + 4.0) / 3.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_q_loss_ignores_masked_steps() -> Result<()> {
        let q1 = single(&[1.0, 2.0, 0.5])?;
        let q2 = single(&[0.0, 1.0, 0.5])?;
        let target = single(&[2.0, 2.0, 2.0])?;
        let dones = t(&[0.0; 3])?;
        let masks = t(&[1.0, 1.0, 0.0])?;

        let (a1, a2) = sac_q_loss(&q1, &q2, &target, &dones, &single(&[1.0, 1.0, 1.0])?, &signals(), &masks)?;
        let (b1, b2) = sac_q_loss(&q1, &q2, &target, &dones, &single(&[1.0, 1.0, 1e6])?, &signals(), &masks)?;
        assert_eq!(scalar(&a1)?, scalar(&b1)?);
        assert_eq!(scalar(&a2)?, scalar(&b2)?);
        Ok(())
    }

    #[test]
    fn test_value_loss_non_finite() -> Result<()> {
        let strategy = ContinuousStrategy::new(1, 1.0);
        let log_probs = Tensor::zeros((2, 1), candle_core::DType::F32, &Device::Cpu)?;
        let alpha = t(&[1.0])?;
        let masks = t(&[1.0, 1.0])?;

        let loss = sac_value_loss(
            &strategy,
            &log_probs,
            &single(&[0.0, 1.0])?,
            &single(&[1.0, 3.0])?,
            &single(&[2.0, 2.0])?,
            &alpha,
            &masks,
        )?;
        // Backups are min(q1, q2) = [1, 2]
        assert!((scalar(&loss)? - 0.5 * (1.0 + 1.0) / 2.0).abs() < 1e-6);

        let err = sac_value_loss(
            &strategy,
            &log_probs,
            &single(&[0.0, 1.0])?,
            &single(&[1e30, 3.0])?,
            &single(&[1e30, 2.0])?,
            &alpha,
            &masks,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SacError>(),
            Some(SacError::NonFiniteValueLoss(_))
        ));
        Ok(())
    }

    #[test]
    fn test_entropy_loss_gradient() -> Result<()> {
        // Entropy below target drives log_ent_coef up
        let strategy = ContinuousStrategy::new(1, 1.0);
        let log_ent_coef = Var::zeros(1, candle_core::DType::F32, &Device::Cpu)?;
        let log_probs = Tensor::from_slice(&[2f32, 2.0], (2, 1), &Device::Cpu)?;
        let loss = sac_entropy_loss(&strategy, &log_probs, log_ent_coef.as_tensor(), &t(&[1.0, 1.0])?)?;
        let grads = loss.backward()?;
        let grad = grads
            .get(log_ent_coef.as_tensor())
            .ok_or_else(|| anyhow!("no gradient"))?
            .to_vec1::<f32>()?;
        // d/dx -(x * (2 - 1)) = -1
        assert!((grad[0] + 1.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_discrete_policy_loss() -> Result<()> {
        let strategy = DiscreteStrategy::new(&[2], 0.2);
        let half = 0.5f32.ln();
        let log_probs = Tensor::from_slice(&[half, half], (1, 2), &Device::Cpu)?;
        let mut q1p = StreamValues::new();
        q1p.insert(
            "extrinsic".to_string(),
            Tensor::from_slice(&[1f32, 3.0], (1, 2), &Device::Cpu)?,
        );
        let loss = sac_policy_loss(&strategy, &log_probs, &q1p, &t(&[1.0])?, &t(&[1.0])?)?;
        // sum(p * lp) - sum(p * q) = -ln 2 - 2
        assert!((scalar(&loss)? - (-(2f32.ln()) - 2.0)).abs() < 1e-5);
        Ok(())
    }

    /// Uniform log probabilities of branches with the given sizes, one sample.
    fn uniform_log_probs(branch_sizes: &[usize]) -> Result<Tensor> {
        let lp: Vec<f32> = branch_sizes
            .iter()
            .flat_map(|n| vec![-(*n as f32).ln(); *n])
            .collect();
        Ok(Tensor::from_slice(&lp, (1, lp.len()), &Device::Cpu)?)
    }

    fn single_row(xs: &[f32]) -> Result<StreamValues> {
        let mut values = StreamValues::new();
        values.insert(
            "extrinsic".to_string(),
            Tensor::from_slice(xs, (1, xs.len()), &Device::Cpu)?,
        );
        Ok(values)
    }

    #[test]
    fn test_discrete_policy_loss_averages_branches() -> Result<()> {
        let strategy = DiscreteStrategy::new(&[2, 2], 0.2);
        let log_probs = uniform_log_probs(&[2, 2])?;
        let q1p = single_row(&[1.0, 3.0, 5.0, 7.0])?;
        let ln2 = 2f32.ln();

        // Branch terms: -ln 2 - 2 and -ln 2 - 6
        let loss = sac_policy_loss(&strategy, &log_probs, &q1p, &t(&[1.0, 1.0])?, &t(&[1.0])?)?;
        assert!((scalar(&loss)? - (-ln2 - 4.0)).abs() < 1e-5);

        // Each branch uses its own coefficient
        let loss = sac_policy_loss(&strategy, &log_probs, &q1p, &t(&[1.0, 2.0])?, &t(&[1.0])?)?;
        assert!((scalar(&loss)? - (-1.5 * ln2 - 4.0)).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_discrete_value_loss() -> Result<()> {
        let strategy = DiscreteStrategy::new(&[2, 3], 0.2);
        let log_probs = uniform_log_probs(&[2, 3])?;
        let (ln2, ln3) = (2f32.ln(), 3f32.ln());

        // Expected Q under the policy: q1 = (3 + 6) / 2, q2 = (4 + 2) / 2
        let q1p = single_row(&[2.0, 4.0, 3.0, 6.0, 9.0])?;
        let q2p = single_row(&[0.0, 8.0, 0.0, 3.0, 3.0])?;
        let alpha = t(&[1.0, 2.0])?;
        let loss = sac_value_loss(&strategy, &log_probs, &single(&[0.0])?, &q1p, &q2p, &alpha, &t(&[1.0])?)?;

        // Entropy bonus: (1 * -ln 2 + 2 * -ln 3) / 2
        let backup = 3.0 + (ln2 + 2.0 * ln3) / 2.0;
        assert!((scalar(&loss)? - 0.5 * backup * backup).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_discrete_entropy_loss() -> Result<()> {
        let strategy = DiscreteStrategy::new(&[2, 3], 0.2);
        let log_probs = uniform_log_probs(&[2, 3])?;
        let (ln2, ln3) = (2f32.ln(), 3f32.ln());
        let log_ent_coef = Var::new(&[0.5f32, -1.0], &Device::Cpu)?;

        // Per-branch sum(p * lp) + target = -ln n + 0.2 ln n
        let loss = sac_entropy_loss(&strategy, &log_probs, log_ent_coef.as_tensor(), &t(&[1.0])?)?;
        let expected = -(0.5 * -0.8 * ln2 + -1.0 * -0.8 * ln3) / 2.0;
        assert!((scalar(&loss)? - expected).abs() < 1e-5);

        // Entropy above target drives each coefficient down, scaled by its branch
        let grads = loss.backward()?;
        let grad = grads
            .get(log_ent_coef.as_tensor())
            .ok_or_else(|| anyhow!("no gradient"))?
            .to_vec1::<f32>()?;
        assert!((grad[0] - 0.4 * ln2).abs() < 1e-5);
        assert!((grad[1] - 0.4 * ln3).abs() < 1e-5);
        Ok(())
    }
}
