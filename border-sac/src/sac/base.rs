//! SAC optimizer.
use super::{
    loss::{sac_entropy_loss, sac_policy_loss, sac_q_loss, sac_value_loss},
    ActionStrategy, ContinuousStrategy, DiscreteStrategy, EntCoef, RewardSignalConfig,
    SacOptimizerConfig, TwinQNetwork,
};
use crate::{
    buffer::{
        next_visual_obs_key, rewards_key, visual_obs_key, ACTIONS, ACTION_MASK, DONE, MASKS,
        MEMORY, NEXT_VECTOR_OBS, VECTOR_OBS,
    },
    network::{ActionSpec, Critic, ObservationSpec, StreamValues},
    opt::Optimizer,
    policy::SacPolicy,
    util::track,
    AgentBuffer, SacError,
};
use anyhow::{ensure, Result};
use border_core::record::{Record, RecordValue};
use candle_core::{Device, Tensor, TensorId, Var};
use log::{debug, info, trace};
use std::{
    collections::{BTreeMap, HashMap},
    convert::TryInto,
};

fn detach_values(values: &StreamValues) -> StreamValues {
    values
        .iter()
        .map(|(name, v)| (name.clone(), v.detach()))
        .collect()
}

/// Splits concatenated vector observations into one tensor per observation.
fn split_vector_obs(xs: &Tensor, vector_sizes: &[usize]) -> Result<Vec<Tensor>> {
    let mut start = 0;
    vector_sizes
        .iter()
        .map(|size| {
            let obs = xs.narrow(1, start, *size)?;
            start += size;
            Ok(obs)
        })
        .collect()
}

fn vector_obs(
    batch: &AgentBuffer,
    key: &str,
    obs_spec: &ObservationSpec,
    device: &Device,
) -> Result<Vec<Tensor>> {
    match obs_spec.vector_sizes.is_empty() {
        true => Ok(vec![]),
        false => split_vector_obs(&batch.tensor(key, device)?, &obs_spec.vector_sizes),
    }
}

fn visual_obs(
    batch: &AgentBuffer,
    key: fn(usize) -> String,
    obs_spec: &ObservationSpec,
    device: &Device,
) -> Result<Vec<Tensor>> {
    obs_spec
        .camera_resolutions
        .iter()
        .enumerate()
        .map(|(i, res)| {
            let xs = batch.tensor(&key(i), device)?;
            let n = xs.dim(0)?;
            Ok(xs.reshape((n, res.num_channels, res.height, res.width))?)
        })
        .collect()
}

/// Checks that no variable belongs to two parameter groups.
pub(crate) fn audit_parameter_groups(groups: &[(&str, &[Var])]) -> Result<()> {
    let mut owners: HashMap<TensorId, &str> = HashMap::new();
    for (group, vars) in groups.iter() {
        for var in vars.iter() {
            if let Some(owner) = owners.insert(var.as_tensor().id(), *group) {
                if owner != *group {
                    return Err(
                        SacError::ParameterGroupOverlap(owner.to_string(), group.to_string()).into(),
                    );
                }
            }
        }
    }
    Ok(())
}

fn log_shapes(group: &str, vars: &[Var]) {
    for var in vars.iter() {
        debug!("{} parameter {:?}", group, var.as_tensor().shape());
    }
}

/// Soft actor-critic optimizer.
///
/// Owns the twin Q networks, the target network of the policy critic, the
/// entropy coefficients and the optimizers of three disjoint parameter groups:
///
/// * policy: the variables returned by [`SacPolicy::policy_vars`],
/// * value: the twin Q networks and the policy critic,
/// * entropy: the log entropy coefficients.
///
/// The target network starts as a copy of the policy critic and follows it by
/// Polyak averaging after each update.
pub struct SacOptimizer<P: SacPolicy> {
    policy: P,
    twin_q: TwinQNetwork,
    target: Critic,
    ent_coef: EntCoef,
    strategy: Box<dyn ActionStrategy>,
    policy_opt: Optimizer,
    value_opt: Optimizer,
    reward_signals: BTreeMap<String, RewardSignalConfig>,
    tau: f64,
    device: Device,
}

impl<P: SacPolicy> SacOptimizer<P> {
    /// Constructs [`SacOptimizer`] training `policy`.
    ///
    /// The reward streams of the configuration must be those of the policy critic.
    pub fn new(policy: P, config: SacOptimizerConfig) -> Result<Self> {
        let device: Device = match config.device {
            Some(device) => device.try_into()?,
            None => policy.device().clone(),
        };
        let stream_names = config.stream_names();
        let critic_streams = policy.critic().stream_names();
        if stream_names != critic_streams {
            return Err(SacError::StreamMismatch {
                expected: stream_names,
                found: critic_streams,
            }
            .into());
        }
        ensure!(
            (0.0..=1.0).contains(&config.tau),
            "tau must be in [0, 1], got {}",
            config.tau
        );

        let action_spec = policy.action_spec().clone();
        action_spec.validate()?;
        let obs_spec = policy.observation_spec();
        let settings = policy.network_settings();

        let twin_q = TwinQNetwork::build(&stream_names, obs_spec, settings, &action_spec, &device)?;
        let target = Critic::build(&stream_names, obs_spec, settings, &device)?;
        track(target.varmap(), policy.critic().varmap(), 1.0)?;

        let strategy: Box<dyn ActionStrategy> = match &action_spec {
            ActionSpec::Continuous(dim) => Box::new(ContinuousStrategy::new(
                *dim,
                config.continuous_target_entropy_scale,
            )),
            ActionSpec::Discrete(branch_sizes) => Box::new(DiscreteStrategy::new(
                branch_sizes,
                config.discrete_target_entropy_scale,
            )),
        };
        let ent_coef = EntCoef::new(
            strategy.target_entropy().len(),
            config.init_entcoef,
            &config.optimizer,
            &device,
        )?;

        let policy_vars = policy.policy_vars();
        let value_vars: Vec<Var> = twin_q
            .vars()
            .into_iter()
            .chain(policy.critic().vars())
            .collect();
        let entropy_vars = ent_coef.vars();
        audit_parameter_groups(&[
            ("policy", policy_vars.as_slice()),
            ("value", value_vars.as_slice()),
            ("entropy", entropy_vars.as_slice()),
        ])?;
        log_shapes("value", &value_vars);
        log_shapes("policy", &policy_vars);
        info!(
            "Parameter groups: {} policy, {} value, {} entropy",
            policy_vars.len(),
            value_vars.len(),
            entropy_vars.len()
        );
        info!("Target entropy: {:?}", strategy.target_entropy());

        let policy_opt = config.optimizer.build(policy_vars)?;
        let value_opt = config.optimizer.build(value_vars)?;

        Ok(Self {
            policy,
            twin_q,
            target,
            ent_coef,
            strategy,
            policy_opt,
            value_opt,
            reward_signals: config.reward_signals,
            tau: config.tau,
            device,
        })
    }

    /// Performs one SAC update with a batch of `num_sequences` sequences.
    ///
    /// Returns the losses and the mean entropy coefficient. A non-finite
    /// value loss aborts the update with [`SacError::NonFiniteValueLoss`]
    /// before any parameter changes.
    pub fn update(&mut self, batch: &AgentBuffer, num_sequences: usize) -> Result<Record> {
        trace!("Gather batch of {} sequences", num_sequences);
        let device = self.device.clone();
        let seq_len = self.policy.sequence_length();
        let action_spec = self.policy.action_spec().clone();
        let obs_spec = self.policy.observation_spec().clone();

        let rewards = self
            .reward_signals
            .keys()
            .map(|name| Ok((name.clone(), batch.scalar_tensor(&rewards_key(name), &device)?)))
            .collect::<Result<StreamValues>>()?;
        let vec_obs = vector_obs(batch, VECTOR_OBS, &obs_spec, &device)?;
        let next_vec_obs = vector_obs(batch, NEXT_VECTOR_OBS, &obs_spec, &device)?;
        let vis_obs = visual_obs(batch, visual_obs_key, &obs_spec, &device)?;
        let next_vis_obs = visual_obs(batch, next_visual_obs_key, &obs_spec, &device)?;
        let actions = batch.tensor(ACTIONS, &device)?;
        let act_masks = match !action_spec.is_continuous() && batch.contains_key(ACTION_MASK) {
            true => Some(batch.tensor(ACTION_MASK, &device)?),
            false => None,
        };
        let memories = match batch.contains_key(MEMORY) {
            true => {
                let memories = batch.strided_tensor(MEMORY, seq_len, &device)?;
                ensure!(
                    memories.dim(0)? == num_sequences,
                    "Expected memories of {} sequences, got {}",
                    num_sequences,
                    memories.dim(0)?
                );
                Some(memories.unsqueeze(0)?)
            }
            false => None,
        };
        let loss_masks = batch.scalar_tensor(MASKS, &device)?;
        let dones = batch.scalar_tensor(DONE, &device)?;

        trace!("Copy normalization");
        self.twin_q.copy_normalization(self.policy.network_body())?;
        self.target
            .network_body_mut()
            .copy_normalization(self.policy.network_body())?;

        trace!("Sample actions");
        let sampled = self.policy.sample_actions(
            &vec_obs,
            &vis_obs,
            act_masks.as_ref(),
            memories.as_ref(),
            seq_len,
            !action_spec.is_continuous(),
        )?;

        trace!("Forward Q networks");
        let (q1p_out, q2p_out, q1_stream, q2_stream) = match action_spec.is_continuous() {
            true => {
                let (q1p, q2p) = self.twin_q.forward(&vec_obs, &vis_obs, Some(&sampled.actions))?;
                let (q1, q2) = self.twin_q.forward(&vec_obs, &vis_obs, Some(&actions))?;
                (q1p, q2p, q1, q2)
            }
            false => {
                let (q1_out, q2_out) = self.twin_q.forward(&vec_obs, &vis_obs, None)?;
                let q1 = self.strategy.condense_q(&q1_out, &actions)?;
                let q2 = self.strategy.condense_q(&q2_out, &actions)?;
                (detach_values(&q1_out), detach_values(&q2_out), q1, q2)
            }
        };

        trace!("Forward target network");
        let target_values = detach_values(&self.target.forward(&next_vec_obs, &next_vis_obs)?);

        trace!("Compute losses");
        let strategy = self.strategy.as_ref();
        let alpha = self.ent_coef.alpha()?;
        let (q1_loss, q2_loss) = sac_q_loss(
            &q1_stream,
            &q2_stream,
            &target_values,
            &dones,
            &rewards,
            &self.reward_signals,
            &loss_masks,
        )?;
        let value_loss = sac_value_loss(
            strategy,
            &sampled.log_probs,
            &sampled.values,
            &q1p_out,
            &q2p_out,
            &alpha,
            &loss_masks,
        )?;
        let policy_loss =
            sac_policy_loss(strategy, &sampled.log_probs, &q1p_out, &alpha, &loss_masks)?;
        let entropy_loss = sac_entropy_loss(
            strategy,
            &sampled.log_probs,
            self.ent_coef.log_ent_coef(),
            &loss_masks,
        )?;
        let total_value_loss = ((&q1_loss + &q2_loss)? + &value_loss)?;

        trace!("Optimizer steps");
        self.policy_opt.backward_step(&policy_loss)?;
        self.value_opt.backward_step(&total_value_loss)?;
        self.ent_coef.backward_step(&entropy_loss)?;

        trace!("Soft update of the target network");
        track(self.target.varmap(), self.policy.critic().varmap(), self.tau)?;

        Ok(Record::from_slice(&[
            (
                "Losses/Policy Loss",
                RecordValue::Scalar(policy_loss.to_scalar::<f32>()?.abs()),
            ),
            (
                "Losses/Value Loss",
                RecordValue::Scalar(value_loss.to_scalar::<f32>()?),
            ),
            (
                "Losses/Q1 Loss",
                RecordValue::Scalar(q1_loss.to_scalar::<f32>()?),
            ),
            (
                "Losses/Q2 Loss",
                RecordValue::Scalar(q2_loss.to_scalar::<f32>()?),
            ),
            (
                "Policy/Entropy Coeff",
                RecordValue::Scalar(self.ent_coef.mean_alpha()?),
            ),
        ]))
    }

    /// Updates the reward providers.
    ///
    /// SAC does not train reward providers, so the returned record is empty.
    pub fn update_reward_signals(
        &mut self,
        _reward_signal_minibatches: &BTreeMap<String, AgentBuffer>,
        _num_sequences: usize,
    ) -> Result<Record> {
        Ok(Record::empty())
    }

    /// Policy being trained.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Mutable policy, e.g. to update its normalizers.
    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    /// Twin Q networks.
    pub fn twin_q(&self) -> &TwinQNetwork {
        &self.twin_q
    }

    /// Target network.
    pub fn target(&self) -> &Critic {
        &self.target
    }

    /// Entropy coefficients.
    pub fn ent_coef(&self) -> &EntCoef {
        &self.ent_coef
    }

    /// Continuous or discrete variant of the losses.
    pub fn strategy(&self) -> &dyn ActionStrategy {
        self.strategy.as_ref()
    }

    /// Soft update coefficient.
    pub fn tau(&self) -> f64 {
        self.tau
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        network::{NetworkSettings, ObservationSpec},
        policy::{MlpPolicy, MlpPolicyConfig},
        util::snapshot,
    };
    use candle_core::DType;

    fn policy() -> Result<MlpPolicy> {
        let config = MlpPolicyConfig::new(ObservationSpec::vector(3), ActionSpec::Continuous(2))
            .network_settings(NetworkSettings::default().hidden_units(8));
        MlpPolicy::build(config)
    }

    #[test]
    fn test_audit_parameter_groups() -> Result<()> {
        let a = Var::zeros(1, DType::F32, &Device::Cpu)?;
        let b = Var::zeros(1, DType::F32, &Device::Cpu)?;
        let policy_vars = vec![a.clone()];
        assert!(audit_parameter_groups(&[
            ("policy", policy_vars.as_slice()),
            ("value", &[b.clone()][..])
        ])
        .is_ok());

        let value_vars = vec![b, a];
        let err = audit_parameter_groups(&[
            ("policy", policy_vars.as_slice()),
            ("value", value_vars.as_slice()),
        ])
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<SacError>(),
            Some(&SacError::ParameterGroupOverlap(
                "policy".to_string(),
                "value".to_string()
            ))
        );
        Ok(())
    }

    #[test]
    fn test_target_starts_as_copy_of_policy_critic() -> Result<()> {
        let opt = SacOptimizer::new(policy()?, SacOptimizerConfig::default())?;
        let source = snapshot(opt.policy().critic().varmap())?;
        let target = snapshot(opt.target().varmap())?;
        assert_eq!(source.len(), target.len());
        for ((k1, t1), (k2, t2)) in source.iter().zip(target.iter()) {
            assert_eq!(k1, k2);
            assert_eq!(
                t1.flatten_all()?.to_vec1::<f32>()?,
                t2.flatten_all()?.to_vec1::<f32>()?
            );
        }
        assert_eq!(opt.strategy().target_entropy(), &[-2.0]);
        assert_eq!(opt.ent_coef().alpha()?.dims(), &[1]);
        Ok(())
    }

    fn values(vars: &[(String, Tensor)]) -> Result<Vec<Vec<f32>>> {
        vars.iter()
            .map(|(_, t)| Ok(t.flatten_all()?.to_vec1::<f32>()?))
            .collect()
    }

    #[test]
    fn test_policy_step_leaves_q_networks_unchanged() -> Result<()> {
        let mut opt = SacOptimizer::new(policy()?, SacOptimizerConfig::default())?;
        let obs = Tensor::randn(0f32, 1.0, (4, 3), &Device::Cpu)?;
        let loss_masks = Tensor::ones(4, DType::F32, &Device::Cpu)?;

        // Q1 is evaluated with gradient at the sampled actions
        let sampled = opt
            .policy
            .sample_actions(&[obs.clone()], &[], None, None, 1, false)?;
        let (q1p_out, _) = opt.twin_q.forward(&[obs], &[], Some(&sampled.actions))?;
        let alpha = opt.ent_coef.alpha()?;
        let policy_loss = sac_policy_loss(
            opt.strategy.as_ref(),
            &sampled.log_probs,
            &q1p_out,
            &alpha,
            &loss_masks,
        )?;
        let grads = policy_loss.backward()?;
        assert!(opt
            .twin_q
            .vars()
            .iter()
            .any(|v| grads.get(v.as_tensor()).is_some()));

        let twin = values(&snapshot(opt.twin_q().varmap())?)?;
        let critic = values(&snapshot(opt.policy().critic().varmap())?)?;
        let policy_vars: Vec<Vec<f32>> = opt
            .policy()
            .policy_vars()
            .iter()
            .map(|v| Ok(v.as_tensor().flatten_all()?.to_vec1::<f32>()?))
            .collect::<Result<_>>()?;

        opt.policy_opt.backward_step(&policy_loss)?;

        assert_eq!(twin, values(&snapshot(opt.twin_q().varmap())?)?);
        assert_eq!(critic, values(&snapshot(opt.policy().critic().varmap())?)?);
        let updated = opt
            .policy()
            .policy_vars()
            .iter()
            .map(|v| Ok(v.as_tensor().flatten_all()?.to_vec1::<f32>()?))
            .collect::<Result<Vec<Vec<f32>>>>()?;
        assert_ne!(policy_vars, updated);
        Ok(())
    }

    #[test]
    fn test_stream_mismatch() -> Result<()> {
        let config = SacOptimizerConfig::default()
            .reward_signal("curiosity", RewardSignalConfig::new(0.9));
        let err = SacOptimizer::new(policy()?, config).err().ok_or_else(|| anyhow::anyhow!("no error"))?;
        assert_eq!(
            err.downcast_ref::<SacError>(),
            Some(&SacError::StreamMismatch {
                expected: vec!["curiosity".to_string(), "extrinsic".to_string()],
                found: vec!["extrinsic".to_string()],
            })
        );
        Ok(())
    }
}
