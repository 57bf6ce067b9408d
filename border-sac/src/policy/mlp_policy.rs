//! Feed-forward policy with its own value critic.
use super::{MlpPolicyConfig, SacPolicy, SampledActions};
use crate::{
    network::{ActionSpec, Critic, NetworkBody, NetworkSettings, ObservationSpec},
    util::{break_into_branches, normal_logp},
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor, Var, D};
use candle_nn::{linear, ops::log_softmax, Linear, Module, VarBuilder, VarMap};
use log::info;
use std::convert::TryInto;

/// Logit added to masked out choices.
const MASKED_LOGIT: f64 = -1e8;

/// Output layers producing the action distribution.
enum DistHead {
    /// Tanh-squashed Gaussian.
    Gaussian { mean: Linear, log_std: Linear },

    /// Independent categorical distribution per branch.
    Categorical {
        logits: Linear,
        branch_sizes: Vec<usize>,
    },
}

/// Feed-forward policy.
///
/// The network body and the distribution head live in one [`VarMap`] under the
/// `policy` prefix. The value [`Critic`] has its own variables.
pub struct MlpPolicy {
    config: MlpPolicyConfig,
    device: Device,
    varmap: VarMap,
    body: NetworkBody,
    head: DistHead,
    critic: Critic,
}

impl MlpPolicy {
    /// Constructs [`MlpPolicy`].
    pub fn build(config: MlpPolicyConfig) -> Result<Self> {
        config.action_spec.validate()?;
        let device: Device = config.device.try_into()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device).pp("policy");
        let body = NetworkBody::build(
            vb.pp("body"),
            &config.observation_spec,
            &config.network_settings,
            0,
        )?;
        let h = body.out_dim();
        let head = match &config.action_spec {
            ActionSpec::Continuous(dim) => DistHead::Gaussian {
                mean: linear(h, *dim, vb.pp("mean"))?,
                log_std: linear(h, *dim, vb.pp("log_std"))?,
            },
            ActionSpec::Discrete(branch_sizes) => DistHead::Categorical {
                logits: linear(h, config.action_spec.total_size(), vb.pp("logits"))?,
                branch_sizes: branch_sizes.clone(),
            },
        };
        let critic = Critic::build(
            &config.reward_streams,
            &config.observation_spec,
            &config.network_settings,
            &device,
        )?;
        info!(
            "Policy with {} variables, critic with {} variables",
            varmap.all_vars().len(),
            critic.vars().len()
        );

        Ok(Self {
            config,
            device,
            varmap,
            body,
            head,
            critic,
        })
    }

    /// Folds vector observations into the normalizers of the policy and its critic.
    pub fn update_normalization(&mut self, vec_obs: &[Tensor]) -> Result<()> {
        self.body.update_normalization(vec_obs)?;
        self.critic.network_body_mut().update_normalization(vec_obs)
    }

    /// Variables of the policy, excluding its critic.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    fn sample_gaussian(
        &self,
        mean: &Linear,
        log_std: &Linear,
        hidden: &Tensor,
    ) -> Result<(Tensor, Tensor, Tensor)> {
        let mu = mean.forward(hidden)?;
        let lstd = log_std
            .forward(hidden)?
            .clamp(self.config.min_log_std, self.config.max_log_std)?;
        let eps = mu.randn_like(0.0, 1.0)?;
        let z = (&mu + (lstd.exp()? * &eps)?)?;
        let actions = z.tanh()?;

        // log N(z; mu, std) with the Jacobian of tanh
        let log_jacobian = actions.sqr()?.affine(-1.0, 1.0 + 1e-6)?.log()?;
        let log_probs = ((normal_logp(&eps)? - &lstd)? - log_jacobian)?;
        let entropies = (lstd + (0.5 + 0.5 * (2.0 * std::f64::consts::PI).ln()))?.sum(D::Minus1)?;

        Ok((actions, log_probs, entropies))
    }

    fn sample_categorical(
        &self,
        logits: &Linear,
        branch_sizes: &[usize],
        hidden: &Tensor,
        masks: Option<&Tensor>,
        all_log_probs: bool,
    ) -> Result<(Tensor, Tensor, Tensor)> {
        let logits = logits.forward(hidden)?;
        let logits = match masks {
            Some(masks) => (&logits + (masks.affine(-1.0, 1.0)? * MASKED_LOGIT)?)?,
            None => logits,
        };

        let mut actions = Vec::with_capacity(branch_sizes.len());
        let mut log_probs = Vec::with_capacity(branch_sizes.len());
        let mut entropies = Vec::with_capacity(branch_sizes.len());
        for branch in break_into_branches(&logits, branch_sizes)? {
            let lp = log_softmax(&branch, D::Minus1)?;

            // Gumbel-max sampling
            let u = lp.rand_like(1e-7, 1.0 - 1e-7)?;
            let gumbel = u.log()?.neg()?.log()?.neg()?;
            let ix = (&lp + gumbel)?.argmax_keepdim(D::Minus1)?;

            entropies.push((lp.exp()? * &lp)?.sum(D::Minus1)?.neg()?);
            match all_log_probs {
                true => log_probs.push(lp),
                false => log_probs.push(lp.gather(&ix, D::Minus1)?),
            }
            actions.push(ix);
        }

        Ok((
            Tensor::cat(&actions, 1)?,
            Tensor::cat(&log_probs, 1)?,
            Tensor::stack(&entropies, 0)?.sum(0)?,
        ))
    }
}

impl SacPolicy for MlpPolicy {
    fn action_spec(&self) -> &ActionSpec {
        &self.config.action_spec
    }

    fn observation_spec(&self) -> &ObservationSpec {
        &self.config.observation_spec
    }

    fn network_settings(&self) -> &NetworkSettings {
        &self.config.network_settings
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn sample_actions(
        &self,
        vec_obs: &[Tensor],
        vis_obs: &[Tensor],
        masks: Option<&Tensor>,
        memories: Option<&Tensor>,
        _seq_len: usize,
        all_log_probs: bool,
    ) -> Result<SampledActions> {
        let hidden = self.body.forward(vec_obs, vis_obs, None)?;
        let (actions, log_probs, entropies) = match &self.head {
            DistHead::Gaussian { mean, log_std } => self.sample_gaussian(mean, log_std, &hidden)?,
            DistHead::Categorical {
                logits,
                branch_sizes,
            } => self.sample_categorical(logits, branch_sizes, &hidden, masks, all_log_probs)?,
        };
        let values = self.critic.forward(vec_obs, vis_obs)?;

        Ok(SampledActions {
            actions,
            log_probs,
            entropies,
            values,
            memories: memories.cloned(),
        })
    }

    fn network_body(&self) -> &NetworkBody {
        &self.body
    }

    fn critic(&self) -> &Critic {
        &self.critic
    }

    fn policy_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }
}
