//! Configuration of SAC optimizer.
use crate::{opt::OptimizerConfig, Device};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Discounting of a reward stream.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct RewardSignalConfig {
    /// Discount factor.
    pub gamma: f32,

    /// If `true`, episode termination zeroes the bootstrap term.
    #[serde(default = "default_use_terminal_states")]
    pub use_terminal_states: bool,
}

fn default_use_terminal_states() -> bool {
    true
}

impl Default for RewardSignalConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            use_terminal_states: true,
        }
    }
}

impl RewardSignalConfig {
    /// Creates a configuration with the given discount factor.
    pub fn new(gamma: f32) -> Self {
        Self {
            gamma,
            ..Default::default()
        }
    }

    /// Sets whether termination zeroes the bootstrap term.
    pub fn use_terminal_states(mut self, v: bool) -> Self {
        self.use_terminal_states = v;
        self
    }
}

/// Configuration of [`SacOptimizer`](super::SacOptimizer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct SacOptimizerConfig {
    /// Optimizer of each parameter group.
    pub optimizer: OptimizerConfig,

    /// Coefficient of the Polyak averaging of the target network.
    pub tau: f64,

    /// Initial value of the entropy coefficients.
    pub init_entcoef: f64,

    /// Reward streams keyed by name.
    pub reward_signals: BTreeMap<String, RewardSignalConfig>,

    /// Scale of the target entropy `scale * ln(n)` of a discrete branch with `n` choices.
    pub discrete_target_entropy_scale: f64,

    /// Scale of the target entropy `-scale * dim` of continuous actions.
    pub continuous_target_entropy_scale: f64,

    /// Device of the critics, must be the device of the policy.
    pub device: Option<Device>,
}

impl Default for SacOptimizerConfig {
    fn default() -> Self {
        let mut reward_signals = BTreeMap::new();
        reward_signals.insert("extrinsic".to_string(), RewardSignalConfig::default());

        Self {
            optimizer: OptimizerConfig::default(),
            tau: 0.005,
            init_entcoef: 1.0,
            reward_signals,
            discrete_target_entropy_scale: 0.2,
            continuous_target_entropy_scale: 1.0,
            device: None,
        }
    }
}

impl SacOptimizerConfig {
    /// Sets the optimizer configuration.
    pub fn optimizer(mut self, v: OptimizerConfig) -> Self {
        self.optimizer = v;
        self
    }

    /// Sets the learning rate of all optimizers.
    pub fn learning_rate(mut self, v: f64) -> Self {
        self.optimizer = self.optimizer.learning_rate(v);
        self
    }

    /// Sets the soft update coefficient.
    pub fn tau(mut self, v: f64) -> Self {
        self.tau = v;
        self
    }

    /// Sets the initial entropy coefficient.
    pub fn init_entcoef(mut self, v: f64) -> Self {
        self.init_entcoef = v;
        self
    }

    /// Replaces the reward streams.
    pub fn reward_signals(mut self, v: BTreeMap<String, RewardSignalConfig>) -> Self {
        self.reward_signals = v;
        self
    }

    /// Adds or replaces a reward stream.
    pub fn reward_signal(mut self, name: impl Into<String>, v: RewardSignalConfig) -> Self {
        self.reward_signals.insert(name.into(), v);
        self
    }

    /// Sets the scale of the discrete target entropy.
    pub fn discrete_target_entropy_scale(mut self, v: f64) -> Self {
        self.discrete_target_entropy_scale = v;
        self
    }

    /// Sets the scale of the continuous target entropy.
    pub fn continuous_target_entropy_scale(mut self, v: f64) -> Self {
        self.continuous_target_entropy_scale = v;
        self
    }

    /// Sets the device. If not set, the device of the policy is used.
    pub fn device(mut self, v: Device) -> Self {
        self.device = Some(v);
        self
    }

    /// Names of the reward streams in sorted order.
    pub fn stream_names(&self) -> Vec<String> {
        self.reward_signals.keys().cloned().collect()
    }

    /// Loads [`SacOptimizerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`SacOptimizerConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_sac_optimizer_config() -> Result<()> {
        let config = SacOptimizerConfig::default()
            .tau(0.01)
            .learning_rate(1e-3)
            .reward_signal("curiosity", RewardSignalConfig::new(0.9).use_terminal_states(false));

        let dir = TempDir::new("sac_optimizer")?;
        let path = dir.path().join("sac_optimizer.yaml");
        println!("{:?}", path);

        config.save(&path)?;
        let config_ = SacOptimizerConfig::load(&path)?;
        assert_eq!(config, config_);
        assert_eq!(config_.stream_names(), vec!["curiosity", "extrinsic"]);
        Ok(())
    }

    #[test]
    fn test_defaults_from_yaml() -> Result<()> {
        let yaml = r#"
optimizer:
  Adam:
    lr: 0.0003
tau: 0.005
init_entcoef: 0.5
reward_signals:
  extrinsic:
    gamma: 0.95
discrete_target_entropy_scale: 0.2
continuous_target_entropy_scale: 1.0
device: ~
"#;
        let config: SacOptimizerConfig = serde_yaml::from_str(yaml)?;
        assert!(config.reward_signals["extrinsic"].use_terminal_states);
        assert_eq!(config.init_entcoef, 0.5);
        Ok(())
    }
}
