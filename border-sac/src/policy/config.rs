//! Configuration of [`MlpPolicy`](super::MlpPolicy).
use crate::{
    network::{ActionSpec, NetworkSettings, ObservationSpec},
    Device,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

fn default_reward_streams() -> Vec<String> {
    vec!["extrinsic".to_string()]
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`MlpPolicy`](super::MlpPolicy).
pub struct MlpPolicyConfig {
    /// Observations.
    pub observation_spec: ObservationSpec,

    /// Action space.
    pub action_spec: ActionSpec,

    /// Sizing of the networks.
    #[serde(default)]
    pub network_settings: NetworkSettings,

    /// Names of the reward streams of the policy critic.
    #[serde(default = "default_reward_streams")]
    pub reward_streams: Vec<String>,

    /// Lower bound of the log standard deviation of continuous actions.
    pub min_log_std: f64,

    /// Upper bound of the log standard deviation of continuous actions.
    pub max_log_std: f64,

    /// Device of the parameters.
    #[serde(default)]
    pub device: Device,
}

impl MlpPolicyConfig {
    /// Creates a configuration with default settings.
    pub fn new(observation_spec: ObservationSpec, action_spec: ActionSpec) -> Self {
        Self {
            observation_spec,
            action_spec,
            network_settings: NetworkSettings::default(),
            reward_streams: default_reward_streams(),
            min_log_std: -20.0,
            max_log_std: 2.0,
            device: Device::default(),
        }
    }

    /// Sets the network settings.
    pub fn network_settings(mut self, v: NetworkSettings) -> Self {
        self.network_settings = v;
        self
    }

    /// Sets the names of the reward streams.
    pub fn reward_streams(mut self, v: Vec<String>) -> Self {
        self.reward_streams = v;
        self
    }

    /// Sets the minimum value of log std.
    pub fn min_log_std(mut self, v: f64) -> Self {
        self.min_log_std = v;
        self
    }

    /// Sets the maximum value of log std.
    pub fn max_log_std(mut self, v: f64) -> Self {
        self.max_log_std = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Loads [`MlpPolicyConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`MlpPolicyConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
