//! Shapes of observations and actions, and sizing of networks.
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Settings of the recurrent memory of a policy.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MemorySettings {
    /// Number of steps in a sequence.
    pub sequence_length: usize,

    /// Size of the memory vector.
    pub memory_size: usize,
}

/// Sizing of the networks of a policy and its critics.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct NetworkSettings {
    /// Number of units in each hidden layer.
    pub hidden_units: usize,

    /// Number of hidden layers.
    pub num_layers: usize,

    /// If `true`, vector observations are normalized with running statistics.
    pub normalize: bool,

    /// Recurrent memory, `None` for feed-forward policies.
    pub memory: Option<MemorySettings>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            hidden_units: 128,
            num_layers: 2,
            normalize: false,
            memory: None,
        }
    }
}

impl NetworkSettings {
    /// Sets the number of hidden units.
    pub fn hidden_units(mut self, v: usize) -> Self {
        self.hidden_units = v;
        self
    }

    /// Sets the number of hidden layers.
    pub fn num_layers(mut self, v: usize) -> Self {
        self.num_layers = v;
        self
    }

    /// Enables or disables observation normalization.
    pub fn normalize(mut self, v: bool) -> Self {
        self.normalize = v;
        self
    }

    /// Sets the recurrent memory.
    pub fn memory(mut self, v: Option<MemorySettings>) -> Self {
        self.memory = v;
        self
    }

    /// Number of steps in a sequence, 1 without memory.
    pub fn sequence_length(&self) -> usize {
        self.memory.as_ref().map_or(1, |m| m.sequence_length)
    }
}

/// Resolution of a camera, observations are laid out as `[c, h, w]`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub struct CameraResolution {
    /// Height in pixels.
    pub height: usize,

    /// Width in pixels.
    pub width: usize,

    /// Number of channels.
    pub num_channels: usize,
}

impl CameraResolution {
    /// Number of values in a flattened observation.
    pub fn size(&self) -> usize {
        self.height * self.width * self.num_channels
    }
}

/// Observations fed to the networks.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct ObservationSpec {
    /// Sizes of the vector observations.
    pub vector_sizes: Vec<usize>,

    /// Resolutions of the cameras.
    #[serde(default)]
    pub camera_resolutions: Vec<CameraResolution>,
}

impl ObservationSpec {
    /// Spec with a single vector observation and no camera.
    pub fn vector(size: usize) -> Self {
        Self {
            vector_sizes: vec![size],
            camera_resolutions: vec![],
        }
    }

    /// Adds a camera.
    pub fn camera(mut self, resolution: CameraResolution) -> Self {
        self.camera_resolutions.push(resolution);
        self
    }
}

/// Action space of the agent.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum ActionSpec {
    /// Real-valued actions of the given dimension.
    Continuous(usize),

    /// Independent categorical branches with the given numbers of choices.
    Discrete(Vec<usize>),
}

impl ActionSpec {
    /// Returns `true` for continuous actions.
    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Continuous(_))
    }

    /// `[dim]` for continuous actions, branch sizes for discrete actions.
    pub fn act_size(&self) -> Vec<usize> {
        match self {
            Self::Continuous(dim) => vec![*dim],
            Self::Discrete(branches) => branches.clone(),
        }
    }

    /// Width of a discrete output covering every branch, or the action dimension.
    pub fn total_size(&self) -> usize {
        self.act_size().iter().sum()
    }

    /// Checks that the action space is not empty.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Continuous(dim) => ensure!(*dim > 0, "Continuous action dimension is zero"),
            Self::Discrete(branches) => {
                ensure!(!branches.is_empty(), "No discrete action branch");
                ensure!(
                    branches.iter().all(|n| *n > 0),
                    "Discrete action branch without choices"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_action_spec() {
        let spec = ActionSpec::Discrete(vec![3, 2]);
        assert!(!spec.is_continuous());
        assert_eq!(spec.total_size(), 5);
        assert!(spec.validate().is_ok());
        assert!(ActionSpec::Discrete(vec![3, 0]).validate().is_err());
        assert_eq!(ActionSpec::Continuous(4).act_size(), vec![4]);
    }

    #[test]
    fn test_settings_from_yaml() -> Result<()> {
        let yaml = r#"
hidden_units: 64
num_layers: 1
normalize: true
memory:
  sequence_length: 16
  memory_size: 32
"#;
        let settings: NetworkSettings = serde_yaml::from_str(yaml)?;
        assert_eq!(settings.sequence_length(), 16);
        assert_eq!(NetworkSettings::default().sequence_length(), 1);
        Ok(())
    }
}
