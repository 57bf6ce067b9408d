//! Soft actor-critic (SAC) optimizer implemented with
//! [candle](https://crates.io/crates/candle-core).
//!
//! The crate owns the parts of a SAC trainer that update parameters:
//!
//! * a pair of action-value networks ([`sac::TwinQNetwork`]),
//! * a state-value target network updated by Polyak averaging
//!   ([`network::Critic`], [`util::track`]),
//! * the learnable entropy coefficients ([`sac::EntCoef`]),
//! * the four SAC losses ([`sac::loss`]) and the update step that ties them
//!   together ([`sac::SacOptimizer`]).
//!
//! Action sampling is delegated to a policy implementing [`SacPolicy`].
//! [`MlpPolicy`] is a feed-forward implementation of it.
//! Experience is read from an [`AgentBuffer`].
pub mod buffer;
mod error;
pub mod mlp;
pub mod network;
pub mod opt;
pub mod policy;
pub mod sac;
pub mod util;
pub use buffer::AgentBuffer;
pub use error::SacError;
pub use policy::{MlpPolicy, MlpPolicyConfig, SacPolicy, SampledActions};
pub use sac::{SacOptimizer, SacOptimizerConfig};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

impl TryFrom<Device> for candle_core::Device {
    type Error = candle_core::Error;

    fn try_from(device: Device) -> Result<Self, Self::Error> {
        match device {
            Device::Cpu => Ok(candle_core::Device::Cpu),
            Device::Cuda(n) => candle_core::Device::new_cuda(n),
        }
    }
}
