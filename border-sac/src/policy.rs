//! Policy collaborator of the SAC optimizer.
mod base;
mod config;
mod mlp_policy;
pub use base::{SacPolicy, SampledActions};
pub use config::MlpPolicyConfig;
pub use mlp_policy::MlpPolicy;
