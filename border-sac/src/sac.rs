//! Soft actor-critic (SAC) optimizer.
mod action_strategy;
mod base;
mod config;
mod ent_coef;
pub mod loss;
mod twin_critic;
pub use action_strategy::{ActionStrategy, ContinuousStrategy, DiscreteStrategy};
pub use base::SacOptimizer;
pub use config::{RewardSignalConfig, SacOptimizerConfig};
pub use ent_coef::EntCoef;
pub use twin_critic::TwinQNetwork;
