//! Networks of the policy and the critics.
mod body;
mod critic;
mod encoder;
mod heads;
mod normalizer;
mod q_network;
mod settings;
pub use body::NetworkBody;
use candle_core::Tensor;
pub use critic::Critic;
pub use encoder::SimpleVisualEncoder;
pub use heads::ValueHeads;
pub use normalizer::Normalizer;
pub use q_network::QNetwork;
pub use settings::{
    ActionSpec, CameraResolution, MemorySettings, NetworkSettings, ObservationSpec,
};
use std::collections::BTreeMap;

/// Per-stream network outputs keyed by reward stream name.
pub type StreamValues = BTreeMap<String, Tensor>;
