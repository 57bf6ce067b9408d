//! Errors raised by the SAC optimizer.
use thiserror::Error;

/// Errors raised by the SAC optimizer.
///
/// Shape errors of the numeric backend are not wrapped; they reach the caller
/// as [`candle_core::Error`] through [`anyhow::Error`].
#[derive(Error, Debug, PartialEq)]
pub enum SacError {
    /// The state-value loss was NaN or infinite.
    ///
    /// Raised before any optimizer step, so no parameter was modified.
    #[error("Non-finite value loss: {0}")]
    NonFiniteValueLoss(f32),

    /// A field required by the update was not found in the batch.
    #[error("Missing key in experience batch: {0}")]
    MissingBatchKey(String),

    /// A parameter was found in more than one optimizer group.
    #[error("Parameter shared between optimizer groups: {0} and {1}")]
    ParameterGroupOverlap(String, String),

    /// Reward streams of the optimizer and the value heads of the policy differ.
    #[error("Reward streams {expected:?} do not match value heads {found:?}")]
    StreamMismatch {
        /// Streams configured in the optimizer.
        expected: Vec<String>,
        /// Streams of the policy's critic.
        found: Vec<String>,
    },
}
