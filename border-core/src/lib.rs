#![warn(missing_docs)]
//! Vocabulary shared by border crates.
//!
//! The optimizers in the workspace report their per-update statistics as a
//! [`record::Record`], a mapping from metric names to values that a trainer
//! hands to its stats writers.
pub mod error;
pub mod record;
