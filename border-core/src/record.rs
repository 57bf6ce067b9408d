//! Named values produced by an optimization step.
//!
//! An optimizer returns a [`Record`] from each update. Keys are fixed metric
//! names such as `"Losses/Value Loss"`, values are [`RecordValue`]s.
//!
//! ```rust
//! use border_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("Losses/Q1 Loss", 0.25);
//! record.insert("Policy/Entropy Coeff", RecordValue::Scalar(1.0));
//!
//! assert_eq!(record.get_scalar("Losses/Q1 Loss").unwrap(), 0.25);
//! ```
mod base;

pub use base::{Record, RecordValue};
