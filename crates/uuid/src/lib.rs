//! Identifier utilities for inpatient episodes.
//!
//! Two identifiers live here:
//!
//! - [`ShardableUuid`]: the storage identifier for episodes and ledger entries. Always rendered
//!   in canonical form, **32 lowercase hexadecimal characters** with no hyphens, and used to
//!   derive a sharded directory: `parent/<u[0..2]>/<u[2..4]>/<u>/`.
//! - [`AdmissionNumber`]: the human-facing admission reference printed on wristbands and
//!   paperwork, `IPD-YYYYMMDD-XXXXXX`.
//!
//! Externally supplied identifiers must already be canonical; nothing here normalises
//! hyphenated or uppercase UUIDs.

mod admission;
mod shardable;

pub use admission::AdmissionNumber;
pub use shardable::{ShardableUuid, Uuid};

/// Error type for identifier parsing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UuidError {
    #[error("invalid identifier: {0}")]
    InvalidInput(String),
}

pub type UuidResult<T> = Result<T, UuidError>;
