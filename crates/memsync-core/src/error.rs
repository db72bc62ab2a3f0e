//! Error types for memsync core

use crate::clock::ReplicaId;
use thiserror::Error;

/// Core error types
///
/// A missing key is not an error: reads return `None` for absent or
/// tombstoned keys.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Malformed delta entry #{index}: {reason}")]
    MalformedDelta { index: usize, reason: String },

    #[error("Version clock of replica {replica_id} exhausted its counter range")]
    ClockOverflow { replica_id: ReplicaId },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for memsync core operations
pub type Result<T> = std::result::Result<T, Error>;
