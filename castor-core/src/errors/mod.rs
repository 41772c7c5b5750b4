//! Error types for the replication core.
//!
//! One thiserror enum per failure family, aggregated into
//! [`ReplicationError`]. Conflicts are never errors — every conflict branch
//! has a defined outcome — so these types only cover corruption, lookup
//! failures, and infrastructure faults.

mod decode_error;
mod replay_error;

pub use decode_error::DecodeError;
pub use replay_error::ReplayError;

/// Top-level error for the replication core.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Replay(#[from] ReplayError),
}

/// Result alias used across the workspace.
pub type ReplicationResult<T> = Result<T, ReplicationError>;
