//! Configuration for the replication core.
//!
//! # Examples
//!
//! ```
//! use castor_core::ReplicationConfig;
//!
//! let config = ReplicationConfig::default();
//! assert!(config.replay_threads >= 1);
//! assert_eq!(config.replay_queue_capacity, 10_000);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the replay engine and the protocol layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Number of replay worker tasks. Default: available parallelism.
    pub replay_threads: usize,
    /// Maximum queued remote updates before enqueue blocks. Default: 10_000.
    pub replay_queue_capacity: usize,
    /// Bounded wait of one queue poll, in milliseconds; keeps shutdown
    /// observation prompt. Default: 100.
    pub replay_poll_timeout_ms: u64,
    /// Connection/handshake budget for the externally-owned transport, in
    /// milliseconds. Default: 5_000.
    pub connection_timeout_ms: u64,
}

impl ReplicationConfig {
    /// The queue poll timeout as a `Duration`.
    pub fn replay_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.replay_poll_timeout_ms)
    }

    /// The connection timeout as a `Duration`.
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            replay_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            replay_queue_capacity: 10_000,
            replay_poll_timeout_ms: 100,
            connection_timeout_ms: 5_000,
        }
    }
}
