//! # castor-replication
//!
//! The causal replay half of the Castor replication core: tracks remote
//! changes awaiting replay, computes causal dependencies between them from
//! their target DNs, replays independent changes concurrently through a
//! bounded worker pool, and advances the per-replica watermark only over
//! contiguous committed prefixes.
//!
//! Also provides fake-operation reconstruction — regenerating replication
//! messages from stored entry + historical state when a replica asks for
//! changes older than the change log retains — and the process-wide registry
//! of replication domains.

pub mod backend;
pub mod domain;
pub mod fake_operation;
pub mod pending;
pub mod registry;
pub mod replay;

pub use backend::{MemoryBackend, ReplicaBackend};
pub use domain::ReplicationDomain;
pub use fake_operation::FakeOperation;
pub use pending::{PendingChange, PendingChanges, PendingOperation};
pub use registry::DomainRegistry;
pub use replay::{ReplayEngine, UpdateToReplay};
