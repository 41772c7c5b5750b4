//! # castor-core
//!
//! Foundation crate for the Castor multi-master replication engine.
//! Defines the CSN logical clock, the replica watermark, the DN/entry/
//! modification model, replication update messages, errors, and config.
//! Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod csn;
pub mod dn;
pub mod entry;
pub mod errors;
pub mod generation;
pub mod message;
pub mod modification;
pub mod schema;
pub mod state;

// Re-export the most commonly used types at the crate root.
pub use config::ReplicationConfig;
pub use csn::{Csn, CsnGenerator, ReplicaId};
pub use dn::Dn;
pub use entry::{Attribute, AttributeDescription, Entry};
pub use errors::{DecodeError, ReplayError, ReplicationError, ReplicationResult};
pub use message::{AddMessage, DeleteMessage, ModifyDnMessage, ModifyMessage, UpdateMessage};
pub use modification::{Modification, ModificationType};
pub use schema::Schema;
pub use state::ServerState;
