//! # castor-historical
//!
//! The attribute history engine of the Castor replication core: per-value
//! historical records, single- and multi-valued conflict resolution, the
//! textual historical encoding stored on entries, and the CSN ordering rule
//! used to index that encoding.
//!
//! Replicas apply the same logical changes in different wall-clock orders;
//! this crate guarantees they converge to the same attribute values and the
//! same history, using only CSN comparisons.

pub mod attribute;
pub mod encoding;
pub mod entry_history;
pub mod index_key;
pub mod value_history;

pub use attribute::{AttributeHistory, ReplayAction, ReplayOutcome};
pub use encoding::{HistoricalRecord, HistoryKind};
pub use entry_history::EntryHistory;
pub use index_key::{CsnIndexKey, CsnOrderingRule};
pub use value_history::ValueHistory;
