//! Attribute history engine.
//!
//! One `AttributeHistory` per attribute per entry, in a single-valued or
//! multi-valued variant. The engine has three entry points:
//!
//! - [`AttributeHistory::assign`] — unconditional state load, used when
//!   decoding stored historical metadata;
//! - [`AttributeHistory::process_local`] — applies a modification known not
//!   to conflict (a local operation, or a remote one already proven safe);
//! - [`AttributeHistory::replay`] — the conflict-aware path for remote
//!   changes, which returns a [`ReplayOutcome`] instead of mutating the
//!   caller's modification list.

pub mod multiple;
pub mod single;

use castor_core::csn::Csn;
use castor_core::entry::{AttributeDescription, Entry};
use castor_core::modification::Modification;
use castor_core::schema::Schema;

use crate::encoding::{HistoricalRecord, HistoryKind};

pub use multiple::MultiValueHistory;
pub use single::SingleValueHistory;

/// What the caller must do with the replayed modification.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayAction {
    /// Apply the modification unchanged.
    Keep,
    /// Apply this modification instead of the original.
    Rewrite(Modification),
    /// Discard the modification entirely.
    Drop,
}

/// Result of replaying one modification through the conflict engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    pub action: ReplayAction,
    /// True when the effect differs from plain application — the caller uses
    /// this to decide whether the client-visible result deviates from the
    /// no-conflict fast path.
    pub conflict: bool,
}

impl ReplayOutcome {
    pub(crate) fn keep() -> Self {
        Self {
            action: ReplayAction::Keep,
            conflict: false,
        }
    }

    pub(crate) fn drop_conflict() -> Self {
        Self {
            action: ReplayAction::Drop,
            conflict: true,
        }
    }

    pub(crate) fn rewrite(modification: Modification, conflict: bool) -> Self {
        Self {
            action: ReplayAction::Rewrite(modification),
            conflict,
        }
    }
}

/// Conflict-resolution state of one attribute of one entry.
#[derive(Debug, Clone)]
pub enum AttributeHistory {
    Single(SingleValueHistory),
    Multiple(MultiValueHistory),
}

impl AttributeHistory {
    /// Create the right variant for an attribute under the given schema.
    pub fn for_attribute(desc: AttributeDescription, schema: &Schema) -> Self {
        if schema.is_single_valued(&desc) {
            AttributeHistory::Single(SingleValueHistory::new(desc))
        } else {
            AttributeHistory::Multiple(MultiValueHistory::new(desc))
        }
    }

    /// Unconditional state load — the decode path. No conflict check.
    pub fn assign(&mut self, kind: HistoryKind, value: Option<&str>, csn: Csn) {
        match self {
            AttributeHistory::Single(h) => h.assign(kind, value, csn),
            AttributeHistory::Multiple(h) => h.assign(kind, value, csn),
        }
    }

    /// Apply a modification known not to conflict.
    pub fn process_local(&mut self, csn: Csn, modification: &Modification) {
        match self {
            AttributeHistory::Single(h) => h.process_local(csn, modification),
            AttributeHistory::Multiple(h) => h.process_local(csn, modification),
        }
    }

    /// Conflict-aware replay of a remote modification against the current
    /// entry state. The entry is read, never written; the caller applies the
    /// returned decision.
    pub fn replay(
        &mut self,
        csn: Csn,
        modification: &Modification,
        entry: &Entry,
    ) -> ReplayOutcome {
        match self {
            AttributeHistory::Single(h) => h.replay(csn, modification, entry),
            AttributeHistory::Multiple(h) => h.replay(csn, modification, entry),
        }
    }

    /// Encode the engine state as historical records, deterministically
    /// ordered.
    pub fn encode(&self) -> Vec<HistoricalRecord> {
        match self {
            AttributeHistory::Single(h) => h.encode(),
            AttributeHistory::Multiple(h) => h.encode(),
        }
    }

    /// The newest CSN recorded anywhere in this history.
    pub fn newest_csn(&self) -> Option<Csn> {
        match self {
            AttributeHistory::Single(h) => h.newest_csn(),
            AttributeHistory::Multiple(h) => h.newest_csn(),
        }
    }

    /// Forget state strictly older than `csn` (retention hook; the policy
    /// deciding `csn` lives outside the engine). Returns how many per-value
    /// records were dropped.
    pub fn purge_older_than(&mut self, csn: Csn) -> usize {
        match self {
            AttributeHistory::Single(h) => h.purge_older_than(csn),
            AttributeHistory::Multiple(h) => h.purge_older_than(csn),
        }
    }

    /// The attribute this history describes.
    pub fn desc(&self) -> &AttributeDescription {
        match self {
            AttributeHistory::Single(h) => h.desc(),
            AttributeHistory::Multiple(h) => h.desc(),
        }
    }
}
