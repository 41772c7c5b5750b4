//! Conflict resolution for single-valued attributes.
//!
//! A single-valued attribute has exactly one winner at any time. The state
//! is the last add time, the last delete time, the current value, and the
//! kind of the last applied modification. The last-mod kind exists for the
//! tie cases: an add and a delete of the same attribute share a CSN when
//! they come from the same originating operation.

use castor_core::csn::Csn;
use castor_core::entry::{Attribute, AttributeDescription, Entry};
use castor_core::modification::{Modification, ModificationType};

use crate::encoding::{HistoricalRecord, HistoryKind};

use super::ReplayOutcome;

/// History of one single-valued attribute.
#[derive(Debug, Clone)]
pub struct SingleValueHistory {
    desc: AttributeDescription,
    add_time: Option<Csn>,
    delete_time: Option<Csn>,
    value: Option<String>,
    last_mod: Option<HistoryKind>,
}

impl SingleValueHistory {
    /// Empty history for an attribute.
    pub fn new(desc: AttributeDescription) -> Self {
        Self {
            desc,
            add_time: None,
            delete_time: None,
            value: None,
            last_mod: None,
        }
    }

    /// The attribute this history describes.
    pub fn desc(&self) -> &AttributeDescription {
        &self.desc
    }

    /// Last recorded add time.
    pub fn add_time(&self) -> Option<Csn> {
        self.add_time
    }

    /// Last recorded delete time.
    pub fn delete_time(&self) -> Option<Csn> {
        self.delete_time
    }

    /// The tracked current value, if any.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Newest CSN recorded in this history.
    pub fn newest_csn(&self) -> Option<Csn> {
        self.add_time.max(self.delete_time)
    }

    /// Unconditional state load used by the decode path.
    pub fn assign(&mut self, kind: HistoryKind, value: Option<&str>, csn: Csn) {
        match kind {
            HistoryKind::Add => {
                self.add_time = Some(csn);
                self.value = value.map(str::to_string);
            }
            HistoryKind::Repl => {
                self.add_time = Some(csn);
                if csn.is_newer_than(self.delete_time) {
                    self.delete_time = Some(csn);
                }
                self.value = value.map(str::to_string);
            }
            HistoryKind::Del | HistoryKind::AttrDel => {
                if csn.is_newer_than(self.delete_time) {
                    self.delete_time = Some(csn);
                }
            }
        }
        if Some(csn) == self.newest_csn() {
            self.last_mod = Some(kind);
        }
    }

    /// Apply a modification known not to conflict.
    pub fn process_local(&mut self, csn: Csn, modification: &Modification) {
        let value = modification.attribute.values.first();
        match modification.mod_type {
            ModificationType::Add => {
                self.add_time = Some(csn);
                self.value = value.cloned();
                self.last_mod = Some(HistoryKind::Add);
            }
            ModificationType::Delete => {
                let kind = if value.is_some() {
                    HistoryKind::Del
                } else {
                    HistoryKind::AttrDel
                };
                self.record_delete(csn, kind);
            }
            ModificationType::Replace => match value {
                Some(value) => self.record_replace(csn, value.clone()),
                None => self.record_delete(csn, HistoryKind::AttrDel),
            },
            ModificationType::Increment => {}
        }
    }

    /// Conflict-aware replay. See the decision tables in the crate docs.
    pub fn replay(
        &mut self,
        csn: Csn,
        modification: &Modification,
        entry: &Entry,
    ) -> ReplayOutcome {
        match modification.mod_type {
            ModificationType::Delete => self.replay_delete(csn, modification, entry),
            ModificationType::Add => self.replay_add(csn, modification),
            ModificationType::Replace => self.replay_replace(csn, modification),
            // Increment conflict handling is an acknowledged gap: passed
            // through untouched, never treated as an error.
            ModificationType::Increment => ReplayOutcome::keep(),
        }
    }

    fn replay_delete(
        &mut self,
        csn: Csn,
        modification: &Modification,
        entry: &Entry,
    ) -> ReplayOutcome {
        let newer_than_add = csn.is_newer_than(self.add_time);
        let same_op_tie = Some(csn) == self.add_time
            && matches!(self.last_mod, Some(HistoryKind::Add | HistoryKind::Repl));
        if !newer_than_add && !same_op_tie {
            // A later add wins over this delete.
            return ReplayOutcome::drop_conflict();
        }

        match modification.attribute.values.first() {
            Some(target) => {
                if entry.has_value(&self.desc, target) {
                    self.record_delete(csn, HistoryKind::Del);
                    ReplayOutcome::keep()
                } else if !entry.has_attribute(&self.desc) {
                    // Nothing left to delete: a newer change already removed
                    // it. Record the delete time, drop the modification.
                    self.record_delete(csn, HistoryKind::Del);
                    ReplayOutcome::drop_conflict()
                } else {
                    // The entry holds a different value added later; this
                    // delete targets a value that never made it in.
                    ReplayOutcome::drop_conflict()
                }
            }
            None => {
                let present = entry.has_attribute(&self.desc);
                self.record_delete(csn, HistoryKind::AttrDel);
                if present {
                    ReplayOutcome::keep()
                } else {
                    ReplayOutcome::drop_conflict()
                }
            }
        }
    }

    fn replay_add(&mut self, csn: Csn, modification: &Modification) -> ReplayOutcome {
        let value = modification.attribute.values.first().cloned();
        let after_delete = csn.is_newer_than_or_equal_to(self.delete_time);
        let add_superseded = match (self.add_time, self.delete_time) {
            (None, _) => true,
            (Some(add), Some(delete)) => add.is_older_than(delete),
            (Some(_), None) => false,
        };

        if after_delete && csn.is_older_than(self.add_time) {
            // Two adds raced without an intervening delete in view. The
            // single value slot cannot hold both: adopt this (csn, value)
            // pair and rewrite the add as a replace so the entry ends up
            // with exactly one value.
            self.add_time = Some(csn);
            self.value = value.clone();
            self.last_mod = Some(HistoryKind::Add);
            let rewritten = Modification::new(
                ModificationType::Replace,
                Attribute::new(self.desc.clone(), value.into_iter().collect()),
            );
            return ReplayOutcome::rewrite(rewritten, true);
        }

        let same_op_tie = Some(csn) == self.delete_time
            && Some(csn) == self.add_time
            && self.last_mod == Some(HistoryKind::Del);
        if (after_delete && add_superseded) || same_op_tie {
            self.add_time = Some(csn);
            self.value = value;
            self.last_mod = Some(HistoryKind::Add);
            return ReplayOutcome::keep();
        }

        ReplayOutcome::drop_conflict()
    }

    fn replay_replace(&mut self, csn: Csn, modification: &Modification) -> ReplayOutcome {
        if csn.is_older_than(self.delete_time) || csn.is_older_than(self.add_time) {
            // Superseded: the attribute was deleted or re-added after this
            // replace was generated.
            return ReplayOutcome::drop_conflict();
        }
        match modification.attribute.values.first() {
            Some(value) => self.record_replace(csn, value.clone()),
            None => self.record_delete(csn, HistoryKind::AttrDel),
        }
        ReplayOutcome::keep()
    }

    fn record_delete(&mut self, csn: Csn, kind: HistoryKind) {
        if csn.is_newer_than(self.delete_time) {
            self.delete_time = Some(csn);
        }
        self.value = None;
        self.last_mod = Some(kind);
    }

    fn record_replace(&mut self, csn: Csn, value: String) {
        self.add_time = Some(csn);
        if csn.is_newer_than(self.delete_time) {
            self.delete_time = Some(csn);
        }
        self.value = Some(value);
        self.last_mod = Some(HistoryKind::Repl);
    }

    /// Encode as historical records: an `attrDel` record at the delete time
    /// (unless subsumed by a replace-with-value at the same CSN) and an
    /// `add`/`repl` record carrying the current value.
    pub fn encode(&self) -> Vec<HistoricalRecord> {
        let mut out = Vec::new();
        if let Some(delete_time) = self.delete_time {
            // A replace-with-value carries its own delete time; anything
            // else (including a delete-then-add at one CSN) needs the
            // explicit attrDel record to survive a decode.
            let subsumed = self.add_time == Some(delete_time)
                && self.value.is_some()
                && self.last_mod == Some(HistoryKind::Repl);
            if !subsumed {
                out.push(HistoricalRecord::attribute(
                    self.desc.clone(),
                    delete_time,
                    HistoryKind::AttrDel,
                    None,
                ));
            }
        }
        if let (Some(add_time), Some(value)) = (self.add_time, &self.value) {
            let kind = if self.last_mod == Some(HistoryKind::Repl) {
                HistoryKind::Repl
            } else {
                HistoryKind::Add
            };
            out.push(HistoricalRecord::attribute(
                self.desc.clone(),
                add_time,
                kind,
                Some(value.clone()),
            ));
        }
        out
    }

    /// Drop state strictly older than `csn`.
    pub fn purge_older_than(&mut self, csn: Csn) -> usize {
        let mut purged = 0;
        if self.delete_time.is_some_and(|dt| dt.is_older_than(csn)) {
            self.delete_time = None;
            purged += 1;
        }
        if self.add_time.is_some_and(|at| at.is_older_than(csn)) {
            self.add_time = None;
            self.value = None;
            purged += 1;
        }
        if self.add_time.is_none() && self.delete_time.is_none() {
            self.last_mod = None;
        }
        purged
    }
}
