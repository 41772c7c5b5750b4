//! Conflict resolution for multi-valued attributes.
//!
//! Bookkeeping is per value, not per attribute: two replicas adding and
//! deleting *different* values of the same attribute concurrently must not
//! clobber each other. The attribute-wide delete time and last-update time
//! exist for whole-attribute deletes and for the non-conflicting fast path.

use std::collections::HashMap;

use castor_core::csn::Csn;
use castor_core::entry::{normalize_value, Attribute, AttributeDescription, Entry};
use castor_core::modification::{Modification, ModificationType};

use crate::encoding::{HistoricalRecord, HistoryKind};
use crate::value_history::ValueHistory;

use super::ReplayOutcome;

/// History of one multi-valued attribute: attribute-wide delete and update
/// times plus one [`ValueHistory`] per tracked value, keyed by normalized
/// value.
#[derive(Debug, Clone)]
pub struct MultiValueHistory {
    desc: AttributeDescription,
    delete_time: Option<Csn>,
    last_update_time: Option<Csn>,
    values: HashMap<String, ValueHistory>,
}

impl MultiValueHistory {
    /// Empty history for an attribute.
    pub fn new(desc: AttributeDescription) -> Self {
        Self {
            desc,
            delete_time: None,
            last_update_time: None,
            values: HashMap::new(),
        }
    }

    /// The attribute this history describes.
    pub fn desc(&self) -> &AttributeDescription {
        &self.desc
    }

    /// Attribute-wide delete time.
    pub fn delete_time(&self) -> Option<Csn> {
        self.delete_time
    }

    /// Last time anything in this attribute changed.
    pub fn last_update_time(&self) -> Option<Csn> {
        self.last_update_time
    }

    /// The tracked record for a value, if any.
    pub fn value_history(&self, value: &str) -> Option<&ValueHistory> {
        self.values.get(&normalize_value(value))
    }

    /// Newest CSN recorded in this history.
    pub fn newest_csn(&self) -> Option<Csn> {
        let newest_value = self.values.values().map(ValueHistory::time).max();
        [self.delete_time, self.last_update_time, newest_value]
            .into_iter()
            .flatten()
            .max()
    }

    /// Unconditional state load used by the decode path.
    pub fn assign(&mut self, kind: HistoryKind, value: Option<&str>, csn: Csn) {
        match kind {
            HistoryKind::Add => {
                if let Some(value) = value {
                    self.put(ValueHistory::updated(value, csn));
                }
            }
            HistoryKind::Del => {
                if let Some(value) = value {
                    self.put(ValueHistory::deleted(value, csn));
                }
            }
            HistoryKind::Repl => {
                self.raise_delete_time(csn);
                if let Some(value) = value {
                    self.put(ValueHistory::updated(value, csn));
                }
            }
            HistoryKind::AttrDel => self.raise_delete_time(csn),
        }
        self.touch(csn);
    }

    /// Apply a modification known not to conflict.
    pub fn process_local(&mut self, csn: Csn, modification: &Modification) {
        match modification.mod_type {
            ModificationType::Add => {
                for value in &modification.attribute.values {
                    self.put(ValueHistory::updated(value, csn));
                }
                self.touch(csn);
            }
            ModificationType::Delete => {
                if modification.attribute.is_empty() {
                    self.delete_attribute(csn);
                } else {
                    for value in &modification.attribute.values {
                        self.put(ValueHistory::deleted(value, csn));
                    }
                }
                self.touch(csn);
            }
            ModificationType::Replace => {
                self.delete_attribute(csn);
                for value in &modification.attribute.values {
                    self.put(ValueHistory::updated(value, csn));
                }
                self.touch(csn);
            }
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
        // Fast path: a replace at least as new as everything seen cannot
        // conflict — no other replica has modified this attribute more
        // recently.
        if csn.is_newer_than_or_equal_to(self.last_update_time)
            && modification.mod_type == ModificationType::Replace
        {
            self.process_local(csn, modification);
            return ReplayOutcome::keep();
        }

        match modification.mod_type {
            ModificationType::Delete => self.conflict_delete(csn, modification, entry),
            ModificationType::Add => self.conflict_add(csn, modification),
            ModificationType::Replace => self.conflict_replace(csn, modification),
            // Increment conflict handling is an acknowledged gap: passed
            // through untouched, never treated as an error.
            ModificationType::Increment => ReplayOutcome::keep(),
        }
    }

    fn conflict_delete(
        &mut self,
        csn: Csn,
        modification: &Modification,
        entry: &Entry,
    ) -> ReplayOutcome {
        if csn.is_older_than(self.delete_time) {
            // The whole modification was superseded by a newer attribute
            // delete.
            return ReplayOutcome::drop_conflict();
        }

        if modification.attribute.is_empty() {
            // Whole-attribute delete. Values added after this delete's CSN
            // must survive it, so the delete becomes a replace that keeps
            // exactly those values.
            self.delete_attribute(csn);
            self.touch(csn);
            let mut survivors: Vec<String> = self
                .values
                .values()
                .filter(|r| r.update_time().is_some_and(|t| t.is_newer_than(csn)))
                .map(|r| r.value().to_string())
                .collect();
            survivors.sort_by_key(|v| normalize_value(v));
            let conflict = !survivors.is_empty();
            let rewritten = Modification::new(
                ModificationType::Replace,
                Attribute::new(self.desc.clone(), survivors),
            );
            return ReplayOutcome::rewrite(rewritten, conflict);
        }

        // Delete of specific values, resolved value by value.
        let mut kept: Vec<String> = Vec::new();
        let mut dropped_any = false;
        for value in &modification.attribute.values {
            let norm = normalize_value(value);
            match self.values.get(&norm) {
                Some(record) if record.is_update() => {
                    if csn.is_newer_than_or_equal_to(record.update_time()) {
                        self.values.insert(norm, ValueHistory::deleted(value, csn));
                        kept.push(value.clone());
                    } else {
                        // The value was re-added after this delete; the
                        // delete loses.
                        dropped_any = true;
                    }
                }
                Some(record) => {
                    // Already deleted. Refresh the delete time when newer;
                    // the value is absent either way.
                    if csn.is_newer_than(record.delete_time()) {
                        self.values.insert(norm, ValueHistory::deleted(value, csn));
                    }
                    dropped_any = true;
                }
                None => {
                    self.values.insert(norm, ValueHistory::deleted(value, csn));
                    if entry.has_value(&self.desc, value) {
                        kept.push(value.clone());
                    } else {
                        dropped_any = true;
                    }
                }
            }
        }
        self.touch(csn);

        if kept.is_empty() {
            ReplayOutcome::drop_conflict()
        } else if !dropped_any {
            ReplayOutcome::keep()
        } else {
            let rewritten = Modification::new(
                ModificationType::Delete,
                Attribute::new(self.desc.clone(), kept),
            );
            ReplayOutcome::rewrite(rewritten, true)
        }
    }

    fn conflict_add(&mut self, csn: Csn, modification: &Modification) -> ReplayOutcome {
        if csn.is_older_than(self.delete_time) {
            // The whole add predates an attribute delete.
            return ReplayOutcome::drop_conflict();
        }

        let mut kept: Vec<String> = Vec::new();
        let mut dropped_any = false;
        for value in &modification.attribute.values {
            let norm = normalize_value(value);
            match self.values.get(&norm) {
                Some(record) if record.is_update() => {
                    // Already present; refresh the add time when newer but
                    // never add the value twice.
                    if csn.is_newer_than(record.update_time()) {
                        self.values.insert(norm, ValueHistory::updated(value, csn));
                    }
                    dropped_any = true;
                }
                Some(record) => {
                    // Tracked as deleted. Newer-or-equal add wins the tie so
                    // a delete-then-add carried by one change stays an add.
                    if csn.is_newer_than_or_equal_to(record.delete_time()) {
                        self.values.insert(norm, ValueHistory::updated(value, csn));
                        kept.push(value.clone());
                    } else {
                        dropped_any = true;
                    }
                }
                None => {
                    self.values.insert(norm, ValueHistory::updated(value, csn));
                    kept.push(value.clone());
                }
            }
        }
        self.touch(csn);

        if kept.is_empty() {
            ReplayOutcome::drop_conflict()
        } else if !dropped_any {
            ReplayOutcome::keep()
        } else {
            let rewritten = Modification::new(
                ModificationType::Add,
                Attribute::new(self.desc.clone(), kept),
            );
            ReplayOutcome::rewrite(rewritten, true)
        }
    }

    fn conflict_replace(&mut self, csn: Csn, modification: &Modification) -> ReplayOutcome {
        if csn.is_older_than(self.delete_time) {
            return ReplayOutcome::drop_conflict();
        }

        // A replace both retracts old values not yet superseded by newer
        // remote writes and adds new values that may themselves be racing
        // other replicas. Decompose: delete everything older than csn, then
        // add the replacement values, then emit one replace carrying the
        // union.
        self.delete_attribute(csn);
        let mut result: Vec<String> = self
            .values
            .values()
            .filter(|r| r.update_time().is_some_and(|t| t.is_newer_than(csn)))
            .map(|r| r.value().to_string())
            .collect();
        result.sort_by_key(|v| normalize_value(v));

        for value in &modification.attribute.values {
            let norm = normalize_value(value);
            match self.values.get(&norm) {
                Some(record) if record.is_update() => {
                    // Re-added later by another replica: already a survivor,
                    // and the newer record wins the time.
                }
                Some(_) => {
                    // Deleted after this replace was generated: the delete
                    // wins and the value stays out.
                }
                None => {
                    self.values.insert(norm, ValueHistory::updated(value, csn));
                    result.push(value.clone());
                }
            }
        }
        self.touch(csn);

        let same_effect = same_value_set(&result, &modification.attribute.values);
        let rewritten = Modification::new(
            ModificationType::Replace,
            Attribute::new(self.desc.clone(), result),
        );
        if same_effect {
            ReplayOutcome::rewrite(rewritten, false)
        } else {
            ReplayOutcome::rewrite(rewritten, true)
        }
    }

    /// Whole-attribute delete at `csn`: raise the delete time and forget
    /// every record at or before it — the attribute-level record subsumes
    /// them.
    fn delete_attribute(&mut self, csn: Csn) {
        self.raise_delete_time(csn);
        self.values.retain(|_, record| record.time().is_newer_than(csn));
    }

    fn raise_delete_time(&mut self, csn: Csn) {
        if csn.is_newer_than(self.delete_time) {
            self.delete_time = Some(csn);
        }
    }

    fn touch(&mut self, csn: Csn) {
        if csn.is_newer_than(self.last_update_time) {
            self.last_update_time = Some(csn);
        }
    }

    fn put(&mut self, record: ValueHistory) {
        self.values.insert(record.norm().to_string(), record);
    }

    /// Encode as historical records sorted by (CSN, normalized value). When
    /// the attribute-wide delete time is set, the first record added at that
    /// CSN is emitted as `repl` (a replace marker); with no such record an
    /// explicit `attrDel` record is emitted.
    pub fn encode(&self) -> Vec<HistoricalRecord> {
        let mut records: Vec<&ValueHistory> = self.values.values().collect();
        records.sort_by(|a, b| (a.time(), a.norm()).cmp(&(b.time(), b.norm())));

        let mut out = Vec::new();
        if let Some(delete_time) = self.delete_time {
            let has_repl_marker = records
                .iter()
                .any(|r| r.is_update() && r.update_time() == Some(delete_time));
            if !has_repl_marker {
                out.push(HistoricalRecord::attribute(
                    self.desc.clone(),
                    delete_time,
                    HistoryKind::AttrDel,
                    None,
                ));
            }
        }

        let mut repl_emitted = false;
        for record in records {
            let kind = if record.is_update() {
                if !repl_emitted && record.update_time() == self.delete_time {
                    repl_emitted = true;
                    HistoryKind::Repl
                } else {
                    HistoryKind::Add
                }
            } else {
                HistoryKind::Del
            };
            out.push(HistoricalRecord::attribute(
                self.desc.clone(),
                record.time(),
                kind,
                Some(record.value().to_string()),
            ));
        }
        out
    }

    /// Drop records strictly older than `csn`.
    pub fn purge_older_than(&mut self, csn: Csn) -> usize {
        let before = self.values.len();
        self.values
            .retain(|_, record| record.time().is_newer_than_or_equal_to(csn));
        let mut purged = before - self.values.len();
        if self.delete_time.is_some_and(|dt| dt.is_older_than(csn)) {
            self.delete_time = None;
            purged += 1;
        }
        purged
    }
}

/// Order-insensitive comparison of two value lists under normalization.
fn same_value_set(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a_norm: Vec<String> = a.iter().map(|v| normalize_value(v)).collect();
    let mut b_norm: Vec<String> = b.iter().map(|v| normalize_value(v)).collect();
    a_norm.sort();
    b_norm.sort();
    a_norm == b_norm
}
