//! Per-entry historical aggregate.
//!
//! Owns one [`AttributeHistory`] per attribute plus the entry-level
//! `dn:<csn>:add` / `dn:<csn>:moddn` records, and round-trips the whole
//! state through the `ds-sync-hist` operational attribute.

use std::collections::BTreeMap;
use std::sync::Arc;

use castor_core::constants::HISTORICAL_ATTRIBUTE_NAME;
use castor_core::csn::Csn;
use castor_core::entry::{AttributeDescription, Entry};
use castor_core::errors::ReplicationResult;
use castor_core::modification::Modification;
use castor_core::schema::Schema;
use tracing::debug;

use crate::attribute::{AttributeHistory, ReplayAction};
use crate::encoding::HistoricalRecord;

/// Result of replaying one replicated modify against an entry's history.
#[derive(Debug, Clone)]
pub struct ReplayedModifications {
    /// The modifications to actually apply, post conflict resolution.
    pub mods: Vec<Modification>,
    /// True when any modification was dropped or altered.
    pub conflict: bool,
}

/// Historical state of one entry.
#[derive(Debug, Clone)]
pub struct EntryHistory {
    schema: Arc<Schema>,
    attributes: BTreeMap<AttributeDescription, AttributeHistory>,
    entry_add_csn: Option<Csn>,
    entry_rename_csn: Option<Csn>,
}

impl EntryHistory {
    /// Empty history under the given schema.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            attributes: BTreeMap::new(),
            entry_add_csn: None,
            entry_rename_csn: None,
        }
    }

    /// Rebuild the history from the entry's `ds-sync-hist` attribute.
    /// Fails fast on any malformed record: the attribute is written only by
    /// the server, so damage means corruption.
    pub fn from_entry(entry: &Entry, schema: Arc<Schema>) -> ReplicationResult<Self> {
        let mut history = Self::new(schema);
        let hist_attr = AttributeDescription::new(HISTORICAL_ATTRIBUTE_NAME);
        if let Some(values) = entry.get(&hist_attr) {
            for value in values {
                let record: HistoricalRecord = value.parse()?;
                history.load_record(record);
            }
        }
        Ok(history)
    }

    fn load_record(&mut self, record: HistoricalRecord) {
        match record {
            HistoricalRecord::EntryAdd { csn } => self.set_entry_add_csn(csn),
            HistoricalRecord::EntryRename { csn } => self.set_entry_rename_csn(csn),
            HistoricalRecord::Attribute {
                attr,
                csn,
                kind,
                value,
            } => {
                self.attribute_history_mut(&attr)
                    .assign(kind, value.as_deref(), csn);
            }
        }
    }

    /// The history of one attribute, created on first touch.
    pub fn attribute_history_mut(&mut self, desc: &AttributeDescription) -> &mut AttributeHistory {
        let schema = Arc::clone(&self.schema);
        self.attributes
            .entry(desc.clone())
            .or_insert_with(|| AttributeHistory::for_attribute(desc.clone(), &schema))
    }

    /// The history of one attribute, if it was ever touched.
    pub fn attribute_history(&self, desc: &AttributeDescription) -> Option<&AttributeHistory> {
        self.attributes.get(desc)
    }

    /// When the entry was created, if recorded.
    pub fn entry_add_csn(&self) -> Option<Csn> {
        self.entry_add_csn
    }

    /// When the entry was last renamed, if recorded.
    pub fn entry_rename_csn(&self) -> Option<Csn> {
        self.entry_rename_csn
    }

    /// Record the entry creation time. Monotonic.
    pub fn set_entry_add_csn(&mut self, csn: Csn) {
        if csn.is_newer_than(self.entry_add_csn) {
            self.entry_add_csn = Some(csn);
        }
    }

    /// Record the last rename time. Monotonic.
    pub fn set_entry_rename_csn(&mut self, csn: Csn) {
        if csn.is_newer_than(self.entry_rename_csn) {
            self.entry_rename_csn = Some(csn);
        }
    }

    /// Local (or proven non-conflicting) write path: mutate history without
    /// conflict checks.
    pub fn process_local_modifications(&mut self, csn: Csn, mods: &[Modification]) {
        for modification in mods {
            self.attribute_history_mut(modification.desc())
                .process_local(csn, modification);
        }
    }

    /// Conflict-aware replay of a remote modify. The entry is consulted but
    /// not mutated; the caller applies the returned modifications.
    pub fn replay_modifications(
        &mut self,
        csn: Csn,
        mods: Vec<Modification>,
        entry: &Entry,
    ) -> ReplayedModifications {
        let mut kept = Vec::with_capacity(mods.len());
        let mut conflict = false;
        for modification in mods {
            let outcome = self
                .attribute_history_mut(modification.desc())
                .replay(csn, &modification, entry);
            conflict |= outcome.conflict;
            match outcome.action {
                ReplayAction::Keep => kept.push(modification),
                ReplayAction::Rewrite(rewritten) => kept.push(rewritten),
                ReplayAction::Drop => {
                    debug!(
                        attr = %modification.desc(),
                        %csn,
                        "modification dropped by conflict resolution"
                    );
                }
            }
        }
        ReplayedModifications {
            mods: kept,
            conflict,
        }
    }

    /// Encode the whole history, entry-level records first, attribute
    /// records in attribute order.
    pub fn encode(&self) -> Vec<HistoricalRecord> {
        let mut out = Vec::new();
        if let Some(csn) = self.entry_add_csn {
            out.push(HistoricalRecord::EntryAdd { csn });
        }
        if let Some(csn) = self.entry_rename_csn {
            out.push(HistoricalRecord::EntryRename { csn });
        }
        for history in self.attributes.values() {
            out.extend(history.encode());
        }
        out
    }

    /// Encode to the string values stored in `ds-sync-hist`.
    pub fn encode_values(&self) -> Vec<String> {
        self.encode().iter().map(HistoricalRecord::to_string).collect()
    }

    /// Write the encoded history back onto the entry.
    pub fn update_entry(&self, entry: &mut Entry) {
        entry.put(
            AttributeDescription::new(HISTORICAL_ATTRIBUTE_NAME),
            self.encode_values(),
        );
    }

    /// Newest CSN recorded anywhere in this entry's history.
    pub fn newest_csn(&self) -> Option<Csn> {
        let newest_attr = self
            .attributes
            .values()
            .filter_map(AttributeHistory::newest_csn)
            .max();
        [self.entry_add_csn, self.entry_rename_csn, newest_attr]
            .into_iter()
            .flatten()
            .max()
    }

    /// Forget state strictly older than `csn`; retention policy is decided
    /// by the caller. Returns the number of purged records.
    pub fn purge_older_than(&mut self, csn: Csn) -> usize {
        let mut purged = 0;
        for history in self.attributes.values_mut() {
            purged += history.purge_older_than(csn);
        }
        self.attributes
            .retain(|_, history| !history.encode().is_empty());
        purged
    }
}
