//! Backend boundary.
//!
//! The storage engine is an external collaborator: the replication core only
//! needs entry lookup, the four write primitives, and a changed-since scan
//! for resynchronization. [`MemoryBackend`] is the in-memory implementation
//! used by tests and embedding scenarios.

use std::sync::Arc;

use castor_core::constants::HISTORICAL_ATTRIBUTE_NAME;
use castor_core::csn::Csn;
use castor_core::dn::Dn;
use castor_core::entry::{AttributeDescription, Entry};
use castor_core::errors::{ReplayError, ReplicationResult};
use castor_historical::index_key::CsnIndexKey;
use dashmap::DashMap;
use uuid::Uuid;

/// Storage operations the replay engine relies on.
pub trait ReplicaBackend: Send + Sync {
    /// Fetch an entry by DN.
    fn entry(&self, dn: &Dn) -> ReplicationResult<Option<Entry>>;

    /// Fetch an entry by its unique id. Replays prefer this: the entry may
    /// have been renamed since the change was generated.
    fn entry_by_uuid(&self, entry_uuid: Uuid) -> ReplicationResult<Option<Entry>>;

    /// Create an entry.
    fn add_entry(&self, entry: Entry) -> ReplicationResult<()>;

    /// Overwrite an existing entry (same DN).
    fn replace_entry(&self, entry: Entry) -> ReplicationResult<()>;

    /// Remove an entry by DN.
    fn delete_entry(&self, dn: &Dn) -> ReplicationResult<()>;

    /// Move an entry from `old_dn` to the DN carried by `entry`.
    fn rename_entry(&self, old_dn: &Dn, entry: Entry) -> ReplicationResult<()>;

    /// Entries with at least one historical record newer than `from`
    /// (all entries with history when `from` is `None`). Backing stores
    /// index the historical attribute with the CSN ordering rule so this is
    /// a range scan, not a full sweep.
    fn entries_changed_since(&self, from: Option<Csn>) -> ReplicationResult<Vec<Entry>>;
}

/// DashMap-backed in-memory backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    by_dn: DashMap<Dn, Entry>,
    by_uuid: DashMap<Uuid, Dn>,
}

impl MemoryBackend {
    /// Empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, the shape the domain expects.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.by_dn.len()
    }

    /// True when no entry is stored.
    pub fn is_empty(&self) -> bool {
        self.by_dn.is_empty()
    }
}

impl ReplicaBackend for MemoryBackend {
    fn entry(&self, dn: &Dn) -> ReplicationResult<Option<Entry>> {
        Ok(self.by_dn.get(dn).map(|e| e.value().clone()))
    }

    fn entry_by_uuid(&self, entry_uuid: Uuid) -> ReplicationResult<Option<Entry>> {
        match self.by_uuid.get(&entry_uuid) {
            Some(dn) => self.entry(&dn),
            None => Ok(None),
        }
    }

    fn add_entry(&self, entry: Entry) -> ReplicationResult<()> {
        if self.by_dn.contains_key(&entry.dn) {
            return Err(ReplayError::DuplicateEntry {
                dn: entry.dn.to_string(),
            }
            .into());
        }
        self.by_uuid.insert(entry.entry_uuid, entry.dn.clone());
        self.by_dn.insert(entry.dn.clone(), entry);
        Ok(())
    }

    fn replace_entry(&self, entry: Entry) -> ReplicationResult<()> {
        if !self.by_dn.contains_key(&entry.dn) {
            return Err(ReplayError::EntryMissing {
                target: entry.dn.to_string(),
            }
            .into());
        }
        self.by_uuid.insert(entry.entry_uuid, entry.dn.clone());
        self.by_dn.insert(entry.dn.clone(), entry);
        Ok(())
    }

    fn delete_entry(&self, dn: &Dn) -> ReplicationResult<()> {
        match self.by_dn.remove(dn) {
            Some((_, entry)) => {
                self.by_uuid.remove(&entry.entry_uuid);
                Ok(())
            }
            None => Err(ReplayError::EntryMissing {
                target: dn.to_string(),
            }
            .into()),
        }
    }

    fn rename_entry(&self, old_dn: &Dn, entry: Entry) -> ReplicationResult<()> {
        if self.by_dn.remove(old_dn).is_none() {
            return Err(ReplayError::EntryMissing {
                target: old_dn.to_string(),
            }
            .into());
        }
        self.by_uuid.insert(entry.entry_uuid, entry.dn.clone());
        self.by_dn.insert(entry.dn.clone(), entry);
        Ok(())
    }

    fn entries_changed_since(&self, from: Option<Csn>) -> ReplicationResult<Vec<Entry>> {
        let hist_attr = AttributeDescription::new(HISTORICAL_ATTRIBUTE_NAME);
        let mut out = Vec::new();
        for item in self.by_dn.iter() {
            let Some(values) = item.value().get(&hist_attr) else {
                continue;
            };
            let changed = values.iter().any(|value| {
                match CsnIndexKey::from_historical_value(value) {
                    Ok(key) => key.csn().is_newer_than(from),
                    Err(_) => false,
                }
            });
            if changed {
                out.push(item.value().clone());
            }
        }
        out.sort_by(|a, b| a.dn.cmp(&b.dn));
        Ok(out)
    }
}
