//! Fake-operation reconstruction.
//!
//! When a replica asks for changes older than what the change log retains,
//! the missing messages are regenerated from the stored entry plus its
//! historical metadata. Reconstructed operations are necessarily coarser
//! than the originals — a rebuilt modify only knows what the historical
//! records kept — but they sort under the same CSN comparator as live
//! messages, so a catching-up replica replays them through the ordinary
//! path.
//!
//! Constructed transiently; never persisted.

use std::collections::BTreeMap;

use castor_core::csn::Csn;
use castor_core::dn::Dn;
use castor_core::entry::Entry;
use castor_core::message::{
    AddMessage, DeleteMessage, ModifyDnMessage, ModifyMessage, UpdateMessage,
};
use castor_core::modification::Modification;
use castor_historical::encoding::HistoricalRecord;
use castor_historical::entry_history::EntryHistory;
use uuid::Uuid;

/// A reconstructed operation: one replication message worth of entry data.
#[derive(Debug, Clone)]
pub enum FakeOperation {
    /// Entry creation — carries the whole entry.
    Add { csn: Csn, entry: Entry },
    /// Entry removal — only DN and unique id survive deletion.
    Delete {
        csn: Csn,
        dn: Dn,
        entry_uuid: Uuid,
    },
    /// Modifications accumulated from historical records sharing one CSN.
    Modify {
        csn: Csn,
        dn: Dn,
        entry_uuid: Uuid,
        mods: Vec<Modification>,
    },
    /// Rename — parent and RDN derive from the entry's current DN.
    ModifyDn {
        csn: Csn,
        dn: Dn,
        entry_uuid: Uuid,
    },
}

impl FakeOperation {
    /// The operation's CSN — the ordering key shared with live messages.
    pub fn csn(&self) -> Csn {
        match self {
            FakeOperation::Add { csn, .. }
            | FakeOperation::Delete { csn, .. }
            | FakeOperation::Modify { csn, .. }
            | FakeOperation::ModifyDn { csn, .. } => *csn,
        }
    }

    /// Add a caller-supplied modification to a rebuilt modify. No-op for
    /// the other variants.
    pub fn add_modification(&mut self, modification: Modification) {
        if let FakeOperation::Modify { mods, .. } = self {
            mods.push(modification);
        }
    }

    /// Regenerate the replication message for this operation.
    pub fn generate_message(&self) -> UpdateMessage {
        match self {
            FakeOperation::Add { csn, entry } => UpdateMessage::Add(AddMessage {
                csn: *csn,
                dn: entry.dn.clone(),
                entry_uuid: entry.entry_uuid,
                parent_uuid: None,
                attributes: entry.attributes().collect(),
            }),
            FakeOperation::Delete {
                csn,
                dn,
                entry_uuid,
            } => UpdateMessage::Delete(DeleteMessage {
                csn: *csn,
                dn: dn.clone(),
                entry_uuid: *entry_uuid,
            }),
            FakeOperation::Modify {
                csn,
                dn,
                entry_uuid,
                mods,
            } => UpdateMessage::Modify(ModifyMessage {
                csn: *csn,
                dn: dn.clone(),
                entry_uuid: *entry_uuid,
                mods: mods.clone(),
            }),
            FakeOperation::ModifyDn {
                csn,
                dn,
                entry_uuid,
            } => UpdateMessage::ModifyDn(ModifyDnMessage {
                csn: *csn,
                dn: dn.clone(),
                entry_uuid: *entry_uuid,
                new_rdn: dn.rdn().unwrap_or_default().to_string(),
                delete_old_rdn: false,
                new_superior: dn.parent(),
                new_superior_uuid: None,
            }),
        }
    }

    /// Rebuild the operations recorded in an entry's history, grouped by
    /// CSN and returned in CSN order. Attribute records sharing a CSN fold
    /// into one modify; records at the entry-add CSN are subsumed by the add
    /// (it already carries the whole entry).
    pub fn from_entry_history(entry: &Entry, history: &EntryHistory) -> Vec<FakeOperation> {
        let mut ops: BTreeMap<Csn, FakeOperation> = BTreeMap::new();

        if let Some(csn) = history.entry_add_csn() {
            ops.insert(
                csn,
                FakeOperation::Add {
                    csn,
                    entry: entry.clone(),
                },
            );
        }
        if let Some(csn) = history.entry_rename_csn() {
            ops.entry(csn).or_insert(FakeOperation::ModifyDn {
                csn,
                dn: entry.dn.clone(),
                entry_uuid: entry.entry_uuid,
            });
        }

        for record in history.encode() {
            let HistoricalRecord::Attribute { .. } = record else {
                continue;
            };
            let Some(modification) = record.generate_mod() else {
                continue;
            };
            let csn = record.csn();
            match ops.get_mut(&csn) {
                Some(op @ FakeOperation::Modify { .. }) => op.add_modification(modification),
                Some(_) => {
                    // An add or rename at this CSN already covers the state.
                }
                None => {
                    ops.insert(
                        csn,
                        FakeOperation::Modify {
                            csn,
                            dn: entry.dn.clone(),
                            entry_uuid: entry.entry_uuid,
                            mods: vec![modification],
                        },
                    );
                }
            }
        }

        ops.into_values().collect()
    }
}
