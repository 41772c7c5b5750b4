//! One replicated domain: a base DN and everything needed to converge it.
//!
//! Local writes run synchronously in the caller's thread and update the
//! attribute history directly — no conflict is possible for the originating
//! replica. Remote updates go through the dependency tracker and the
//! conflict-aware replay path, then commit into the watermark.

use std::sync::Arc;

use castor_core::csn::{Csn, CsnGenerator, ReplicaId};
use castor_core::dn::Dn;
use castor_core::entry::Entry;
use castor_core::errors::{ReplayError, ReplicationResult};
use castor_core::message::{
    AddMessage, DeleteMessage, ModifyDnMessage, ModifyMessage, UpdateMessage,
};
use castor_core::modification::Modification;
use castor_core::schema::Schema;
use castor_core::state::ServerState;
use castor_historical::entry_history::EntryHistory;
use tracing::{debug, instrument, warn};

use crate::backend::ReplicaBackend;
use crate::fake_operation::FakeOperation;
use crate::pending::PendingChanges;

/// One replicated base DN on this replica.
pub struct ReplicationDomain {
    base_dn: Dn,
    generator: CsnGenerator,
    state: Arc<ServerState>,
    pending: PendingChanges,
    backend: Arc<dyn ReplicaBackend>,
    schema: Arc<Schema>,
}

impl ReplicationDomain {
    /// Create a domain for `base_dn` on replica `replica_id`.
    pub fn new(
        base_dn: Dn,
        replica_id: ReplicaId,
        backend: Arc<dyn ReplicaBackend>,
        schema: Arc<Schema>,
    ) -> Arc<Self> {
        let state = Arc::new(ServerState::new());
        Arc::new(Self {
            base_dn,
            generator: CsnGenerator::new(replica_id),
            state: Arc::clone(&state),
            pending: PendingChanges::new(state),
            backend,
            schema,
        })
    }

    /// The replicated base DN.
    pub fn base_dn(&self) -> &Dn {
        &self.base_dn
    }

    /// The domain's watermark.
    pub fn server_state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// The domain's dependency tracker.
    pub fn pending_changes(&self) -> &PendingChanges {
        &self.pending
    }

    // ── Local write path ────────────────────────────────────────────────

    /// Locally create an entry. Returns the message to publish.
    #[instrument(skip_all, fields(dn = %entry.dn))]
    pub fn local_add(&self, mut entry: Entry) -> ReplicationResult<UpdateMessage> {
        let csn = self.generator.new_csn();
        let mut history = EntryHistory::from_entry(&entry, Arc::clone(&self.schema))?;
        history.set_entry_add_csn(csn);
        history.update_entry(&mut entry);

        let parent_uuid = match entry.dn.parent() {
            Some(parent) => self.backend.entry(&parent)?.map(|e| e.entry_uuid),
            None => None,
        };
        let msg = UpdateMessage::Add(AddMessage {
            csn,
            dn: entry.dn.clone(),
            entry_uuid: entry.entry_uuid,
            parent_uuid,
            attributes: entry.attributes().collect(),
        });
        self.backend.add_entry(entry)?;
        self.commit_local(msg.clone());
        Ok(msg)
    }

    /// Locally modify an entry: stamp a CSN, update the history with the
    /// non-conflict path, persist, commit.
    #[instrument(skip_all, fields(dn = %dn))]
    pub fn local_modify(
        &self,
        dn: &Dn,
        mods: Vec<Modification>,
    ) -> ReplicationResult<UpdateMessage> {
        let csn = self.generator.new_csn();
        let mut entry = self
            .backend
            .entry(dn)?
            .ok_or_else(|| ReplayError::EntryMissing {
                target: dn.to_string(),
            })?;
        let mut history = EntryHistory::from_entry(&entry, Arc::clone(&self.schema))?;
        history.process_local_modifications(csn, &mods);
        entry.apply_modifications(&mods);
        history.update_entry(&mut entry);

        let msg = UpdateMessage::Modify(ModifyMessage {
            csn,
            dn: dn.clone(),
            entry_uuid: entry.entry_uuid,
            mods,
        });
        self.backend.replace_entry(entry)?;
        self.commit_local(msg.clone());
        Ok(msg)
    }

    /// Locally delete an entry.
    #[instrument(skip_all, fields(dn = %dn))]
    pub fn local_delete(&self, dn: &Dn) -> ReplicationResult<UpdateMessage> {
        let csn = self.generator.new_csn();
        let entry = self
            .backend
            .entry(dn)?
            .ok_or_else(|| ReplayError::EntryMissing {
                target: dn.to_string(),
            })?;
        self.backend.delete_entry(dn)?;
        let msg = UpdateMessage::Delete(DeleteMessage {
            csn,
            dn: dn.clone(),
            entry_uuid: entry.entry_uuid,
        });
        self.commit_local(msg.clone());
        Ok(msg)
    }

    /// Locally rename an entry.
    #[instrument(skip_all, fields(dn = %dn, new_rdn))]
    pub fn local_modify_dn(
        &self,
        dn: &Dn,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<Dn>,
    ) -> ReplicationResult<UpdateMessage> {
        let csn = self.generator.new_csn();
        let mut entry = self
            .backend
            .entry(dn)?
            .ok_or_else(|| ReplayError::EntryMissing {
                target: dn.to_string(),
            })?;
        let mut history = EntryHistory::from_entry(&entry, Arc::clone(&self.schema))?;
        history.set_entry_rename_csn(csn);

        let new_dn = dn.rename(new_rdn, new_superior.as_ref())?;
        let new_superior_uuid = match &new_superior {
            Some(superior) => self.backend.entry(superior)?.map(|e| e.entry_uuid),
            None => None,
        };
        entry.dn = new_dn;
        history.update_entry(&mut entry);

        let msg = UpdateMessage::ModifyDn(ModifyDnMessage {
            csn,
            dn: dn.clone(),
            entry_uuid: entry.entry_uuid,
            new_rdn: new_rdn.to_string(),
            delete_old_rdn,
            new_superior,
            new_superior_uuid,
        });
        self.backend.rename_entry(dn, entry)?;
        self.commit_local(msg.clone());
        Ok(msg)
    }

    fn commit_local(&self, msg: UpdateMessage) {
        let csn = msg.csn();
        self.pending.put_local_change(msg);
        self.pending.commit(csn);
    }

    // ── Remote replay path ──────────────────────────────────────────────

    /// Register a received update with the tracker and align the local
    /// clock. Returns false on duplicate delivery.
    pub fn receive_update(&self, msg: UpdateMessage) -> bool {
        self.generator.adjust(msg.csn());
        self.pending.put_remote_update(msg)
    }

    /// Replay one remote update, then drain every parked change this commit
    /// releases. A failing change is logged and the drain continues — one
    /// bad message never wedges the domain.
    pub fn replay(&self, msg: UpdateMessage) {
        let mut next = Some(msg);
        while let Some(msg) = next.take() {
            let csn = msg.csn();
            if self.pending.check_dependencies(&msg) {
                debug!(%csn, kind = msg.kind(), "change parked until its dependency commits");
            } else {
                match self.replay_update(&msg) {
                    Ok(conflict) => {
                        if conflict {
                            debug!(%csn, kind = msg.kind(), "change replayed with conflict resolution");
                        }
                    }
                    Err(error) => {
                        warn!(%csn, kind = msg.kind(), %error, "error replaying change; continuing");
                    }
                }
                self.pending.commit(csn);
            }
            next = self.pending.get_next_update();
        }
    }

    /// Apply one remote update through the conflict engine. Returns whether
    /// conflict resolution altered the outcome.
    fn replay_update(&self, msg: &UpdateMessage) -> ReplicationResult<bool> {
        match msg {
            UpdateMessage::Add(m) => {
                if self.backend.entry_by_uuid(m.entry_uuid)?.is_some()
                    || self.backend.entry(&m.dn)?.is_some()
                {
                    // Already applied (redelivered or reconstructed change).
                    return Ok(true);
                }
                let mut entry = m.to_entry();
                let mut history = EntryHistory::from_entry(&entry, Arc::clone(&self.schema))?;
                history.set_entry_add_csn(m.csn);
                history.update_entry(&mut entry);
                self.backend.add_entry(entry)?;
                Ok(false)
            }
            UpdateMessage::Delete(m) => match self.backend.entry_by_uuid(m.entry_uuid)? {
                Some(entry) => {
                    self.backend.delete_entry(&entry.dn)?;
                    Ok(false)
                }
                None => Ok(true),
            },
            UpdateMessage::Modify(m) => {
                let entry = match self.backend.entry_by_uuid(m.entry_uuid)? {
                    Some(entry) => Some(entry),
                    None => self.backend.entry(&m.dn)?,
                };
                let Some(mut entry) = entry else {
                    // The entry is gone; a newer delete won.
                    return Ok(true);
                };
                let mut history = EntryHistory::from_entry(&entry, Arc::clone(&self.schema))?;
                let replayed = history.replay_modifications(m.csn, m.mods.clone(), &entry);
                entry.apply_modifications(&replayed.mods);
                history.update_entry(&mut entry);
                self.backend.replace_entry(entry)?;
                Ok(replayed.conflict)
            }
            UpdateMessage::ModifyDn(m) => {
                let Some(mut entry) = self.backend.entry_by_uuid(m.entry_uuid)? else {
                    return Ok(true);
                };
                let mut history = EntryHistory::from_entry(&entry, Arc::clone(&self.schema))?;
                if m.csn.is_older_than(history.entry_rename_csn()) {
                    // Renamed again by a newer change; this one is history.
                    return Ok(true);
                }
                history.set_entry_rename_csn(m.csn);
                let old_dn = entry.dn.clone();
                entry.dn = m.new_dn();
                history.update_entry(&mut entry);
                self.backend.rename_entry(&old_dn, entry)?;
                Ok(false)
            }
        }
    }

    // ── Resynchronization ───────────────────────────────────────────────

    /// Rebuild the messages a catching-up replica is missing, from stored
    /// entries and their historical metadata, ordered by CSN. Used when the
    /// change log no longer holds the requested changes.
    #[instrument(skip_all)]
    pub fn build_missing_changes(
        &self,
        from: &ServerState,
    ) -> ReplicationResult<Vec<UpdateMessage>> {
        let floor: Option<Csn> = from.snapshot().values().min().copied();
        let mut out: Vec<UpdateMessage> = Vec::new();
        for entry in self.backend.entries_changed_since(floor)? {
            let history = EntryHistory::from_entry(&entry, Arc::clone(&self.schema))?;
            for op in FakeOperation::from_entry_history(&entry, &history) {
                if !from.cover(op.csn()) {
                    out.push(op.generate_message());
                }
            }
        }
        out.sort_by_key(UpdateMessage::csn);
        debug!(count = out.len(), "rebuilt missing changes from history");
        Ok(out)
    }
}
