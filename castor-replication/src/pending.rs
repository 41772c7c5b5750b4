//! Pending-change dependency tracker.
//!
//! Every in-flight change of a domain lives here from receipt until it is
//! part of the oldest contiguous committed run. Remote changes whose target
//! DN is order-sensitive relative to an older in-flight change are parked
//! and only released once everything they could conflict with has been
//! resolved. Committing walks the pending map from its lowest key and
//! advances the [`ServerState`] watermark over the contiguous committed
//! prefix — gaps are never skipped.
//!
//! Locking: the pending map and the active set share a read/write lock
//! (readers: dependency queries; writers: insert/commit); the dependent
//! queue has its own mutex. The nesting order is always map lock outer,
//! dependent lock inner.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, RwLock};

use castor_core::csn::Csn;
use castor_core::message::UpdateMessage;
use castor_core::state::ServerState;
use tracing::{debug, warn};

/// Where a pending change came from.
#[derive(Debug, Clone)]
pub enum PendingOperation {
    /// A locally generated operation, carrying the message to publish.
    Local(UpdateMessage),
    /// An update received from another replica.
    Remote(UpdateMessage),
}

impl PendingOperation {
    /// The update message either way.
    pub fn message(&self) -> &UpdateMessage {
        match self {
            PendingOperation::Local(msg) | PendingOperation::Remote(msg) => msg,
        }
    }
}

/// One in-flight change.
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub csn: Csn,
    pub committed: bool,
    pub op: PendingOperation,
}

#[derive(Debug, Default)]
struct Inner {
    /// All in-flight changes, ordered by CSN.
    pending: BTreeMap<Csn, PendingChange>,
    /// Changes handed to a replay worker or blocked on a dependency.
    active: BTreeSet<Csn>,
}

/// Dependency tracker for one replicated domain.
#[derive(Debug)]
pub struct PendingChanges {
    state: Arc<ServerState>,
    inner: RwLock<Inner>,
    /// Parked changes waiting for their dependencies, ordered by CSN.
    dependent: Mutex<BTreeSet<Csn>>,
}

impl PendingChanges {
    /// Create a tracker advancing the given watermark.
    pub fn new(state: Arc<ServerState>) -> Self {
        Self {
            state,
            inner: RwLock::new(Inner::default()),
            dependent: Mutex::new(BTreeSet::new()),
        }
    }

    /// The watermark this tracker advances.
    pub fn server_state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Register a received remote update. Returns false when a change with
    /// the same CSN is already tracked (duplicate delivery).
    pub fn put_remote_update(&self, msg: UpdateMessage) -> bool {
        let csn = msg.csn();
        let mut inner = self.inner.write().expect("pending map lock poisoned");
        if inner.pending.contains_key(&csn) {
            return false;
        }
        inner.pending.insert(
            csn,
            PendingChange {
                csn,
                committed: false,
                op: PendingOperation::Remote(msg),
            },
        );
        true
    }

    /// Register a locally generated change.
    pub fn put_local_change(&self, msg: UpdateMessage) -> bool {
        let csn = msg.csn();
        let mut inner = self.inner.write().expect("pending map lock poisoned");
        if inner.pending.contains_key(&csn) {
            return false;
        }
        inner.pending.insert(
            csn,
            PendingChange {
                csn,
                committed: false,
                op: PendingOperation::Local(msg),
            },
        );
        true
    }

    /// Mark a change as handed to a replay worker. Atomic with the dequeue
    /// step under the replay engine's coordination lock.
    pub fn mark_in_progress(&self, msg: &UpdateMessage) {
        let mut inner = self.inner.write().expect("pending map lock poisoned");
        let csn = msg.csn();
        if !inner.pending.contains_key(&csn) {
            // Receipt normally precedes dispatch; tolerate direct dispatch.
            inner.pending.insert(
                csn,
                PendingChange {
                    csn,
                    committed: false,
                    op: PendingOperation::Remote(msg.clone()),
                },
            );
        }
        inner.active.insert(csn);
    }

    /// Evaluate the dependency rules of `msg` against every active or
    /// dependent change with a strictly older CSN. A dependent change is
    /// parked and `true` is returned; the caller must not replay it.
    pub fn check_dependencies(&self, msg: &UpdateMessage) -> bool {
        let csn = msg.csn();
        let inner = self.inner.read().expect("pending map lock poisoned");
        let mut dependent = self.dependent.lock().expect("dependent set lock poisoned");

        let blocked = inner
            .active
            .iter()
            .chain(dependent.iter())
            .filter(|&&older| older < csn)
            .any(|older| match inner.pending.get(older) {
                Some(change) if !change.committed => depends_on(msg, change.op.message()),
                _ => false,
            });

        if blocked {
            debug!(%csn, "change depends on an older in-flight change");
            dependent.insert(csn);
        }
        blocked
    }

    /// Release the oldest parked change once the oldest pending CSN is
    /// newer-or-equal to it — i.e. everything it could conflict with has
    /// been committed and evicted.
    pub fn get_next_update(&self) -> Option<UpdateMessage> {
        let inner = self.inner.read().expect("pending map lock poisoned");
        let mut dependent = self.dependent.lock().expect("dependent set lock poisoned");

        let first = *dependent.iter().next()?;
        let oldest_pending = inner.pending.keys().next().copied();
        if oldest_pending.is_some_and(|oldest| oldest.is_older_than(first)) {
            return None;
        }
        dependent.remove(&first);
        inner.pending.get(&first).map(|c| c.op.message().clone())
    }

    /// Mark a change committed and advance the watermark over the contiguous
    /// committed prefix starting at the minimum key, evicting exactly that
    /// prefix.
    pub fn commit(&self, csn: Csn) {
        let mut inner = self.inner.write().expect("pending map lock poisoned");
        match inner.pending.get_mut(&csn) {
            Some(change) => change.committed = true,
            None => {
                warn!(%csn, "commit of unknown pending change");
                return;
            }
        }
        inner.active.remove(&csn);
        self.dependent
            .lock()
            .expect("dependent set lock poisoned")
            .remove(&csn);

        loop {
            let Some((&first, committed)) = inner
                .pending
                .iter()
                .next()
                .map(|(csn, change)| (csn, change.committed))
            else {
                break;
            };
            if !committed {
                break;
            }
            inner.pending.remove(&first);
            self.state.update(first);
        }
    }

    /// Number of tracked in-flight changes.
    pub fn pending_count(&self) -> usize {
        self.inner
            .read()
            .expect("pending map lock poisoned")
            .pending
            .len()
    }

    /// Number of changes parked on a dependency.
    pub fn dependent_count(&self) -> usize {
        self.dependent
            .lock()
            .expect("dependent set lock poisoned")
            .len()
    }

    /// True when the change is marked active (in-flight or blocked).
    pub fn is_active(&self, csn: Csn) -> bool {
        self.inner
            .read()
            .expect("pending map lock poisoned")
            .active
            .contains(&csn)
    }

    /// The oldest tracked CSN, if any.
    pub fn oldest_pending(&self) -> Option<Csn> {
        self.inner
            .read()
            .expect("pending map lock poisoned")
            .pending
            .keys()
            .next()
            .copied()
    }
}

/// The DN relationships that make `change` order-sensitive relative to an
/// older in-flight `older` change. These rules encode exactly the
/// containment/identity cases where replaying out of order would corrupt the
/// tree or resurrect deleted data.
fn depends_on(change: &UpdateMessage, older: &UpdateMessage) -> bool {
    let target = change.dn();
    match change {
        UpdateMessage::Add(_) => match older {
            // The target was deleted, or a parent is still being created,
            // or a rename is about to produce the target or its parent.
            UpdateMessage::Delete(d) => d.dn == *target,
            UpdateMessage::Add(a) => *target != a.dn && target.is_subordinate_to(&a.dn),
            UpdateMessage::ModifyDn(m) => {
                let new_dn = m.new_dn();
                new_dn == *target || new_dn.is_parent_of(target)
            }
            UpdateMessage::Modify(_) => false,
        },
        UpdateMessage::Modify(_) => match older {
            UpdateMessage::Add(a) => a.dn == *target,
            UpdateMessage::ModifyDn(m) => m.new_dn() == *target,
            _ => false,
        },
        UpdateMessage::Delete(_) => match older {
            // Children must go before the parent; creations and renames
            // touching the subtree must settle first.
            UpdateMessage::Delete(d) => d.dn.is_subordinate_to(target),
            UpdateMessage::Add(a) => a.dn == *target,
            UpdateMessage::ModifyDn(m) => {
                m.dn.is_subordinate_to(target) || m.new_dn().is_subordinate_to(target)
            }
            UpdateMessage::Modify(_) => false,
        },
        UpdateMessage::ModifyDn(change_dn) => {
            let new_dn = change_dn.new_dn();
            match older {
                UpdateMessage::Delete(d) => d.dn == new_dn,
                UpdateMessage::Add(a) => {
                    a.dn == *target || new_dn.parent().is_some_and(|p| p == a.dn)
                }
                UpdateMessage::ModifyDn(m) => m.new_dn() == *target,
                UpdateMessage::Modify(_) => false,
            }
        }
    }
}
