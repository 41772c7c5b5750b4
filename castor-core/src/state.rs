//! ServerState — the per-replica watermark of fully applied changes.
//!
//! Maps each replica id to the newest CSN from that replica known to be
//! contiguously applied locally. Internally synchronized; shared between the
//! pending-change tracker (which advances it on commit) and the protocol
//! layer (which reads it during handshakes).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::csn::{Csn, ReplicaId};

/// Per-replica watermark. `update` only ever advances, so a CSN recorded for
/// a replica is never replaced with an older one.
#[derive(Debug, Default)]
pub struct ServerState {
    csns: Mutex<BTreeMap<ReplicaId, Csn>>,
}

impl ServerState {
    /// Create an empty state (no replica seen yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `csn` as applied. Returns false when the state already holds a
    /// newer-or-equal CSN for that replica.
    pub fn update(&self, csn: Csn) -> bool {
        let mut csns = self.csns.lock().expect("server state lock poisoned");
        match csns.get(&csn.replica_id()) {
            Some(current) if csn.is_older_than_or_equal_to(*current) => false,
            _ => {
                csns.insert(csn.replica_id(), csn);
                true
            }
        }
    }

    /// Newest applied CSN for one replica.
    pub fn get(&self, replica_id: ReplicaId) -> Option<Csn> {
        self.csns
            .lock()
            .expect("server state lock poisoned")
            .get(&replica_id)
            .copied()
    }

    /// True when `csn` is already covered by the watermark of its replica.
    pub fn cover(&self, csn: Csn) -> bool {
        self.get(csn.replica_id())
            .is_some_and(|newest| csn.is_older_than_or_equal_to(newest))
    }

    /// Deterministic snapshot of the whole state, ordered by replica id.
    pub fn snapshot(&self) -> BTreeMap<ReplicaId, Csn> {
        self.csns
            .lock()
            .expect("server state lock poisoned")
            .clone()
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (replica_id, csn) in self.snapshot() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{replica_id}:{csn}")?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for ServerState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ServerState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let csns = BTreeMap::<ReplicaId, Csn>::deserialize(deserializer)?;
        Ok(Self {
            csns: Mutex::new(csns),
        })
    }
}
