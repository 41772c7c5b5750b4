//! Change Sequence Number (CSN) — the logical clock ordering all changes
//! across replicas.
//!
//! A CSN combines a wall-clock timestamp (milliseconds), a per-replica
//! sequence counter, and the replica id. The total order compares the
//! timestamp first, then the sequence counter, then the replica id, so two
//! replicas writing within the same millisecond still order deterministically.
//!
//! # Examples
//!
//! ```
//! use castor_core::Csn;
//!
//! let a = Csn::new(10, 0, 1);
//! let b = Csn::new(10, 1, 1);
//! assert!(a.is_older_than(b));
//! assert!(b.is_newer_than(a));
//! // `None` compares as older than any concrete CSN.
//! assert!(a.is_newer_than_or_equal_to(None));
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::Utc;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::DecodeError;

/// Identifier of one replica participating in multi-master replication.
pub type ReplicaId = u16;

/// Number of characters in the string form: timestamp(16) + replica(4) + seq(8).
pub const CSN_STRING_LEN: usize = 28;

/// A Change Sequence Number. Immutable value type, `Copy`, totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Csn {
    timestamp_ms: u64,
    seq: u32,
    replica_id: ReplicaId,
}

impl Csn {
    /// Create a CSN from its parts.
    pub fn new(timestamp_ms: u64, seq: u32, replica_id: ReplicaId) -> Self {
        Self {
            timestamp_ms,
            seq,
            replica_id,
        }
    }

    /// Milliseconds component of the clock.
    pub fn timestamp_ms(self) -> u64 {
        self.timestamp_ms
    }

    /// Per-replica sequence counter.
    pub fn seq(self) -> u32 {
        self.seq
    }

    /// Replica that generated this change.
    pub fn replica_id(self) -> ReplicaId {
        self.replica_id
    }

    /// True if `self` sorts strictly before `other`.
    ///
    /// All comparison helpers accept `Option<Csn>`: `None` means "no CSN
    /// recorded" and compares as older than any concrete CSN, which is the
    /// convention the conflict decision tables rely on.
    pub fn is_older_than(self, other: impl Into<Option<Csn>>) -> bool {
        match other.into() {
            Some(other) => self < other,
            None => false,
        }
    }

    /// True if `self` sorts before or equal to `other`.
    pub fn is_older_than_or_equal_to(self, other: impl Into<Option<Csn>>) -> bool {
        match other.into() {
            Some(other) => self <= other,
            None => false,
        }
    }

    /// True if `self` sorts strictly after `other`.
    pub fn is_newer_than(self, other: impl Into<Option<Csn>>) -> bool {
        match other.into() {
            Some(other) => self > other,
            None => true,
        }
    }

    /// True if `self` sorts after or equal to `other`.
    pub fn is_newer_than_or_equal_to(self, other: impl Into<Option<Csn>>) -> bool {
        match other.into() {
            Some(other) => self >= other,
            None => true,
        }
    }
}

impl fmt::Display for Csn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:016x}{:04x}{:08x}",
            self.timestamp_ms, self.replica_id, self.seq
        )
    }
}

impl FromStr for Csn {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != CSN_STRING_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DecodeError::MalformedCsn {
                value: s.to_string(),
            });
        }
        let malformed = |_| DecodeError::MalformedCsn {
            value: s.to_string(),
        };
        let timestamp_ms = u64::from_str_radix(&s[..16], 16).map_err(malformed)?;
        let replica_id = u16::from_str_radix(&s[16..20], 16).map_err(malformed)?;
        let seq = u32::from_str_radix(&s[20..28], 16).map_err(malformed)?;
        Ok(Csn::new(timestamp_ms, seq, replica_id))
    }
}

impl Serialize for Csn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Csn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Generates strictly increasing CSNs for one replica.
///
/// The generator never goes backwards: if the wall clock is behind the last
/// issued timestamp (clock regression, or several changes within the same
/// millisecond), the last timestamp is reused and the sequence counter is
/// bumped instead.
#[derive(Debug)]
pub struct CsnGenerator {
    replica_id: ReplicaId,
    last: Mutex<(u64, u32)>,
}

impl CsnGenerator {
    /// Create a generator for the given replica.
    pub fn new(replica_id: ReplicaId) -> Self {
        Self {
            replica_id,
            last: Mutex::new((0, 0)),
        }
    }

    /// The replica this generator stamps.
    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    /// Produce the next CSN. Strictly greater than every CSN previously
    /// returned by or fed into this generator.
    pub fn new_csn(&self) -> Csn {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut last = self.last.lock().expect("csn generator lock poisoned");
        let (last_ms, last_seq) = *last;
        let csn = if now > last_ms {
            Csn::new(now, 0, self.replica_id)
        } else {
            Csn::new(last_ms, last_seq + 1, self.replica_id)
        };
        *last = (csn.timestamp_ms, csn.seq);
        csn
    }

    /// Align the generator with a CSN received from another replica whose
    /// clock runs ahead, so locally generated CSNs keep sorting after every
    /// change already seen.
    pub fn adjust(&self, seen: Csn) {
        let mut last = self.last.lock().expect("csn generator lock poisoned");
        let (last_ms, last_seq) = *last;
        if seen.timestamp_ms > last_ms || (seen.timestamp_ms == last_ms && seen.seq > last_seq) {
            *last = (seen.timestamp_ms, seen.seq);
        }
    }
}
