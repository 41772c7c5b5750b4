//! CSN ordering rule for historical-attribute indexes.
//!
//! An encoded historical value starts with `<attr>:<28-hex csn>:...`. The
//! rule extracts the CSN and re-encodes it as a 14-byte binary key ordered
//! **replica-id (2) ‖ timestamp (8) ‖ sequence (4)** — reordered from the
//! string layout so that all of one replica's history sits contiguously in
//! the index. Per-replica catch-up is a single range scan.
//!
//! The rule supports equality and ordered range matching. Substring
//! assertions are rejected: an ordering rule over a structured binary key
//! has no meaningful substring semantics.

use std::cmp::Ordering;

use castor_core::csn::Csn;
use castor_core::errors::DecodeError;

/// Length of the binary key.
pub const CSN_INDEX_KEY_LEN: usize = 14;

/// The 14-byte index key. Ordering of the byte array is the index ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CsnIndexKey([u8; CSN_INDEX_KEY_LEN]);

impl CsnIndexKey {
    /// Build the key for a CSN.
    pub fn from_csn(csn: Csn) -> Self {
        let mut key = [0u8; CSN_INDEX_KEY_LEN];
        key[..2].copy_from_slice(&csn.replica_id().to_be_bytes());
        key[2..10].copy_from_slice(&csn.timestamp_ms().to_be_bytes());
        key[10..].copy_from_slice(&csn.seq().to_be_bytes());
        Self(key)
    }

    /// Extract the CSN from an encoded historical value and build its key.
    pub fn from_historical_value(value: &str) -> Result<Self, DecodeError> {
        Ok(Self::from_csn(csn_of_historical_value(value)?))
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; CSN_INDEX_KEY_LEN] {
        &self.0
    }

    /// Decode the key back into a CSN.
    pub fn csn(&self) -> Csn {
        let replica_id = u16::from_be_bytes([self.0[0], self.0[1]]);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&self.0[2..10]);
        let mut seq = [0u8; 4];
        seq.copy_from_slice(&self.0[10..]);
        Csn::new(u64::from_be_bytes(ts), u32::from_be_bytes(seq), replica_id)
    }
}

/// Parse the 28-hex-character CSN immediately after the first colon of an
/// encoded historical value.
fn csn_of_historical_value(value: &str) -> Result<Csn, DecodeError> {
    let malformed = || DecodeError::MalformedHistorical {
        value: value.to_string(),
    };
    let (_, rest) = value.split_once(':').ok_or_else(malformed)?;
    let hex = rest.get(..28).ok_or_else(malformed)?;
    hex.parse().map_err(|_| malformed())
}

/// The ordering/equality rule over encoded historical values. Stateless;
/// safe to share across threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsnOrderingRule;

impl CsnOrderingRule {
    /// Normalize an encoded historical value into its index key.
    pub fn index_key(&self, value: &str) -> Result<CsnIndexKey, DecodeError> {
        CsnIndexKey::from_historical_value(value)
    }

    /// Compare two encoded historical values in index order.
    pub fn compare(&self, a: &str, b: &str) -> Result<Ordering, DecodeError> {
        Ok(self.index_key(a)?.cmp(&self.index_key(b)?))
    }

    /// Equality assertion.
    pub fn equal(&self, value: &str, assertion: Csn) -> Result<bool, DecodeError> {
        Ok(self.index_key(value)? == CsnIndexKey::from_csn(assertion))
    }

    /// `value < assertion` in index order.
    pub fn less_than(&self, value: &str, assertion: Csn) -> Result<bool, DecodeError> {
        Ok(self.index_key(value)? < CsnIndexKey::from_csn(assertion))
    }

    /// `value ≤ assertion` in index order.
    pub fn less_than_or_equal(&self, value: &str, assertion: Csn) -> Result<bool, DecodeError> {
        Ok(self.index_key(value)? <= CsnIndexKey::from_csn(assertion))
    }

    /// `value ≥ assertion` in index order.
    pub fn greater_than_or_equal(&self, value: &str, assertion: Csn) -> Result<bool, DecodeError> {
        Ok(self.index_key(value)? >= CsnIndexKey::from_csn(assertion))
    }

    /// Substring assertions are undefined for this rule.
    pub fn substring(&self, _assertion: &str) -> Result<CsnIndexKey, DecodeError> {
        Err(DecodeError::UnsupportedMatching { kind: "substring" })
    }
}
