//! CSN ordering rule: key layout, clustering, range matching.

use castor_core::csn::Csn;
use castor_historical::index_key::{CsnIndexKey, CsnOrderingRule, CSN_INDEX_KEY_LEN};

fn value(csn: Csn) -> String {
    format!("description:{csn}:add:v")
}

#[test]
fn key_reorders_replica_first() {
    let csn = Csn::new(0x0102_0304_0506_0708, 0x0a0b_0c0d, 0x1122);
    let key = CsnIndexKey::from_csn(csn);
    let bytes = key.as_bytes();
    assert_eq!(bytes.len(), CSN_INDEX_KEY_LEN);
    assert_eq!(&bytes[..2], &[0x11, 0x22]);
    assert_eq!(&bytes[2..10], &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
    assert_eq!(&bytes[10..], &[0x0a, 0x0b, 0x0c, 0x0d]);
    assert_eq!(key.csn(), csn);
}

#[test]
fn extracts_the_csn_after_the_first_colon() {
    let csn = Csn::new(42, 7, 3);
    let key = CsnIndexKey::from_historical_value(&value(csn)).unwrap();
    assert_eq!(key.csn(), csn);

    // Attribute options do not disturb extraction.
    let with_options = format!("description;lang-fr:{csn}:del:v");
    assert_eq!(
        CsnIndexKey::from_historical_value(&with_options).unwrap().csn(),
        csn
    );
}

#[test]
fn rejects_values_without_a_csn() {
    assert!(CsnIndexKey::from_historical_value("description").is_err());
    assert!(CsnIndexKey::from_historical_value("description:short:add:v").is_err());
}

#[test]
fn one_replicas_history_clusters_contiguously() {
    // Interleave two replicas in time; in key order each replica's records
    // are contiguous, which is what per-replica catch-up scans rely on.
    let mut keys: Vec<CsnIndexKey> = [
        Csn::new(1, 0, 2),
        Csn::new(2, 0, 1),
        Csn::new(3, 0, 2),
        Csn::new(4, 0, 1),
    ]
    .into_iter()
    .map(CsnIndexKey::from_csn)
    .collect();
    keys.sort();
    let replicas: Vec<u16> = keys.iter().map(|k| k.csn().replica_id()).collect();
    assert_eq!(replicas, [1, 1, 2, 2]);
}

#[test]
fn within_a_replica_keys_order_by_time_then_sequence() {
    let a = CsnIndexKey::from_csn(Csn::new(5, 0, 1));
    let b = CsnIndexKey::from_csn(Csn::new(5, 1, 1));
    let c = CsnIndexKey::from_csn(Csn::new(6, 0, 1));
    assert!(a < b && b < c);
}

#[test]
fn ordered_assertions() {
    let rule = CsnOrderingRule;
    let old = Csn::new(10, 0, 1);
    let new = Csn::new(20, 0, 1);

    assert!(rule.equal(&value(old), old).unwrap());
    assert!(!rule.equal(&value(old), new).unwrap());
    assert!(rule.less_than(&value(old), new).unwrap());
    assert!(rule.less_than_or_equal(&value(old), old).unwrap());
    assert!(rule.greater_than_or_equal(&value(new), old).unwrap());
    assert!(!rule.greater_than_or_equal(&value(old), new).unwrap());

    assert_eq!(
        rule.compare(&value(old), &value(new)).unwrap(),
        std::cmp::Ordering::Less
    );
}

#[test]
fn substring_matching_is_rejected() {
    let rule = CsnOrderingRule;
    assert!(rule.substring("anything").is_err());
}
