//! Entry model and lenient modification application.

use castor_core::dn::Dn;
use castor_core::entry::{normalize_value, Attribute, AttributeDescription, Entry};
use castor_core::modification::{Modification, ModificationType};
use uuid::Uuid;

fn entry() -> Entry {
    Entry::new(Dn::parse("cn=test,dc=example").unwrap(), Uuid::new_v4())
}

fn desc(s: &str) -> AttributeDescription {
    AttributeDescription::new(s)
}

#[test]
fn normalization_is_case_and_space_insensitive() {
    assert_eq!(normalize_value("  Hello   World "), "hello world");
    assert_eq!(normalize_value("x"), "x");
}

#[test]
fn attribute_description_keeps_sorted_options() {
    let d = desc("userCertificate;Binary;x-tag");
    assert_eq!(d.name(), "usercertificate");
    assert_eq!(d.to_string(), "usercertificate;binary;x-tag");
    assert_eq!(desc("cn"), desc("CN"));
    assert_ne!(desc("cn"), desc("cn;lang-fr"));
}

#[test]
fn add_skips_values_already_present() {
    let mut e = entry();
    e.apply_modification(&Modification::of(
        ModificationType::Add,
        "description",
        &["One", "two"],
    ));
    e.apply_modification(&Modification::of(
        ModificationType::Add,
        "description",
        &["ONE", "three"],
    ));
    assert_eq!(e.get(&desc("description")).unwrap().len(), 3);
}

#[test]
fn delete_of_absent_values_is_a_no_op() {
    let mut e = entry();
    e.apply_modification(&Modification::of(
        ModificationType::Add,
        "description",
        &["one"],
    ));
    e.apply_modification(&Modification::of(
        ModificationType::Delete,
        "description",
        &["missing"],
    ));
    assert!(e.has_value(&desc("description"), "one"));
    // Deleting the last value removes the attribute.
    e.apply_modification(&Modification::of(
        ModificationType::Delete,
        "description",
        &["one"],
    ));
    assert!(!e.has_attribute(&desc("description")));
}

#[test]
fn replace_with_no_values_removes_the_attribute() {
    let mut e = entry();
    e.put(desc("mail"), vec!["a@example.com".into()]);
    e.apply_modification(&Modification::new(
        ModificationType::Replace,
        Attribute::empty("mail"),
    ));
    assert!(!e.has_attribute(&desc("mail")));
}

#[test]
fn serde_round_trip() {
    let mut e = entry();
    e.put(desc("cn"), vec!["test".into()]);
    e.put(desc("mail"), vec!["a@example.com".into(), "b@example.com".into()]);
    let json = serde_json::to_string(&e).unwrap();
    let back: Entry = serde_json::from_str(&json).unwrap();
    assert_eq!(back.dn, e.dn);
    assert_eq!(back.entry_uuid, e.entry_uuid);
    assert_eq!(back.get(&desc("mail")), e.get(&desc("mail")));
}
