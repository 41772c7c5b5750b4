//! DN normalization and containment.

use castor_core::dn::Dn;

fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

#[test]
fn equality_ignores_case_and_insignificant_whitespace() {
    assert_eq!(dn("cn=Bob, ou=People,dc=Example"), dn("CN=bob,OU=people , DC=example"));
    assert_ne!(dn("cn=bob,dc=example"), dn("cn=alice,dc=example"));
}

#[test]
fn parent_strips_the_leaf_rdn() {
    let child = dn("cn=bob,ou=people,dc=example");
    assert_eq!(child.parent().unwrap(), dn("ou=people,dc=example"));
    assert_eq!(dn("dc=example").parent().unwrap(), Dn::parse("").unwrap());
    assert!(Dn::parse("").unwrap().parent().is_none());
}

#[test]
fn subordination_includes_equality() {
    let base = dn("dc=example");
    let child = dn("ou=people,dc=example");
    let grandchild = dn("cn=bob,ou=people,dc=example");
    assert!(base.is_subordinate_to(&base));
    assert!(child.is_subordinate_to(&base));
    assert!(grandchild.is_subordinate_to(&base));
    assert!(!base.is_subordinate_to(&child));
    // Sibling trees do not contain each other.
    assert!(!dn("ou=groups,dc=example").is_subordinate_to(&child));
}

#[test]
fn is_parent_of_is_immediate_only() {
    let base = dn("dc=example");
    let child = dn("ou=people,dc=example");
    let grandchild = dn("cn=bob,ou=people,dc=example");
    assert!(base.is_parent_of(&child));
    assert!(!base.is_parent_of(&grandchild));
    assert!(child.is_parent_of(&grandchild));
}

#[test]
fn rename_replaces_rdn_and_optionally_moves() {
    let entry = dn("cn=bob,ou=people,dc=example");
    assert_eq!(
        entry.rename("cn=robert", None).unwrap(),
        dn("cn=robert,ou=people,dc=example")
    );
    assert_eq!(
        entry
            .rename("cn=bob", Some(&dn("ou=admins,dc=example")))
            .unwrap(),
        dn("cn=bob,ou=admins,dc=example")
    );
}

#[test]
fn escaped_commas_do_not_split_rdns() {
    let d = dn(r"cn=Smith\, Bob,ou=people,dc=example");
    assert_eq!(d.depth(), 3);
    assert_eq!(d.parent().unwrap(), dn("ou=people,dc=example"));
}

#[test]
fn rejects_rdns_without_a_value() {
    assert!(Dn::parse("cn=bob,,dc=example").is_err());
    assert!(Dn::parse("nonsense").is_err());
    assert!(Dn::parse("=value,dc=example").is_err());
}
