//! Update message accessors and wire form.

use castor_core::csn::Csn;
use castor_core::dn::Dn;
use castor_core::entry::Attribute;
use castor_core::message::{AddMessage, ModifyDnMessage, UpdateMessage};
use uuid::Uuid;

fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

#[test]
fn add_message_materializes_its_entry() {
    let msg = AddMessage {
        csn: Csn::new(1, 0, 1),
        dn: dn("cn=bob,dc=example"),
        entry_uuid: Uuid::new_v4(),
        parent_uuid: None,
        attributes: vec![
            Attribute::new("cn", vec!["bob".into()]),
            Attribute::new("mail", vec!["bob@example.com".into()]),
        ],
    };
    let entry = msg.to_entry();
    assert_eq!(entry.dn, msg.dn);
    assert!(entry.has_value(&"mail".into(), "bob@example.com"));
}

#[test]
fn modify_dn_derives_the_new_dn() {
    let msg = ModifyDnMessage {
        csn: Csn::new(1, 0, 1),
        dn: dn("cn=bob,ou=people,dc=example"),
        entry_uuid: Uuid::new_v4(),
        new_rdn: "cn=robert".into(),
        delete_old_rdn: true,
        new_superior: None,
        new_superior_uuid: None,
    };
    assert_eq!(msg.new_dn(), dn("cn=robert,ou=people,dc=example"));

    let moved = ModifyDnMessage {
        new_superior: Some(dn("ou=admins,dc=example")),
        ..msg
    };
    assert_eq!(moved.new_dn(), dn("cn=robert,ou=admins,dc=example"));
}

#[test]
fn serde_tags_the_variant() {
    let msg = UpdateMessage::Delete(castor_core::message::DeleteMessage {
        csn: Csn::new(9, 1, 3),
        dn: dn("cn=gone,dc=example"),
        entry_uuid: Uuid::new_v4(),
    });
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["type"], "Delete");
    let back: UpdateMessage = serde_json::from_value(json).unwrap();
    assert_eq!(back, msg);
    assert_eq!(back.kind(), "delete");
}
