//! Replication update messages.
//!
//! One closed sum type covers the four replicated operations. Uses
//! `#[serde(tag = "type", content = "data")]` for a clean JSON form on the
//! wire and in the change log.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::csn::Csn;
use crate::dn::Dn;
use crate::entry::{Attribute, Entry};
use crate::modification::Modification;

/// A replicated update. Every variant carries the originating CSN, the
/// target DN, and the entry's unique id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UpdateMessage {
    /// Entry creation.
    Add(AddMessage),
    /// Entry removal.
    Delete(DeleteMessage),
    /// Attribute modifications on an existing entry.
    Modify(ModifyMessage),
    /// Rename, possibly moving under a new superior.
    ModifyDn(ModifyDnMessage),
}

/// Replicated entry creation. Carries the whole entry content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddMessage {
    pub csn: Csn,
    pub dn: Dn,
    pub entry_uuid: Uuid,
    pub parent_uuid: Option<Uuid>,
    pub attributes: Vec<Attribute>,
}

/// Replicated entry removal. Only the DN and unique id are needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteMessage {
    pub csn: Csn,
    pub dn: Dn,
    pub entry_uuid: Uuid,
}

/// Replicated modify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyMessage {
    pub csn: Csn,
    pub dn: Dn,
    pub entry_uuid: Uuid,
    pub mods: Vec<Modification>,
}

/// Replicated rename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyDnMessage {
    pub csn: Csn,
    pub dn: Dn,
    pub entry_uuid: Uuid,
    pub new_rdn: String,
    pub delete_old_rdn: bool,
    pub new_superior: Option<Dn>,
    pub new_superior_uuid: Option<Uuid>,
}

impl ModifyDnMessage {
    /// The DN the entry carries after the rename.
    pub fn new_dn(&self) -> Dn {
        self.dn
            .rename(&self.new_rdn, self.new_superior.as_ref())
            // new_rdn and new_superior were parsed when the message was
            // built, so recombining them cannot produce a malformed DN.
            .unwrap_or_else(|_| self.dn.clone())
    }
}

impl UpdateMessage {
    /// The change's CSN.
    pub fn csn(&self) -> Csn {
        match self {
            UpdateMessage::Add(m) => m.csn,
            UpdateMessage::Delete(m) => m.csn,
            UpdateMessage::Modify(m) => m.csn,
            UpdateMessage::ModifyDn(m) => m.csn,
        }
    }

    /// The target DN.
    pub fn dn(&self) -> &Dn {
        match self {
            UpdateMessage::Add(m) => &m.dn,
            UpdateMessage::Delete(m) => &m.dn,
            UpdateMessage::Modify(m) => &m.dn,
            UpdateMessage::ModifyDn(m) => &m.dn,
        }
    }

    /// The target entry's unique id.
    pub fn entry_uuid(&self) -> Uuid {
        match self {
            UpdateMessage::Add(m) => m.entry_uuid,
            UpdateMessage::Delete(m) => m.entry_uuid,
            UpdateMessage::Modify(m) => m.entry_uuid,
            UpdateMessage::ModifyDn(m) => m.entry_uuid,
        }
    }

    /// Short operation name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            UpdateMessage::Add(_) => "add",
            UpdateMessage::Delete(_) => "delete",
            UpdateMessage::Modify(_) => "modify",
            UpdateMessage::ModifyDn(_) => "modifydn",
        }
    }
}

impl AddMessage {
    /// Materialize the entry this message creates.
    pub fn to_entry(&self) -> Entry {
        let mut entry = Entry::new(self.dn.clone(), self.entry_uuid);
        for attr in &self.attributes {
            entry.put(attr.desc.clone(), attr.values.clone());
        }
        entry
    }
}
