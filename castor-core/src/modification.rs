//! LDAP modification model.

use serde::{Deserialize, Serialize};

use crate::entry::{Attribute, AttributeDescription};

/// The four LDAP modification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModificationType {
    Add,
    Delete,
    Replace,
    Increment,
}

/// One modification of one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub mod_type: ModificationType,
    pub attribute: Attribute,
}

impl Modification {
    /// Build a modification from its parts.
    pub fn new(mod_type: ModificationType, attribute: Attribute) -> Self {
        Self {
            mod_type,
            attribute,
        }
    }

    /// Convenience constructor from a description and string values.
    pub fn of(
        mod_type: ModificationType,
        desc: impl Into<AttributeDescription>,
        values: &[&str],
    ) -> Self {
        Self::new(
            mod_type,
            Attribute::new(desc, values.iter().map(|v| v.to_string()).collect()),
        )
    }

    /// The attribute description this modification targets.
    pub fn desc(&self) -> &AttributeDescription {
        &self.attribute.desc
    }
}
