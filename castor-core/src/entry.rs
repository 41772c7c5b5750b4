//! Minimal entry model: attribute descriptions, attributes, entries.
//!
//! Only what the conflict-resolution and replay paths need: value presence
//! tests under normalization, and lenient modification application (replayed
//! deletes may target values a newer change already removed).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dn::Dn;
use crate::modification::{Modification, ModificationType};

/// Normalize an attribute value for comparison: trim, collapse inner
/// whitespace runs, lowercase. The caseIgnore flavour of matching is enough
/// for the replication core; exact-match attributes only lose the ability to
/// disagree about case, never convergence.
pub fn normalize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_was_space = false;
    for c in value.trim().chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.extend(c.to_lowercase());
            last_was_space = false;
        }
    }
    out
}

/// An attribute name plus its options, e.g. `description` or
/// `userCertificate;binary`. Name and options are stored lowercased; the
/// string form is `name;opt1;opt2` with options sorted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttributeDescription {
    name: String,
    options: Vec<String>,
}

impl AttributeDescription {
    /// Parse `name[;option]...`.
    pub fn new(s: &str) -> Self {
        let mut parts = s.split(';');
        let name = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let mut options: Vec<String> = parts
            .map(|o| o.trim().to_ascii_lowercase())
            .filter(|o| !o.is_empty())
            .collect();
        options.sort();
        options.dedup();
        Self { name, options }
    }

    /// The attribute type name without options.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attribute options, sorted.
    pub fn options(&self) -> &[String] {
        &self.options
    }
}

impl fmt::Display for AttributeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for option in &self.options {
            write!(f, ";{option}")?;
        }
        Ok(())
    }
}

impl From<AttributeDescription> for String {
    fn from(desc: AttributeDescription) -> String {
        desc.to_string()
    }
}

impl TryFrom<String> for AttributeDescription {
    type Error = std::convert::Infallible;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Ok(AttributeDescription::new(&s))
    }
}

impl From<&str> for AttributeDescription {
    fn from(s: &str) -> Self {
        AttributeDescription::new(s)
    }
}

/// An attribute: description plus raw values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub desc: AttributeDescription,
    pub values: Vec<String>,
}

impl Attribute {
    /// Build an attribute from a description and values.
    pub fn new(desc: impl Into<AttributeDescription>, values: Vec<String>) -> Self {
        Self {
            desc: desc.into(),
            values,
        }
    }

    /// An attribute with no values (used by delete/replace modifications).
    pub fn empty(desc: impl Into<AttributeDescription>) -> Self {
        Self::new(desc, Vec::new())
    }

    /// True when the attribute carries no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Presence test under normalization.
    pub fn contains(&self, value: &str) -> bool {
        let norm = normalize_value(value);
        self.values.iter().any(|v| normalize_value(v) == norm)
    }
}

/// A directory entry: DN, unique id, attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub dn: Dn,
    pub entry_uuid: Uuid,
    attributes: BTreeMap<AttributeDescription, Vec<String>>,
}

impl Entry {
    /// Create an entry with no attributes.
    pub fn new(dn: Dn, entry_uuid: Uuid) -> Self {
        Self {
            dn,
            entry_uuid,
            attributes: BTreeMap::new(),
        }
    }

    /// All attributes, ordered by description.
    pub fn attributes(&self) -> impl Iterator<Item = Attribute> + '_ {
        self.attributes
            .iter()
            .map(|(desc, values)| Attribute::new(desc.clone(), values.clone()))
    }

    /// Values of one attribute.
    pub fn get(&self, desc: &AttributeDescription) -> Option<&[String]> {
        self.attributes.get(desc).map(Vec::as_slice)
    }

    /// True when the entry has the attribute with at least one value.
    pub fn has_attribute(&self, desc: &AttributeDescription) -> bool {
        self.attributes.get(desc).is_some_and(|v| !v.is_empty())
    }

    /// Presence test for one value under normalization.
    pub fn has_value(&self, desc: &AttributeDescription, value: &str) -> bool {
        let norm = normalize_value(value);
        self.attributes
            .get(desc)
            .is_some_and(|values| values.iter().any(|v| normalize_value(v) == norm))
    }

    /// Replace the whole attribute. An empty value list removes it.
    pub fn put(&mut self, desc: AttributeDescription, values: Vec<String>) {
        if values.is_empty() {
            self.attributes.remove(&desc);
        } else {
            self.attributes.insert(desc, values);
        }
    }

    /// Remove the whole attribute.
    pub fn remove(&mut self, desc: &AttributeDescription) {
        self.attributes.remove(desc);
    }

    /// Apply one modification with replay-friendly leniency: adding an
    /// already-present value and deleting an absent one are both no-ops
    /// rather than errors, since conflict resolution may have narrowed the
    /// modification against a moving target.
    pub fn apply_modification(&mut self, modification: &Modification) {
        let desc = modification.attribute.desc.clone();
        match modification.mod_type {
            ModificationType::Add => {
                let values = self.attributes.entry(desc).or_default();
                for value in &modification.attribute.values {
                    let norm = normalize_value(value);
                    if !values.iter().any(|v| normalize_value(v) == norm) {
                        values.push(value.clone());
                    }
                }
            }
            ModificationType::Delete => {
                if modification.attribute.values.is_empty() {
                    self.attributes.remove(&desc);
                } else if let Some(values) = self.attributes.get_mut(&desc) {
                    for value in &modification.attribute.values {
                        let norm = normalize_value(value);
                        values.retain(|v| normalize_value(v) != norm);
                    }
                    if values.is_empty() {
                        self.attributes.remove(&desc);
                    }
                }
            }
            ModificationType::Replace => {
                self.put(desc, modification.attribute.values.clone());
            }
            // Increment is not applied by the replication core; see the
            // conflict engine for the documented gap.
            ModificationType::Increment => {}
        }
    }

    /// Apply a list of modifications in order.
    pub fn apply_modifications(&mut self, mods: &[Modification]) {
        for modification in mods {
            self.apply_modification(modification);
        }
    }
}
