//! Distinguished names, normalized for comparison.
//!
//! The dependency rules between pending changes are all phrased in terms of
//! DN identity and containment, so equality and ancestry tests work on a
//! normalized form: RDNs split on unescaped commas, lowercased, with
//! insignificant whitespace removed.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::DecodeError;

/// A distinguished name. Equality and hashing use the normalized form; the
/// original string is kept for display in messages and entries.
#[derive(Debug, Clone)]
pub struct Dn {
    raw: String,
    /// Normalized RDNs, leaf first (same order as the string form).
    rdns: Vec<String>,
}

impl Dn {
    /// Parse a DN. The empty string is the root DN (zero RDNs).
    pub fn parse(s: &str) -> Result<Self, DecodeError> {
        let raw = s.trim().to_string();
        if raw.is_empty() {
            return Ok(Self {
                raw,
                rdns: Vec::new(),
            });
        }
        let mut rdns = Vec::new();
        for part in split_unescaped(&raw, ',') {
            let rdn = normalize_rdn(&part)?;
            if rdn.is_empty() {
                return Err(DecodeError::MalformedDn {
                    value: s.to_string(),
                });
            }
            rdns.push(rdn);
        }
        Ok(Self { raw, rdns })
    }

    /// The DN as originally written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of RDN components.
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// The leaf RDN in normalized form, if any.
    pub fn rdn(&self) -> Option<&str> {
        self.rdns.first().map(String::as_str)
    }

    /// The parent DN, or `None` for the root.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            return None;
        }
        let raw = match split_unescaped(&self.raw, ',').split_first() {
            Some((_, rest)) if !rest.is_empty() => rest.join(","),
            _ => String::new(),
        };
        Some(Dn {
            raw: raw.trim().to_string(),
            rdns: self.rdns[1..].to_vec(),
        })
    }

    /// True when `self` is `ancestor` or sits below it in the tree.
    pub fn is_subordinate_to(&self, ancestor: &Dn) -> bool {
        let n = ancestor.rdns.len();
        self.rdns.len() >= n && self.rdns[self.rdns.len() - n..] == ancestor.rdns[..]
    }

    /// True when `self` is the immediate parent of `child`.
    pub fn is_parent_of(&self, child: &Dn) -> bool {
        child.parent().as_ref() == Some(self)
    }

    /// Build the DN obtained by replacing the leaf RDN and optionally moving
    /// under a new superior. Used to derive the post-rename DN of a modify-DN
    /// change.
    pub fn rename(&self, new_rdn: &str, new_superior: Option<&Dn>) -> Result<Dn, DecodeError> {
        let parent_raw = match new_superior {
            Some(superior) => superior.raw.clone(),
            None => self.parent().map(|p| p.raw).unwrap_or_default(),
        };
        let raw = if parent_raw.is_empty() {
            new_rdn.to_string()
        } else {
            format!("{new_rdn},{parent_raw}")
        };
        Dn::parse(&raw)
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.rdns == other.rdns
    }
}

impl Eq for Dn {}

impl std::hash::Hash for Dn {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.rdns.hash(state);
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rdns.cmp(&other.rdns)
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Dn {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dn::parse(s)
    }
}

impl Serialize for Dn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Dn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Dn::parse(&s).map_err(D::Error::custom)
    }
}

/// Split on `sep`, honoring backslash escapes.
fn split_unescaped(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            current.push(c);
            escaped = true;
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

/// Normalize one RDN: `type=value` with the type lowercased and both sides
/// trimmed; the value is lowercased with inner whitespace runs collapsed.
fn normalize_rdn(rdn: &str) -> Result<String, DecodeError> {
    let rdn = rdn.trim();
    let Some((attr, value)) = rdn.split_once('=') else {
        return Err(DecodeError::MalformedDn {
            value: rdn.to_string(),
        });
    };
    let attr = attr.trim().to_ascii_lowercase();
    let value = crate::entry::normalize_value(value);
    if attr.is_empty() || value.is_empty() {
        return Err(DecodeError::MalformedDn {
            value: rdn.to_string(),
        });
    }
    Ok(format!("{attr}={value}"))
}
