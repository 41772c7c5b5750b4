//! Textual encoding of historical metadata.
//!
//! One record per line of the `ds-sync-hist` operational attribute:
//!
//! ```text
//! <attrNameWithOptions>:<csn>:<kind>[:<value>]
//! ```
//!
//! with `kind` one of `add`, `del`, `repl`, `attrDel`, plus the two reserved
//! pseudo-attribute forms `dn:<csn>:add` (entry creation time) and
//! `dn:<csn>:moddn` (last rename time). Values may themselves contain
//! colons, so parsing splits into at most four parts.
//!
//! This data is written exclusively by the server; a value that does not
//! parse indicates corruption and decoding fails fast.

use std::fmt;
use std::str::FromStr;

use castor_core::constants::HISTORICAL_DN_PSEUDO_ATTRIBUTE;
use castor_core::csn::Csn;
use castor_core::entry::{Attribute, AttributeDescription};
use castor_core::errors::DecodeError;
use castor_core::modification::{Modification, ModificationType};
use serde::{Deserialize, Serialize};

/// The modification taxonomy recorded per historical entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HistoryKind {
    /// A value was added.
    Add,
    /// A value was deleted.
    Del,
    /// The attribute was replaced with this value.
    Repl,
    /// The whole attribute was deleted.
    AttrDel,
}

impl HistoryKind {
    fn as_str(self) -> &'static str {
        match self {
            HistoryKind::Add => "add",
            HistoryKind::Del => "del",
            HistoryKind::Repl => "repl",
            HistoryKind::AttrDel => "attrDel",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "add" => Some(HistoryKind::Add),
            "del" => Some(HistoryKind::Del),
            "repl" => Some(HistoryKind::Repl),
            "attrDel" => Some(HistoryKind::AttrDel),
            _ => None,
        }
    }
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded historical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum HistoricalRecord {
    /// `<attr>:<csn>:<kind>[:<value>]` — one attribute event.
    Attribute {
        attr: AttributeDescription,
        csn: Csn,
        kind: HistoryKind,
        value: Option<String>,
    },
    /// `dn:<csn>:add` — when the entry was created.
    EntryAdd { csn: Csn },
    /// `dn:<csn>:moddn` — when the entry was last renamed.
    EntryRename { csn: Csn },
}

impl HistoricalRecord {
    /// Build an attribute record.
    pub fn attribute(
        attr: AttributeDescription,
        csn: Csn,
        kind: HistoryKind,
        value: Option<String>,
    ) -> Self {
        HistoricalRecord::Attribute {
            attr,
            csn,
            kind,
            value,
        }
    }

    /// The record's CSN.
    pub fn csn(&self) -> Csn {
        match self {
            HistoricalRecord::Attribute { csn, .. }
            | HistoricalRecord::EntryAdd { csn }
            | HistoricalRecord::EntryRename { csn } => *csn,
        }
    }

    /// Map an attribute record back to the concrete modification it stands
    /// for, used when reconstructing replication messages from stored state.
    /// Returns `None` for the reserved `dn:` records.
    pub fn generate_mod(&self) -> Option<Modification> {
        let HistoricalRecord::Attribute {
            attr, kind, value, ..
        } = self
        else {
            return None;
        };
        let values: Vec<String> = value.iter().cloned().collect();
        let mod_type = match kind {
            HistoryKind::Add => ModificationType::Add,
            HistoryKind::Del | HistoryKind::AttrDel => ModificationType::Delete,
            HistoryKind::Repl => ModificationType::Replace,
        };
        Some(Modification::new(
            mod_type,
            Attribute::new(attr.clone(), values),
        ))
    }
}

impl fmt::Display for HistoricalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoricalRecord::Attribute {
                attr,
                csn,
                kind,
                value,
            } => {
                write!(f, "{attr}:{csn}:{kind}")?;
                if let Some(value) = value {
                    write!(f, ":{value}")?;
                }
                Ok(())
            }
            HistoricalRecord::EntryAdd { csn } => {
                write!(f, "{HISTORICAL_DN_PSEUDO_ATTRIBUTE}:{csn}:add")
            }
            HistoricalRecord::EntryRename { csn } => {
                write!(f, "{HISTORICAL_DN_PSEUDO_ATTRIBUTE}:{csn}:moddn")
            }
        }
    }
}

impl FromStr for HistoricalRecord {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DecodeError::MalformedHistorical {
            value: s.to_string(),
        };

        // The value may contain colons: split the header off in at most
        // four parts and keep the tail intact.
        let mut parts = s.splitn(4, ':');
        let attr = parts.next().filter(|a| !a.is_empty()).ok_or_else(malformed)?;
        let csn: Csn = parts
            .next()
            .ok_or_else(malformed)?
            .parse()
            .map_err(|_| malformed())?;
        let kind = parts.next().ok_or_else(malformed)?;
        let value = parts.next().map(str::to_string);

        if attr.eq_ignore_ascii_case(HISTORICAL_DN_PSEUDO_ATTRIBUTE) {
            if value.is_some() {
                return Err(malformed());
            }
            return match kind {
                "add" => Ok(HistoricalRecord::EntryAdd { csn }),
                "moddn" => Ok(HistoricalRecord::EntryRename { csn }),
                _ => Err(malformed()),
            };
        }

        let kind = HistoryKind::parse(kind).ok_or_else(malformed)?;
        match kind {
            // attrDel never carries a value; the others need one except
            // repl, which may stand for a replace-with-nothing.
            HistoryKind::AttrDel if value.is_some() => return Err(malformed()),
            HistoryKind::Add | HistoryKind::Del if value.is_none() => return Err(malformed()),
            _ => {}
        }

        Ok(HistoricalRecord::Attribute {
            attr: AttributeDescription::new(attr),
            csn,
            kind,
            value,
        })
    }
}
