//! Shared constants.

/// Operational attribute holding the encoded historical metadata on an entry.
pub const HISTORICAL_ATTRIBUTE_NAME: &str = "ds-sync-hist";

/// Operational attribute holding the entry's unique id.
pub const ENTRY_UUID_ATTRIBUTE_NAME: &str = "entryuuid";

/// Pseudo attribute name used by the reserved historical records
/// `dn:<csn>:add` and `dn:<csn>:moddn`.
pub const HISTORICAL_DN_PSEUDO_ATTRIBUTE: &str = "dn";
