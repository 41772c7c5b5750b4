/// Decoding failures. Historical metadata and CSNs are produced exclusively
/// by the server itself, so a malformed value means internal corruption and
/// decoding fails fast instead of attempting recovery.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed CSN: {value:?}")]
    MalformedCsn { value: String },

    #[error("malformed historical value: {value:?}")]
    MalformedHistorical { value: String },

    #[error("malformed DN: {value:?}")]
    MalformedDn { value: String },

    #[error("unsupported matching kind for CSN ordering rule: {kind}")]
    UnsupportedMatching { kind: &'static str },
}
