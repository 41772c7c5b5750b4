/// Failures while replaying a remote change against the local replica.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("no entry for {target}")]
    EntryMissing { target: String },

    #[error("entry already exists: {dn}")]
    DuplicateEntry { dn: String },

    #[error("replay queue is closed")]
    QueueClosed,

    #[error("backend failure: {message}")]
    BackendFailure { message: String },

    #[error("no replication domain covers {dn}")]
    NoDomainFor { dn: String },
}
