use uuid::Uuid;

/// Errors surfaced by the ledger store and its callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("upload not found")]
    UploadNotFound,

    #[error("upload {0} already exists")]
    DuplicateUpload(Uuid),

    /// Backend failure from a durable store implementation. The in-memory
    /// store never returns this.
    #[error("storage failure: {0}")]
    Storage(String),
}
