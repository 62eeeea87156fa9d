use async_trait::async_trait;
use uuid::Uuid;

use super::{DomainError, IssueTransaction, Transaction, TransactionStatus, Upload, UploadStatus};

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, DomainError>;

/// The ledger store contract.
///
/// Exactly one instance is shared (behind `Arc`) among the CSV processor,
/// all bus workers, and the query path. Implementations must be safe under
/// concurrent callers and must preserve per-upload insertion order of
/// transactions. Any durable store honoring this contract may replace the
/// in-memory reference implementation.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Initialize an upload row in `Processing` with an empty transaction
    /// list. Fails with [`DomainError::DuplicateUpload`] if the id exists.
    async fn create_upload(&self, upload_id: Uuid) -> Result<()>;

    async fn get_upload(&self, upload_id: Uuid) -> Result<Upload>;

    /// Transitioning to `Completed` or `Failed` stamps `completed_at`.
    async fn update_upload_status(&self, upload_id: Uuid, status: UploadStatus) -> Result<()>;

    /// Atomic `processed_rows += 1`.
    async fn increment_processed_rows(&self, upload_id: Uuid) -> Result<()>;

    /// Append a transaction to the upload's ledger. Append order equals
    /// commit order, which is not necessarily source order; `line_number`
    /// carries source order.
    async fn add_transaction(
        &self,
        upload_id: Uuid,
        transaction: Transaction,
        line_number: u64,
    ) -> Result<()>;

    /// Net balance in minor units over SUCCESS rows: CREDIT positive,
    /// DEBIT negative. Empty ledger yields 0.
    async fn get_balance(&self, upload_id: Uuid) -> Result<i64>;

    /// Page through FAILED/PENDING rows in insertion order, optionally
    /// restricted to one status. Returns the page and the filtered total.
    async fn get_issues(
        &self,
        upload_id: Uuid,
        page: u64,
        per_page: u64,
        status: Option<TransactionStatus>,
    ) -> Result<(Vec<IssueTransaction>, u64)>;

    /// Whether the event's side effects have already been committed.
    async fn is_event_processed(&self, event_id: &str) -> Result<bool>;

    /// Record the event id in the processed set. Idempotent.
    async fn mark_event_processed(&self, event_id: &str) -> Result<()>;
}
