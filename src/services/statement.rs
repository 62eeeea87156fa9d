//! Upload coordination and ledger queries.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use super::csv_processor::{CsvProcessor, StatementStream};
use crate::domain::{DomainError, IssueTransaction, Repository, TransactionStatus, Upload};

/// Accepts statement uploads and answers ledger queries.
///
/// `upload_statement` returns as soon as the upload row exists; parsing
/// runs in a detached task whose lifetime is bounded by the bus's
/// cancellation token, not by the request. Uploads therefore survive
/// client disconnects.
pub struct StatementService {
    repo: Arc<dyn Repository>,
    processor: Arc<dyn CsvProcessor>,
    pipeline_cancel: CancellationToken,
}

impl StatementService {
    pub fn new(
        repo: Arc<dyn Repository>,
        processor: Arc<dyn CsvProcessor>,
        pipeline_cancel: CancellationToken,
    ) -> Self {
        Self {
            repo,
            processor,
            pipeline_cancel,
        }
    }

    /// Create the upload record and hand the stream to the processor in
    /// the background. Returns the upload id immediately.
    pub async fn upload_statement(&self, stream: StatementStream) -> Result<Uuid, DomainError> {
        let upload_id = Uuid::new_v4();

        info!(upload_id = %upload_id, "Creating upload record");
        self.repo.create_upload(upload_id).await?;

        let processor = self.processor.clone();
        let cancel = self.pipeline_cancel.child_token();
        let span = info_span!("csv_ingest", upload_id = %upload_id);
        tokio::spawn(
            async move {
                info!("Starting async CSV processing");
                if let Err(err) = processor.process_stream(cancel, upload_id, stream).await {
                    error!(error = %err, "CSV processing failed");
                }
            }
            .instrument(span),
        );

        info!(upload_id = %upload_id, "Upload created, processing started");

        Ok(upload_id)
    }

    pub async fn get_balance(&self, upload_id: Uuid) -> Result<i64, DomainError> {
        debug!(upload_id = %upload_id, "Getting balance");
        self.repo.get_balance(upload_id).await
    }

    pub async fn get_issues(
        &self,
        upload_id: Uuid,
        page: u64,
        per_page: u64,
        status: Option<TransactionStatus>,
    ) -> Result<(Vec<IssueTransaction>, u64), DomainError> {
        debug!(
            upload_id = %upload_id,
            page,
            per_page,
            status = ?status,
            "Getting issues"
        );
        self.repo.get_issues(upload_id, page, per_page, status).await
    }

    pub async fn get_upload(&self, upload_id: Uuid) -> Result<Upload, DomainError> {
        debug!(upload_id = %upload_id, "Getting upload status");
        self.repo.get_upload(upload_id).await
    }
}
