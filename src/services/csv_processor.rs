//! Streaming CSV parse feeding the event bus.
//!
//! Parsing errors are per-row: a bad row is logged, counted, and skipped;
//! the stream keeps going. Only the final upload status escapes to the
//! caller's view of the world.

use std::sync::Arc;

use async_trait::async_trait;
use csv_async::{AsyncReaderBuilder, StringRecord, Trim};
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::bus::{Event, EventBus, EventPayload, ReconciliationEvent};
use crate::domain::{
    DomainError, Repository, Transaction, TransactionStatus, TransactionType, UploadStatus,
};

/// Byte stream of an uploaded statement.
pub type StatementStream = Box<dyn AsyncRead + Send + Unpin>;

/// Turns a statement byte stream into reconciliation events.
#[async_trait]
pub trait CsvProcessor: Send + Sync {
    /// Parse `stream` and publish one event per valid row, then finalize
    /// the upload status. Row-level problems never fail the call.
    async fn process_stream(
        &self,
        cancel: CancellationToken,
        upload_id: Uuid,
        stream: StatementStream,
    ) -> Result<(), DomainError>;
}

/// Reasons a row is rejected. Stays inside the processor.
#[derive(Debug, thiserror::Error)]
enum RecordError {
    #[error("expected 6 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid timestamp: {0:?}")]
    Timestamp(String),

    #[error("invalid transaction type: {0:?}")]
    Kind(String),

    #[error("invalid amount: {0:?}")]
    Amount(String),

    #[error("negative amount: {0}")]
    NegativeAmount(i64),

    #[error("invalid status: {0:?}")]
    Status(String),
}

/// Record layout: `timestamp, counterparty, type, amount, status, description`.
/// Fields arrive trimmed; `type` and `status` are case-folded here.
fn parse_record(record: &StringRecord) -> Result<Transaction, RecordError> {
    if record.len() != 6 {
        return Err(RecordError::FieldCount(record.len()));
    }

    let timestamp: i64 = record[0]
        .parse()
        .map_err(|_| RecordError::Timestamp(record[0].to_string()))?;

    let kind_raw = record[2].to_uppercase();
    let kind =
        TransactionType::parse(&kind_raw).ok_or_else(|| RecordError::Kind(kind_raw.clone()))?;

    let amount: i64 = record[3]
        .parse()
        .map_err(|_| RecordError::Amount(record[3].to_string()))?;
    if amount < 0 {
        return Err(RecordError::NegativeAmount(amount));
    }

    let status_raw = record[4].to_uppercase();
    let status = TransactionStatus::parse(&status_raw)
        .ok_or_else(|| RecordError::Status(status_raw.clone()))?;

    Ok(Transaction {
        timestamp,
        counterparty: record[1].to_string(),
        kind,
        amount,
        status,
        description: record[5].to_string(),
    })
}

/// Reference [`CsvProcessor`] over `csv-async`.
pub struct StreamingCsvProcessor {
    bus: Arc<dyn EventBus>,
    repo: Arc<dyn Repository>,
}

impl StreamingCsvProcessor {
    pub fn new(bus: Arc<dyn EventBus>, repo: Arc<dyn Repository>) -> Self {
        Self { bus, repo }
    }
}

#[async_trait]
impl CsvProcessor for StreamingCsvProcessor {
    async fn process_stream(
        &self,
        cancel: CancellationToken,
        upload_id: Uuid,
        stream: StatementStream,
    ) -> Result<(), DomainError> {
        let span = info_span!("process_stream", upload_id = %upload_id);

        async {
            info!("Starting CSV processing");

            // flexible: a wrong field count is a per-row rejection below,
            // not a reader error.
            let reader = AsyncReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .trim(Trim::All)
                .create_reader(stream);
            let mut records = reader.into_records();

            // 1-based index of successfully read records. Read errors do
            // not advance it.
            let mut line_number: u64 = 0;
            let mut success_count: u64 = 0;
            let mut error_count: u64 = 0;

            while let Some(result) = records.next().await {
                let record = match result {
                    Ok(record) => record,
                    Err(err) => {
                        error!(line = line_number, error = %err, "Failed to read CSV record");
                        error_count += 1;
                        continue;
                    }
                };

                line_number += 1;

                let transaction = match parse_record(&record) {
                    Ok(transaction) => transaction,
                    Err(err) => {
                        warn!(line = line_number, error = %err, "Failed to parse transaction");
                        error_count += 1;
                        continue;
                    }
                };

                let event = Event::new(
                    format!("{upload_id}-{line_number}"),
                    EventPayload::Reconciliation(ReconciliationEvent {
                        upload_id,
                        transaction,
                        line_number,
                    }),
                );

                match self.bus.publish(&cancel, event).await {
                    Ok(()) => success_count += 1,
                    Err(err) => {
                        error!(line = line_number, error = %err, "Failed to publish event");
                        error_count += 1;
                    }
                }
            }

            // Completion means "all rows published", not "all consumed":
            // processed_rows may lag until the workers drain.
            let final_status = if error_count > 0 && success_count == 0 {
                UploadStatus::Failed
            } else {
                UploadStatus::Completed
            };
            if let Err(err) = self.repo.update_upload_status(upload_id, final_status).await {
                error!(error = %err, "Failed to finalize upload status");
            }

            info!(
                total_rows = line_number,
                success_count, error_count, "CSV processing completed"
            );

            Ok(())
        }
        .instrument(span)
        .await
    }
}
