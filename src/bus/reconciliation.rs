//! Idempotent application of reconciliation events to the ledger.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use super::{Consumer, ConsumerError, Event, EventPayload};
use crate::domain::Repository;

/// Applies one transaction event to the ledger store.
///
/// The processed-event set makes the apply at-most-once per event id
/// under retry. The add/mark pair is not transactional: if the add
/// commits and the mark fails, a retry duplicates the row. Acceptable
/// for the in-memory store; a durable backend should wrap both in a
/// store-level transaction.
pub struct ReconciliationConsumer {
    repo: Arc<dyn Repository>,
    worker_count: usize,
}

impl ReconciliationConsumer {
    pub fn new(repo: Arc<dyn Repository>, worker_count: usize) -> Self {
        Self { repo, worker_count }
    }
}

#[async_trait]
impl Consumer for ReconciliationConsumer {
    async fn consume(&self, event: &Event) -> Result<(), ConsumerError> {
        if self.repo.is_event_processed(&event.id).await? {
            debug!(event_id = %event.id, "Event already processed, skipping");
            return Ok(());
        }

        let EventPayload::Reconciliation(payload) = &event.payload;

        debug!(
            event_id = %event.id,
            upload_id = %payload.upload_id,
            line_number = payload.line_number,
            status = %payload.transaction.status,
            kind = %payload.transaction.kind,
            amount = payload.transaction.amount,
            "Processing transaction"
        );

        self.repo
            .add_transaction(
                payload.upload_id,
                payload.transaction.clone(),
                payload.line_number,
            )
            .await?;

        self.repo.mark_event_processed(&event.id).await?;

        // The counter is advisory; a failure here must not trigger a retry
        // that would duplicate the row.
        if let Err(err) = self.repo.increment_processed_rows(payload.upload_id).await {
            error!(
                event_id = %event.id,
                upload_id = %payload.upload_id,
                error = %err,
                "Failed to increment processed rows"
            );
        }

        debug!(
            event_id = %event.id,
            line_number = payload.line_number,
            "Transaction processed successfully"
        );

        Ok(())
    }

    fn worker_count(&self) -> usize {
        self.worker_count
    }
}
