//! In-memory ledger store.
//!
//! Keeps uploads, per-upload transaction lists, and the processed-event set
//! under a single reader-writer lock. Readers never block each other;
//! writers are exclusive. Suitable for a single process; no durability.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    DomainError, IssueTransaction, Repository, Transaction, TransactionStatus, Upload,
    UploadStatus,
};

/// A committed ledger row together with its source line.
#[derive(Debug, Clone)]
struct TransactionRecord {
    transaction: Transaction,
    line_number: u64,
}

#[derive(Debug, Default)]
struct StoreInner {
    uploads: HashMap<Uuid, Upload>,
    /// Insertion order equals commit order.
    transactions: HashMap<Uuid, Vec<TransactionRecord>>,
    processed_events: HashSet<String>,
}

/// Reference [`Repository`] backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn create_upload(&self, upload_id: Uuid) -> Result<(), DomainError> {
        let mut inner = self.inner.write().await;

        if inner.uploads.contains_key(&upload_id) {
            return Err(DomainError::DuplicateUpload(upload_id));
        }

        inner.uploads.insert(
            upload_id,
            Upload {
                id: upload_id,
                status: UploadStatus::Processing,
                processed_rows: 0,
                total_rows: 0,
                created_at: Utc::now(),
                completed_at: None,
            },
        );
        inner.transactions.insert(upload_id, Vec::new());

        Ok(())
    }

    async fn get_upload(&self, upload_id: Uuid) -> Result<Upload, DomainError> {
        let inner = self.inner.read().await;

        inner
            .uploads
            .get(&upload_id)
            .cloned()
            .ok_or(DomainError::UploadNotFound)
    }

    async fn update_upload_status(
        &self,
        upload_id: Uuid,
        status: UploadStatus,
    ) -> Result<(), DomainError> {
        let mut inner = self.inner.write().await;

        let upload = inner
            .uploads
            .get_mut(&upload_id)
            .ok_or(DomainError::UploadNotFound)?;

        upload.status = status;
        if matches!(status, UploadStatus::Completed | UploadStatus::Failed) {
            upload.completed_at = Some(Utc::now());
        }

        Ok(())
    }

    async fn increment_processed_rows(&self, upload_id: Uuid) -> Result<(), DomainError> {
        let mut inner = self.inner.write().await;

        let upload = inner
            .uploads
            .get_mut(&upload_id)
            .ok_or(DomainError::UploadNotFound)?;

        upload.processed_rows += 1;

        Ok(())
    }

    async fn add_transaction(
        &self,
        upload_id: Uuid,
        transaction: Transaction,
        line_number: u64,
    ) -> Result<(), DomainError> {
        let mut inner = self.inner.write().await;

        if !inner.uploads.contains_key(&upload_id) {
            return Err(DomainError::UploadNotFound);
        }

        inner
            .transactions
            .entry(upload_id)
            .or_default()
            .push(TransactionRecord {
                transaction,
                line_number,
            });

        Ok(())
    }

    async fn get_balance(&self, upload_id: Uuid) -> Result<i64, DomainError> {
        // Balance = sum of CREDIT (+) and DEBIT (-) over SUCCESS rows only.
        let inner = self.inner.read().await;

        if !inner.uploads.contains_key(&upload_id) {
            return Err(DomainError::UploadNotFound);
        }

        let balance = inner
            .transactions
            .get(&upload_id)
            .map(|records| {
                records
                    .iter()
                    .map(|r| &r.transaction)
                    .filter(|tx| tx.status == TransactionStatus::Success)
                    .map(|tx| match tx.kind {
                        crate::domain::TransactionType::Credit => tx.amount,
                        crate::domain::TransactionType::Debit => -tx.amount,
                    })
                    .sum()
            })
            .unwrap_or(0);

        Ok(balance)
    }

    async fn get_issues(
        &self,
        upload_id: Uuid,
        page: u64,
        per_page: u64,
        status: Option<TransactionStatus>,
    ) -> Result<(Vec<IssueTransaction>, u64), DomainError> {
        let inner = self.inner.read().await;

        if !inner.uploads.contains_key(&upload_id) {
            return Err(DomainError::UploadNotFound);
        }

        let filtered: Vec<IssueTransaction> = inner
            .transactions
            .get(&upload_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.transaction.status.is_issue())
                    .filter(|r| status.is_none_or(|s| r.transaction.status == s))
                    .map(|r| IssueTransaction {
                        transaction: r.transaction.clone(),
                        line_number: r.line_number,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let total = filtered.len() as u64;

        let page = page.max(1);
        let per_page = if per_page == 0 { 10 } else { per_page };

        let start = (page - 1).saturating_mul(per_page);
        if start >= total {
            return Ok((Vec::new(), total));
        }
        let end = (start + per_page).min(total);

        Ok((filtered[start as usize..end as usize].to_vec(), total))
    }

    async fn is_event_processed(&self, event_id: &str) -> Result<bool, DomainError> {
        let inner = self.inner.read().await;

        Ok(inner.processed_events.contains(event_id))
    }

    async fn mark_event_processed(&self, event_id: &str) -> Result<(), DomainError> {
        let mut inner = self.inner.write().await;

        inner.processed_events.insert(event_id.to_string());

        Ok(())
    }
}
