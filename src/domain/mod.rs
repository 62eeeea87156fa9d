//! Core domain model for statement reconciliation.
//!
//! This module contains:
//! - Ledger row types: `Transaction`, `IssueTransaction`
//! - Ingestion job type: `Upload` with its status lifecycle
//! - `Repository` trait: the ledger store contract
//! - `DomainError`: typed errors shared across components

mod errors;
mod repository;

pub use errors::DomainError;
pub use repository::Repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a ledger row. Sign is applied at balance time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Credit,
    Debit,
}

impl TransactionType {
    /// Parse an already upper-cased field value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREDIT" => Some(Self::Credit),
            "DEBIT" => Some(Self::Debit),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Credit => write!(f, "CREDIT"),
            Self::Debit => write!(f, "DEBIT"),
        }
    }
}

/// Settlement status of a ledger row.
///
/// Only `Success` rows contribute to the balance; `Failed` and `Pending`
/// rows form the issue set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
    Failed,
    Pending,
}

impl TransactionStatus {
    /// Parse an already upper-cased field value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            "PENDING" => Some(Self::Pending),
            _ => None,
        }
    }

    /// Whether a row with this status belongs to the issue set.
    pub fn is_issue(self) -> bool {
        matches!(self, Self::Failed | Self::Pending)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
            Self::Pending => write!(f, "PENDING"),
        }
    }
}

/// A single parsed statement row.
///
/// `amount` is non-negative minor units; direction is carried by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Epoch seconds.
    pub timestamp: i64,
    pub counterparty: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: i64,
    pub status: TransactionStatus,
    pub description: String,
}

/// A problem transaction (FAILED or PENDING) with its source line.
///
/// `line_number` is the 1-based index of the row in the uploaded file and
/// preserves source order even when workers commit out of order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub line_number: u64,
}

/// Lifecycle state of an upload.
///
/// `Processing` at acceptance; the CSV processor finalizes to `Completed`
/// or `Failed` once every row has been published. Terminal states are
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Processing,
    Completed,
    Failed,
}

/// One statement-ingestion job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    pub id: Uuid,
    pub status: UploadStatus,
    /// Rows committed by consumers so far. Advisory: may lag the published
    /// row count until the queue drains.
    pub processed_rows: u64,
    pub total_rows: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}
