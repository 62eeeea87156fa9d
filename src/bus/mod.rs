//! Typed in-process event bus.
//!
//! This module contains:
//! - `Event` and its closed payload sum type
//! - `Consumer` trait: event handlers with a declared worker fan-out
//! - `EventBus` trait: publish/subscribe plus lifecycle (start/shutdown)
//! - `ChannelEventBus`: bounded-queue implementation with a worker pool
//!   per subscription
//! - `ReconciliationConsumer`: idempotent ledger application

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{DomainError, Transaction};

mod channel;
mod reconciliation;

pub use channel::{ChannelConfig, ChannelEventBus};
pub use reconciliation::ReconciliationConsumer;

// ============================================================================
// Events
// ============================================================================

/// Discriminator for event kinds, one queue per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Reconciliation,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reconciliation => write!(f, "reconciliation"),
        }
    }
}

/// One parsed statement row bound for the ledger.
#[derive(Debug, Clone)]
pub struct ReconciliationEvent {
    pub upload_id: Uuid,
    pub transaction: Transaction,
    pub line_number: u64,
}

/// Event payload as a closed sum type.
///
/// The event kind is derived from the variant, so a kind/payload mismatch
/// is unrepresentable.
#[derive(Debug, Clone)]
pub enum EventPayload {
    Reconciliation(ReconciliationEvent),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Reconciliation(_) => EventType::Reconciliation,
        }
    }
}

/// Bus payload. `id` uniquely identifies one logical ledger effect
/// (`<upload_id>-<line_number>` for reconciliation events).
#[derive(Debug, Clone)]
pub struct Event {
    pub id: String,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
    /// Informational retry count carried with the event.
    pub retries: u32,
}

impl Event {
    pub fn new(id: String, payload: EventPayload) -> Self {
        Self {
            id,
            payload,
            timestamp: Utc::now(),
            retries: 0,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("publish cancelled")]
    Cancelled,

    #[error("subscribe after start is not supported")]
    SubscribeAfterStart,

    #[error("event bus shutdown timed out")]
    ShutdownTimeout,
}

/// Errors returned by consumers. Treated as transient by the worker loop:
/// the event is retried with backoff and dropped once the budget is spent.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error(transparent)]
    Repository(#[from] DomainError),
}

/// Handler for events of one type.
///
/// The bus spawns `worker_count()` concurrent workers for each
/// subscription; `consume` must therefore be safe to call concurrently
/// and idempotent per event id, since retries can re-deliver.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn consume(&self, event: &Event) -> std::result::Result<(), ConsumerError>;

    /// Worker fan-out the bus allocates for this consumer at start.
    fn worker_count(&self) -> usize;
}

/// Interface for event delivery to consumers.
///
/// Publishing never blocks the caller: a full queue drops the event
/// (logged and counted) and reports success. Delivery is at-least-once
/// per enqueued event; ordering holds within one worker only.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Enqueue an event for its type's queue. Returns
    /// [`BusError::Cancelled`] if `cancel` has already fired; publishing
    /// to a type with no subscription is a no-op success.
    async fn publish(&self, cancel: &CancellationToken, event: Event) -> Result<()>;

    /// Register a consumer for an event type. Must be called before
    /// `start`.
    async fn subscribe(&self, event_type: EventType, consumer: Arc<dyn Consumer>) -> Result<()>;

    /// Spawn worker pools for every subscription. Idempotent; returns
    /// immediately after spawning.
    async fn start(&self) -> Result<()>;

    /// Cancel workers and wait for them to drain, bounded by `timeout`.
    /// On timeout, in-flight events are abandoned.
    async fn shutdown(&self, timeout: Duration) -> Result<()>;
}
