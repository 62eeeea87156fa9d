//! Bounded-channel event bus with per-subscription worker pools.
//!
//! One bounded mpsc queue per event type. Workers share the queue's
//! receiver and race to pull events; each pulled event is consumed under
//! the retry policy with the bus's cancellation token threaded through so
//! shutdown interrupts backoff sleeps.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::{BusError, Consumer, Event, EventBus, EventType, Result};
use crate::utils::retry::{retry, RetryConfig, RetryError};

/// Configuration for the channel event bus.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Capacity of each per-type queue.
    pub channel_buffer: usize,
    /// Retry policy applied by workers to each consumed event.
    pub retry: RetryConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1000,
            retry: RetryConfig::default(),
        }
    }
}

/// One per-type queue. The receiver is shared by all workers of the type.
struct Queue {
    sender: mpsc::Sender<Event>,
    receiver: Arc<Mutex<mpsc::Receiver<Event>>>,
}

#[derive(Default)]
struct BusState {
    queues: HashMap<EventType, Queue>,
    consumers: HashMap<EventType, Vec<Arc<dyn Consumer>>>,
    workers: Vec<JoinHandle<()>>,
    started: bool,
}

/// In-memory [`EventBus`] over bounded tokio channels.
pub struct ChannelEventBus {
    state: RwLock<BusState>,
    config: ChannelConfig,
    cancel: CancellationToken,
}

impl ChannelEventBus {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            state: RwLock::new(BusState::default()),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token cancelled when the bus shuts down. Background producers
    /// derive child tokens from this so their lifetime is bounded by the
    /// bus, not by any request.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn worker_loop(
        worker_id: usize,
        event_type: EventType,
        receiver: Arc<Mutex<mpsc::Receiver<Event>>>,
        consumer: Arc<dyn Consumer>,
        cancel: CancellationToken,
        retry_config: RetryConfig,
    ) {
        debug!(worker_id, event_type = %event_type, "Worker started");

        loop {
            // Hold the receiver lock only while waiting for one event so
            // sibling workers can pull while this one is processed.
            let event = {
                let mut receiver = receiver.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(worker_id, "Worker stopping");
                        return;
                    }
                    event = receiver.recv() => match event {
                        Some(event) => event,
                        None => {
                            debug!(worker_id, "Queue closed, worker stopping");
                            return;
                        }
                    },
                }
            };

            let span = info_span!("consume", event_id = %event.id, worker_id);
            Self::process_event(&event, consumer.as_ref(), &cancel, &retry_config)
                .instrument(span)
                .await;
        }
    }

    async fn process_event(
        event: &Event,
        consumer: &dyn Consumer,
        cancel: &CancellationToken,
        retry_config: &RetryConfig,
    ) {
        debug!(event_type = %event.event_type(), "Processing event");

        let outcome = retry(cancel, retry_config, || consumer.consume(event)).await;

        match outcome {
            Ok(()) => {
                #[cfg(feature = "otel")]
                crate::utils::metrics::EVENTS_CONSUMED.add(1, &[]);
                debug!("Event processed successfully");
            }
            Err(RetryError::Cancelled) => {
                debug!("Event processing cancelled by shutdown");
            }
            Err(RetryError::Exhausted { attempts, source }) => {
                #[cfg(feature = "otel")]
                crate::utils::metrics::EVENTS_ABANDONED.add(1, &[]);
                error!(
                    attempts,
                    error = %source,
                    "Failed to process event after retries, dropping"
                );
            }
        }
    }
}

#[async_trait]
impl EventBus for ChannelEventBus {
    async fn publish(&self, cancel: &CancellationToken, event: Event) -> Result<()> {
        let state = self.state.read().await;

        let Some(queue) = state.queues.get(&event.event_type()) else {
            warn!(
                event_type = %event.event_type(),
                event_id = %event.id,
                "No queue for event type, dropping"
            );
            return Ok(());
        };

        if cancel.is_cancelled() {
            return Err(BusError::Cancelled);
        }

        match queue.sender.try_send(event) {
            Ok(()) => {
                #[cfg(feature = "otel")]
                crate::utils::metrics::EVENTS_PUBLISHED.add(1, &[]);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                // Backpressure policy: never block the publisher.
                #[cfg(feature = "otel")]
                crate::utils::metrics::EVENTS_DROPPED.add(1, &[]);
                warn!(
                    event_type = %event.event_type(),
                    event_id = %event.id,
                    "Event queue full, event dropped"
                );
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(
                    event_type = %event.event_type(),
                    event_id = %event.id,
                    "Event queue closed, event dropped"
                );
                Ok(())
            }
        }
    }

    async fn subscribe(&self, event_type: EventType, consumer: Arc<dyn Consumer>) -> Result<()> {
        let mut state = self.state.write().await;

        if state.started {
            return Err(BusError::SubscribeAfterStart);
        }

        if !state.queues.contains_key(&event_type) {
            let (sender, receiver) = mpsc::channel(self.config.channel_buffer);
            state.queues.insert(
                event_type,
                Queue {
                    sender,
                    receiver: Arc::new(Mutex::new(receiver)),
                },
            );
        }

        state.consumers.entry(event_type).or_default().push(consumer);

        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let mut state = self.state.write().await;

        if state.started {
            return Ok(());
        }

        let mut workers = Vec::new();
        for (event_type, consumers) in &state.consumers {
            let receiver = match state.queues.get(event_type) {
                Some(queue) => queue.receiver.clone(),
                None => continue,
            };

            for consumer in consumers {
                let worker_count = consumer.worker_count();
                info!(
                    event_type = %event_type,
                    worker_count,
                    "Starting workers"
                );

                for worker_id in 0..worker_count {
                    workers.push(tokio::spawn(Self::worker_loop(
                        worker_id,
                        *event_type,
                        receiver.clone(),
                        consumer.clone(),
                        self.cancel.clone(),
                        self.config.retry,
                    )));
                }
            }
        }

        state.workers = workers;
        state.started = true;
        info!("Event bus started");

        Ok(())
    }

    async fn shutdown(&self, timeout: Duration) -> Result<()> {
        info!("Shutting down event bus");

        self.cancel.cancel();

        let workers = {
            let mut state = self.state.write().await;
            std::mem::take(&mut state.workers)
        };

        let drain = async {
            for worker in workers {
                // Worker panics were already logged by the runtime.
                let _ = worker.await;
            }
        };

        match tokio::time::timeout(timeout, drain).await {
            Ok(()) => {
                info!("Event bus shutdown complete");
                Ok(())
            }
            Err(_) => {
                warn!("Event bus shutdown timeout, abandoning in-flight events");
                Err(BusError::ShutdownTimeout)
            }
        }
    }
}
