//! ledgerflow-server: statement ingestion and reconciliation service.
//!
//! Wires the pipeline leaves-first (store → consumer → bus → processor →
//! service), serves HTTP, and on SIGINT/SIGTERM shuts down ingress first
//! so no new events arrive while the bus drains.

use std::sync::Arc;

use tracing::{error, info};

use ledgerflow::bus::{ChannelConfig, ChannelEventBus, EventBus, EventType, ReconciliationConsumer};
use ledgerflow::config::Config;
use ledgerflow::http::{self, AppState};
use ledgerflow::services::{StatementService, StreamingCsvProcessor};
use ledgerflow::storage::MemoryStore;
use ledgerflow::utils::bootstrap::init_tracing;
use ledgerflow::utils::retry::RetryConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    init_tracing(&config.logging.level);

    info!("Starting application");

    let repo = Arc::new(MemoryStore::new());
    info!("Repository initialized");

    let bus = Arc::new(ChannelEventBus::new(ChannelConfig {
        channel_buffer: config.event_bus.channel_buffer_size,
        retry: RetryConfig::default().with_max_attempts(config.worker.max_retries),
    }));
    info!("Event bus initialized");

    let consumer = Arc::new(ReconciliationConsumer::new(
        repo.clone(),
        config.worker.pool_size,
    ));
    info!(worker_count = config.worker.pool_size, "Reconciliation consumer initialized");

    bus.subscribe(EventType::Reconciliation, consumer).await?;
    bus.start().await?;

    let processor = Arc::new(StreamingCsvProcessor::new(bus.clone(), repo.clone()));
    let service = Arc::new(StatementService::new(
        repo,
        processor,
        bus.cancellation_token().child_token(),
    ));
    info!("Services initialized");

    let app = http::router(AppState::new(service));

    info!("Application started successfully");

    // Graceful shutdown in order: stop accepting HTTP requests, then stop
    // the event bus and wait for workers to finish.
    http::serve(&config.server.address(), app, shutdown_signal()).await?;

    info!("Received shutdown signal");

    if let Err(err) = bus.shutdown(config.server.shutdown_timeout).await {
        error!(error = %err, "Event bus shutdown error");
    }

    info!("Application stopped gracefully");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install SIGINT handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => error!(error = %err, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
