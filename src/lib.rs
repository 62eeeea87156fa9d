//! Ledgerflow - asynchronous bank-statement reconciliation.
//!
//! Accepts CSV statement uploads, reconciles each row into a per-upload
//! ledger in the background, and serves balance and issue queries over HTTP.

pub mod bus;
pub mod config;
pub mod domain;
pub mod http;
pub mod services;
pub mod storage;
pub mod utils;

// Re-export common types for library usage
pub use bus::{ChannelConfig, ChannelEventBus, Consumer, Event, EventBus, EventType};
pub use config::Config;
pub use domain::{Repository, Transaction, Upload};
pub use services::{StatementService, StreamingCsvProcessor};
pub use storage::MemoryStore;
