//! Application configuration.
//!
//! Loaded from the process environment via the `config` crate with
//! `try_parsing` enabled. Flat variable names, defaults in brackets:
//! `SERVER_PORT`[8080], `SERVER_HOST`[0.0.0.0], `SHUTDOWN_TIMEOUT`[30]
//! (seconds), `WORKER_POOL_SIZE`[10], `MAX_RETRIES`[5], `LOG_LEVEL`[info],
//! `EVENT_CHANNEL_BUFFER_SIZE`[1000].

use std::time::Duration;

use serde::Deserialize;

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Consumer worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub pool_size: usize,
    pub max_retries: usize,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
}

/// Event bus settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBusConfig {
    pub channel_buffer_size: usize,
}

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server: ServerConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
    pub event_bus: EventBusConfig,
}

/// Flat environment view; grouped into `Config` after deserialization.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawEnv {
    server_port: u16,
    server_host: String,
    /// Whole seconds.
    shutdown_timeout: u64,
    worker_pool_size: usize,
    max_retries: usize,
    log_level: String,
    event_channel_buffer_size: usize,
}

impl Default for RawEnv {
    fn default() -> Self {
        Self {
            server_port: 8080,
            server_host: "0.0.0.0".to_string(),
            shutdown_timeout: 30,
            worker_pool_size: 10,
            max_retries: 5,
            log_level: "info".to_string(),
            event_channel_buffer_size: 1000,
        }
    }
}

impl From<RawEnv> for Config {
    fn from(raw: RawEnv) -> Self {
        Self {
            server: ServerConfig {
                host: raw.server_host,
                port: raw.server_port,
                shutdown_timeout: Duration::from_secs(raw.shutdown_timeout),
            },
            worker: WorkerConfig {
                pool_size: raw.worker_pool_size,
                max_retries: raw.max_retries,
            },
            logging: LoggingConfig {
                level: raw.log_level,
            },
            event_bus: EventBusConfig {
                channel_buffer_size: raw.event_channel_buffer_size,
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        RawEnv::default().into()
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults
    /// for unset variables.
    pub fn load() -> Result<Self, ::config::ConfigError> {
        use ::config::{Config as ConfigLib, Environment};

        let raw: RawEnv = ConfigLib::builder()
            .add_source(Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()?;

        Ok(raw.into())
    }
}
