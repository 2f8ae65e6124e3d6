//! Configuration management for the PDF worker service

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::worker::DEFAULT_QUEUE_CAPACITY;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3100;
const DEFAULT_TASK_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_DOCUMENT_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Bound of each execution context's request queue
    pub queue_capacity: usize,
    /// Reply deadline for HTTP submissions (0 = wait forever)
    pub task_timeout_secs: u64,
    /// Largest decoded document accepted over HTTP
    pub max_document_bytes: usize,
}

impl WorkerConfig {
    pub fn task_timeout(&self) -> Option<Duration> {
        (self.task_timeout_secs > 0).then(|| Duration::from_secs(self.task_timeout_secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
            },
            worker: WorkerConfig {
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
                task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
                max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            },
        }
    }
}

/// Parse a variable, falling back to `default` when missing or invalid
fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value for {}: {:?}, using default", key, raw);
            default
        }),
        None => default,
    }
}

impl Config {
    /// Load from process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: parsed(&lookup, "SERVER_PORT", DEFAULT_PORT),
            },
            worker: WorkerConfig {
                queue_capacity: parsed(&lookup, "WORKER_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)
                    .max(1),
                task_timeout_secs: parsed(&lookup, "TASK_TIMEOUT_SECS", DEFAULT_TASK_TIMEOUT_SECS),
                max_document_bytes: parsed(
                    &lookup,
                    "MAX_DOCUMENT_BYTES",
                    DEFAULT_MAX_DOCUMENT_BYTES,
                ),
            },
        }
    }
}
