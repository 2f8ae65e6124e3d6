//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::worker::{ContextManager, SharedContextManager};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    manager: SharedContextManager,
}

impl AppState {
    /// Create the state and its (empty) context registry
    pub fn new(config: Config) -> Self {
        let manager: SharedContextManager =
            Arc::new(ContextManager::new(config.worker.queue_capacity));
        Self {
            inner: Arc::new(AppStateInner { config, manager }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the context manager
    pub fn manager(&self) -> &SharedContextManager {
        &self.inner.manager
    }

    /// Tear down every execution context
    pub fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        let terminated = self.inner.manager.terminate_all();
        tracing::info!("Released {} execution contexts", terminated);
    }
}
