//! Context manager
//!
//! Caller-owned registry of execution contexts, one per task family.
//! Contexts are created lazily on first use and live until
//! `terminate_all` (or until a timed-out submission discards one).
//!
//! Every submission gets a fresh correlation id and its own reply
//! channel; dispatcher-level failures (unknown kind, unreachable context,
//! deadline) come back as failed envelopes rather than errors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::document::{DocumentError, DocumentResult};

use super::context::{ContextStats, ExecutionContext, TaskHandler};
use super::runner;
use super::task::{ResultEnvelope, TaskDescriptor, TaskKind, TaskOptions};

/// Default bound of each context's request queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Registry of long-lived execution contexts keyed by task family
pub struct ContextManager {
    contexts: Mutex<HashMap<String, Arc<ExecutionContext>>>,
    queue_capacity: usize,
    handler: TaskHandler,
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl ContextManager {
    pub fn new(queue_capacity: usize) -> Self {
        Self::with_handler(queue_capacity, runner::execute)
    }

    /// Manager whose contexts run tasks through `handler`
    pub fn with_handler(queue_capacity: usize, handler: TaskHandler) -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
            queue_capacity,
            handler,
        }
    }

    /// Context for `family`, started on first use
    pub fn get_or_create(&self, family: &str) -> DocumentResult<Arc<ExecutionContext>> {
        let mut contexts = self.contexts.lock();
        if let Some(context) = contexts.get(family) {
            return Ok(Arc::clone(context));
        }

        let context = Arc::new(ExecutionContext::spawn_with(
            family,
            self.queue_capacity,
            self.handler,
        )?);
        tracing::info!("Created {} context {}", family, context.id());
        contexts.insert(family.to_string(), Arc::clone(&context));
        Ok(context)
    }

    /// Submit a task and wait for its envelope
    pub async fn submit(&self, descriptor: TaskDescriptor) -> ResultEnvelope {
        self.dispatch(descriptor, None).await
    }

    /// Submit by kind name; the content is copied before dispatch
    pub async fn submit_task(
        &self,
        kind: &str,
        content: &[u8],
        options: TaskOptions,
    ) -> ResultEnvelope {
        match kind.parse::<TaskKind>() {
            Ok(kind) => self.submit(TaskDescriptor::new(kind, content, options)).await,
            Err(e) => {
                tracing::warn!("Rejected task: {}", e);
                ResultEnvelope::failure(Uuid::new_v4().to_string(), &e)
            }
        }
    }

    /// Submit a task and give up waiting after `timeout`
    ///
    /// The task itself is not cancelled. The context it was queued on is
    /// discarded from the registry so later submissions get a fresh one.
    pub async fn submit_with_timeout(
        &self,
        descriptor: TaskDescriptor,
        timeout: Duration,
    ) -> ResultEnvelope {
        self.dispatch(descriptor, Some(timeout)).await
    }

    async fn dispatch(&self, descriptor: TaskDescriptor, timeout: Option<Duration>) -> ResultEnvelope {
        let correlation_id = Uuid::new_v4().to_string();
        let family = descriptor.kind.family();

        let context = match self.get_or_create(family) {
            Ok(context) => context,
            Err(e) => {
                tracing::error!("No {} context for task {}: {}", family, correlation_id, e);
                return ResultEnvelope::failure(correlation_id, &e);
            }
        };

        let reply = context.dispatch(correlation_id.clone(), descriptor);
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, reply).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        "Task {} timed out after {:?}, discarding context {}",
                        correlation_id,
                        limit,
                        context.id()
                    );
                    self.discard(family, context.id());
                    Err(DocumentError::Timeout(limit))
                }
            },
            None => reply.await,
        };

        outcome.unwrap_or_else(|e| ResultEnvelope::failure(correlation_id, &e))
    }

    /// Remove a context if it is still the registered one for `family`
    fn discard(&self, family: &str, id: &str) {
        let mut contexts = self.contexts.lock();
        if contexts.get(family).is_some_and(|c| c.id() == id) {
            contexts.remove(family);
        }
    }

    /// Drop every context; returns how many were registered
    ///
    /// Work already queued still runs to completion.
    pub fn terminate_all(&self) -> usize {
        let mut contexts = self.contexts.lock();
        let count = contexts.len();
        contexts.clear();
        if count > 0 {
            tracing::info!("Terminated {} execution contexts", count);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }

    pub fn contains(&self, family: &str) -> bool {
        self.contexts.lock().contains_key(family)
    }

    /// Counters of every live context, ordered by family
    pub fn stats(&self) -> Vec<ContextStats> {
        let mut stats: Vec<ContextStats> = self
            .contexts
            .lock()
            .values()
            .map(|context| context.stats())
            .collect();
        stats.sort_by(|a, b| a.family.cmp(&b.family));
        stats
    }
}

/// Shared handle for async callers
pub type SharedContextManager = Arc<ContextManager>;

pub fn create_shared_manager(queue_capacity: usize) -> SharedContextManager {
    Arc::new(ContextManager::new(queue_capacity))
}
