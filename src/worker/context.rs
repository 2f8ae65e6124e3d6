//! Execution contexts
//!
//! An execution context is a dedicated OS thread that owns a bounded
//! request queue. Requests are processed strictly one at a time; each one
//! carries its own reply channel, so concurrent callers never see each
//! other's results.
//!
//! ```text
//!  submit ──► mpsc (bounded) ──► worker thread ──► oneshot ──► caller
//!                                 run_task()
//! ```
//!
//! A panicking task is caught at the thread boundary and reported as a
//! failed envelope; the thread keeps serving the queue. Dropping every
//! handle to a context closes the queue: already queued requests still
//! drain, then the thread exits.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::document::{DocumentError, DocumentResult};

use super::runner;
use super::task::{ResultEnvelope, TaskDescriptor};

/// Function that executes one task inside a context
pub type TaskHandler = fn(&str, &TaskDescriptor) -> ResultEnvelope;

/// One queued submission
struct Request {
    correlation_id: String,
    descriptor: TaskDescriptor,
    reply: oneshot::Sender<ResultEnvelope>,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    panicked: AtomicUsize,
}

/// Snapshot of a context's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStats {
    pub id: String,
    pub family: String,
    /// Requests waiting in the queue
    pub queued: usize,
    pub completed: usize,
    pub failed: usize,
    pub panicked: usize,
}

/// Handle to a running execution context
#[derive(Debug)]
pub struct ExecutionContext {
    id: String,
    family: String,
    sender: mpsc::Sender<Request>,
    counters: Arc<Counters>,
}

impl ExecutionContext {
    /// Start a context for `family` with a queue of `capacity` requests
    pub fn spawn(family: &str, capacity: usize) -> DocumentResult<Self> {
        Self::spawn_with(family, capacity, runner::execute)
    }

    /// Start a context that runs tasks through `handler`
    pub fn spawn_with(family: &str, capacity: usize, handler: TaskHandler) -> DocumentResult<Self> {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let id = format!("{}-{}", family, Uuid::new_v4());

        let thread_counters = Arc::clone(&counters);
        let thread_id = id.clone();
        std::thread::Builder::new()
            .name(format!("pdf-{}", family))
            .spawn(move || run_loop(&thread_id, receiver, thread_counters, handler))
            .map_err(|e| {
                DocumentError::Unavailable(format!("failed to start {} context: {}", family, e))
            })?;

        tracing::debug!("Started execution context {}", id);

        Ok(Self {
            id,
            family: family.to_string(),
            sender,
            counters,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Queue a task and wait for its reply
    ///
    /// A request is counted as queued only once it holds a queue slot, so
    /// dropping this future while the queue is full leaves the counters as
    /// they were.
    pub async fn dispatch(
        &self,
        correlation_id: String,
        descriptor: TaskDescriptor,
    ) -> DocumentResult<ResultEnvelope> {
        let permit = self.sender.reserve().await.map_err(|_| {
            DocumentError::Unavailable(format!("context {} is closed", self.id))
        })?;

        let (reply, response) = oneshot::channel();
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        permit.send(Request {
            correlation_id,
            descriptor,
            reply,
        });

        response.await.map_err(|_| {
            DocumentError::Unavailable(format!("context {} dropped the reply", self.id))
        })
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            id: self.id.clone(),
            family: self.family.clone(),
            queued: self.counters.queued.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }
}

fn run_loop(
    id: &str,
    mut receiver: mpsc::Receiver<Request>,
    counters: Arc<Counters>,
    handler: TaskHandler,
) {
    while let Some(request) = receiver.blocking_recv() {
        counters.queued.fetch_sub(1, Ordering::Relaxed);
        let Request {
            correlation_id,
            descriptor,
            reply,
        } = request;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&correlation_id, &descriptor)));

        let envelope = match outcome {
            Ok(envelope) => {
                if envelope.success {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }
                envelope
            }
            Err(payload) => {
                counters.panicked.fetch_add(1, Ordering::Relaxed);
                let message = panic_message(payload.as_ref());
                tracing::error!(
                    "Task {} ({}) panicked in {}: {}",
                    correlation_id,
                    descriptor.kind,
                    id,
                    message
                );
                ResultEnvelope::failure(
                    correlation_id.as_str(),
                    &DocumentError::Internal(format!("task panicked: {message}")),
                )
            }
        };

        if reply.send(envelope).is_err() {
            tracing::debug!("Caller of task {} went away before the reply", correlation_id);
        }
    }

    tracing::debug!("Execution context {} stopped", id);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::pdf::synthesizer::create;
    use crate::worker::task::{TaskKind, TaskOptions, TaskResult};

    fn panicking(correlation_id: &str, descriptor: &TaskDescriptor) -> ResultEnvelope {
        if descriptor.options.get("boom").is_some() {
            panic!("boom requested");
        }
        runner::execute(correlation_id, descriptor)
    }

    #[tokio::test]
    async fn test_dispatch_runs_task() {
        let context = ExecutionContext::spawn("text", 4).unwrap();
        let descriptor = TaskDescriptor::new(TaskKind::Extract, &create("context"), TaskOptions::new());
        let envelope = context.dispatch("c-1".to_string(), descriptor).await.unwrap();

        assert!(envelope.success);
        assert_eq!(envelope.correlation_id, "c-1");
        assert!(matches!(envelope.result, Some(TaskResult::Text(_))));

        let stats = context.stats();
        assert_eq!(stats.family, "text");
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let context = ExecutionContext::spawn_with("text", 4, panicking).unwrap();
        let bytes = create("survivor");

        let boom = TaskDescriptor::new(
            TaskKind::Extract,
            &bytes,
            TaskOptions::new().with("boom", true),
        );
        let envelope = context.dispatch("c-1".to_string(), boom).await.unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.error_kind(), Some("internal"));

        // The context keeps serving requests
        let ok = TaskDescriptor::new(TaskKind::Extract, &bytes, TaskOptions::new());
        let envelope = context.dispatch("c-2".to_string(), ok).await.unwrap();
        assert!(envelope.success);

        let stats = context.stats();
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.completed, 1);
    }

    fn slow(correlation_id: &str, descriptor: &TaskDescriptor) -> ResultEnvelope {
        std::thread::sleep(Duration::from_millis(200));
        runner::execute(correlation_id, descriptor)
    }

    #[tokio::test]
    async fn test_abandoned_dispatch_is_not_counted() {
        let context = Arc::new(ExecutionContext::spawn_with("text", 1, slow).unwrap());
        let bytes = create("busy");
        let descriptor = || TaskDescriptor::new(TaskKind::Extract, &bytes, TaskOptions::new());

        // One task running, one holding the only queue slot
        let running = tokio::spawn({
            let context = context.clone();
            let descriptor = descriptor();
            async move { context.dispatch("c-1".to_string(), descriptor).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let waiting = tokio::spawn({
            let context = context.clone();
            let descriptor = descriptor();
            async move { context.dispatch("c-2".to_string(), descriptor).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A third caller gives up while the queue is full
        let abandoned = tokio::time::timeout(
            Duration::from_millis(30),
            context.dispatch("c-3".to_string(), descriptor()),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(context.stats().queued, 1);

        assert!(running.await.unwrap().unwrap().success);
        assert!(waiting.await.unwrap().unwrap().success);
        let stats = context.stats();
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.completed, 2);
    }

    #[tokio::test]
    async fn test_failed_task_is_counted() {
        let context = ExecutionContext::spawn("text", 1).unwrap();
        let descriptor = TaskDescriptor::new(TaskKind::Extract, b"garbage", TaskOptions::new());
        let envelope = context.dispatch("c-1".to_string(), descriptor).await.unwrap();
        assert_eq!(envelope.error_kind(), Some("parseError"));
        assert_eq!(context.stats().failed, 1);
    }
}
