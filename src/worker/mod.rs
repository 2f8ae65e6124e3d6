//! Task dispatcher
//!
//! Offloads PDF work to long-lived execution contexts, one per task
//! family, and resolves each caller's request with its own envelope.
//!
//! - `task`: descriptors, options and result envelopes
//! - `runner`: executes a descriptor against the PDF engines
//! - `context`: a worker thread with a bounded queue
//! - `manager`: the registry callers submit through

pub mod context;
pub mod manager;
pub mod runner;
pub mod task;

pub use context::{ContextStats, ExecutionContext, TaskHandler};
pub use manager::{
    create_shared_manager, ContextManager, SharedContextManager, DEFAULT_QUEUE_CAPACITY,
};
pub use runner::{execute, run_task};
pub use task::{
    ResultEnvelope, TaskDescriptor, TaskError, TaskKind, TaskOptions, TaskResult,
    FAMILY_ANNOTATIONS, FAMILY_SYNTHESIS, FAMILY_TEXT,
};
