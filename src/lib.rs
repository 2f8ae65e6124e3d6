//! Amnesia PDF Worker
//!
//! Offloads PDF processing (text extraction, search with highlight
//! geometry, annotation extraction and embedding, document synthesis) to
//! long-lived background execution contexts.
//!
//! # Modules
//!
//! - `document`: domain types and the error taxonomy
//! - `pdf`: the engines that read and write PDF bytes
//! - `worker`: task descriptors, execution contexts and the context manager
//! - `routes`, `state`, `config`, `error`: the HTTP service around them
//!
//! # Example
//!
//! ```ignore
//! use amnesia_pdf_worker::worker::{ContextManager, TaskOptions};
//!
//! let manager = ContextManager::default();
//! let envelope = manager
//!     .submit_task("search", &pdf_bytes, TaskOptions::new().with("searchText", "needle"))
//!     .await;
//! assert!(envelope.success);
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod pdf;
pub mod routes;
pub mod state;
pub mod worker;
