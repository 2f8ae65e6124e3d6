//! Document error types
//!
//! Error taxonomy shared by the PDF engines and the worker contexts.
//! Page-level errors are recovered by the engines; everything else ends
//! up in the `error` field of a result envelope.

use std::time::Duration;

use thiserror::Error;

/// Unified document error type
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The buffer could not be loaded as a document at all
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A single page is malformed (recoverable)
    #[error("Corrupt page {page}: {reason}")]
    CorruptPage { page: u32, reason: String },

    /// Missing or malformed task option, or unknown task kind
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Execution context could not be reached
    #[error("Execution context unavailable: {0}")]
    Unavailable(String),

    /// Reply did not arrive before the caller's deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Failed to serialize a rewritten document
    #[error("Write error: {0}")]
    WriteError(String),

    /// The task panicked inside its execution context
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocumentError {
    /// Build a corrupt-page error from anything displayable
    pub fn corrupt_page(page: u32, reason: impl std::fmt::Display) -> Self {
        DocumentError::CorruptPage {
            page,
            reason: reason.to_string(),
        }
    }

    /// Whether the error only affects one page of an otherwise usable document
    pub fn is_page_level(&self) -> bool {
        matches!(self, DocumentError::CorruptPage { .. })
    }

    /// Stable machine-readable name, carried in failed result envelopes
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentError::ParseError(_) => "parseError",
            DocumentError::CorruptPage { .. } => "corruptPage",
            DocumentError::InvalidArgument(_) => "invalidArgument",
            DocumentError::Unavailable(_) => "unavailable",
            DocumentError::Timeout(_) => "timeout",
            DocumentError::WriteError(_) => "writeError",
            DocumentError::Internal(_) => "internal",
        }
    }
}

/// Result type alias for document operations
pub type Result<T> = std::result::Result<T, DocumentError>;

/// Alias for Result (used by the worker layer)
pub type DocumentResult<T> = Result<T>;
