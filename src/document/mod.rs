//! Document domain model
//!
//! Format-level types shared by the PDF engines and the worker layer:
//!
//! - `TextRun` / `PageText`: positioned page text
//! - `SearchMatch`: a query hit with highlight geometry
//! - `Annotation`: normalized markup
//! - `DocumentError`: the error taxonomy carried in result envelopes

mod error;
mod types;

pub use error::{DocumentError, DocumentResult, Result};
pub use types::{
    hex_to_rgb, rgb_to_hex, Annotation, AnnotationRect, AnnotationType, DocumentText,
    ExtractedPage, HighlightRect, PageText, SearchMatch, SearchOptions, TextRun,
    DEFAULT_ANNOTATION_COLOR, DEFAULT_RUN_HEIGHT,
};
