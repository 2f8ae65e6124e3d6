//! PDF engines
//!
//! Everything that touches PDF bytes, built on lopdf:
//!
//! - `loader`: bytes to a page-addressable `DocumentHandle`
//! - `content` / `fonts`: content stream interpretation into text runs
//! - `text`: per-page and whole-document text extraction
//! - `search`: query matching with highlight geometry
//! - `annotations`: native markup extraction and embedding
//! - `synthesizer`: `create` / `edit` of minimal single-page documents

pub mod annotations;
pub mod content;
pub mod fonts;
pub mod loader;
pub mod search;
pub mod synthesizer;
pub mod text;

pub use annotations::{extract_annotations, page_annotations, save_annotations};
pub use content::{page_runs, Matrix, TextInterpreter};
pub use fonts::FontInfo;
pub use loader::DocumentHandle;
pub use search::{build_pattern, search_document, search_handle, search_page};
pub use synthesizer::{create, edit, PdfWriter};
pub use text::{extract_from_bytes, extract_pages, extract_text, page_text, PAGE_SEPARATOR};
