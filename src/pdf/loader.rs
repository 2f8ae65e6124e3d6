//! Document model loader
//!
//! Decodes a raw PDF byte buffer into a page-addressable `DocumentHandle`.
//!
//! # Ownership
//!
//! A handle is created at the start of a task and dropped when the task
//! finishes. It is never cached or shared between execution contexts.
//!
//! # Failure modes
//!
//! - The buffer cannot be loaded at all: `DocumentError::ParseError`
//! - One page is malformed: `DocumentError::CorruptPage`, which the
//!   engines recover from by skipping that page

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::document::{DocumentError, Result};

/// Maximum indirect-reference chain followed by `resolve`
const MAX_REFERENCE_DEPTH: usize = 16;

/// A loaded PDF document
pub struct DocumentHandle {
    /// Parsed object graph
    doc: Document,
    /// Page object ids in page-tree order (index 0 = page 1)
    page_ids: Vec<ObjectId>,
    /// Size of the source buffer
    byte_len: usize,
}

impl std::fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("page_count", &self.page_ids.len())
            .field("byte_len", &self.byte_len)
            .finish_non_exhaustive()
    }
}

impl DocumentHandle {
    /// Load a document from bytes
    pub fn load(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(DocumentError::ParseError("empty buffer".into()));
        }

        let doc = Document::load_mem(bytes)
            .map_err(|e| DocumentError::ParseError(format!("failed to parse PDF: {e}")))?;

        if doc.is_encrypted() {
            return Err(DocumentError::ParseError(
                "encrypted documents are not supported".into(),
            ));
        }

        // get_pages is keyed by 1-based page number
        let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();

        tracing::debug!(
            "Loaded PDF: {} pages, {} bytes",
            page_ids.len(),
            bytes.len()
        );

        Ok(Self {
            doc,
            page_ids,
            byte_len: bytes.len(),
        })
    }

    /// Number of pages
    pub fn page_count(&self) -> u32 {
        self.page_ids.len() as u32
    }

    /// Size of the buffer this handle was loaded from
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Page object ids in page order
    pub fn page_ids(&self) -> &[ObjectId] {
        &self.page_ids
    }

    /// Underlying object graph
    pub fn inner(&self) -> &Document {
        &self.doc
    }

    /// Give up the handle and take the object graph (for rewriting)
    pub fn into_inner(self) -> Document {
        self.doc
    }

    /// Object id of a 1-indexed page
    pub fn page_id(&self, page_number: u32) -> Result<ObjectId> {
        page_number
            .checked_sub(1)
            .and_then(|index| self.page_ids.get(index as usize))
            .copied()
            .ok_or_else(|| {
                DocumentError::InvalidArgument(format!(
                    "page {} out of range (document has {} pages)",
                    page_number,
                    self.page_ids.len()
                ))
            })
    }

    /// Page dictionary of a 1-indexed page
    pub fn page_dict(&self, page_number: u32) -> Result<&Dictionary> {
        let id = self.page_id(page_number)?;
        self.doc
            .get_dictionary(id)
            .map_err(|e| DocumentError::corrupt_page(page_number, e))
    }

    /// Decoded content stream bytes of a page
    ///
    /// Multiple content streams are concatenated with a newline between
    /// them. A page without /Contents has no content.
    pub fn page_content(&self, page_number: u32) -> Result<Vec<u8>> {
        let page = self.page_dict(page_number)?;

        let contents = match page.get(b"Contents") {
            Ok(obj) => self
                .resolve(obj)
                .map_err(|e| DocumentError::corrupt_page(page_number, e))?,
            Err(_) => return Ok(Vec::new()),
        };

        let mut streams = Vec::new();
        match contents {
            Object::Stream(stream) => streams.push(stream),
            Object::Array(parts) => {
                for part in parts {
                    let stream = self
                        .resolve(part)
                        .and_then(Object::as_stream)
                        .map_err(|e| DocumentError::corrupt_page(page_number, e))?;
                    streams.push(stream);
                }
            }
            Object::Null => {}
            other => {
                let found = other.type_name().unwrap_or("unknown");
                return Err(DocumentError::corrupt_page(
                    page_number,
                    format!("/Contents is not a stream: {}", found),
                ));
            }
        }

        let mut content = Vec::new();
        for stream in streams {
            let data = stream_bytes(stream)
                .map_err(|e| DocumentError::corrupt_page(page_number, e))?;
            if !content.is_empty() {
                content.push(b'\n');
            }
            content.extend_from_slice(&data);
        }

        Ok(content)
    }

    /// Resource dictionary of a page, inherited through /Parent if needed
    pub fn page_resources(&self, page_number: u32) -> Result<Option<&Dictionary>> {
        let id = self.page_id(page_number)?;
        let resources = self
            .inherited(id, b"Resources")
            .map_err(|e| DocumentError::corrupt_page(page_number, e))?;

        match resources {
            Some(obj) => obj
                .as_dict()
                .map(Some)
                .map_err(|e| DocumentError::corrupt_page(page_number, e)),
            None => Ok(None),
        }
    }

    /// Follow indirect references until a direct object is reached
    pub fn resolve<'a>(&'a self, obj: &'a Object) -> lopdf::Result<&'a Object> {
        resolve(&self.doc, obj)
    }

    /// Look up a page attribute, walking up the page tree
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> lopdf::Result<Option<&Object>> {
        let mut current = page_id;
        for _ in 0..MAX_REFERENCE_DEPTH {
            let dict = self.doc.get_dictionary(current)?;
            if let Ok(value) = dict.get(key) {
                return self.resolve(value).map(Some);
            }
            match dict.get(b"Parent").and_then(Object::as_reference) {
                Ok(parent) => current = parent,
                Err(_) => return Ok(None),
            }
        }
        Ok(None)
    }
}

/// Follow indirect references until a direct object is reached
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> lopdf::Result<&'a Object> {
    let mut current = obj;
    for _ in 0..MAX_REFERENCE_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id)?,
            direct => return Ok(direct),
        }
    }
    Err(lopdf::Error::ReferenceLimit)
}

/// Stream data with filters applied (unfiltered streams are returned as-is)
pub fn stream_bytes(stream: &Stream) -> lopdf::Result<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content()
    } else {
        Ok(stream.content.clone())
    }
}

/// Integer or real operand as f32
pub fn as_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f),
        _ => None,
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, UTF-8 with BOM, or
/// PDFDocEncoding approximated as Latin-1)
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::synthesizer::{create, PdfWriter};

    #[test]
    fn test_load_synthesized_document() {
        let bytes = create("Hello loader");
        let handle = DocumentHandle::load(&bytes).unwrap();
        assert_eq!(handle.page_count(), 1);
        assert_eq!(handle.byte_len(), bytes.len());

        let content = handle.page_content(1).unwrap();
        let content = String::from_utf8_lossy(&content);
        assert!(content.contains("(Hello loader) Tj"));
        assert!(handle.page_resources(1).unwrap().is_some());
    }

    #[test]
    fn test_load_rejects_garbage() {
        assert!(matches!(
            DocumentHandle::load(b"not a pdf at all"),
            Err(DocumentError::ParseError(_))
        ));
        assert!(matches!(
            DocumentHandle::load(&[]),
            Err(DocumentError::ParseError(_))
        ));
    }

    #[test]
    fn test_page_out_of_range() {
        let handle = DocumentHandle::load(&create("x")).unwrap();
        assert!(matches!(
            handle.page_content(0),
            Err(DocumentError::InvalidArgument(_))
        ));
        assert!(matches!(
            handle.page_content(2),
            Err(DocumentError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_non_stream_contents_is_corrupt_page() {
        let mut writer = PdfWriter::new();
        writer.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
        writer.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
        writer.object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >>",
        );
        writer.object(4, "42");
        let bytes = writer.finish(1);

        let handle = DocumentHandle::load(&bytes).unwrap();
        let err = handle.page_content(1).unwrap_err();
        assert!(err.is_page_level());
        match err {
            DocumentError::CorruptPage { page, reason } => {
                assert_eq!(page, 1);
                assert!(reason.starts_with("/Contents is not a stream: "), "{}", reason);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_resources_inherited_from_parent() {
        let mut writer = PdfWriter::new();
        writer.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
        writer.object(
            2,
            "<< /Type /Pages /Kids [3 0 R] /Count 1 /Resources << /Font << /F9 4 0 R >> >> >>",
        );
        writer.object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>");
        writer.object(4, "<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>");
        let bytes = writer.finish(1);

        let handle = DocumentHandle::load(&bytes).unwrap();
        let resources = handle.page_resources(1).unwrap().unwrap();
        assert!(resources.has(b"Font"));
        // No /Contents means an empty page, not an error
        assert!(handle.page_content(1).unwrap().is_empty());
    }

    #[test]
    fn test_decode_text_string() {
        assert_eq!(decode_text_string(b"plain"), "plain");
        assert_eq!(decode_text_string(&[0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69]), "Hi");
        assert_eq!(decode_text_string(&[0xEF, 0xBB, 0xBF, b'o', b'k']), "ok");
        assert_eq!(decode_text_string(&[0xE9]), "\u{e9}");
    }

    #[test]
    fn test_as_number() {
        assert_eq!(as_number(&Object::Integer(3)), Some(3.0));
        assert_eq!(as_number(&Object::Real(1.5)), Some(1.5));
        assert_eq!(as_number(&Object::Null), None);
    }
}
