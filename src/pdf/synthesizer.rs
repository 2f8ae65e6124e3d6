//! Document synthesizer
//!
//! Builds minimal PDF byte streams from plain text.
//!
//! - `create(text)`: a single Letter page with one text run per line
//! - `edit(content, text, page)`: replace one page's text and re-synthesize
//!
//! `edit` collapses every page into one synthesized page; layout and
//! formatting of the source document are not preserved.
//!
//! The cross-reference table is computed from the exact byte layout that
//! `PdfWriter` emits: every entry is 20 bytes and `startxref` points at the
//! `xref` keyword.

use crate::document::Result;

use super::fonts::win_ansi_code;
use super::loader::DocumentHandle;
use super::text::extract_text;

/// Text origin of synthesized pages
const ORIGIN_X: u32 = 72;
const ORIGIN_Y: u32 = 720;
/// Font size and leading of synthesized text
const FONT_SIZE: u32 = 12;
const LEADING: u32 = 14;
/// US Letter media box
const MEDIA_BOX: &str = "[0 0 612 792]";

/// Separator placed between page texts when pages are merged by `edit`
pub const PAGE_JOIN: &str = "\n\n";

/// Low-level PDF serializer with exact xref bookkeeping
///
/// Objects are written with explicit ids; ids never written become free
/// entries in the cross-reference table.
///
/// ```ignore
/// let mut writer = PdfWriter::new();
/// writer.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
/// writer.object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
/// let bytes = writer.finish(1);
/// ```
pub struct PdfWriter {
    buf: Vec<u8>,
    /// Byte offset of each object, indexed by id - 1
    offsets: Vec<Option<usize>>,
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfWriter {
    /// Start a PDF 1.4 file (header plus binary marker comment)
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(1024);
        buf.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        Self {
            buf,
            offsets: Vec::new(),
        }
    }

    /// Write an indirect object with the given body
    pub fn object(&mut self, id: u32, body: &str) {
        self.begin_object(id);
        self.buf.extend_from_slice(body.as_bytes());
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    /// Write a stream object; `extra` is spliced into the stream dictionary
    pub fn stream(&mut self, id: u32, extra: &str, data: &[u8]) {
        self.begin_object(id);
        let dict = if extra.is_empty() {
            format!("<< /Length {} >>\nstream\n", data.len())
        } else {
            format!("<< /Length {} {} >>\nstream\n", data.len(), extra)
        };
        self.buf.extend_from_slice(dict.as_bytes());
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
    }

    /// Write the xref table and trailer and return the file bytes
    pub fn finish(mut self, root: u32) -> Vec<u8> {
        let xref_offset = self.buf.len();
        let size = self.offsets.len() + 1;

        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", size);
        for offset in &self.offsets {
            match offset {
                Some(offset) => xref.push_str(&format!("{:010} 00000 n \n", offset)),
                None => xref.push_str("0000000000 65535 f \n"),
            }
        }
        xref.push_str(&format!(
            "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            size, root, xref_offset
        ));

        self.buf.extend_from_slice(xref.as_bytes());
        self.buf
    }

    fn begin_object(&mut self, id: u32) {
        let index = id.saturating_sub(1) as usize;
        if self.offsets.len() <= index {
            self.offsets.resize(index + 1, None);
        }
        self.offsets[index] = Some(self.buf.len());
        self.buf
            .extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
    }
}

/// Escape text for a WinAnsi literal string: `(`, `)` and `\` are
/// structural, characters WinAnsiEncoding cannot express become `?`
pub fn escape_literal(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' | ')' | '\\' => {
                out.push(b'\\');
                out.push(ch as u8);
            }
            '\t' => out.push(b' '),
            ' '..='~' => out.push(ch as u8),
            _ => match win_ansi_code(ch) {
                Some(code) if code >= 0x80 => out.push(code),
                _ => out.push(b'?'),
            },
        }
    }
    out
}

/// Content stream showing each line of `text` as its own run
fn text_content(text: &str) -> Vec<u8> {
    let mut content = Vec::new();
    content.extend_from_slice(
        format!(
            "BT\n/F1 {} Tf\n{} TL\n{} {} Td\n",
            FONT_SIZE, LEADING, ORIGIN_X, ORIGIN_Y
        )
        .as_bytes(),
    );

    for (index, line) in text.lines().enumerate() {
        if index > 0 {
            content.extend_from_slice(b"T*\n");
        }
        if line.is_empty() {
            continue;
        }
        content.push(b'(');
        content.extend_from_slice(&escape_literal(line));
        content.extend_from_slice(b") Tj\n");
    }

    content.extend_from_slice(b"ET");
    content
}

/// Synthesize a single-page document containing `text`
pub fn create(text: &str) -> Vec<u8> {
    let content = text_content(text);

    let mut writer = PdfWriter::new();
    writer.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    writer.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    writer.object(
        3,
        &format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox {} /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>",
            MEDIA_BOX
        ),
    );
    writer.stream(4, "", &content);
    writer.object(
        5,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
    );

    let bytes = writer.finish(1);
    tracing::debug!("Synthesized document: {} bytes", bytes.len());
    bytes
}

/// Replace the text of one page and re-synthesize the whole document
///
/// `page_number` is 1-indexed; out-of-range values leave every page as it
/// was. The result is always a single page.
pub fn edit(content: &[u8], text: &str, page_number: i64) -> Result<Vec<u8>> {
    let handle = DocumentHandle::load(content)?;
    let extracted = extract_text(&handle);
    let mut pages: Vec<String> = extracted.pages.into_iter().map(|p| p.text).collect();

    match usize::try_from(page_number) {
        Ok(n) if n >= 1 && n <= pages.len() => pages[n - 1] = text.to_string(),
        _ => tracing::debug!(
            "Edit page {} out of range ({} pages), keeping text unchanged",
            page_number,
            pages.len()
        ),
    }

    Ok(create(&pages.join(PAGE_JOIN)))
}
