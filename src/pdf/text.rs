//! Text extraction engine
//!
//! Joins the runs of each page with a single space and concatenates page
//! texts into a document text, each page followed by a blank line.
//! A page that fails to parse is logged and contributes empty text; the
//! remaining pages are still extracted.

use crate::document::{DocumentText, ExtractedPage, PageText, Result};

use super::content::TextInterpreter;
use super::loader::DocumentHandle;

/// Separator appended after every page in the document text
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Runs of every page in order; failed pages are empty
pub fn extract_pages(handle: &DocumentHandle) -> Vec<PageText> {
    let mut interpreter = TextInterpreter::new(handle);

    (1..=handle.page_count())
        .map(|page_number| match interpreter.page_runs(page_number) {
            Ok(runs) => PageText { page_number, runs },
            Err(e) => {
                tracing::warn!("Failed to extract text from page {}: {}", page_number, e);
                PageText::empty(page_number)
            }
        })
        .collect()
}

/// Linear text of one page
pub fn page_text(handle: &DocumentHandle, page_number: u32) -> Result<PageText> {
    let runs = TextInterpreter::new(handle).page_runs(page_number)?;
    Ok(PageText { page_number, runs })
}

/// Extract the text of every page of a loaded document
pub fn extract_text(handle: &DocumentHandle) -> DocumentText {
    let pages: Vec<ExtractedPage> = extract_pages(handle)
        .iter()
        .map(|page| ExtractedPage {
            page_number: page.page_number,
            text: page.text(),
        })
        .collect();

    let mut text = String::new();
    for page in &pages {
        text.push_str(&page.text);
        text.push_str(PAGE_SEPARATOR);
    }

    tracing::debug!(
        "Extracted {} chars from {} pages",
        text.len(),
        pages.len()
    );

    DocumentText {
        text,
        page_count: handle.page_count(),
        pages,
    }
}

/// Load `bytes` and extract its text
pub fn extract_from_bytes(bytes: &[u8]) -> Result<DocumentText> {
    let handle = DocumentHandle::load(bytes)?;
    Ok(extract_text(&handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::synthesizer::{create, PdfWriter};

    /// Three pages; page 2's /Contents points at an integer
    fn document_with_bad_middle_page() -> Vec<u8> {
        let page = |contents: u32| {
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 9 0 R >> >> /Contents {} 0 R >>",
                contents
            )
        };
        let mut writer = PdfWriter::new();
        writer.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
        writer.object(2, "<< /Type /Pages /Kids [3 0 R 4 0 R 5 0 R] /Count 3 >>");
        writer.object(3, &page(6));
        writer.object(4, &page(7));
        writer.object(5, &page(8));
        writer.stream(6, "", b"BT /F1 12 Tf 72 720 Td (first page) Tj ET");
        writer.object(7, "42");
        writer.stream(8, "", b"BT /F1 12 Tf 72 720 Td (third page) Tj ET");
        writer.object(9, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>");
        writer.finish(1)
    }

    #[test]
    fn test_extract_round_trip() {
        let text = "Hello World";
        let extracted = extract_from_bytes(&create(text)).unwrap();
        assert_eq!(extracted.page_count, 1);
        assert_eq!(extracted.pages.len(), 1);
        assert_eq!(extracted.pages[0].page_number, 1);
        assert_eq!(extracted.pages[0].text, text);
        assert_eq!(extracted.text, format!("{}{}", text, PAGE_SEPARATOR));
    }

    #[test]
    fn test_extract_is_idempotent() {
        let bytes = create("same input\nsame output");
        let first = extract_from_bytes(&bytes).unwrap();
        let second = extract_from_bytes(&bytes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_bad_page_is_contained() {
        let extracted = extract_from_bytes(&document_with_bad_middle_page()).unwrap();
        assert_eq!(extracted.page_count, 3);
        assert_eq!(extracted.pages[0].text, "first page");
        assert_eq!(extracted.pages[1].text, "");
        assert_eq!(extracted.pages[2].text, "third page");
        assert_eq!(extracted.text, "first page\n\n\n\nthird page\n\n");
    }

    #[test]
    fn test_page_text_reports_corrupt_page() {
        let handle = DocumentHandle::load(&document_with_bad_middle_page()).unwrap();
        assert!(page_text(&handle, 2).unwrap_err().is_page_level());
        assert_eq!(page_text(&handle, 3).unwrap().text(), "third page");
    }

    #[test]
    fn test_malformed_cid_widths_do_not_abort_extraction() {
        let mut writer = PdfWriter::new();
        writer.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
        writer.object(2, "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>");
        writer.object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 7 0 R >> >> /Contents 5 0 R >>",
        );
        writer.object(
            4,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F2 8 0 R >> >> /Contents 6 0 R >>",
        );
        writer.stream(5, "", b"BT /F1 12 Tf 72 720 Td (good page) Tj ET");
        writer.stream(6, "", b"BT /F2 12 Tf 72 720 Td <00010002> Tj ET");
        writer.object(7, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>");
        writer.object(
            8,
            "<< /Type /Font /Subtype /Type0 /BaseFont /Broken /Encoding /Identity-H /DescendantFonts [<< /Type /Font /Subtype /CIDFontType2 /W [4294967295 [500 500]] >>] >>",
        );

        let extracted = extract_from_bytes(&writer.finish(1)).unwrap();
        assert_eq!(extracted.page_count, 2);
        assert_eq!(extracted.pages[0].text, "good page");
        assert_eq!(extracted.pages[1].text, "");
    }

    #[test]
    fn test_extract_rejects_garbage() {
        assert!(extract_from_bytes(b"not a pdf").is_err());
    }
}
