//! Search and highlight geometry
//!
//! Finds every occurrence of a query in each page's flattened text and maps
//! it back to the text run it starts in.
//!
//! The flattened text is the page's runs joined by one space. While
//! flattening, each run's `[start, end)` byte range is recorded; the next
//! run starts at `end + 1`. A match is attributed to the first run whose
//! end reaches the match start, and the highlight rectangle comes from that
//! run alone: a match that continues into the next run still reports only
//! the starting run's box.

use regex::{Regex, RegexBuilder};

use crate::document::{
    DocumentError, HighlightRect, PageText, Result, SearchMatch, SearchOptions,
};

use super::loader::DocumentHandle;
use super::text::extract_pages;

/// Byte range of a run inside the flattened page text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RunSpan {
    start: usize,
    end: usize,
}

/// Flattened page text with the span of every run
fn flatten(page: &PageText) -> (String, Vec<RunSpan>) {
    let mut text = String::new();
    let mut spans = Vec::with_capacity(page.runs.len());
    let mut offset = 0;

    for (index, run) in page.runs.iter().enumerate() {
        if index > 0 {
            text.push(' ');
        }
        text.push_str(&run.text);
        let end = offset + run.text.len();
        spans.push(RunSpan { start: offset, end });
        offset = end + 1;
    }

    (text, spans)
}

/// First run whose end offset reaches `position`
fn run_at(spans: &[RunSpan], position: usize) -> Option<usize> {
    spans.iter().position(|span| span.end >= position)
}

/// Compile the query; `None` for an empty query
pub fn build_pattern(query: &str, options: SearchOptions) -> Result<Option<Regex>> {
    if query.is_empty() {
        return Ok(None);
    }

    let escaped = regex::escape(query);
    let pattern = if options.whole_word {
        format!(r"\b{}\b", escaped)
    } else {
        escaped
    };

    RegexBuilder::new(&pattern)
        .case_insensitive(!options.match_case)
        .build()
        .map(Some)
        .map_err(|e| DocumentError::InvalidArgument(format!("bad query: {e}")))
}

/// Matches on one page, in text order
pub fn search_page(page: &PageText, pattern: &Regex) -> Vec<SearchMatch> {
    let (text, spans) = flatten(page);
    let mut matches = Vec::new();

    for found in pattern.find_iter(&text) {
        let Some(start_item) = run_at(&spans, found.start()) else {
            continue;
        };
        let end_item = run_at(&spans, found.end()).unwrap_or(start_item);
        if end_item != start_item {
            tracing::trace!(
                "Match on page {} spans runs {}..={}, using run {}",
                page.page_number,
                start_item,
                end_item,
                start_item
            );
        }

        let rect = HighlightRect::from_run(&page.runs[start_item]);
        matches.push(SearchMatch {
            page_number: page.page_number,
            matched_text: found.as_str().to_string(),
            rect,
            quad_points: rect.quad_points(),
        });
    }

    matches
}

/// Search every page of a loaded document
pub fn search_handle(
    handle: &DocumentHandle,
    query: &str,
    options: SearchOptions,
) -> Result<Vec<SearchMatch>> {
    let Some(pattern) = build_pattern(query, options)? else {
        return Ok(Vec::new());
    };

    let matches: Vec<SearchMatch> = extract_pages(handle)
        .iter()
        .flat_map(|page| search_page(page, &pattern))
        .collect();

    tracing::debug!(
        "Search {:?}: {} matches in {} pages",
        query,
        matches.len(),
        handle.page_count()
    );
    Ok(matches)
}

/// Load `bytes` and search it
pub fn search_document(
    bytes: &[u8],
    query: &str,
    options: SearchOptions,
) -> Result<Vec<SearchMatch>> {
    let handle = DocumentHandle::load(bytes)?;
    search_handle(&handle, query, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextRun;
    use crate::pdf::synthesizer::create;

    fn run(text: &str, x: f32) -> TextRun {
        TextRun {
            text: text.to_string(),
            x,
            y: 700.0,
            width: 10.0 * text.len() as f32,
            height: 12.0,
            page_number: 1,
        }
    }

    fn page(runs: &[(&str, f32)]) -> PageText {
        PageText {
            page_number: 1,
            runs: runs.iter().map(|(t, x)| run(t, *x)).collect(),
        }
    }

    fn insensitive() -> SearchOptions {
        SearchOptions::default()
    }

    #[test]
    fn test_flatten_offsets() {
        let (text, spans) = flatten(&page(&[("Hello", 0.0), ("World", 60.0)]));
        assert_eq!(text, "Hello World");
        assert_eq!(spans[0], RunSpan { start: 0, end: 5 });
        assert_eq!(spans[1], RunSpan { start: 6, end: 11 });
    }

    #[test]
    fn test_hello_world_search() {
        let matches = search_document(&create("Hello\nWorld"), "World", insensitive()).unwrap();
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.page_number, 1);
        assert_eq!(m.matched_text, "World");
        assert_eq!(m.quad_points.len(), 8);
        assert!(m.rect.right > m.rect.left);
        // Second line of the synthesized page
        assert!((m.rect.bottom - 706.0).abs() < 1e-3);
        assert!((m.rect.top - 694.0).abs() < 1e-3);
    }

    #[test]
    fn test_case_sensitivity() {
        let bytes = create("Hello World");
        let found = search_document(&bytes, "hello", insensitive()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].matched_text, "Hello");

        let sensitive = SearchOptions {
            match_case: true,
            whole_word: false,
        };
        assert!(search_document(&bytes, "hello", sensitive).unwrap().is_empty());
        assert_eq!(search_document(&bytes, "Hello", sensitive).unwrap().len(), 1);
    }

    #[test]
    fn test_whole_word() {
        let whole = SearchOptions {
            match_case: false,
            whole_word: true,
        };
        let pattern = build_pattern("cat", whole).unwrap().unwrap();
        assert!(search_page(&page(&[("concatenate", 0.0)]), &pattern).is_empty());
        assert_eq!(search_page(&page(&[("a cat sat", 0.0)]), &pattern).len(), 1);

        let partial = build_pattern("cat", insensitive()).unwrap().unwrap();
        assert_eq!(search_page(&page(&[("concatenate", 0.0)]), &partial).len(), 1);
    }

    #[test]
    fn test_empty_query_matches_nothing() {
        assert!(build_pattern("", insensitive()).unwrap().is_none());
        assert!(search_document(&create("anything"), "", insensitive())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let pattern = build_pattern("a.c", insensitive()).unwrap().unwrap();
        assert!(search_page(&page(&[("abc", 0.0)]), &pattern).is_empty());
        assert_eq!(search_page(&page(&[("a.c", 0.0)]), &pattern).len(), 1);
    }

    #[test]
    fn test_multiple_matches_in_order() {
        let pattern = build_pattern("ab", insensitive()).unwrap().unwrap();
        let matches = search_page(&page(&[("ab", 0.0), ("xab", 100.0), ("ab", 200.0)]), &pattern);
        let lefts: Vec<f32> = matches.iter().map(|m| m.rect.left).collect();
        assert_eq!(lefts, vec![0.0, 100.0, 200.0]);
    }

    #[test]
    fn test_match_spanning_runs_reports_start_run_rect() {
        // Known limitation: the box covers only the run the match starts in
        let runs = page(&[("quick", 0.0), ("brown", 80.0)]);
        let pattern = build_pattern("ick bro", insensitive()).unwrap().unwrap();
        let matches = search_page(&runs, &pattern);
        assert_eq!(matches.len(), 1);
        let rect = matches[0].rect;
        assert_eq!(rect.left, 0.0);
        assert_eq!(rect.right, 50.0);
        assert_eq!(rect.top, 688.0);
        assert_eq!(rect.bottom, 700.0);
        assert_eq!(matches[0].quad_points, rect.quad_points());
    }

    #[test]
    fn test_matches_across_pages_ordered_by_page() {
        let mut writer = crate::pdf::synthesizer::PdfWriter::new();
        writer.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
        writer.object(2, "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>");
        for (id, contents) in [(3, 5), (4, 6)] {
            writer.object(
                id,
                &format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 7 0 R >> >> /Contents {} 0 R >>",
                    contents
                ),
            );
        }
        writer.stream(5, "", b"BT /F1 12 Tf 72 720 Td (needle one) Tj ET");
        writer.stream(6, "", b"BT /F1 12 Tf 72 720 Td (needle two needle) Tj ET");
        writer.object(7, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>");
        let bytes = writer.finish(1);

        let matches = search_document(&bytes, "needle", insensitive()).unwrap();
        let pages: Vec<u32> = matches.iter().map(|m| m.page_number).collect();
        assert_eq!(pages, vec![1, 2, 2]);
    }

    #[test]
    fn test_corrupt_page_contributes_no_matches() {
        let mut writer = crate::pdf::synthesizer::PdfWriter::new();
        writer.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
        writer.object(2, "<< /Type /Pages /Kids [3 0 R 4 0 R 5 0 R] /Count 3 >>");
        for (id, contents) in [(3, 6), (4, 7), (5, 8)] {
            writer.object(
                id,
                &format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 9 0 R >> >> /Contents {} 0 R >>",
                    contents
                ),
            );
        }
        writer.stream(6, "", b"BT /F1 12 Tf 72 720 Td (first page) Tj ET");
        // Page 2's /Contents is not a stream
        writer.object(7, "42");
        writer.stream(8, "", b"BT /F1 12 Tf 72 720 Td (third page) Tj ET");
        writer.object(9, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>");

        let matches = search_document(&writer.finish(1), "page", insensitive()).unwrap();
        let pages: Vec<u32> = matches.iter().map(|m| m.page_number).collect();
        assert_eq!(pages, vec![1, 3]);
    }
}
