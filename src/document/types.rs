//! Document types
//!
//! Domain types produced by the PDF engines and carried in result envelopes.

use serde::{Deserialize, Serialize};

/// Default highlight color for annotations without a native color
pub const DEFAULT_ANNOTATION_COLOR: &str = "#ffff00";

/// Height used when a run's effective font size is zero
pub const DEFAULT_RUN_HEIGHT: f32 = 12.0;

/// One positioned fragment of page text
///
/// Coordinates are in the page's untransformed user space: the origin is
/// the text rendering matrix applied to (0, rise), width is the advance of
/// the shown string and height the effective font size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Page number (1-indexed)
    pub page_number: u32,
}

/// Ordered text runs of a single page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageText {
    /// Page number (1-indexed)
    pub page_number: u32,
    pub runs: Vec<TextRun>,
}

impl PageText {
    pub fn empty(page_number: u32) -> Self {
        Self {
            page_number,
            runs: Vec::new(),
        }
    }

    /// Run strings joined with a single space
    pub fn text(&self) -> String {
        let parts: Vec<&str> = self.runs.iter().map(|r| r.text.as_str()).collect();
        parts.join(" ")
    }
}

/// Extracted text of one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedPage {
    pub page_number: u32,
    pub text: String,
}

/// Result of whole-document text extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentText {
    /// Page texts, each followed by a blank-line separator
    pub text: String,
    pub page_count: u32,
    pub pages: Vec<ExtractedPage>,
}

/// Highlight rectangle (left/top/right/bottom)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HighlightRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl HighlightRect {
    /// Rectangle covering a single text run
    pub fn from_run(run: &TextRun) -> Self {
        Self {
            left: run.x,
            top: run.y - run.height,
            right: run.x + run.width,
            bottom: run.y,
        }
    }

    /// Corners as bottom-left, bottom-right, top-left, top-right
    pub fn quad_points(&self) -> [f32; 8] {
        [
            self.left,
            self.bottom,
            self.right,
            self.bottom,
            self.left,
            self.top,
            self.right,
            self.top,
        ]
    }
}

/// One occurrence of a search query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    pub page_number: u32,
    pub matched_text: String,
    /// Box of the run in which the match starts
    pub rect: HighlightRect,
    pub quad_points: [f32; 8],
}

/// Search options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub match_case: bool,
    pub whole_word: bool,
}

/// Normalized annotation type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationType {
    #[default]
    Highlight,
    Note,
    FreeText,
    Square,
    Circle,
    Ink,
}

impl AnnotationType {
    /// Map a native /Subtype name; unknown subtypes become highlights
    pub fn from_subtype(subtype: &str) -> Self {
        match subtype {
            "Highlight" => AnnotationType::Highlight,
            "Text" => AnnotationType::Note,
            "FreeText" => AnnotationType::FreeText,
            "Square" => AnnotationType::Square,
            "Circle" => AnnotationType::Circle,
            "Ink" => AnnotationType::Ink,
            _ => AnnotationType::Highlight,
        }
    }

    /// Native /Subtype name written when saving
    pub fn subtype(&self) -> &'static str {
        match self {
            AnnotationType::Highlight => "Highlight",
            AnnotationType::Note => "Text",
            AnnotationType::FreeText => "FreeText",
            AnnotationType::Square => "Square",
            AnnotationType::Circle => "Circle",
            AnnotationType::Ink => "Ink",
        }
    }
}

/// Annotation rectangle (origin at bottom-left)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl AnnotationRect {
    /// Build from a native [x1 y1 x2 y2] box, normalizing corner order
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        let (left, right) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let (bottom, top) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        Self {
            x: left,
            y: bottom,
            width: right - left,
            height: top - bottom,
        }
    }

    /// Native [left bottom right top] box
    pub fn corners(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }
}

/// Normalized annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: String,
    #[serde(rename = "type", default)]
    pub annotation_type: AnnotationType,
    pub page_number: u32,
    pub rect: AnnotationRect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    DEFAULT_ANNOTATION_COLOR.to_string()
}

/// Convert an RGB triple in [0, 1] to "#rrggbb"
pub fn rgb_to_hex(r: f32, g: f32, b: f32) -> String {
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}

/// Parse "#rrggbb" (leading '#' optional) into an RGB triple in [0, 1]
pub fn hex_to_rgb(color: &str) -> Option<(f32, f32, f32)> {
    let hex = color.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .ok()
            .map(|v| v as f32 / 255.0)
    };
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}
