//! Content stream interpreter
//!
//! Walks a page's operators and emits one `TextRun` per text-showing
//! operation (`Tj`, `'`, `"`, or a whole `TJ` array). Only the state that
//! affects run geometry is tracked: the CTM, text and line matrices, and
//! the text state parameters. Form XObjects are followed with their own
//! matrix and resources.
//!
//! Geometry follows the text rendering matrix
//! `Trm = [Tfs*Th 0 0 Tfs 0 Ts] x Tm x CTM`:
//!
//! - origin: `Tm x CTM` applied to `(0, Ts)`
//! - width: horizontal advance of the run scaled by the matrix x-axis
//! - height: font size scaled by the matrix y-axis, 12.0 when zero

use std::collections::HashMap;
use std::rc::Rc;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId};

use crate::document::{DocumentError, Result, TextRun, DEFAULT_RUN_HEIGHT};

use super::fonts::FontInfo;
use super::loader::{as_number, resolve, stream_bytes, DocumentHandle};

/// Maximum nesting of form XObjects
const MAX_FORM_DEPTH: usize = 8;

/// Affine transform `[a b c d e f]` acting on row vectors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// Six numeric operands, as used by `cm`, `Tm` and `/Matrix`
    pub fn from_operands(operands: &[Object]) -> Option<Self> {
        let values: Vec<f32> = operands.iter().filter_map(as_number).collect();
        match values.as_slice() {
            [a, b, c, d, e, f] => Some(Self::new(*a, *b, *c, *d, *e, *f)),
            _ => None,
        }
    }

    /// `self x other`: apply `self` first, then `other`
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.a + y * self.c + self.e,
            x * self.b + y * self.d + self.f,
        )
    }
}

/// Graphics state entries saved by `q` and restored by `Q`
#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Rc<FontInfo>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    /// `Tz / 100`
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            font: Rc::new(FontInfo::default()),
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

/// Interpreter state for one page
struct PageState {
    page_number: u32,
    gs: GraphicsState,
    stack: Vec<GraphicsState>,
    tm: Matrix,
    tlm: Matrix,
    runs: Vec<TextRun>,
}

impl PageState {
    fn new(page_number: u32) -> Self {
        Self {
            page_number,
            gs: GraphicsState::default(),
            stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            runs: Vec::new(),
        }
    }

    fn save(&mut self) {
        self.stack.push(self.gs.clone());
    }

    fn restore(&mut self) {
        if let Some(gs) = self.stack.pop() {
            self.gs = gs;
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).multiply(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.gs.leading);
    }

    /// Show strings (and `TJ` adjustments) as a single run
    fn show(&mut self, parts: &[Object]) {
        let gs = &self.gs;
        let m = self.tm.multiply(&gs.ctm);
        let (x, y) = m.apply(0.0, gs.rise);
        let scale_x = m.a.hypot(m.b);
        let size = gs.font_size * m.c.hypot(m.d);

        let mut text = String::new();
        let mut tx = 0.0;
        for part in parts {
            match part {
                Object::String(bytes, _) => {
                    for glyph in gs.font.decode(bytes) {
                        text.push_str(&glyph.text);
                        let mut advance = glyph.width / 1000.0 * gs.font_size + gs.char_spacing;
                        if glyph.is_space {
                            advance += gs.word_spacing;
                        }
                        tx += advance * gs.horizontal_scale;
                    }
                }
                other => {
                    if let Some(adjust) = as_number(other) {
                        tx -= adjust / 1000.0 * gs.font_size * gs.horizontal_scale;
                    }
                }
            }
        }

        self.tm = Matrix::translate(tx, 0.0).multiply(&self.tm);

        if text.is_empty() {
            return;
        }

        let height = if size == 0.0 {
            DEFAULT_RUN_HEIGHT
        } else {
            size.abs()
        };

        self.runs.push(TextRun {
            text,
            x,
            y,
            width: tx * scale_x,
            height,
            page_number: self.page_number,
        });
    }
}

fn number(operands: &[Object], index: usize) -> Option<f32> {
    operands.get(index).and_then(as_number)
}

/// Extracts text runs from the pages of one document
///
/// Fonts are cached by object id for the lifetime of the interpreter, so
/// reuse one interpreter for every page of a document.
pub struct TextInterpreter<'a> {
    handle: &'a DocumentHandle,
    fonts: HashMap<ObjectId, Rc<FontInfo>>,
}

impl<'a> TextInterpreter<'a> {
    pub fn new(handle: &'a DocumentHandle) -> Self {
        Self {
            handle,
            fonts: HashMap::new(),
        }
    }

    /// Text runs of a 1-indexed page in content-stream order
    pub fn page_runs(&mut self, page_number: u32) -> Result<Vec<TextRun>> {
        let handle = self.handle;
        let content = handle.page_content(page_number)?;
        let resources = handle.page_resources(page_number)?;

        let operations = Content::decode(&content)
            .map_err(|e| DocumentError::corrupt_page(page_number, e))?
            .operations;

        let mut state = PageState::new(page_number);
        self.run(&mut state, &operations, resources, 0);

        tracing::trace!("Page {}: {} text runs", page_number, state.runs.len());
        Ok(state.runs)
    }

    fn run(
        &mut self,
        state: &mut PageState,
        operations: &[Operation],
        resources: Option<&'a Dictionary>,
        depth: usize,
    ) {
        for op in operations {
            let operands = op.operands.as_slice();
            match op.operator.as_str() {
                "q" => state.save(),
                "Q" => state.restore(),
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        state.gs.ctm = m.multiply(&state.gs.ctm);
                    }
                }
                "BT" => {
                    state.tm = Matrix::IDENTITY;
                    state.tlm = Matrix::IDENTITY;
                }
                "ET" => {}
                "Tf" => {
                    if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                        state.gs.font = self.font(resources, name);
                    }
                    if let Some(size) = number(operands, 1) {
                        state.gs.font_size = size;
                    }
                }
                "Tc" => {
                    if let Some(v) = number(operands, 0) {
                        state.gs.char_spacing = v;
                    }
                }
                "Tw" => {
                    if let Some(v) = number(operands, 0) {
                        state.gs.word_spacing = v;
                    }
                }
                "Tz" => {
                    if let Some(v) = number(operands, 0) {
                        state.gs.horizontal_scale = v / 100.0;
                    }
                }
                "TL" => {
                    if let Some(v) = number(operands, 0) {
                        state.gs.leading = v;
                    }
                }
                "Ts" => {
                    if let Some(v) = number(operands, 0) {
                        state.gs.rise = v;
                    }
                }
                "Td" => {
                    if let (Some(tx), Some(ty)) = (number(operands, 0), number(operands, 1)) {
                        state.move_line(tx, ty);
                    }
                }
                "TD" => {
                    if let (Some(tx), Some(ty)) = (number(operands, 0), number(operands, 1)) {
                        state.gs.leading = -ty;
                        state.move_line(tx, ty);
                    }
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        state.tm = m;
                        state.tlm = m;
                    }
                }
                "T*" => state.next_line(),
                "Tj" => state.show(operands),
                "TJ" => {
                    if let Some(Object::Array(parts)) = operands.first() {
                        state.show(parts);
                    }
                }
                "'" => {
                    state.next_line();
                    state.show(operands);
                }
                "\"" => {
                    if let (Some(aw), Some(ac)) = (number(operands, 0), number(operands, 1)) {
                        state.gs.word_spacing = aw;
                        state.gs.char_spacing = ac;
                    }
                    state.next_line();
                    state.show(operands.get(2..).unwrap_or(&[]));
                }
                "Do" => {
                    if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                        if let Err(e) = self.form(state, resources, name, depth) {
                            tracing::warn!(
                                "Page {}: skipping XObject {}: {}",
                                state.page_number,
                                String::from_utf8_lossy(name),
                                e
                            );
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Run a form XObject's content with its matrix and resources
    fn form(
        &mut self,
        state: &mut PageState,
        resources: Option<&'a Dictionary>,
        name: &[u8],
        depth: usize,
    ) -> lopdf::Result<()> {
        if depth >= MAX_FORM_DEPTH {
            return Err(lopdf::Error::ReferenceLimit);
        }
        let handle = self.handle;
        let doc = handle.inner();

        let Some(xobjects) = resources.and_then(|r| r.get(b"XObject").ok()) else {
            return Ok(());
        };
        let xobject = resolve(doc, xobjects)?.as_dict()?.get(name)?;
        let stream = resolve(doc, xobject)?.as_stream()?;

        // Images and other XObjects carry no text
        if stream.dict.get(b"Subtype").and_then(Object::as_name).ok() != Some(b"Form".as_slice()) {
            return Ok(());
        }

        let data = stream_bytes(stream)?;
        let operations = Content::decode(&data)?.operations;

        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|m| resolve(doc, m).ok())
            .and_then(|m| m.as_array().ok())
            .and_then(|m| Matrix::from_operands(m))
            .unwrap_or(Matrix::IDENTITY);

        let form_resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|r| resolve(doc, r).ok())
            .and_then(|r| r.as_dict().ok())
            .or(resources);

        state.save();
        let (tm, tlm) = (state.tm, state.tlm);
        state.gs.ctm = matrix.multiply(&state.gs.ctm);
        self.run(state, &operations, form_resources, depth + 1);
        state.tm = tm;
        state.tlm = tlm;
        state.restore();

        Ok(())
    }

    /// Font for a /Tf resource name; unknown names get the fallback font
    fn font(&mut self, resources: Option<&'a Dictionary>, name: &[u8]) -> Rc<FontInfo> {
        let handle = self.handle;
        let doc = handle.inner();

        let entry = resources
            .and_then(|r| r.get(b"Font").ok())
            .and_then(|fonts| resolve(doc, fonts).ok())
            .and_then(|fonts| fonts.as_dict().ok())
            .and_then(|fonts| fonts.get(name).ok());

        let Some(entry) = entry else {
            tracing::debug!("Font {} not in resources", String::from_utf8_lossy(name));
            return Rc::new(FontInfo::default());
        };

        if let Object::Reference(id) = entry {
            if let Some(font) = self.fonts.get(id) {
                return Rc::clone(font);
            }
        }

        let font = match resolve(doc, entry).and_then(Object::as_dict) {
            Ok(dict) => Rc::new(FontInfo::from_dict(doc, dict)),
            Err(_) => Rc::new(FontInfo::default()),
        };

        if let Object::Reference(id) = entry {
            self.fonts.insert(*id, Rc::clone(&font));
        }
        font
    }
}

/// Text runs of one page (convenience for single-page callers)
pub fn page_runs(handle: &DocumentHandle, page_number: u32) -> Result<Vec<TextRun>> {
    TextInterpreter::new(handle).page_runs(page_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::synthesizer::{create, PdfWriter};

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    /// One page with Helvetica as /F1 and optional extra resources/objects
    fn page_with(content: &[u8], extra_resources: &str, extra: impl FnOnce(&mut PdfWriter)) -> Vec<u8> {
        let mut writer = PdfWriter::new();
        writer.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
        writer.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
        writer.object(
            3,
            &format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 5 0 R >> {} >> /Contents 4 0 R >>",
                extra_resources
            ),
        );
        writer.stream(4, "", content);
        writer.object(5, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>");
        extra(&mut writer);
        writer.finish(1)
    }

    fn runs_of(bytes: &[u8]) -> Vec<TextRun> {
        let handle = DocumentHandle::load(bytes).unwrap();
        page_runs(&handle, 1).unwrap()
    }

    #[test]
    fn test_matrix_multiply_order() {
        let scale = Matrix::new(2.0, 0.0, 0.0, 2.0, 0.0, 0.0);
        let shift = Matrix::translate(10.0, 5.0);
        // Scale first, then translate
        assert_eq!(scale.multiply(&shift).apply(1.0, 1.0), (12.0, 7.0));
        // Translate first, then scale
        assert_eq!(shift.multiply(&scale).apply(1.0, 1.0), (22.0, 12.0));
        assert_eq!(Matrix::IDENTITY.multiply(&shift), shift);
    }

    #[test]
    fn test_runs_of_synthesized_lines() {
        let runs = runs_of(&create("Hello\nWorld"));
        assert_eq!(runs.len(), 2);

        assert_eq!(runs[0].text, "Hello");
        assert!(close(runs[0].x, 72.0));
        assert!(close(runs[0].y, 720.0));
        // H e l l o in Helvetica at 12pt
        assert!(close(runs[0].width, (722.0 + 556.0 + 222.0 + 222.0 + 556.0) / 1000.0 * 12.0));
        assert!(close(runs[0].height, 12.0));

        assert_eq!(runs[1].text, "World");
        assert!(close(runs[1].x, 72.0));
        assert!(close(runs[1].y, 706.0));
        assert_eq!(runs[1].page_number, 1);
    }

    #[test]
    fn test_tj_array_is_one_run_with_kerning() {
        let runs = runs_of(&page_with(
            b"BT /F1 10 Tf 100 200 Td [(A) -1000 (B)] TJ ET",
            "",
            |_| {},
        ));
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "AB");
        assert!(close(runs[0].width, 6.67 + 10.0 + 6.67));
        assert!(close(runs[0].x, 100.0));
    }

    #[test]
    fn test_consecutive_tj_advance_origin() {
        let runs = runs_of(&page_with(b"BT /F1 10 Tf 0 0 Td (AA) Tj (B) Tj ET", "", |_| {}));
        assert_eq!(runs.len(), 2);
        assert!(close(runs[1].x, 13.34));
    }

    #[test]
    fn test_ctm_scales_geometry() {
        let runs = runs_of(&page_with(
            b"2 0 0 2 0 0 cm BT /F1 12 Tf 10 10 Td (H) Tj ET",
            "",
            |_| {},
        ));
        assert_eq!(runs.len(), 1);
        assert!(close(runs[0].x, 20.0));
        assert!(close(runs[0].y, 20.0));
        assert!(close(runs[0].height, 24.0));
        assert!(close(runs[0].width, 0.722 * 12.0 * 2.0));
    }

    #[test]
    fn test_q_restores_ctm() {
        let runs = runs_of(&page_with(
            b"q 1 0 0 1 100 100 cm Q BT /F1 12 Tf 5 5 Td (x) Tj ET",
            "",
            |_| {},
        ));
        assert!(close(runs[0].x, 5.0));
        assert!(close(runs[0].y, 5.0));
    }

    #[test]
    fn test_zero_font_size_uses_default_height() {
        let runs = runs_of(&page_with(b"BT /F1 0 Tf (x) Tj ET", "", |_| {}));
        assert_eq!(runs[0].height, DEFAULT_RUN_HEIGHT);
    }

    #[test]
    fn test_form_xobject_is_followed() {
        let bytes = page_with(
            b"q 1 0 0 1 50 50 cm /Fm1 Do Q BT /F1 12 Tf 0 0 Td (after) Tj ET",
            "/XObject << /Fm1 6 0 R >>",
            |writer| {
                writer.stream(
                    6,
                    "/Type /XObject /Subtype /Form /BBox [0 0 612 792] /Matrix [1 0 0 1 10 0]",
                    b"BT /F1 12 Tf 0 0 Td (inside) Tj ET",
                );
            },
        );
        let runs = runs_of(&bytes);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].text, "inside");
        assert!(close(runs[0].x, 60.0));
        assert!(close(runs[0].y, 50.0));
        // CTM restored after the form
        assert_eq!(runs[1].text, "after");
        assert!(close(runs[1].x, 0.0));
    }

    #[test]
    fn test_unknown_font_still_yields_text() {
        let runs = runs_of(&page_with(b"BT /Missing 10 Tf (abc) Tj ET", "", |_| {}));
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "abc");
        assert!(runs[0].width > 0.0);
    }

    #[test]
    fn test_quote_operators_move_to_next_line() {
        let runs = runs_of(&page_with(
            b"BT /F1 10 Tf 12 TL 0 100 Td (one) Tj (two) ' 1 0 (three) \" ET",
            "",
            |_| {},
        ));
        let texts: Vec<&str> = runs.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert!(close(runs[1].y, 88.0));
        assert!(close(runs[2].y, 76.0));
        assert!(close(runs[2].x, 0.0));
    }
}
