//! Font decoding for text runs
//!
//! Turns the bytes of a text-showing operator into glyphs: character
//! code, Unicode text and advance width. Only what run geometry needs is
//! read from the font dictionary:
//!
//! - simple fonts: `/FirstChar` + `/Widths`, standard-14 metrics otherwise
//! - Type0 fonts: two-byte codes, `/W` + `/DW` of the descendant font
//! - `/ToUnicode` CMaps (`bfchar` and `bfrange` sections)
//! - `/WinAnsiEncoding` for the 0x80-0x9F block; other single-byte codes
//!   decode as Latin-1

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};

use super::loader::{as_number, resolve, stream_bytes};

/// Width used for glyphs with no metrics (glyph space units)
const DEFAULT_WIDTH: f32 = 500.0;
/// Default /DW of CID fonts
const DEFAULT_CID_WIDTH: f32 = 1000.0;
/// Largest bfrange expanded into the lookup table
const MAX_RANGE_SPAN: u32 = 0xFFFF;

/// Helvetica widths for codes 32..=126
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32-47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48-63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64-79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80-95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96-111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 112-126
];

/// WinAnsiEncoding codes 0x80..=0x9F; the rest of the upper half is Latin-1
const WIN_ANSI_HIGH: [Option<char>; 32] = [
    Some('\u{20ac}'), None, Some('\u{201a}'), Some('\u{0192}'),
    Some('\u{201e}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02c6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None, Some('\u{017d}'), None,
    None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201c}'),
    Some('\u{201d}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02dc}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203a}'),
    Some('\u{0153}'), None, Some('\u{017e}'), Some('\u{0178}'),
];

/// Character of a WinAnsiEncoding code
pub fn win_ansi_char(code: u8) -> Option<char> {
    match code {
        0x80..=0x9F => WIN_ANSI_HIGH[usize::from(code - 0x80)],
        _ => Some(char::from(code)),
    }
}

/// WinAnsiEncoding code of a character, if it has one
pub fn win_ansi_code(ch: char) -> Option<u8> {
    match u32::from(ch) {
        0x00..=0x7F | 0xA0..=0xFF => Some(ch as u32 as u8),
        _ => WIN_ANSI_HIGH
            .iter()
            .position(|&c| c == Some(ch))
            .map(|index| 0x80 + index as u8),
    }
}

/// One decoded glyph
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub code: u32,
    pub text: String,
    /// Advance in glyph space (1/1000 of text space)
    pub width: f32,
    /// Single-byte code 32, which receives word spacing
    pub is_space: bool,
}

/// Metrics source of a font
#[derive(Debug, Clone)]
enum Widths {
    /// Explicit /Widths starting at /FirstChar
    Simple {
        first_char: u32,
        widths: Vec<f32>,
        missing: f32,
    },
    /// Built-in metrics of a standard-14 font
    Standard(StandardFont),
    /// CID widths from /W with /DW default
    Cid {
        widths: HashMap<u32, f32>,
        default: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StandardFont {
    Helvetica,
    Courier,
    Other,
}

/// Decoding information for one font resource
#[derive(Debug, Clone)]
pub struct FontInfo {
    /// Codes are two bytes wide (Type0 fonts)
    two_byte: bool,
    /// Simple font declaring /WinAnsiEncoding
    win_ansi: bool,
    widths: Widths,
    to_unicode: Option<HashMap<u32, String>>,
}

impl Default for FontInfo {
    /// Single-byte font with average widths, used when /Tf names an
    /// unknown resource
    fn default() -> Self {
        Self {
            two_byte: false,
            win_ansi: false,
            widths: Widths::Standard(StandardFont::Other),
            to_unicode: None,
        }
    }
}

impl FontInfo {
    /// Read a font dictionary
    pub fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let subtype = name_of(doc, font.get(b"Subtype").ok()).unwrap_or_default();
        let two_byte = subtype == "Type0";
        let win_ansi =
            !two_byte && encoding_name(doc, font).as_deref() == Some("WinAnsiEncoding");

        let widths = if two_byte {
            cid_widths(doc, font)
        } else {
            simple_widths(doc, font)
        };

        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| resolve(doc, obj).ok())
            .and_then(|obj| obj.as_stream().ok())
            .and_then(|stream| stream_bytes(stream).ok())
            .map(|data| parse_to_unicode(&data))
            .filter(|map| !map.is_empty());

        Self {
            two_byte,
            win_ansi,
            widths,
            to_unicode,
        }
    }

    /// Split string bytes into glyphs
    pub fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        let codes: Vec<u32> = if self.two_byte {
            bytes
                .chunks(2)
                .map(|pair| match pair {
                    [hi, lo] => u32::from(*hi) << 8 | u32::from(*lo),
                    [single] => u32::from(*single),
                    _ => 0,
                })
                .collect()
        } else {
            bytes.iter().map(|&b| u32::from(b)).collect()
        };

        codes
            .into_iter()
            .map(|code| Glyph {
                code,
                text: self.unicode(code),
                width: self.width(code),
                is_space: !self.two_byte && code == 32,
            })
            .collect()
    }

    fn unicode(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.as_ref().and_then(|map| map.get(&code)) {
            return text.clone();
        }
        if self.two_byte {
            // No CMap: glyph ids carry no text
            return String::new();
        }
        match u8::try_from(code) {
            Ok(byte) if self.win_ansi => {
                win_ansi_char(byte).map(String::from).unwrap_or_default()
            }
            _ => char::from_u32(code).map(String::from).unwrap_or_default(),
        }
    }

    fn width(&self, code: u32) -> f32 {
        match &self.widths {
            Widths::Simple {
                first_char,
                widths,
                missing,
            } => code
                .checked_sub(*first_char)
                .and_then(|index| widths.get(index as usize))
                .copied()
                .unwrap_or(*missing),
            Widths::Standard(font) => font.width(code),
            Widths::Cid { widths, default } => widths.get(&code).copied().unwrap_or(*default),
        }
    }
}

impl StandardFont {
    fn from_base_font(name: &str) -> Self {
        // Subset prefixes look like "ABCDEF+Helvetica"
        let name = name.split('+').last().unwrap_or(name);
        if name.starts_with("Helvetica") || name.starts_with("Arial") {
            StandardFont::Helvetica
        } else if name.starts_with("Courier") {
            StandardFont::Courier
        } else {
            StandardFont::Other
        }
    }

    fn width(&self, code: u32) -> f32 {
        match self {
            StandardFont::Helvetica => code
                .checked_sub(32)
                .and_then(|index| HELVETICA_WIDTHS.get(index as usize))
                .map(|&w| f32::from(w))
                .unwrap_or(556.0),
            StandardFont::Courier => 600.0,
            StandardFont::Other => DEFAULT_WIDTH,
        }
    }
}

fn name_of(doc: &Document, obj: Option<&Object>) -> Option<String> {
    let obj = resolve(doc, obj?).ok()?;
    obj.as_name()
        .ok()
        .map(|name| String::from_utf8_lossy(name).into_owned())
}

/// Base encoding name: `/Encoding /Name` or `/Encoding << /BaseEncoding /Name >>`
fn encoding_name(doc: &Document, font: &Dictionary) -> Option<String> {
    let encoding = resolve(doc, font.get(b"Encoding").ok()?).ok()?;
    match encoding {
        Object::Dictionary(dict) => name_of(doc, dict.get(b"BaseEncoding").ok()),
        other => name_of(doc, Some(other)),
    }
}

fn number_array(doc: &Document, obj: Option<&Object>) -> Option<Vec<f32>> {
    let array = resolve(doc, obj?).ok()?.as_array().ok()?;
    Some(
        array
            .iter()
            .map(|item| {
                resolve(doc, item)
                    .ok()
                    .and_then(as_number)
                    .unwrap_or(0.0)
            })
            .collect(),
    )
}

fn simple_widths(doc: &Document, font: &Dictionary) -> Widths {
    let missing = font
        .get(b"FontDescriptor")
        .ok()
        .and_then(|obj| resolve(doc, obj).ok())
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|descriptor| descriptor.get(b"MissingWidth").ok())
        .and_then(as_number);

    match number_array(doc, font.get(b"Widths").ok()) {
        Some(widths) if !widths.is_empty() => {
            let first_char = font
                .get(b"FirstChar")
                .ok()
                .and_then(as_number)
                .unwrap_or(0.0)
                .max(0.0) as u32;
            Widths::Simple {
                first_char,
                widths,
                missing: missing.unwrap_or(0.0),
            }
        }
        _ => {
            let base = name_of(doc, font.get(b"BaseFont").ok()).unwrap_or_default();
            Widths::Standard(StandardFont::from_base_font(&base))
        }
    }
}

fn cid_widths(doc: &Document, font: &Dictionary) -> Widths {
    let descendant = font
        .get(b"DescendantFonts")
        .ok()
        .and_then(|obj| resolve(doc, obj).ok())
        .and_then(|obj| obj.as_array().ok())
        .and_then(|fonts| fonts.first())
        .and_then(|obj| resolve(doc, obj).ok())
        .and_then(|obj| obj.as_dict().ok());

    let Some(descendant) = descendant else {
        return Widths::Cid {
            widths: HashMap::new(),
            default: DEFAULT_CID_WIDTH,
        };
    };

    let default = descendant
        .get(b"DW")
        .ok()
        .and_then(as_number)
        .unwrap_or(DEFAULT_CID_WIDTH);

    let mut widths = HashMap::new();
    let entries = descendant
        .get(b"W")
        .ok()
        .and_then(|obj| resolve(doc, obj).ok())
        .and_then(|obj| obj.as_array().ok());

    if let Some(entries) = entries {
        // Two forms: `c [w1 w2 ...]` and `c_first c_last w`
        let mut i = 0;
        while i < entries.len() {
            let Some(first) = resolve(doc, &entries[i]).ok().and_then(as_number) else {
                break;
            };
            let first = first.max(0.0) as u32;
            match entries.get(i + 1).and_then(|obj| resolve(doc, obj).ok()) {
                Some(Object::Array(list)) => {
                    for (offset, w) in list.iter().enumerate() {
                        let Some(code) = u32::try_from(offset)
                            .ok()
                            .and_then(|offset| first.checked_add(offset))
                        else {
                            break;
                        };
                        if let Some(w) = as_number(w) {
                            widths.insert(code, w);
                        }
                    }
                    i += 2;
                }
                Some(last) => {
                    let last = as_number(last).unwrap_or(0.0).max(0.0) as u32;
                    let w = entries
                        .get(i + 2)
                        .and_then(as_number)
                        .unwrap_or(default);
                    for code in first..=last.min(first.saturating_add(MAX_RANGE_SPAN)) {
                        widths.insert(code, w);
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    Widths::Cid { widths, default }
}

/// CMap tokens we care about
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    Word(String),
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        match b {
            b'<' => {
                let end = data[i + 1..]
                    .iter()
                    .position(|&c| c == b'>')
                    .map(|p| i + 1 + p)
                    .unwrap_or(data.len());
                let digits: Vec<u8> = data[i + 1..end]
                    .iter()
                    .copied()
                    .filter(u8::is_ascii_hexdigit)
                    .collect();
                tokens.push(Token::Hex(hex_bytes(&digits)));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                i += 1;
            }
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            _ if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < data.len()
                    && !data[i].is_ascii_whitespace()
                    && !matches!(data[i], b'<' | b'[' | b']' | b'%')
                {
                    i += 1;
                }
                tokens.push(Token::Word(
                    String::from_utf8_lossy(&data[start..i]).into_owned(),
                ));
            }
        }
    }
    tokens
}

fn hex_bytes(digits: &[u8]) -> Vec<u8> {
    let value = |c: u8| (c as char).to_digit(16).unwrap_or(0) as u8;
    digits
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => value(*hi) << 4 | value(*lo),
            // Odd digit count: trailing digit is padded with 0
            [hi] => value(*hi) << 4,
            _ => 0,
        })
        .collect()
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| acc << 8 | u32::from(b))
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => u16::from(*single),
            _ => 0,
        })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Destination of a bfrange entry shifted by `offset`
fn shifted_text(dst: &[u8], offset: u32) -> String {
    let mut units: Vec<u16> = dst
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => u16::from(*single),
            _ => 0,
        })
        .collect();
    if let Some(last) = units.last_mut() {
        *last = last.wrapping_add(offset as u16);
    }
    String::from_utf16_lossy(&units)
}

/// Parse the `bfchar` and `bfrange` sections of a ToUnicode CMap
pub fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    let tokens = tokenize(data);
    let mut map = HashMap::new();
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Word(word) if word == "beginbfchar" => {
                i += 1;
                while let (Some(Token::Hex(src)), Some(Token::Hex(dst))) =
                    (tokens.get(i), tokens.get(i + 1))
                {
                    map.insert(code_of(src), utf16_text(dst));
                    i += 2;
                }
            }
            Token::Word(word) if word == "beginbfrange" => {
                i += 1;
                while let (Some(Token::Hex(lo)), Some(Token::Hex(hi))) =
                    (tokens.get(i), tokens.get(i + 1))
                {
                    let (lo, hi) = (code_of(lo), code_of(hi));
                    let hi = hi.min(lo.saturating_add(MAX_RANGE_SPAN));
                    match tokens.get(i + 2) {
                        Some(Token::Hex(dst)) => {
                            for code in lo..=hi {
                                map.insert(code, shifted_text(dst, code - lo));
                            }
                            i += 3;
                        }
                        Some(Token::ArrayStart) => {
                            let mut j = i + 3;
                            let mut code = lo;
                            while let Some(Token::Hex(dst)) = tokens.get(j) {
                                if code <= hi {
                                    map.insert(code, utf16_text(dst));
                                }
                                code = code.saturating_add(1);
                                j += 1;
                            }
                            // Skip the closing bracket
                            i = j + 1;
                        }
                        _ => {
                            i += 2;
                            break;
                        }
                    }
                }
            }
            _ => i += 1,
        }
    }

    map
}
