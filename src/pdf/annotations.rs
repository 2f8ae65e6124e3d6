//! Annotation extraction and embedding
//!
//! Reads native markup from each page's `/Annots` array and normalizes it
//! into `Annotation` records; `save_annotations` writes records back as
//! annotation dictionaries.
//!
//! # Normalization
//!
//! - id: `/NM` if present, else `"{object}R"` for indirect annotations,
//!   else a generated UUID
//! - type: fixed table over `/Subtype`, unknown or missing subtypes become
//!   highlights
//! - rect: `/Rect` with corners normalized; entries without one are skipped
//! - color: `/C` (gray, RGB or CMYK) as `#rrggbb`, default `#ffff00`
//! - content: `/Contents` text string

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use uuid::Uuid;

use crate::document::{
    hex_to_rgb, rgb_to_hex, Annotation, AnnotationRect, AnnotationType, DocumentError, Result,
    DEFAULT_ANNOTATION_COLOR,
};

use super::loader::{as_number, decode_text_string, resolve, DocumentHandle};

/// Annotation flag "Print"
const FLAG_PRINT: i64 = 4;

/// Annotations of one page
pub fn page_annotations(handle: &DocumentHandle, page_number: u32) -> Result<Vec<Annotation>> {
    let page = handle.page_dict(page_number)?;
    let doc = handle.inner();

    let annots = match page.get(b"Annots") {
        Ok(obj) => resolve(doc, obj).map_err(|e| DocumentError::corrupt_page(page_number, e))?,
        Err(_) => return Ok(Vec::new()),
    };

    let entries = match annots {
        Object::Array(entries) => entries,
        Object::Null => return Ok(Vec::new()),
        other => {
            let found = other.type_name().unwrap_or("unknown");
            return Err(DocumentError::corrupt_page(
                page_number,
                format!("/Annots is not an array: {}", found),
            ));
        }
    };

    let mut annotations = Vec::with_capacity(entries.len());
    for entry in entries {
        let indirect = entry.as_reference().ok();
        let dict = match resolve(doc, entry).and_then(Object::as_dict) {
            Ok(dict) => dict,
            Err(e) => {
                tracing::debug!("Page {}: skipping annotation entry: {}", page_number, e);
                continue;
            }
        };
        if let Some(annotation) = normalize(doc, dict, indirect, page_number) {
            annotations.push(annotation);
        }
    }

    Ok(annotations)
}

/// Annotations of every page; unreadable pages are skipped
pub fn extract_annotations(handle: &DocumentHandle) -> Vec<Annotation> {
    let mut annotations = Vec::new();

    for page_number in 1..=handle.page_count() {
        match page_annotations(handle, page_number) {
            Ok(mut page) => annotations.append(&mut page),
            Err(e) => {
                tracing::warn!(
                    "Failed to read annotations on page {}: {}",
                    page_number,
                    e
                );
            }
        }
    }

    tracing::debug!(
        "Extracted {} annotations from {} pages",
        annotations.len(),
        handle.page_count()
    );
    annotations
}

/// Load `bytes` and extract its annotations
pub fn extract_from_bytes(bytes: &[u8]) -> Result<Vec<Annotation>> {
    let handle = DocumentHandle::load(bytes)?;
    Ok(extract_annotations(&handle))
}

fn normalize(
    doc: &Document,
    dict: &Dictionary,
    indirect: Option<ObjectId>,
    page_number: u32,
) -> Option<Annotation> {
    let rect = numbers(doc, dict.get(b"Rect").ok()?);
    let rect = match rect.as_slice() {
        [x1, y1, x2, y2] => AnnotationRect::from_corners(*x1, *y1, *x2, *y2),
        _ => return None,
    };

    let subtype = dict
        .get(b"Subtype")
        .ok()
        .and_then(|s| resolve(doc, s).ok())
        .and_then(|s| s.as_name().ok())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .unwrap_or_default();

    let id = text_string(doc, dict, b"NM")
        .filter(|nm| !nm.is_empty())
        .or_else(|| indirect.map(|(num, _)| format!("{}R", num)))
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let color = dict
        .get(b"C")
        .ok()
        .and_then(|c| color_from(&numbers(doc, c)))
        .unwrap_or_else(|| DEFAULT_ANNOTATION_COLOR.to_string());

    let content = text_string(doc, dict, b"Contents").filter(|c| !c.is_empty());

    Some(Annotation {
        id,
        annotation_type: AnnotationType::from_subtype(&subtype),
        page_number,
        rect,
        content,
        color,
    })
}

/// Numeric array entries (indirect elements resolved)
fn numbers(doc: &Document, obj: &Object) -> Vec<f32> {
    resolve(doc, obj)
        .and_then(Object::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| resolve(doc, item).ok().and_then(as_number))
                .collect()
        })
        .unwrap_or_default()
}

fn text_string(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    match resolve(doc, dict.get(key).ok()?).ok()? {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        _ => None,
    }
}

/// `/C` components to hex; empty arrays mean transparent
fn color_from(components: &[f32]) -> Option<String> {
    match components {
        [gray] => Some(rgb_to_hex(*gray, *gray, *gray)),
        [r, g, b] => Some(rgb_to_hex(*r, *g, *b)),
        [c, m, y, k] => Some(rgb_to_hex(
            (1.0 - c) * (1.0 - k),
            (1.0 - m) * (1.0 - k),
            (1.0 - y) * (1.0 - k),
        )),
        _ => None,
    }
}

/// PDF text string: plain bytes for ASCII, UTF-16BE with BOM otherwise
fn encode_text_string(text: &str) -> Vec<u8> {
    if text.is_ascii() {
        return text.as_bytes().to_vec();
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}

fn reals(values: &[f32]) -> Object {
    Object::Array(values.iter().map(|v| Object::Real(*v)).collect())
}

/// Annotation dictionary for a normalized record
fn annotation_dict(annotation: &Annotation, page_id: ObjectId) -> Dictionary {
    let (r, g, b) = hex_to_rgb(&annotation.color)
        .or_else(|| hex_to_rgb(DEFAULT_ANNOTATION_COLOR))
        .unwrap_or((1.0, 1.0, 0.0));
    let [left, bottom, right, top] = annotation.rect.corners();

    let mut dict = dictionary! {
        "Type" => "Annot",
        "Subtype" => annotation.annotation_type.subtype(),
        "Rect" => reals(&[left, bottom, right, top]),
        "C" => reals(&[r, g, b]),
        "NM" => Object::string_literal(encode_text_string(&annotation.id)),
        "F" => FLAG_PRINT,
        "P" => page_id,
    };

    if let Some(content) = &annotation.content {
        dict.set("Contents", Object::string_literal(encode_text_string(content)));
    }

    if annotation.annotation_type == AnnotationType::Highlight {
        // Top-left, top-right, bottom-left, bottom-right
        dict.set(
            "QuadPoints",
            reals(&[left, top, right, top, left, bottom, right, bottom]),
        );
    }

    dict
}

/// Append an annotation reference to a page's /Annots
fn attach(doc: &mut Document, page_id: ObjectId, annot_id: ObjectId) -> lopdf::Result<()> {
    let existing = doc.get_dictionary(page_id)?.get(b"Annots").ok().cloned();

    match existing {
        Some(Object::Reference(array_id)) => {
            if let Object::Array(items) = doc.get_object_mut(array_id)? {
                items.push(Object::Reference(annot_id));
                return Ok(());
            }
            set_annots(doc, page_id, vec![Object::Reference(annot_id)])
        }
        Some(Object::Array(mut items)) => {
            items.push(Object::Reference(annot_id));
            set_annots(doc, page_id, items)
        }
        _ => set_annots(doc, page_id, vec![Object::Reference(annot_id)]),
    }
}

fn set_annots(doc: &mut Document, page_id: ObjectId, items: Vec<Object>) -> lopdf::Result<()> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)?
        .set("Annots", Object::Array(items));
    Ok(())
}

/// Embed annotations into a document and return the rewritten bytes
///
/// With nothing to embed the input is returned unchanged. Annotations
/// pointing at pages the document does not have are skipped.
pub fn save_annotations(bytes: &[u8], annotations: &[Annotation]) -> Result<Vec<u8>> {
    if annotations.is_empty() {
        return Ok(bytes.to_vec());
    }

    let handle = DocumentHandle::load(bytes)?;
    let page_ids = handle.page_ids().to_vec();
    let mut doc = handle.into_inner();
    let mut attached = 0usize;

    for annotation in annotations {
        let page_id = annotation
            .page_number
            .checked_sub(1)
            .and_then(|index| page_ids.get(index as usize))
            .copied();
        let Some(page_id) = page_id else {
            tracing::warn!(
                "Skipping annotation {}: page {} out of range ({} pages)",
                annotation.id,
                annotation.page_number,
                page_ids.len()
            );
            continue;
        };

        let annot_id = doc.add_object(annotation_dict(annotation, page_id));
        if let Err(e) = attach(&mut doc, page_id, annot_id) {
            tracing::warn!("Skipping annotation {}: {}", annotation.id, e);
            continue;
        }
        attached += 1;
    }

    if attached == 0 {
        return Ok(bytes.to_vec());
    }

    let mut out = Vec::with_capacity(bytes.len());
    doc.save_to(&mut out)
        .map_err(|e| DocumentError::WriteError(e.to_string()))?;

    tracing::debug!(
        "Embedded {} of {} annotations ({} bytes)",
        attached,
        annotations.len(),
        out.len()
    );
    Ok(out)
}
