//! Resilient extraction of annotation triples from model output.
//!
//! Model replies are untrusted, semi-structured input: the JSON we asked for
//! may arrive wrapped in prose, inside a Markdown code fence, or as a lone
//! object instead of an array. Extraction strategies are tried in order and
//! decoding is lenient per element — one bad element never invalidates the
//! rest of the batch.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::AnnotationError;

/// Default confidence when the model omits the field.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;
/// Stored confidence is clamped into this range.
pub const MIN_CONFIDENCE: f32 = 0.1;
pub const MAX_CONFIDENCE: f32 = 1.0;

/// One parsed (index, label, confidence) triple.
///
/// `label` stays a raw JSON value here; the resolver owns its normalization
/// (string vs. single-element array) and taxonomy matching.
#[derive(Debug, Clone)]
pub struct ParsedAnnotation {
    pub index: usize,
    pub label: Value,
    pub confidence: f32,
}

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("fence regex"));
static ARRAY_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("array regex"));
static OBJECT_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("object regex"));

/// Candidate JSON snippets in extraction-priority order.
fn candidates(content: &str) -> Vec<&str> {
    let mut out = Vec::new();
    if let Some(caps) = CODE_FENCE.captures(content) {
        if let Some(inner) = caps.get(1) {
            out.push(inner.as_str().trim());
        }
    }
    if let Some(m) = ARRAY_SPAN.find(content) {
        out.push(m.as_str());
    }
    if let Some(m) = OBJECT_SPAN.find(content) {
        out.push(m.as_str());
    }
    out.push(content.trim());
    out
}

/// Parse a model reply into annotation triples.
///
/// Returns `Ok(vec![])` for an empty reply, `Err(ResponseParsing)` when no
/// strategy yields JSON at all. Elements missing `index` or `label`, or with
/// a present but non-numeric `index`/`confidence`, are dropped individually.
pub fn parse_annotations(content: &str) -> Result<Vec<ParsedAnnotation>, AnnotationError> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value = candidates(content)
        .into_iter()
        .find_map(|snippet| serde_json::from_str::<Value>(snippet).ok())
        .ok_or_else(|| {
            AnnotationError::ResponseParsing(format!(
                "no JSON found in reply ({} chars)",
                content.len()
            ))
        })?;

    // A lone object is treated as a singleton array.
    let elements = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        other => {
            return Err(AnnotationError::ResponseParsing(format!(
                "unexpected JSON shape: {other}"
            )))
        }
    };

    let mut parsed = Vec::new();
    for element in elements {
        match decode_element(&element) {
            Some(triple) => parsed.push(triple),
            None => {
                tracing::debug!(element = %element, "dropping malformed annotation element");
            }
        }
    }
    Ok(parsed)
}

fn decode_element(element: &Value) -> Option<ParsedAnnotation> {
    let obj = element.as_object()?;
    let index = coerce_index(obj.get("index")?)?;
    let label = obj.get("label")?.clone();
    let confidence = match obj.get("confidence") {
        None | Some(Value::Null) => DEFAULT_CONFIDENCE,
        Some(v) => coerce_f32(v)?,
    };
    Some(ParsedAnnotation {
        index,
        label,
        confidence: confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE),
    })
}

/// Accept an integer, a whole-valued float, or a numeric string.
fn coerce_index(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                usize::try_from(u).ok()
            } else {
                let f = n.as_f64()?;
                (f.fract() == 0.0 && f >= 0.0).then(|| f as usize)
            }
        }
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_f32(value: &Value) -> Option<f32> {
    let f = match value {
        Value::Number(n) => n.as_f64()? as f32,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    f.is_finite().then_some(f)
}
