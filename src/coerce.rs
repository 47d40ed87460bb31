//! Legacy format coercion: best-effort normalization of fully-formed,
//! non-canonical payloads from historical non-streaming endpoints into the
//! same canonical [`Document`] the streaming path produces.
//!
//! The accepted shapes are a fixed, closed set. Anything else yields `None`
//! or, for plain prose, the single-paragraph fallback. Nothing in here can
//! error into the render path.

use serde_json::{Value, json};

use crate::block::{self, Block};
use crate::document::{DOC_VERSION, Document};

/// String payloads longer than this are rejected before any parse attempt.
/// Untrusted oversized input fails fast instead of feeding a recursive
/// parser.
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Coerce an untyped payload into a canonical document.
///
/// String values take the string path (fence unwrap, nested JSON parse,
/// plain-prose fallback); everything else is probed against the legacy
/// shape list directly.
pub fn coerce(payload: &Value) -> Option<Document> {
    match payload {
        Value::String(s) => coerce_str(s),
        _ => try_extract(payload).and_then(validate),
    }
}

/// Coerce a raw string payload.
///
/// The string is trimmed, optionally unwrapped from a single fenced block,
/// then JSON-parsed up to two nested times (a JSON string embedded inside a
/// JSON string is a real producer output). Each successful parse is tried
/// against the shape list. If nothing matches and what remains is non-empty
/// plain prose, it becomes a single-paragraph document: the most common
/// producer output must never be treated as an error.
pub fn coerce_str(raw: &str) -> Option<Document> {
    if raw.len() > MAX_PAYLOAD_BYTES {
        tracing::warn!(
            len = raw.len(),
            limit = MAX_PAYLOAD_BYTES,
            "payload too large for document coercion"
        );
        return None;
    }

    let mut s = raw.trim().to_string();
    if let Some(inner) = strip_fence(&s) {
        s = inner.to_string();
    }

    for _ in 0..2 {
        match serde_json::from_str::<Value>(&s) {
            Ok(parsed) => {
                if let Some(doc) = try_extract(&parsed).and_then(validate) {
                    return Some(doc);
                }
                // sometimes there is another JSON string inside
                if let Value::String(inner) = parsed {
                    s = inner;
                    continue;
                }
                break;
            }
            Err(err) => {
                tracing::debug!(%err, "payload did not parse as JSON");
                break;
            }
        }
    }

    if !s.is_empty() && !s.starts_with('[') && !s.starts_with('{') {
        return Some(Document::plain_text(s));
    }

    None
}

/// Coerce with the caller-side fallback policy applied: an unusable payload
/// is wrapped as raw text rather than rendering nothing.
pub fn coerce_or_text(raw: &str) -> Document {
    coerce_str(raw).unwrap_or_else(|| Document::plain_text(raw))
}

/// Intermediate result of shape extraction: raw block values plus whatever
/// top-level metadata the source carried. Blocks are still untrusted here.
struct RawDoc {
    version: Option<String>,
    blocks: Vec<Value>,
    ops: Option<Vec<Value>>,
}

impl RawDoc {
    fn synthesized(blocks: Vec<Value>) -> Self {
        RawDoc {
            version: None,
            blocks,
            ops: None,
        }
    }
}

/// Probe one parsed payload against the closed legacy shape list, in
/// priority order.
fn try_extract(payload: &Value) -> Option<RawDoc> {
    // (h) array of {type:"text"} / {type:"action"} items
    if let Value::Array(items) = payload {
        return extract_item_array(items);
    }

    let obj = payload.as_object()?;

    // (a) already shaped as a document
    if let Some(blocks) = obj.get("blocks").and_then(Value::as_array) {
        return Some(RawDoc {
            version: obj.get("version").and_then(Value::as_str).map(String::from),
            blocks: blocks.clone(),
            ops: obj.get("ops").and_then(Value::as_array).cloned(),
        });
    }

    let is_doc_v1 = obj.get("version").and_then(Value::as_str) == Some("doc.v1");

    // (b) {version:"doc.v1", content:[...]}
    if is_doc_v1 {
        if let Some(content) = obj.get("content").and_then(Value::as_array) {
            return Some(RawDoc {
                version: Some("doc.v1".to_string()),
                blocks: content.clone(),
                ops: None,
            });
        }
        // (c) {version:"doc.v1", explanation:{content:[...]}}
        if let Some(content) = obj
            .get("explanation")
            .and_then(|e| e.get("content"))
            .and_then(Value::as_array)
        {
            return Some(RawDoc {
                version: Some("doc.v1".to_string()),
                blocks: content.clone(),
                ops: None,
            });
        }
    }

    if let Some(doc) = obj.get("doc").and_then(Value::as_object) {
        if doc.get("version").and_then(Value::as_str) == Some("v1") {
            // (d) {doc:{version:"v1", content:[...]}}
            if let Some(content) = doc.get("content").and_then(Value::as_array) {
                return Some(RawDoc::synthesized(content.clone()));
            }
            // (e) {doc:{version:"v1", paragraphs, quotes, terms}}
            if doc.contains_key("paragraphs")
                || doc.contains_key("quotes")
                || doc.contains_key("terms")
            {
                return Some(RawDoc::synthesized(explode_sections(
                    doc.get("paragraphs"),
                    doc.get("quotes"),
                    doc.get("terms"),
                )));
            }
        }
    }

    // (f) {explanation:{paragraphs, terms}} - older variant without quotes
    if let Some(explanation) = obj.get("explanation").and_then(Value::as_object) {
        if explanation.contains_key("paragraphs") || explanation.contains_key("terms") {
            return Some(RawDoc::synthesized(explode_sections(
                explanation.get("paragraphs"),
                None,
                explanation.get("terms"),
            )));
        }
    }

    // (g) flat {paragraph, quote, term}
    if truthy(obj.get("paragraph")) || truthy(obj.get("quote")) || truthy(obj.get("term")) {
        let mut blocks = Vec::new();
        if let Some(paragraph) = obj.get("paragraph").filter(|v| truthy(Some(*v))) {
            blocks.push(json!({ "type": "paragraph", "text": paragraph }));
        }
        if let Some(quote) = obj.get("quote").filter(|v| truthy(Some(*v))) {
            blocks.push(json!({ "type": "quote", "text": quote }));
        }
        if let Some(term) = obj.get("term").and_then(Value::as_object) {
            blocks.push(json!({
                "type": "term",
                "term": term.get("term").cloned().unwrap_or(Value::Null),
                "definition": term.get("definition").cloned().unwrap_or(Value::Null),
            }));
        }
        return Some(RawDoc::synthesized(blocks));
    }

    None
}

/// Explode the sectioned study-chat shape into paragraph, quote, and term
/// blocks, in that order.
fn explode_sections(
    paragraphs: Option<&Value>,
    quotes: Option<&Value>,
    terms: Option<&Value>,
) -> Vec<Value> {
    let mut blocks = Vec::new();

    if let Some(paragraphs) = paragraphs.and_then(Value::as_array) {
        for para in paragraphs {
            // items are plain strings or {content: "..."} objects
            let text = para.get("content").cloned().unwrap_or_else(|| para.clone());
            blocks.push(json!({ "type": "paragraph", "text": text }));
        }
    }

    if let Some(quotes) = quotes.and_then(Value::as_array) {
        for quote in quotes {
            blocks.push(json!({
                "type": "quote",
                "text": quote.get("text").cloned().unwrap_or(Value::Null),
                "source": quote.get("source").cloned().unwrap_or(Value::Null),
                "context": quote.get("context").cloned().unwrap_or(Value::Null),
            }));
        }
    }

    if let Some(terms) = terms.and_then(Value::as_array) {
        for term in terms {
            blocks.push(json!({
                "type": "term",
                "term": term.get("term").cloned().unwrap_or(Value::Null),
                "definition": term.get("definition").cloned().unwrap_or(Value::Null),
            }));
        }
    }

    blocks
}

/// Map a `{type:"text"}` / `{type:"action"}` item array to paragraph and
/// callout blocks.
fn extract_item_array(items: &[Value]) -> Option<RawDoc> {
    let mut blocks = Vec::new();

    for item in items {
        let Some(obj) = item.as_object() else { continue };
        match obj.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = obj.get("text").filter(|v| truthy(Some(*v))) {
                    blocks.push(json!({ "type": "paragraph", "text": text }));
                }
            }
            Some("action") => {
                let Some(action) = obj.get("action").and_then(Value::as_str) else {
                    continue;
                };
                let tref = obj
                    .get("action_input")
                    .and_then(|input| input.get("tref"))
                    .and_then(Value::as_str);
                let text = match tref {
                    Some(tref) => format!("Running action: {action} for ref: {tref}"),
                    None => format!("Running action: {action}"),
                };
                blocks.push(json!({ "type": "callout", "variant": "info", "text": text }));
            }
            _ => {}
        }
    }

    if blocks.is_empty() {
        return None;
    }
    Some(RawDoc::synthesized(blocks))
}

/// Sanitize every extracted block; a structure that sanitizes to zero valid
/// blocks is a failure, not an empty success, so an apparently well-shaped
/// but entirely-invalid payload falls through to the plain-text fallback.
fn validate(raw: RawDoc) -> Option<Document> {
    let blocks: Vec<Block> = raw.blocks.iter().filter_map(block::sanitize).collect();
    if blocks.is_empty() {
        return None;
    }

    Some(Document {
        version: raw.version.unwrap_or_else(|| DOC_VERSION.to_string()),
        blocks,
        ops: raw.ops,
    })
}

/// Unwrap a single ``` or ```json fence around the whole payload.
fn strip_fence(s: &str) -> Option<&str> {
    let rest = s.strip_prefix("```")?;
    let rest = match rest.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
        _ => rest,
    };
    let inner = rest.trim_start();
    let inner = inner.strip_suffix("```")?;
    Some(inner.trim())
}

/// JS-style truthiness for the presence checks the legacy shapes rely on:
/// present, non-null, and not an empty string.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(_) => true,
    }
}
