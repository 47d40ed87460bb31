//! Block content model, payload sanitization, and delta merging.
//!
//! A [`Block`] is one typed content unit of a [`Document`](crate::Document).
//! Blocks carry no identity of their own; identity lives in the per-position
//! [`BlockState`](crate::session::BlockState) during streaming.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Content kinds recognized by the assembly engine. Closed set: anything
/// else is rejected by [`sanitize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading,
    Quote,
    List,
    Term,
    Callout,
    Action,
    Code,
    Table,
    Hr,
    Image,
}

impl BlockKind {
    /// Parse a wire-level type tag. Returns `None` for unrecognized tags.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag {
            "paragraph" => BlockKind::Paragraph,
            "heading" => BlockKind::Heading,
            "quote" => BlockKind::Quote,
            "list" => BlockKind::List,
            "term" => BlockKind::Term,
            "callout" => BlockKind::Callout,
            "action" => BlockKind::Action,
            "code" => BlockKind::Code,
            "table" => BlockKind::Table,
            "hr" => BlockKind::Hr,
            "image" => BlockKind::Image,
            _ => return None,
        };
        Some(kind)
    }
}

/// Callout emphasis variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalloutVariant {
    Info,
    Warn,
    Success,
    Danger,
}

/// One typed content unit. Serialized with an external `type` tag so the
/// canonical JSON shape matches what the sanitizer accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Paragraph {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        dir: Option<String>,
    },
    Heading {
        level: u8,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        dir: Option<String>,
    },
    Quote {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        dir: Option<String>,
    },
    List {
        items: Vec<String>,
        #[serde(default)]
        ordered: bool,
    },
    Term {
        term: String,
        definition: String,
    },
    Callout {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        variant: Option<CalloutVariant>,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Action {
        label: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        action_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    Code {
        code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
    },
    Table {
        #[serde(skip_serializing_if = "Option::is_none")]
        headers: Option<Vec<String>>,
        #[serde(default)]
        rows: Vec<Vec<String>>,
    },
    Hr,
    Image {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

impl Block {
    /// The kind tag of this block.
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Paragraph { .. } => BlockKind::Paragraph,
            Block::Heading { .. } => BlockKind::Heading,
            Block::Quote { .. } => BlockKind::Quote,
            Block::List { .. } => BlockKind::List,
            Block::Term { .. } => BlockKind::Term,
            Block::Callout { .. } => BlockKind::Callout,
            Block::Action { .. } => BlockKind::Action,
            Block::Code { .. } => BlockKind::Code,
            Block::Table { .. } => BlockKind::Table,
            Block::Hr => BlockKind::Hr,
            Block::Image { .. } => BlockKind::Image,
        }
    }

    /// An empty block of the given kind, used when a `start` event carries a
    /// type tag but no payload.
    pub fn empty_of(kind: BlockKind) -> Block {
        match kind {
            BlockKind::Paragraph => Block::Paragraph {
                text: String::new(),
                lang: None,
                dir: None,
            },
            BlockKind::Heading => Block::Heading {
                level: 2,
                text: String::new(),
                lang: None,
                dir: None,
            },
            BlockKind::Quote => Block::Quote {
                text: String::new(),
                source: None,
                context: None,
                lang: None,
                dir: None,
            },
            BlockKind::List => Block::List {
                items: Vec::new(),
                ordered: false,
            },
            BlockKind::Term => Block::Term {
                term: String::new(),
                definition: String::new(),
            },
            BlockKind::Callout => Block::Callout {
                text: String::new(),
                variant: None,
                label: None,
            },
            BlockKind::Action => Block::Action {
                label: String::new(),
                action_id: None,
                params: None,
            },
            BlockKind::Code => Block::Code {
                code: String::new(),
                lang: None,
            },
            BlockKind::Table => Block::Table {
                headers: None,
                rows: Vec::new(),
            },
            BlockKind::Hr => Block::Hr,
            BlockKind::Image => Block::Image {
                url: String::new(),
                alt: None,
                caption: None,
            },
        }
    }

    /// Convenience constructor for the single most common block.
    pub fn paragraph(text: impl Into<String>) -> Block {
        Block::Paragraph {
            text: text.into(),
            lang: None,
            dir: None,
        }
    }

    /// The primary text of this block, if it has one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Block::Paragraph { text, .. }
            | Block::Heading { text, .. }
            | Block::Quote { text, .. }
            | Block::Callout { text, .. } => Some(text),
            Block::Code { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// How an incoming delta combines with existing content at a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaMode {
    #[default]
    Replace,
    Append,
}

/// Normalize one untyped payload into a well-formed [`Block`], or reject it.
///
/// Default-deny: only the fields recognized for the tagged kind are copied;
/// everything else is dropped. Malformed-but-harmless input gets a soft
/// fallback (non-string text is stringified, a non-array item list becomes
/// empty) so it still renders as something.
pub fn sanitize(raw: &Value) -> Option<Block> {
    let obj = raw.as_object()?;
    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .and_then(BlockKind::from_tag)?;

    let block = match kind {
        BlockKind::Paragraph => Block::Paragraph {
            text: text_lossy(obj.get("text")),
            lang: opt_str(obj, "lang"),
            dir: opt_str(obj, "dir"),
        },
        BlockKind::Heading => Block::Heading {
            level: obj
                .get("level")
                .and_then(Value::as_u64)
                .map(|l| l.clamp(1, 6) as u8)
                .unwrap_or(2),
            text: text_lossy(obj.get("text")),
            lang: opt_str(obj, "lang"),
            dir: opt_str(obj, "dir"),
        },
        BlockKind::Quote => Block::Quote {
            text: text_lossy(obj.get("text")),
            source: opt_str(obj, "source"),
            context: opt_str(obj, "context"),
            lang: opt_str(obj, "lang"),
            dir: opt_str(obj, "dir"),
        },
        BlockKind::List => Block::List {
            items: string_items(obj.get("items")),
            ordered: obj
                .get("ordered")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        // Historical payloads spelled the head word `he` or `text` and the
        // definition `ru` or `en`; all of them normalize to term/definition.
        BlockKind::Term => Block::Term {
            term: first_text(obj, &["term", "he", "text"]),
            definition: first_text(obj, &["definition", "ru", "en"]),
        },
        BlockKind::Callout => Block::Callout {
            text: text_lossy(obj.get("text")),
            variant: obj
                .get("variant")
                .and_then(Value::as_str)
                .and_then(callout_variant),
            label: opt_str(obj, "label"),
        },
        BlockKind::Action => Block::Action {
            label: text_lossy(obj.get("label")),
            action_id: opt_str(obj, "action_id").or_else(|| opt_str(obj, "actionId")),
            params: obj.get("params").filter(|v| v.is_object()).cloned(),
        },
        BlockKind::Code => Block::Code {
            code: first_text(obj, &["code", "text"]),
            lang: opt_str(obj, "lang"),
        },
        BlockKind::Table => Block::Table {
            headers: obj
                .get("headers")
                .and_then(Value::as_array)
                .map(|a| a.iter().map(|v| text_lossy(Some(v))).collect()),
            rows: obj
                .get("rows")
                .and_then(Value::as_array)
                .map(|rows| rows.iter().map(|row| string_items(Some(row))).collect())
                .unwrap_or_default(),
        },
        BlockKind::Hr => Block::Hr,
        BlockKind::Image => Block::Image {
            url: text_lossy(obj.get("url")),
            alt: opt_str(obj, "alt"),
            caption: opt_str(obj, "caption"),
        },
    };

    Some(block)
}

/// Combine a block's existing content with an incoming partial update.
///
/// A kind change is a full replacement: partial-merge semantics only make
/// sense within one content kind. Pure and referentially stable under
/// repeated identical calls.
pub fn merge(previous: &Block, incoming: Block, mode: DeltaMode) -> Block {
    if previous.kind() != incoming.kind() {
        return incoming;
    }

    match (previous, incoming) {
        (
            Block::Paragraph {
                text: prev_text,
                lang,
                dir,
            },
            Block::Paragraph {
                text: next_text, ..
            },
        ) => Block::Paragraph {
            text: merge_text(prev_text, next_text, mode),
            lang: lang.clone(),
            dir: dir.clone(),
        },
        (
            Block::Quote {
                text: prev_text,
                source,
                context,
                lang,
                dir,
            },
            Block::Quote {
                text: next_text, ..
            },
        ) => Block::Quote {
            text: merge_text(prev_text, next_text, mode),
            source: source.clone(),
            context: context.clone(),
            lang: lang.clone(),
            dir: dir.clone(),
        },
        (
            Block::List {
                items: prev_items,
                ordered,
            },
            Block::List {
                items: next_items, ..
            },
        ) => Block::List {
            items: match mode {
                DeltaMode::Replace => next_items,
                DeltaMode::Append => prev_items.iter().cloned().chain(next_items).collect(),
            },
            // items are the streamed payload; list shape stays as started
            ordered: *ordered,
        },
        // All remaining kinds: field-level last-write-wins shallow merge.
        (prev, next) => shallow_merge(prev, next),
    }
}

/// Text merge with the empty-delta guard: an empty incoming value against
/// existing non-empty text preserves the existing text. Transient empty
/// deltas are noise from the producer, not intent.
fn merge_text(prev: &str, next: String, mode: DeltaMode) -> String {
    if next.is_empty() && !prev.is_empty() {
        return prev.to_string();
    }
    match mode {
        DeltaMode::Replace => next,
        DeltaMode::Append => format!("{prev}{next}"),
    }
}

/// Overlay the incoming block's present fields onto the previous block.
/// Optional fields absent from the incoming payload are retained from the
/// previous one.
fn shallow_merge(previous: &Block, incoming: Block) -> Block {
    let base = serde_json::to_value(previous);
    let over = serde_json::to_value(&incoming);
    let (Ok(Value::Object(mut base)), Ok(Value::Object(over))) = (base, over) else {
        return incoming;
    };
    for (key, value) in over {
        if !value.is_null() {
            base.insert(key, value);
        }
    }
    sanitize(&Value::Object(base)).unwrap_or(incoming)
}

fn opt_str(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Soft string coercion: strings pass through, scalars render via display,
/// structured values fall back to their compact JSON form, null is empty.
fn text_lossy(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|v| !v.is_null())
        .map(|v| text_lossy(Some(v)))
        .unwrap_or_default()
}

fn string_items(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().map(|v| text_lossy(Some(v))).collect())
        .unwrap_or_default()
}

fn callout_variant(tag: &str) -> Option<CalloutVariant> {
    let variant = match tag {
        "info" => CalloutVariant::Info,
        "warn" => CalloutVariant::Warn,
        "success" => CalloutVariant::Success,
        "danger" => CalloutVariant::Danger,
        _ => return None,
    };
    Some(variant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn sanitize_rejects_non_objects_and_unknown_kinds() {
        assert_eq!(sanitize(&json!("just a string")), None);
        assert_eq!(sanitize(&json!(42)), None);
        assert_eq!(sanitize(&json!(null)), None);
        assert_eq!(sanitize(&json!({ "text": "no tag" })), None);
        assert_eq!(sanitize(&json!({ "type": "marquee", "text": "nope" })), None);
    }

    #[test]
    fn sanitize_drops_unrecognized_fields() {
        let block = sanitize(&json!({
            "type": "paragraph",
            "text": "hello",
            "onclick": "alert(1)",
            "__proto__": { "polluted": true }
        }))
        .unwrap();

        let round = serde_json::to_value(&block).unwrap();
        assert_eq!(round, json!({ "type": "paragraph", "text": "hello" }));
    }

    #[test]
    fn sanitize_coerces_non_string_text() {
        let block = sanitize(&json!({ "type": "paragraph", "text": 42 })).unwrap();
        assert_eq!(block.text(), Some("42"));

        let block = sanitize(&json!({ "type": "quote", "text": null })).unwrap();
        assert_eq!(block.text(), Some(""));
    }

    #[test]
    fn sanitize_coerces_bad_list_items() {
        let block = sanitize(&json!({ "type": "list", "items": "not-an-array" })).unwrap();
        assert_eq!(
            block,
            Block::List {
                items: vec![],
                ordered: false
            }
        );

        let block = sanitize(&json!({ "type": "list", "items": ["a", 2], "ordered": true }))
            .unwrap();
        assert_eq!(
            block,
            Block::List {
                items: vec!["a".into(), "2".into()],
                ordered: true
            }
        );
    }

    #[test]
    fn sanitize_clamps_heading_level() {
        let block = sanitize(&json!({ "type": "heading", "level": 9, "text": "t" })).unwrap();
        assert!(matches!(block, Block::Heading { level: 6, .. }));

        let block = sanitize(&json!({ "type": "heading", "text": "t" })).unwrap();
        assert!(matches!(block, Block::Heading { level: 2, .. }));
    }

    #[test]
    fn sanitize_accepts_legacy_term_spellings() {
        let block = sanitize(&json!({ "type": "term", "he": "שבת", "ru": "день покоя" })).unwrap();
        assert_eq!(
            block,
            Block::Term {
                term: "שבת".into(),
                definition: "день покоя".into()
            }
        );
    }

    #[test]
    fn merge_kind_change_is_full_replacement() {
        let prev = Block::paragraph("old");
        let next = Block::Code {
            code: "let x = 1;".into(),
            lang: Some("rust".into()),
        };
        assert_eq!(merge(&prev, next.clone(), DeltaMode::Append), next);
    }

    #[test]
    fn merge_append_concatenates_text() {
        let prev = Block::paragraph("Hello");
        let next = Block::paragraph(" world");
        assert_eq!(
            merge(&prev, next, DeltaMode::Append).text(),
            Some("Hello world")
        );
    }

    #[test]
    fn merge_replace_sets_text() {
        let prev = Block::paragraph("draft");
        let next = Block::paragraph("final");
        assert_eq!(merge(&prev, next, DeltaMode::Replace).text(), Some("final"));
    }

    #[test]
    fn merge_empty_delta_preserves_existing_text() {
        let prev = Block::paragraph("kept");
        let next = Block::paragraph("");
        assert_eq!(merge(&prev, next, DeltaMode::Replace).text(), Some("kept"));

        let prev = Block::paragraph("kept");
        let next = Block::paragraph("");
        assert_eq!(merge(&prev, next, DeltaMode::Append).text(), Some("kept"));
    }

    #[test]
    fn merge_is_referentially_stable() {
        let prev = Block::paragraph("a");
        let next = Block::paragraph("b");
        let once = merge(&prev, next.clone(), DeltaMode::Replace);
        let twice = merge(&prev, next, DeltaMode::Replace);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_list_modes() {
        let prev = Block::List {
            items: vec!["one".into()],
            ordered: true,
        };
        let next = Block::List {
            items: vec!["two".into()],
            ordered: false,
        };

        let appended = merge(&prev, next.clone(), DeltaMode::Append);
        assert_eq!(
            appended,
            Block::List {
                items: vec!["one".into(), "two".into()],
                // shape from the start event wins
                ordered: true
            }
        );

        let replaced = merge(&prev, next, DeltaMode::Replace);
        assert_eq!(
            replaced,
            Block::List {
                items: vec!["two".into()],
                ordered: true
            }
        );
    }

    #[test]
    fn merge_shallow_for_other_kinds() {
        let prev = Block::Image {
            url: "https://example.org/a.png".into(),
            alt: Some("first".into()),
            caption: None,
        };
        let next = Block::Image {
            url: "https://example.org/b.png".into(),
            alt: None,
            caption: Some("added".into()),
        };
        assert_eq!(
            merge(&prev, next, DeltaMode::Replace),
            Block::Image {
                url: "https://example.org/b.png".into(),
                alt: Some("first".into()),
                caption: Some("added".into()),
            }
        );
    }

    #[test]
    fn canonical_serde_shape_round_trips_through_sanitize() {
        let block = Block::Quote {
            text: "as it is written".into(),
            source: Some("Bereshit 1:1".into()),
            context: None,
            lang: Some("en".into()),
            dir: Some("ltr".into()),
        };
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(sanitize(&value), Some(block));
    }
}
