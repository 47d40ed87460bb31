//! The canonical, ordered, versioned container consumed by rendering.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::Block;

/// Version string stamped on documents assembled by this crate.
pub const DOC_VERSION: &str = "1.0";

/// A render-ready document. Block order is the only order that may ever be
/// rendered: it is produced sorted by position, never by arrival time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: String,
    pub blocks: Vec<Block>,
    /// Opaque operation records carried through from legacy payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ops: Option<Vec<Value>>,
}

impl Document {
    /// An empty but valid document.
    pub fn empty() -> Self {
        Self::from_blocks(Vec::new())
    }

    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Document {
            version: DOC_VERSION.to_string(),
            blocks,
            ops: None,
        }
    }

    /// Wrap plain prose as a single-paragraph document. This is the fallback
    /// policy for payloads that fail coercion: the most common producer
    /// output must never be treated as an error.
    pub fn plain_text(text: impl Into<String>) -> Self {
        Self::from_blocks(vec![Block::paragraph(text)])
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::empty()
    }
}
