//! Block events as delivered by the streaming transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::DeltaMode;
use crate::error::{AssemblyError, Result};

/// Lifecycle stage of a block event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    Delta,
    End,
}

/// One block-level event keyed by position.
///
/// The embedded `block` payload stays an untyped [`Value`] here: it is
/// untrusted and only becomes a [`Block`](crate::Block) after passing the
/// sanitizer inside the reducer. The frame itself, by contrast, must be
/// structurally valid, which is why [`BlockEvent::from_value`] returns a
/// `Result` rather than quietly dropping garbage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEvent {
    pub kind: EventKind,
    pub position: u64,
    /// Block type tag for `start` events that carry no payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<Value>,
    /// Producer-assigned identity hint, honored only on the first `start`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_mode: Option<DeltaMode>,
}

impl BlockEvent {
    pub fn start(position: u64) -> Self {
        Self::new(EventKind::Start, position)
    }

    pub fn delta(position: u64) -> Self {
        Self::new(EventKind::Delta, position)
    }

    pub fn end(position: u64) -> Self {
        Self::new(EventKind::End, position)
    }

    fn new(kind: EventKind, position: u64) -> Self {
        BlockEvent {
            kind,
            position,
            kind_tag: None,
            block: None,
            stable_id: None,
            delta_mode: None,
        }
    }

    pub fn with_kind_tag(mut self, tag: impl Into<String>) -> Self {
        self.kind_tag = Some(tag.into());
        self
    }

    pub fn with_block(mut self, block: Value) -> Self {
        self.block = Some(block);
        self
    }

    pub fn with_stable_id(mut self, id: impl Into<String>) -> Self {
        self.stable_id = Some(id.into());
        self
    }

    pub fn with_mode(mut self, mode: DeltaMode) -> Self {
        self.delta_mode = Some(mode);
        self
    }

    /// Decode a frame that has already been parsed into JSON.
    pub fn from_value(frame: &Value) -> Result<Self> {
        serde_json::from_value(frame.clone())
            .map_err(|cause| AssemblyError::FrameDecode { cause })
    }

    /// Decode a raw text frame.
    pub fn from_json_str(frame: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(frame).map_err(|cause| AssemblyError::FrameParse { cause })?;
        Self::from_value(&value)
    }
}
