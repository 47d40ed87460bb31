//! The block event reducer: one state record per position, folded from
//! `{start, delta, end}` events into an ordered, render-ready document.
//!
//! The session is a value, not a shared structure: every event produces a
//! new [`StreamSession`], so a snapshot handed to a renderer can never be
//! invalidated mid-read.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::block::{self, Block, BlockKind, DeltaMode};
use crate::document::Document;
use crate::event::{BlockEvent, EventKind};

/// Mutable record tracked per position while streaming.
///
/// Lifecycle: created on the first `start` for a position, mutated by
/// `delta` events while open, then finalized exactly once. Finalization is
/// terminal: no field changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockState {
    /// The unique key and the only total order over blocks.
    pub position: u64,
    /// Assigned once per position; preserved across repeated `start` events
    /// so downstream references keyed by id survive retransmission.
    pub stable_id: String,
    pub kind: BlockKind,
    pub block: Block,
    pub finalized: bool,
}

/// All per-position state for one message/turn, plus the session-level
/// completion flag set by the transport's end-of-stream signal.
///
/// Keyed by a `BTreeMap` so that iteration order *is* the render order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSession {
    states: BTreeMap<u64, BlockState>,
    complete: bool,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the session, returning the updated session.
    /// `self` is never mutated.
    ///
    /// Protocol violations (a delta for a position that was never started,
    /// any event for a finalized position) are absorbed as no-ops rather
    /// than surfaced: dropping one stray event must not corrupt the whole
    /// document.
    pub fn apply(&self, event: &BlockEvent) -> StreamSession {
        match event.kind {
            EventKind::Start => self.apply_start(event),
            EventKind::Delta => self.apply_delta(event),
            EventKind::End => self.apply_end(event),
        }
    }

    fn apply_start(&self, event: &BlockEvent) -> StreamSession {
        let current = self.states.get(&event.position);
        if current.is_some_and(|state| state.finalized) {
            tracing::debug!(position = event.position, "start for finalized position dropped");
            return self.clone();
        }

        let block = match &event.block {
            Some(raw) => match block::sanitize(raw) {
                Some(block) => block,
                None => {
                    tracing::debug!(position = event.position, "start with invalid block dropped");
                    return self.clone();
                }
            },
            // No payload: open an empty block of the tagged kind. A start
            // with an unrecognized tag is dropped like any invalid block.
            None => match &event.kind_tag {
                Some(tag) => match BlockKind::from_tag(tag) {
                    Some(kind) => Block::empty_of(kind),
                    None => {
                        tracing::debug!(
                            position = event.position,
                            %tag,
                            "start with unrecognized kind tag dropped"
                        );
                        return self.clone();
                    }
                },
                None => Block::empty_of(BlockKind::Paragraph),
            },
        };

        // Identity survives retransmitted starts: the id assigned on the
        // first start wins over any later hint.
        let stable_id = current
            .map(|state| state.stable_id.clone())
            .or_else(|| event.stable_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut states = self.states.clone();
        states.insert(
            event.position,
            BlockState {
                position: event.position,
                stable_id,
                kind: block.kind(),
                block,
                finalized: false,
            },
        );
        StreamSession {
            states,
            complete: self.complete,
        }
    }

    fn apply_delta(&self, event: &BlockEvent) -> StreamSession {
        let Some(current) = self.states.get(&event.position) else {
            tracing::debug!(position = event.position, "delta for unknown position dropped");
            return self.clone();
        };
        if current.finalized {
            tracing::debug!(position = event.position, "delta for finalized position dropped");
            return self.clone();
        }

        // A delta without a sanitizable payload carries nothing to merge;
        // prior content stays untouched rather than being blanked.
        let incoming = match &event.block {
            Some(raw) => match block::sanitize(raw) {
                Some(block) => block,
                None => {
                    tracing::debug!(position = event.position, "delta with invalid block dropped");
                    return self.clone();
                }
            },
            None => return self.clone(),
        };

        let mode = event.delta_mode.unwrap_or(DeltaMode::Replace);
        let merged = block::merge(&current.block, incoming, mode);

        let mut states = self.states.clone();
        states.insert(
            event.position,
            BlockState {
                position: current.position,
                stable_id: current.stable_id.clone(),
                // a kind change through merge is a full replacement
                kind: merged.kind(),
                block: merged,
                finalized: false,
            },
        );
        StreamSession {
            states,
            complete: self.complete,
        }
    }

    fn apply_end(&self, event: &BlockEvent) -> StreamSession {
        let Some(current) = self.states.get(&event.position) else {
            tracing::debug!(position = event.position, "end for unknown position dropped");
            return self.clone();
        };
        if current.finalized {
            return self.clone();
        }

        let mut states = self.states.clone();
        states.insert(
            event.position,
            BlockState {
                finalized: true,
                ..current.clone()
            },
        );
        StreamSession {
            states,
            complete: self.complete,
        }
    }

    /// Mark the whole stream complete. This is the transport's end-of-stream
    /// signal and is independent of individual block finalization.
    pub fn completed(&self) -> StreamSession {
        StreamSession {
            states: self.states.clone(),
            complete: true,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// True when every tracked block has been finalized. A session with zero
    /// positions is trivially finalized: an empty document is not an
    /// unfinished one.
    pub fn all_finalized(&self) -> bool {
        self.states.values().all(|state| state.finalized)
    }

    pub fn finalized_count(&self) -> usize {
        self.states.values().filter(|state| state.finalized).count()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, position: u64) -> Option<&BlockState> {
        self.states.get(&position)
    }

    /// Project the session into a render-ready [`Document`]: entries in
    /// ascending position order, blocks cloned out. Arrival order plays no
    /// part here.
    pub fn materialize(&self) -> Document {
        Document::from_blocks(self.states.values().map(|state| state.block.clone()).collect())
    }
}
