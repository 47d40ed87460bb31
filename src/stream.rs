//! Session driver and coalesced document snapshots.
//!
//! [`DocAssembler`] is the single owner of the live [`StreamSession`];
//! consumers hold a [`DocumentWatch`] and only ever see immutable
//! [`Document`] values. Handlers are wired explicitly through the channel
//! pair, so two concurrent chat panes get two isolated sessions.
//!
//! The watch channel is the backpressure story: it keeps only the latest
//! session value, so a burst of reductions between two reads collapses into
//! a single materialization reflecting the freshest state. The reducer
//! itself never blocks or drops events; only the projection is throttled.

use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::document::Document;
use crate::error::Result;
use crate::event::BlockEvent;
use crate::session::StreamSession;

/// Owns the live session for one streaming message/turn and publishes every
/// reduction to the paired [`DocumentWatch`].
#[derive(Debug)]
pub struct DocAssembler {
    session: StreamSession,
    tx: watch::Sender<StreamSession>,
}

/// Read side: coalesced, immutable document snapshots.
#[derive(Debug, Clone)]
pub struct DocumentWatch {
    rx: watch::Receiver<StreamSession>,
}

impl DocAssembler {
    /// Create an assembler and its paired watch.
    pub fn channel() -> (DocAssembler, DocumentWatch) {
        let session = StreamSession::new();
        let (tx, rx) = watch::channel(session.clone());
        (DocAssembler { session, tx }, DocumentWatch { rx })
    }

    /// Fold one event into the session and publish the result.
    pub fn apply(&mut self, event: &BlockEvent) {
        self.session = self.session.apply(event);
        self.publish();
    }

    /// Decode and fold a raw transport frame. Frame-level garbage is the one
    /// failure worth returning to the transport layer; block-level garbage
    /// inside a valid frame is absorbed by the reducer.
    pub fn apply_frame(&mut self, frame: &Value) -> Result<()> {
        let event = BlockEvent::from_value(frame)?;
        self.apply(&event);
        Ok(())
    }

    /// Transport end-of-stream signal.
    pub fn complete(&mut self) {
        self.session = self.session.completed();
        self.publish();
    }

    /// Start a new message/turn: the previous session is discarded
    /// atomically, nothing carries over.
    pub fn reset(&mut self) {
        self.session = StreamSession::new();
        self.publish();
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    /// Materialize the current session directly, bypassing the watch.
    pub fn document(&self) -> Document {
        self.session.materialize()
    }

    fn publish(&self) {
        // no receivers left is fine; assembly does not depend on observers
        let _ = self.tx.send(self.session.clone());
    }
}

impl DocumentWatch {
    /// Materialize the latest published session.
    pub fn current(&self) -> Document {
        self.rx.borrow().materialize()
    }

    pub fn is_complete(&self) -> bool {
        self.rx.borrow().is_complete()
    }

    pub fn all_finalized(&self) -> bool {
        self.rx.borrow().all_finalized()
    }

    /// Wait for the next change and materialize once from the freshest
    /// state. Intermediate sessions published since the last call are
    /// skipped, not queued. Returns `None` once the assembler is gone.
    pub async fn next_snapshot(&mut self) -> Option<Document> {
        self.rx.changed().await.ok()?;
        let doc = self.rx.borrow_and_update().materialize();
        Some(doc)
    }

    /// Adapt the watch into a `Stream` of documents for embedders that
    /// compose with stream combinators. Same coalescing semantics as
    /// [`next_snapshot`](Self::next_snapshot).
    pub fn into_stream(self) -> impl Stream<Item = Document> {
        WatchStream::from_changes(self.rx).map(|session| session.materialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::DeltaMode;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio_test::assert_ok;

    fn start_text(position: u64, text: &str) -> BlockEvent {
        BlockEvent::start(position).with_block(json!({ "type": "paragraph", "text": text }))
    }

    #[tokio::test]
    async fn burst_coalesces_to_latest_snapshot() {
        let (mut assembler, mut watch) = DocAssembler::channel();

        assembler.apply(&start_text(0, "a"));
        for i in 0..100 {
            assembler.apply(
                &BlockEvent::delta(0)
                    .with_block(json!({ "type": "paragraph", "text": format!("step {i}") })),
            );
        }

        // one wakeup, one materialization, freshest state
        let doc = watch.next_snapshot().await.unwrap();
        assert_eq!(doc.blocks[0].text(), Some("step 99"));

        // nothing queued behind it
        assert!(!watch.rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn snapshot_reflects_position_order() {
        let (mut assembler, mut watch) = DocAssembler::channel();
        assembler.apply(&start_text(4, "later"));
        assembler.apply(&start_text(1, "earlier"));

        let doc = watch.next_snapshot().await.unwrap();
        let texts: Vec<_> = doc.blocks.iter().filter_map(|b| b.text()).collect();
        assert_eq!(texts, vec!["earlier", "later"]);
    }

    #[tokio::test]
    async fn reset_discards_previous_session() {
        let (mut assembler, watch) = DocAssembler::channel();
        assembler.apply(&start_text(0, "old turn"));
        assembler.apply(&BlockEvent::end(0));
        assembler.complete();

        assembler.reset();
        assert_eq!(watch.current(), Document::empty());
        assert!(!watch.is_complete());
        assert!(watch.all_finalized());

        // prior finalization must not leak into the new turn
        assembler.apply(&start_text(0, "new turn"));
        assert_eq!(
            assembler.document().blocks[0].text(),
            Some("new turn")
        );
        assert!(!assembler.session().all_finalized());
    }

    #[tokio::test]
    async fn next_snapshot_ends_when_assembler_drops() {
        let (assembler, mut watch) = DocAssembler::channel();
        drop(assembler);
        assert_eq!(watch.next_snapshot().await, None);
    }

    #[tokio::test]
    async fn apply_frame_rejects_broken_frames_only() {
        let (mut assembler, _watch) = DocAssembler::channel();

        assert!(assembler.apply_frame(&json!({ "kind": "bogus" })).is_err());

        // valid frame, garbage block: absorbed, session untouched
        assert_ok!(assembler.apply_frame(&json!({
            "kind": "delta",
            "position": 9,
            "block": { "type": "paragraph", "text": "ghost" }
        })));
        assert!(assembler.session().is_empty());
    }

    #[tokio::test]
    async fn stream_adapter_yields_documents() {
        let (mut assembler, watch) = DocAssembler::channel();
        let mut stream = Box::pin(watch.into_stream());

        assembler.apply(&start_text(0, "Hello"));
        assembler.apply(
            &BlockEvent::delta(0)
                .with_block(json!({ "type": "paragraph", "text": " world" }))
                .with_mode(DeltaMode::Append),
        );

        let doc = stream.next().await.unwrap();
        assert_eq!(doc.blocks[0].text(), Some("Hello world"));
    }
}
