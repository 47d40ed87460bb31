//! Masoret - incremental document assembly for streamed study responses
//!
//! This crate turns a stream of partial, possibly out-of-order, possibly
//! retried block-level events from a generation backend into a single,
//! render-ready, ordered [`Document`], and normalizes a closed set of
//! legacy, fully-formed payload shapes from non-streaming endpoints into
//! that same canonical model.
//!
//! Two paths, one output type:
//! - streaming: transport frames -> [`BlockEvent`] -> [`StreamSession`]
//!   reducer -> coalesced [`Document`] snapshots via [`DocAssembler`] /
//!   [`DocumentWatch`];
//! - history fetch: raw payload -> [`coerce`] -> [`Document`].
//!
//! The renderer on the other side is indifferent to which path a document
//! arrived by; that uniformity is the point.

pub mod block;
pub mod coerce;
pub mod document;
pub mod error;
pub mod event;
pub mod session;
pub mod stream;

pub use block::{Block, BlockKind, CalloutVariant, DeltaMode, merge, sanitize};
pub use coerce::{MAX_PAYLOAD_BYTES, coerce, coerce_or_text, coerce_str};
pub use document::{DOC_VERSION, Document};
pub use error::{AssemblyError, Result};
pub use event::{BlockEvent, EventKind};
pub use session::{BlockState, StreamSession};
pub use stream::{DocAssembler, DocumentWatch};
