//! # cosync-core
//!
//! Client core for keeping a local catalog replica in sync through a
//! shared text relay.
//!
//! This crate contains:
//! - **Framing**: `Frame` and `FrameCodec` for the `|||`-delimited wire stream
//! - **Reader**: `FrameReader`, the task that turns socket reads into frame batches
//! - **Messages**: `MessageCode`, `Message`, `Operation` and the frame parser
//! - **Paths**: `NodeKind`, `NodeList` and the grammar that types node lists
//! - **Catalog**: the `CatalogStore` seam and the in-memory `ReplicaTree`
//! - **Replicator**: applies remote operations with self-echo suppression
//! - **Presence**: `PresenceTracker` and the aggregate security flag
//! - **Session**: `SyncSession`, `SessionHandle` and the `SessionPhase` machine
//! - **Outbound**: the paced, lock-guarded writer and its outbox task
//! - **Sink**: the `PresentationSink` seam with tracing and recording sinks
//! - **Error**: `SyncError`, a `thiserror`-based error enum

pub mod catalog;
pub mod error;
pub mod frame;
pub mod message;
pub mod outbound;
pub mod path;
pub mod presence;
pub mod reader;
pub mod replicator;
pub mod session;
pub mod sink;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use catalog::{AnnotationKind, CatalogStore, NewNode, NodeInfo, NodeRef, ReplicaTree};
pub use error::SyncError;
pub use frame::{FRAME_DELIMITER, Frame, FrameCodec, MAX_FRAME_SIZE};
pub use message::{Message, MessageCode, Operation};
pub use path::{NodeKind, NodeList, NoteParent, TypedPath};
pub use presence::PresenceTracker;
pub use reader::{FrameReader, READ_CHUNK_SIZE};
pub use replicator::{ApplyOutcome, Replicator};
pub use session::{
    Finished, LocalCommand, SessionConfig, SessionEvent, SessionHandle, SessionPhase, SyncSession,
};
pub use sink::{PresentationSink, RecordingSink, SinkEvent, TracingSink};
