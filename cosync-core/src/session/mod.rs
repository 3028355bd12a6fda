//! Session control: connect parameters, lifecycle, and the consumer loop.

mod controller;
mod phase;
pub mod transport;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

pub use controller::{Finished, SyncSession};
pub use phase::SessionPhase;

use crate::error::SyncError;
use crate::frame::Frame;
use crate::message::Operation;

pub const DEFAULT_RELAY_PORT: u16 = 8189;
pub const DEFAULT_PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REVALIDATION_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_SEND_PACING: Duration = Duration::from_millis(50);

// ── SessionConfig ────────────────────────────────────────────────

/// Everything needed to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Identity announced to the relay and used for echo suppression.
    pub identity: String,
    pub relay_host: String,
    pub relay_port: u16,
    pub use_tls: bool,
    /// PEM bundle to trust instead of the web PKI roots.
    pub certificate: Option<PathBuf>,
    /// Catalog database host, carried in the announcement.
    pub catalog_host: String,
    pub database: String,
    pub protocol_version: u32,
    pub connect_timeout: Duration,
    pub validation_timeout: Duration,
    pub revalidation_interval: Duration,
    pub send_pacing: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity: String::new(),
            relay_host: "127.0.0.1".into(),
            relay_port: DEFAULT_RELAY_PORT,
            use_tls: true,
            certificate: None,
            catalog_host: "localhost".into(),
            database: "catalog".into(),
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
            revalidation_interval: DEFAULT_REVALIDATION_INTERVAL,
            send_pacing: DEFAULT_SEND_PACING,
        }
    }
}

// ── Events ───────────────────────────────────────────────────────

/// Everything the consumer loop reacts to, in arrival order.
#[derive(Debug)]
pub enum SessionEvent {
    /// All frames decoded from one socket read.
    Frames(Vec<Frame>),
    /// The socket failed or reached end of stream.
    ConnectionLost { reason: String, expected: bool },
    /// A request from a [`SessionHandle`].
    Command(LocalCommand),
}

/// Work submitted by the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalCommand {
    Chat(String),
    /// A catalog change made locally, to be mirrored and broadcast.
    Submit(Operation),
    /// Log the current presence set.
    Who,
    Disconnect,
}

// ── SessionHandle ────────────────────────────────────────────────

/// Cloneable handle for talking to a running [`SyncSession`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    loss_expected: Arc<AtomicBool>,
    phase: watch::Receiver<SessionPhase>,
}

impl SessionHandle {
    pub(crate) fn new(
        events: mpsc::UnboundedSender<SessionEvent>,
        loss_expected: Arc<AtomicBool>,
        phase: watch::Receiver<SessionPhase>,
    ) -> Self {
        Self {
            events,
            loss_expected,
            phase,
        }
    }

    fn command(&self, command: LocalCommand) -> Result<(), SyncError> {
        self.events.send(SessionEvent::Command(command))?;
        Ok(())
    }

    /// Send a chat line to everyone on the relay.
    pub fn chat(&self, text: impl Into<String>) -> Result<(), SyncError> {
        self.command(LocalCommand::Chat(text.into()))
    }

    /// Apply `op` to the local replica and broadcast it.
    pub fn submit(&self, op: Operation) -> Result<(), SyncError> {
        self.command(LocalCommand::Submit(op))
    }

    /// Ask the session to log who is currently on the relay.
    pub fn who(&self) -> Result<(), SyncError> {
        self.command(LocalCommand::Who)
    }

    /// Close the session. The resulting connection loss is not reported
    /// as an error.
    pub fn disconnect(&self) -> Result<(), SyncError> {
        self.loss_expected.store(true, Ordering::SeqCst);
        self.command(LocalCommand::Disconnect)
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// A receiver that observes every phase change.
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.clone()
    }

    /// Wait until the session reaches `Closed`.
    pub async fn closed(&self) {
        let mut rx = self.phase.clone();
        let _ = rx.wait_for(SessionPhase::is_closed).await;
    }
}
