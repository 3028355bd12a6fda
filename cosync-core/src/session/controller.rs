//! The consumer loop that owns the replica, presence set and sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::transport::{self, RelayStream};
use super::{LocalCommand, SessionConfig, SessionEvent, SessionHandle, SessionPhase};
use crate::catalog::{CatalogStore, StoreNotice};
use crate::error::SyncError;
use crate::frame::Frame;
use crate::message::{self, Announcement, Message};
use crate::outbound::{Outbound, OutboxItem, spawn_outbox};
use crate::presence::PresenceTracker;
use crate::reader::FrameReader;
use crate::replicator::{ApplyOutcome, Replicator};
use crate::sink::PresentationSink;

const OUTBOX_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

// ── ValidationTimer ──────────────────────────────────────────────

/// Deadline for the relay's validation frame. Expiry only warns and
/// re-arms with the longer interval.
#[derive(Debug)]
struct ValidationTimer {
    deadline: Option<Instant>,
    interval: Duration,
}

impl ValidationTimer {
    fn armed(initial: Duration, interval: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + initial),
            interval,
        }
    }

    fn rearm(&mut self) {
        self.deadline = Some(Instant::now() + self.interval);
    }

    fn cancel(&mut self) {
        self.deadline = None;
    }

    async fn expired(deadline: Option<Instant>) {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}

// ── SyncSession ──────────────────────────────────────────────────

/// What a session hands back once it has closed.
#[derive(Debug)]
pub struct Finished<S, P> {
    pub store: S,
    pub sink: P,
    pub reason: String,
    /// `true` when the close was requested locally.
    pub expected: bool,
}

/// One connection to the relay and the state it drives.
pub struct SyncSession<S, P> {
    config: SessionConfig,
    phase: SessionPhase,
    phase_tx: watch::Sender<SessionPhase>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    loss_expected: Arc<AtomicBool>,
    reader: FrameReader,
    outbox: mpsc::UnboundedSender<OutboxItem>,
    outbox_task: Option<JoinHandle<()>>,
    validation: ValidationTimer,
    replicator: Replicator,
    presence: PresenceTracker,
    store: S,
    sink: P,
}

impl<S, P> SyncSession<S, P>
where
    S: CatalogStore + Send,
    P: PresentationSink,
{
    /// Connect to the relay named in `config` and announce this client.
    pub async fn connect(config: SessionConfig, store: S, sink: P) -> Result<Self, SyncError> {
        let connected = transport::connect(&config).await?;
        let mut session = Self::from_stream(connected.stream, connected.secure, config, store, sink)?;
        if let Some(fallback) = connected.fallback {
            session.sink.show_warning(&fallback);
        }
        Ok(session)
    }

    /// Start a session over an already established stream.
    ///
    /// Spawns the reader and outbox tasks, queues the announcement, seeds
    /// the presence set and arms the validation timer.
    pub fn from_stream<T>(
        stream: T,
        secure: bool,
        config: SessionConfig,
        store: S,
        mut sink: P,
    ) -> Result<Self, SyncError>
    where
        T: RelayStream + 'static,
    {
        let mut phase = SessionPhase::Connecting;
        let (phase_tx, _) = watch::channel(phase);
        let (events_tx, events) = mpsc::unbounded_channel();
        let loss_expected = Arc::new(AtomicBool::new(false));

        let (read_half, write_half) = tokio::io::split(stream);
        let reader = FrameReader::spawn(read_half, events_tx.clone(), loss_expected.clone());
        let outbound = Arc::new(Outbound::new(
            write_half,
            config.send_pacing,
            events_tx.clone(),
            loss_expected.clone(),
        ));
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        let outbox_task = spawn_outbox(outbound, outbox_rx);

        phase.connected()?;
        phase_tx.send_replace(phase);

        let announcement = Message::Announce(Announcement {
            identity: config.identity.clone(),
            host: config.catalog_host.clone(),
            database: config.database.clone(),
            secure,
            protocol_version: config.protocol_version,
        });
        outbox.send(OutboxItem::Frame(announcement.encode(&config.identity)))?;

        let mut presence = PresenceTracker::new();
        presence.seed_local(&config.identity, secure);
        sink.update_security_indicator(presence.security_aggregate());

        info!(identity = %config.identity, secure, "announced to relay, awaiting validation");

        Ok(Self {
            validation: ValidationTimer::armed(
                config.validation_timeout,
                config.revalidation_interval,
            ),
            replicator: Replicator::new(config.identity.clone()),
            config,
            phase,
            phase_tx,
            events_tx,
            events,
            loss_expected,
            reader,
            outbox,
            outbox_task: Some(outbox_task),
            presence,
            store,
            sink,
        })
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(
            self.events_tx.clone(),
            self.loss_expected.clone(),
            self.phase_tx.subscribe(),
        )
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Process events until the connection closes.
    pub async fn run(mut self) -> Finished<S, P> {
        loop {
            let deadline = self.validation.deadline;
            let event = tokio::select! {
                event = self.events.recv() => event,
                _ = ValidationTimer::expired(deadline) => {
                    self.on_validation_timeout();
                    continue;
                }
            };

            match event {
                Some(SessionEvent::Frames(batch)) => {
                    for frame in &batch {
                        self.dispatch(frame);
                    }
                }
                Some(SessionEvent::Command(LocalCommand::Disconnect)) => {
                    self.loss_expected.store(true, Ordering::SeqCst);
                    return self.close("disconnect requested".into(), true).await;
                }
                Some(SessionEvent::Command(command)) => self.on_command(command),
                Some(SessionEvent::ConnectionLost { reason, expected }) => {
                    return self.close(reason, expected).await;
                }
                None => return self.close("event channel closed".into(), false).await,
            }
        }
    }

    // ── Inbound ──────────────────────────────────────────────────

    fn dispatch(&mut self, frame: &Frame) {
        match message::parse(frame) {
            Ok(msg) => self.on_message(msg, frame.sender()),
            Err(SyncError::UnknownCode(code)) => {
                debug!(%code, "unprocessed frame");
                self.sink.report_unprocessed(frame.raw());
            }
            Err(e) => warn!(frame = %frame, error = %e, "dropping malformed frame"),
        }
    }

    fn on_message(&mut self, msg: Message, sender: &str) {
        match msg {
            Message::Announce(a) => {
                if self.presence.join(&a.identity, a.secure) {
                    self.presence_changed(format!("{} joined", a.identity));
                }
            }
            Message::Join(p) => {
                if self.presence.join(&p.identity, p.secure) {
                    self.presence_changed(format!("{} joined", p.identity));
                }
            }
            Message::RenameUser { old, presence } => {
                if self.presence.rename(&old, &presence.identity, presence.secure) {
                    self.presence_changed(format!("{old} is now {}", presence.identity));
                }
            }
            Message::Leave { identity } => {
                if self.presence.leave(&identity) {
                    self.presence_changed(format!("{identity} left"));
                }
            }
            Message::Chat { text } => {
                if sender == self.config.identity {
                    return;
                }
                self.sink.set_visible(true);
                self.sink.append_log(&format!("{sender}: {text}"));
                self.sink.play_notification_sound();
            }
            Message::Validated => match self.phase.validate() {
                Ok(()) => {
                    self.validation.cancel();
                    self.publish_phase();
                    info!("relay validated this client");
                }
                Err(e) => debug!(error = %e, "ignoring validation frame"),
            },
            Message::Notice { text } => self.sink.append_log(&text),
            Message::Structural(op) => {
                match self.replicator.apply(&op, sender, &mut self.store) {
                    ApplyOutcome::Applied => debug!(code = %op.code(), path = %op.path(), "applied"),
                    ApplyOutcome::Suppressed | ApplyOutcome::Dropped(_) => {}
                }
                self.forward_notices();
            }
        }
    }

    fn presence_changed(&mut self, line: String) {
        debug!(members = self.presence.len(), "{line}");
        self.sink.append_log(&line);
        self.sink
            .update_security_indicator(self.presence.security_aggregate());
    }

    /// Surface the store's reload and refresh requests so none pile up.
    fn forward_notices(&mut self) {
        for notice in self.store.take_notices() {
            match notice {
                StoreNotice::Reload(path) => {
                    self.sink.append_log(&format!("{path} changed; reloading"));
                }
                StoreNotice::Refresh(kind) => debug!(?kind, "annotation lists refreshed"),
            }
        }
    }

    fn who_line(&self) -> String {
        let members: Vec<String> = self
            .presence
            .identities()
            .map(|id| match self.presence.is_secure(id) {
                Some(true) => id.to_string(),
                _ => format!("{id} (unencrypted)"),
            })
            .collect();
        format!("online: {}", members.join(", "))
    }

    fn on_validation_timeout(&mut self) {
        warn!(phase = %self.phase, "relay has not validated this client");
        self.sink.show_warning(
            "the relay has not validated this client; changes may not reach other users",
        );
        self.validation.rearm();
    }

    // ── Local commands ───────────────────────────────────────────

    fn on_command(&mut self, command: LocalCommand) {
        let text = match command {
            LocalCommand::Chat(text) => {
                let identity = &self.config.identity;
                self.sink.append_log(&format!("{identity}: {text}"));
                Message::Chat { text }
            }
            LocalCommand::Submit(op) => {
                if let ApplyOutcome::Dropped(reason) =
                    self.replicator.apply_local(&op, &mut self.store)
                {
                    debug!(%reason, path = %op.path(), "local operation did not change the replica");
                }
                self.forward_notices();
                Message::Structural(op)
            }
            LocalCommand::Who => {
                let line = self.who_line();
                self.sink.append_log(&line);
                return;
            }
            LocalCommand::Disconnect => return,
        }
        .encode(&self.config.identity);

        if self.outbox.send(OutboxItem::Frame(text)).is_err() {
            debug!("outbox closed, frame discarded");
        }
    }

    // ── Teardown ─────────────────────────────────────────────────

    fn publish_phase(&self) {
        self.phase_tx.send_replace(self.phase);
    }

    async fn close(mut self, reason: String, expected: bool) -> Finished<S, P> {
        self.validation.cancel();
        self.phase.close();
        self.reader.abort();

        let _ = self.outbox.send(OutboxItem::Close);
        if let Some(task) = self.outbox_task.take() {
            if tokio::time::timeout(OUTBOX_DRAIN_TIMEOUT, task).await.is_err() {
                debug!("outbox did not drain in time");
            }
        }

        if expected {
            info!(%reason, "session closed");
        } else {
            warn!(%reason, "server lost");
            self.sink
                .show_warning(&format!("connection to the relay was lost: {reason}"));
        }
        self.publish_phase();

        Finished {
            store: self.store,
            sink: self.sink,
            reason,
            expected,
        }
    }
}
