//! Outbound frames: the paced, lock-guarded writer and the outbox task
//! that feeds it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::Encoder;
use tracing::{debug, trace, warn};

use crate::error::SyncError;
use crate::frame::FrameCodec;
use crate::session::SessionEvent;

type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// The write half of the relay socket.
///
/// Every send holds the lock for the write, the flush and the pacing
/// pause, so concurrent senders are serialized and spaced out.
pub struct Outbound {
    writer: Mutex<Option<BoxedWriter>>,
    pacing: Duration,
    events: mpsc::UnboundedSender<SessionEvent>,
    loss_expected: Arc<AtomicBool>,
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}

impl Outbound {
    pub fn new<W>(
        writer: W,
        pacing: Duration,
        events: mpsc::UnboundedSender<SessionEvent>,
        loss_expected: Arc<AtomicBool>,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            writer: Mutex::new(Some(Box::new(writer))),
            pacing,
            events,
            loss_expected,
        }
    }

    /// Write one frame and wait out the pacing interval.
    ///
    /// A write failure releases the socket and reports the loss to the
    /// session, exactly like a failed read.
    pub async fn send(&self, text: &str) -> Result<(), SyncError> {
        let mut buf = BytesMut::new();
        FrameCodec::new().encode(text, &mut buf)?;

        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(SyncError::NotConnected);
        };

        let written = async {
            writer.write_all(&buf).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            guard.take();
            let expected = self.loss_expected.load(Ordering::SeqCst);
            if !expected {
                warn!(error = %e, "write to relay failed");
            }
            let _ = self.events.send(SessionEvent::ConnectionLost {
                reason: e.to_string(),
                expected,
            });
            return Err(SyncError::Connection(e));
        }

        trace!(frame = %text, "sent");
        tokio::time::sleep(self.pacing).await;
        Ok(())
    }

    /// Shut down and release the write half.
    pub async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "shutdown of write half failed");
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }
}

// ── Outbox ───────────────────────────────────────────────────────

/// Work for the outbox task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboxItem {
    Frame(String),
    /// Release the socket once everything queued before this is sent.
    Close,
}

/// Spawn the task that drains `rx` into `outbound` in submission order.
pub fn spawn_outbox(
    outbound: Arc<Outbound>,
    mut rx: mpsc::UnboundedReceiver<OutboxItem>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                OutboxItem::Frame(text) => match outbound.send(&text).await {
                    Ok(()) => {}
                    Err(e) if e.is_transport() => {
                        debug!(error = %e, "outbox stopping");
                        break;
                    }
                    Err(e) => warn!(error = %e, "dropping unsendable frame"),
                },
                OutboxItem::Close => {
                    outbound.close().await;
                    break;
                }
            }
        }
        outbound.close().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;
    use tokio_test::io::Builder;

    fn outbound<W>(writer: W) -> (Outbound, mpsc::UnboundedReceiver<SessionEvent>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let out = Outbound::new(
            writer,
            Duration::from_millis(50),
            tx,
            Arc::new(AtomicBool::new(false)),
        );
        (out, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn send_writes_terminated_frame_and_paces() {
        let mock = Builder::new()
            .write(b"M u1: hi ||| ")
            .write(b"L u1 ||| ")
            .build();
        let (out, _rx) = outbound(mock);

        let start = Instant::now();
        out.send("M u1: hi").await.unwrap();
        out.send("L u1").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn write_failure_reports_loss() {
        let mock = Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let (out, mut rx) = outbound(mock);

        assert!(matches!(out.send("V u1").await, Err(SyncError::Connection(_))));
        assert!(matches!(
            rx.recv().await,
            Some(SessionEvent::ConnectionLost { expected: false, .. })
        ));
        assert!(!out.is_connected().await);
        assert!(matches!(out.send("V u1").await, Err(SyncError::NotConnected)));
    }

    #[tokio::test]
    async fn embedded_delimiter_is_refused_without_writing() {
        let (out, _rx) = outbound(Builder::new().build());
        assert!(matches!(
            out.send("M u1: a ||| b").await,
            Err(SyncError::InvalidField { .. })
        ));
        assert!(out.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn outbox_preserves_order_then_closes() {
        let mock = Builder::new()
            .write(b"C u1 h d False 1 ||| ")
            .write(b"M u1: one ||| ")
            .write(b"M u1: two ||| ")
            .build();
        let (out, _events) = outbound(mock);
        let out = Arc::new(out);
        let (tx, rx) = mpsc::unbounded_channel();
        let task = spawn_outbox(out.clone(), rx);

        for text in ["C u1 h d False 1", "M u1: one", "M u1: two"] {
            tx.send(OutboxItem::Frame(text.into())).unwrap();
        }
        tx.send(OutboxItem::Close).unwrap();
        task.await.unwrap();
        assert!(!out.is_connected().await);
    }
}
