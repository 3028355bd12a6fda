//! The background task that turns socket reads into frame batches.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Decoder;
use tracing::{debug, trace, warn};

use crate::frame::{Frame, FrameCodec};
use crate::session::SessionEvent;

/// Upper bound on a single socket read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Handle to a running reader task. Dropping it stops the task.
#[derive(Debug)]
pub struct FrameReader {
    handle: JoinHandle<()>,
}

impl FrameReader {
    /// Start reading from `reader`.
    ///
    /// Each read produces at most one [`SessionEvent::Frames`] batch. The
    /// task ends after sending exactly one [`SessionEvent::ConnectionLost`],
    /// or silently once the consumer has gone away.
    pub fn spawn<R>(
        reader: R,
        events: mpsc::UnboundedSender<SessionEvent>,
        loss_expected: Arc<AtomicBool>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let handle = tokio::spawn(read_loop(reader, events, loss_expected));
        Self { handle }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read_loop<R>(
    mut reader: R,
    events: mpsc::UnboundedSender<SessionEvent>,
    loss_expected: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut codec = FrameCodec::new();
    let mut overflow = BytesMut::with_capacity(READ_CHUNK_SIZE);
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    let reason = loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break "relay closed the connection".to_string(),
            Ok(n) => n,
            Err(e) => break e.to_string(),
        };
        trace!(bytes = n, "read");
        overflow.extend_from_slice(&chunk[..n]);

        let mut batch: Vec<Frame> = Vec::new();
        let decoded = loop {
            match codec.decode(&mut overflow) {
                Ok(Some(frame)) => batch.push(frame),
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        if !batch.is_empty() && events.send(SessionEvent::Frames(batch)).is_err() {
            debug!("session gone, reader stopping");
            return;
        }
        if let Err(e) = decoded {
            break e.to_string();
        }
    };

    if !overflow.is_empty() {
        debug!(bytes = overflow.len(), "discarding partial frame");
    }
    let expected = loss_expected.load(Ordering::SeqCst);
    if expected {
        debug!(%reason, "reader finished");
    } else {
        warn!(%reason, "connection to relay lost");
    }
    let _ = events.send(SessionEvent::ConnectionLost { reason, expected });
}
