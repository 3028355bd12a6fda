//! Domain-specific error types for the cosync client.
//!
//! All fallible operations return `Result<T, SyncError>`.
//! Transport errors end the session; protocol errors only drop the
//! offending frame.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the cosync client.
#[derive(Debug, Error)]
pub enum SyncError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The TLS layer could not be configured or the handshake failed.
    #[error("tls error: {0}")]
    Tls(String),

    /// The configured certificate file could not be used.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// TCP connect did not complete in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// The socket has already been released.
    #[error("not connected")]
    NotConnected,

    // ── Protocol Errors ──────────────────────────────────────────
    /// A frame carried a type code this client does not understand.
    #[error("unknown message code: {0}")]
    UnknownCode(String),

    /// A frame could not be split into code, sender and payload.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A payload had the wrong number of elements for its code.
    #[error("{code}: expected {expected} elements, got {actual}")]
    Arity {
        code: String,
        expected: &'static str,
        actual: usize,
    },

    /// A payload field could not be interpreted.
    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    /// A node kind tag did not map to any known kind.
    #[error("unknown node kind: {0}")]
    UnknownKind(String),

    /// A node list did not fit the grammar of its target kind.
    #[error("path does not match {kind} grammar: {reason}")]
    PathMismatch { kind: &'static str, reason: String },

    /// The relay sent more bytes than a frame may hold without a delimiter.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A frame was not valid UTF-8.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    // ── State Errors ─────────────────────────────────────────────
    /// A session phase transition was attempted from the wrong phase.
    #[error("phase violation: {0}")]
    PhaseViolation(&'static str),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Returns `true` for errors that terminate the current session.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Tls(_)
                | Self::Certificate(_)
                | Self::ConnectTimeout(_)
                | Self::ChannelClosed
                | Self::NotConnected
                | Self::FrameTooLarge { .. }
                | Self::InvalidUtf8(_)
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for SyncError {
    fn from(s: String) -> Self {
        SyncError::Other(s)
    }
}

impl From<&str> for SyncError {
    fn from(s: &str) -> Self {
        SyncError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for SyncError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        SyncError::ChannelClosed
    }
}

impl From<rustls::Error> for SyncError {
    fn from(e: rustls::Error) -> Self {
        SyncError::Tls(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = SyncError::UnknownCode("ZZ".into());
        assert!(e.to_string().contains("ZZ"));

        let e = SyncError::Arity {
            code: "RN".into(),
            expected: "at least 4",
            actual: 2,
        };
        assert!(e.to_string().contains("at least 4"));
        assert!(e.to_string().contains('2'));
    }

    #[test]
    fn from_string() {
        let e: SyncError = "something broke".into();
        assert!(matches!(e, SyncError::Other(_)));
    }

    #[test]
    fn from_io_is_transport() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: SyncError = io_err.into();
        assert!(matches!(e, SyncError::Connection(_)));
        assert!(e.is_transport());
    }

    #[test]
    fn oversized_frame_is_transport() {
        let e = SyncError::FrameTooLarge {
            size: 2_000_000,
            max: 1_048_576,
        };
        assert!(e.to_string().contains("2000000"));
        assert!(e.is_transport());
    }

    #[test]
    fn protocol_errors_are_recoverable() {
        assert!(!SyncError::UnknownCode("Q".into()).is_transport());
        assert!(!SyncError::UnknownKind("Widget".into()).is_transport());
        assert!(!SyncError::PhaseViolation("x").is_transport());
    }
}
