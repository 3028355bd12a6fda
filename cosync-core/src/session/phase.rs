//! Session lifecycle state machine.
//!
//! Transitions are validated and return `Result` instead of panicking.

use tokio::time::Instant;

use crate::error::SyncError;

/// The current phase of a relay session.
///
/// ```text
///  Connecting ──► ConnectedUnvalidated ──► Validated
///       │                  │                   │
///       └──────────────────┴─────► Closed ◄────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Transport negotiation in progress.
    #[default]
    Connecting,

    /// Socket is up and the announcement sent; waiting for the relay's
    /// validation frame.
    ConnectedUnvalidated {
        /// When the announcement went out.
        since: Instant,
    },

    /// The relay acknowledged this client.
    Validated { since: Instant },

    /// Terminal. The socket has been released.
    Closed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::ConnectedUnvalidated { .. } => write!(f, "ConnectedUnvalidated"),
            Self::Validated { .. } => write!(f, "Validated"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl SessionPhase {
    /// Returns `true` while the socket is usable.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Self::ConnectedUnvalidated { .. } | Self::Validated { .. }
        )
    }

    pub fn is_validated(&self) -> bool {
        matches!(self, Self::Validated { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `ConnectedUnvalidated`.
    ///
    /// Valid from: `Connecting`.
    pub fn connected(&mut self) -> Result<(), SyncError> {
        match self {
            Self::Connecting => {
                *self = Self::ConnectedUnvalidated {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(SyncError::PhaseViolation(
                "cannot mark connected: not in Connecting state",
            )),
        }
    }

    /// Transition to `Validated`.
    ///
    /// Valid from: `ConnectedUnvalidated`.
    pub fn validate(&mut self) -> Result<(), SyncError> {
        match self {
            Self::ConnectedUnvalidated { .. } => {
                *self = Self::Validated {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(SyncError::PhaseViolation(
                "cannot validate: not awaiting validation",
            )),
        }
    }

    /// Transition to `Closed` from any phase.
    ///
    /// Returns `false` if the session was already closed.
    pub fn close(&mut self) -> bool {
        let was_open = !self.is_closed();
        *self = Self::Closed;
        was_open
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = SessionPhase::default();
        assert_eq!(phase, SessionPhase::Connecting);

        phase.connected().unwrap();
        assert!(phase.is_open());
        assert!(!phase.is_validated());

        phase.validate().unwrap();
        assert!(phase.is_validated());

        assert!(phase.close());
        assert!(phase.is_closed());
        assert!(!phase.close());
    }

    #[test]
    fn validate_before_connect_is_rejected() {
        let mut phase = SessionPhase::Connecting;
        assert!(matches!(
            phase.validate(),
            Err(SyncError::PhaseViolation(_))
        ));
    }

    #[test]
    fn second_validation_is_rejected() {
        let mut phase = SessionPhase::Connecting;
        phase.connected().unwrap();
        phase.validate().unwrap();
        assert!(phase.validate().is_err());
        assert!(phase.is_validated());
    }

    #[test]
    fn closed_is_terminal() {
        let mut phase = SessionPhase::Closed;
        assert!(phase.connected().is_err());
        assert!(phase.validate().is_err());
    }

    #[test]
    fn connecting_can_close() {
        let mut phase = SessionPhase::Connecting;
        assert!(phase.close());
        assert_eq!(phase.to_string(), "Closed");
    }
}
