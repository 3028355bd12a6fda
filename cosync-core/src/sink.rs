//! The presentation seam: chat log, attention cues and the security
//! indicator.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

/// Narrow interface onto whatever shows session activity to the user.
pub trait PresentationSink: Send {
    /// Append one line to the chat log.
    fn append_log(&mut self, line: &str);

    /// Show or hide the chat surface.
    fn set_visible(&mut self, visible: bool);

    fn play_notification_sound(&mut self);

    /// `true` when every participant is on an encrypted link.
    fn update_security_indicator(&mut self, secure: bool);

    /// A frame arrived that this client could not process.
    fn report_unprocessed(&mut self, raw: &str);

    /// A non-fatal condition the user should know about.
    fn show_warning(&mut self, message: &str) {
        self.append_log(&format!("warning: {message}"));
    }
}

impl<T: PresentationSink + ?Sized> PresentationSink for Box<T> {
    fn append_log(&mut self, line: &str) {
        (**self).append_log(line)
    }

    fn set_visible(&mut self, visible: bool) {
        (**self).set_visible(visible)
    }

    fn play_notification_sound(&mut self) {
        (**self).play_notification_sound()
    }

    fn update_security_indicator(&mut self, secure: bool) {
        (**self).update_security_indicator(secure)
    }

    fn report_unprocessed(&mut self, raw: &str) {
        (**self).report_unprocessed(raw)
    }

    fn show_warning(&mut self, message: &str) {
        (**self).show_warning(message)
    }
}

// ── TracingSink ──────────────────────────────────────────────────

/// Sends everything to `tracing`. Useful for headless clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl PresentationSink for TracingSink {
    fn append_log(&mut self, line: &str) {
        info!(target: "cosync::chat", "{line}");
    }

    fn set_visible(&mut self, _visible: bool) {}

    fn play_notification_sound(&mut self) {}

    fn update_security_indicator(&mut self, secure: bool) {
        info!(secure, "security indicator updated");
    }

    fn report_unprocessed(&mut self, raw: &str) {
        warn!(frame = %raw, "unprocessed frame");
    }

    fn show_warning(&mut self, message: &str) {
        warn!("{message}");
    }
}

// ── RecordingSink ────────────────────────────────────────────────

/// One call made on a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Log(String),
    Visible(bool),
    Sound,
    Security(bool),
    Unprocessed(String),
    Warning(String),
}

/// Records every call. Clones share the same event list, so a test can
/// keep one handle while the session owns another.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: SinkEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// Every event recorded so far.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn logs(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Log(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Warning(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    /// The most recent security indicator value, if any was pushed.
    pub fn last_security(&self) -> Option<bool> {
        self.events().into_iter().rev().find_map(|e| match e {
            SinkEvent::Security(secure) => Some(secure),
            _ => None,
        })
    }
}

impl PresentationSink for RecordingSink {
    fn append_log(&mut self, line: &str) {
        self.push(SinkEvent::Log(line.to_string()));
    }

    fn set_visible(&mut self, visible: bool) {
        self.push(SinkEvent::Visible(visible));
    }

    fn play_notification_sound(&mut self) {
        self.push(SinkEvent::Sound);
    }

    fn update_security_indicator(&mut self, secure: bool) {
        self.push(SinkEvent::Security(secure));
    }

    fn report_unprocessed(&mut self, raw: &str) {
        self.push(SinkEvent::Unprocessed(raw.to_string()));
    }

    fn show_warning(&mut self, message: &str) {
        self.push(SinkEvent::Warning(message.to_string()));
    }
}
