//! Terminal presentation: the console sink and stdin command parsing.

use std::io::Write;

use cosync_core::{Frame, Message, Operation, PresentationSink, SyncError, message};

/// Prints session activity to a writer (stdout in the binary).
pub struct ConsoleSink<W: Write + Send> {
    out: W,
    visible: bool,
    secure: Option<bool>,
    bell: bool,
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            visible: true,
            secure: None,
            bell: false,
        }
    }

    /// Ring the terminal bell on incoming chat.
    pub fn with_bell(mut self, bell: bool) -> Self {
        self.bell = bell;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}") {
            tracing::debug!(error = %e, "console write failed");
        }
    }
}

impl<W: Write + Send> PresentationSink for ConsoleSink<W> {
    fn append_log(&mut self, line: &str) {
        if self.visible {
            self.line(line);
        }
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn play_notification_sound(&mut self) {
        if self.bell {
            let _ = self.out.write_all(b"\x07");
            let _ = self.out.flush();
        }
    }

    /// Prints only when the aggregate actually flips.
    fn update_security_indicator(&mut self, secure: bool) {
        if self.secure == Some(secure) {
            return;
        }
        self.secure = Some(secure);
        let label = if secure {
            "[secure] every participant is encrypted"
        } else {
            "[insecure] at least one participant is unencrypted"
        };
        self.line(label);
    }

    fn report_unprocessed(&mut self, raw: &str) {
        self.line(&format!("[unprocessed] {raw}"));
    }

    fn show_warning(&mut self, message: &str) {
        self.line(&format!("[warning] {message}"));
    }
}

// ── Input ────────────────────────────────────────────────────────

/// One line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Chat(String),
    /// `/local <CODE> <payload>`: a catalog change made on this machine.
    Local(Operation),
    /// `/who`: list the people on the relay.
    Who,
    /// `/quit`
    Quit,
    Empty,
}

/// Parse a stdin line. Structural commands are typed without the sender,
/// which is filled in from `identity`.
pub fn parse_input(line: &str, identity: &str) -> Result<Input, SyncError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }
    match line {
        "/quit" | "/exit" => return Ok(Input::Quit),
        "/who" => return Ok(Input::Who),
        _ => {}
    }

    let Some(rest) = line.strip_prefix("/local ") else {
        return Ok(Input::Chat(line.to_string()));
    };
    let rest = rest.trim_start();
    let (code, payload) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let frame = Frame::from_text(&format!("{code} {identity} {payload}"))
        .ok_or_else(|| SyncError::MalformedFrame("empty command".into()))?;
    match message::parse(&frame)? {
        Message::Structural(op) => Ok(Input::Local(op)),
        other => Err(SyncError::MalformedFrame(format!(
            "{} is not a catalog change",
            other.code()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(sink: ConsoleSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn hidden_sink_drops_log_lines() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.append_log("first");
        sink.set_visible(false);
        sink.append_log("second");
        sink.set_visible(true);
        sink.append_log("third");
        assert_eq!(output(sink), "first\nthird\n");
    }

    #[test]
    fn incoming_chat_reveals_hidden_sink_first() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.set_visible(false);
        sink.append_log("missed");
        sink.set_visible(true);
        sink.append_log("u2: hello");
        assert_eq!(output(sink), "u2: hello\n");
    }

    #[test]
    fn security_indicator_prints_on_change_only() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.update_security_indicator(true);
        sink.update_security_indicator(true);
        sink.update_security_indicator(false);
        let text = output(sink);
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("[secure]"));
    }

    #[test]
    fn bell_is_optional() {
        let mut quiet = ConsoleSink::new(Vec::new());
        quiet.play_notification_sound();
        assert!(output(quiet).is_empty());

        let mut loud = ConsoleSink::new(Vec::new()).with_bell(true);
        loud.play_notification_sound();
        assert_eq!(output(loud), "\x07");
    }

    #[test]
    fn warnings_and_unprocessed_are_tagged() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.show_warning("not validated");
        sink.report_unprocessed("ZZ u2 x");
        assert_eq!(output(sink), "[warning] not validated\n[unprocessed] ZZ u2 x\n");
    }

    #[test]
    fn plain_lines_are_chat() {
        assert_eq!(
            parse_input("  hello all ", "u1").unwrap(),
            Input::Chat("hello all".into())
        );
        assert_eq!(parse_input("", "u1").unwrap(), Input::Empty);
        assert_eq!(parse_input("/quit", "u1").unwrap(), Input::Quit);
        assert_eq!(parse_input("/who", "u1").unwrap(), Input::Who);
    }

    #[test]
    fn local_command_fills_in_identity() {
        let Input::Local(op) =
            parse_input("/local AC 42 >|< Collections >|< Root >|< Child", "u1").unwrap()
        else {
            panic!("expected a local operation");
        };
        assert_eq!(
            Message::Structural(op).encode("u1"),
            "AC u1 42 >|< Collections >|< Root >|< Child"
        );
    }

    #[test]
    fn local_command_rejects_non_structural_codes() {
        assert!(parse_input("/local M hi", "u1").is_err());
        assert!(parse_input("/local ZZ 1", "u1").is_err());
    }
}
