//! Relay wire framing.
//!
//! # Wire Format
//!
//! ```text
//! <code> <sender>[:] <payload> ||| <code> <sender> <payload> ||| ...
//! ```
//!
//! Frames are UTF-8 text separated by [`FRAME_DELIMITER`]. Senders
//! terminate every frame with [`FRAME_TERMINATOR`]; receivers trim the
//! whitespace around each piece and skip blank pieces. The delimiter is
//! pure ASCII, so splitting happens on raw bytes and UTF-8 decoding only
//! runs on complete frames: a multi-byte character cut in half by the
//! transport is stitched back together before it is decoded.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::SyncError;

/// Separator between frames on the wire.
pub const FRAME_DELIMITER: &str = "|||";

/// What the encoder appends after every outgoing frame.
pub const FRAME_TERMINATOR: &str = " ||| ";

/// Most bytes the decoder buffers while waiting for a delimiter.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

// ── Frame ────────────────────────────────────────────────────────

/// One delimited unit of the relay protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    code: String,
    sender: String,
    payload: String,
    raw: String,
}

impl Frame {
    /// Split trimmed frame text into code, sender and payload.
    ///
    /// Returns `None` for blank text. The sender ends at the first
    /// whitespace or `:`, and the `:` is dropped, so both `M u1: hello` and
    /// `M u1:hello` carry the bare identity.
    pub fn from_text(text: &str) -> Option<Self> {
        let raw = text.trim();
        if raw.is_empty() {
            return None;
        }

        let (code, rest) = split_token(raw);
        let (sender, payload) = split_sender(rest);

        Some(Self {
            code: code.to_string(),
            sender: sender.to_string(),
            payload: payload.to_string(),
            raw: raw.to_string(),
        })
    }

    /// The message type code (first token).
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Identity of the client that originated the frame.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Everything after the sender token.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// The whole trimmed frame text.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_token(text: &str) -> (&str, &str) {
    match text.find(char::is_whitespace) {
        Some(idx) => (&text[..idx], text[idx..].trim_start()),
        None => (text, ""),
    }
}

fn split_sender(text: &str) -> (&str, &str) {
    match text.find(|c: char| c == ':' || c.is_whitespace()) {
        Some(idx) => {
            let tail = &text[idx..];
            (&text[..idx], tail.strip_prefix(':').unwrap_or(tail).trim_start())
        }
        None => (text, ""),
    }
}

// ── FrameCodec ───────────────────────────────────────────────────

/// `tokio_util` codec turning a byte stream into [`Frame`]s and outgoing
/// text into terminated frames.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Bytes already scanned without finding a delimiter.
    next_index: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = SyncError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, SyncError> {
        let delimiter = FRAME_DELIMITER.as_bytes();
        loop {
            let start = self.next_index.min(src.len());
            let Some(offset) = src[start..]
                .windows(delimiter.len())
                .position(|window| window == delimiter)
            else {
                if src.len() > MAX_FRAME_SIZE {
                    return Err(SyncError::FrameTooLarge {
                        size: src.len(),
                        max: MAX_FRAME_SIZE,
                    });
                }
                // A delimiter may straddle the end of the buffer.
                self.next_index = src.len().saturating_sub(delimiter.len() - 1);
                return Ok(None);
            };

            let end = start + offset;
            self.next_index = 0;
            let piece = src.split_to(end + delimiter.len());
            let text = std::str::from_utf8(&piece[..end])?;
            if let Some(frame) = Frame::from_text(text) {
                return Ok(Some(frame));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, SyncError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if !src.is_empty() {
            debug!(bytes = src.len(), "discarding unterminated frame at end of stream");
            src.clear();
            self.next_index = 0;
        }
        Ok(None)
    }
}

impl<'a> Encoder<&'a str> for FrameCodec {
    type Error = SyncError;

    fn encode(&mut self, item: &'a str, dst: &mut BytesMut) -> Result<(), SyncError> {
        if item.contains(FRAME_DELIMITER) {
            return Err(SyncError::InvalidField {
                field: "frame text",
                value: item.to_string(),
            });
        }
        dst.reserve(item.len() + FRAME_TERMINATOR.len());
        dst.put_slice(item.as_bytes());
        dst.put_slice(FRAME_TERMINATOR.as_bytes());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut FrameCodec, buf: &mut BytesMut) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn splits_code_sender_payload() {
        let frame = Frame::from_text("  AC u2 42 >|< Collections >|< Root ").unwrap();
        assert_eq!(frame.code(), "AC");
        assert_eq!(frame.sender(), "u2");
        assert_eq!(frame.payload(), "42 >|< Collections >|< Root");
        assert_eq!(frame.raw(), "AC u2 42 >|< Collections >|< Root");
    }

    #[test]
    fn chat_sender_colon_is_stripped() {
        let frame = Frame::from_text("M u1: hello there").unwrap();
        assert_eq!(frame.sender(), "u1");
        assert_eq!(frame.payload(), "hello there");
    }

    #[test]
    fn chat_sender_colon_without_space() {
        let frame = Frame::from_text("M u1:hello there").unwrap();
        assert_eq!(frame.sender(), "u1");
        assert_eq!(frame.payload(), "hello there");

        let frame = Frame::from_text("S relay:").unwrap();
        assert_eq!(frame.sender(), "relay");
        assert_eq!(frame.payload(), "");
    }

    #[test]
    fn bare_code_has_empty_sender_and_payload() {
        let frame = Frame::from_text("V").unwrap();
        assert_eq!(frame.code(), "V");
        assert_eq!(frame.sender(), "");
        assert_eq!(frame.payload(), "");
    }

    #[test]
    fn blank_text_is_not_a_frame() {
        assert!(Frame::from_text("   \n").is_none());
    }

    #[test]
    fn decodes_multiple_frames_and_keeps_overflow() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from("A u1 x ||| M u1: hi ||| L u");
        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].code(), "A");
        assert_eq!(frames[1].payload(), "hi");
        assert_eq!(&buf[..], b" L u");

        buf.extend_from_slice(b"2 |||");
        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sender(), "u2");
    }

    #[test]
    fn delimiter_split_across_reads() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from("V u1 ||");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"| ");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.code(), "V");
    }

    #[test]
    fn blank_pieces_are_skipped() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(" |||  ||| V u1 |||");
        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].code(), "V");
    }

    #[test]
    fn multibyte_character_split_across_reads() {
        let text = "M u1: café |||".as_bytes();
        let cut = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&text[..cut]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&text[cut..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.payload(), "café");
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&b"M u1: \xff\xfe |||"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(SyncError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn oversized_frame_is_refused() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from("V r1 ||| M u1: ");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().code(), "V");

        let chunk = vec![b'x'; 64 * 1024];
        let mut refused = None;
        for _ in 0..(MAX_FRAME_SIZE / chunk.len() + 1) {
            buf.extend_from_slice(&chunk);
            match codec.decode(&mut buf) {
                Ok(None) => {}
                Ok(Some(frame)) => panic!("unexpected frame {frame}"),
                Err(e) => {
                    refused = Some(e);
                    break;
                }
            }
        }
        assert!(matches!(
            refused,
            Some(SyncError::FrameTooLarge { max: MAX_FRAME_SIZE, .. })
        ));
    }

    #[test]
    fn frame_at_the_limit_still_decodes() {
        let mut codec = FrameCodec::new();
        let mut text = String::from("M u1: ");
        text.push_str(&"y".repeat(MAX_FRAME_SIZE - text.len() - FRAME_DELIMITER.len()));
        text.push_str(FRAME_DELIMITER);
        let mut buf = BytesMut::from(text.as_str());
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.sender(), "u1");
        assert!(buf.is_empty());
    }

    #[test]
    fn eof_discards_partial_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from("M u1: unfinished");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_appends_terminator() {
        let mut codec = FrameCodec::new();
        let mut dst = BytesMut::new();
        codec.encode("M u1: hi", &mut dst).unwrap();
        assert_eq!(&dst[..], b"M u1: hi ||| ");

        let frame = codec.decode(&mut dst).unwrap().unwrap();
        assert_eq!(frame.raw(), "M u1: hi");
    }

    #[test]
    fn encode_rejects_embedded_delimiter() {
        let mut codec = FrameCodec::new();
        let mut dst = BytesMut::new();
        assert!(codec.encode("M u1: a ||| b", &mut dst).is_err());
        assert!(dst.is_empty());
    }
}
