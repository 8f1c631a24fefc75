//! Per-connection session state.
//!
//! A session owns one accepted connection, the display tag derived from the
//! peer address and a reusable inbound buffer. Dropping the session closes
//! the connection, so ownership decides when the handle is released.

use std::fmt;
use std::io::Read;
use std::net::SocketAddr;
use std::time::Instant;

use mio::Token;
use protocol::{decode_prefix, drain_available, is_quit};

use crate::error::SessionError;

/// Stable display tag of a session, fixed at accept time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Create an id from an arbitrary tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Derive the id from the peer's `host:port`.
    pub fn from_peer(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer shut the connection down (a read returned zero bytes).
    Closed,
    /// The peer sent the quit sentinel.
    Quit,
    /// Reading from the connection failed.
    ReadError(String),
    /// The peer sent bytes that are not valid UTF-8.
    DecodeError(String),
    /// The peer stopped accepting bytes partway through a relayed message.
    WriteStalled,
    /// The reactor is shutting down.
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Closed => f.write_str("connection closed"),
            DisconnectReason::Quit => f.write_str("quit"),
            DisconnectReason::ReadError(e) => write!(f, "read error: {}", e),
            DisconnectReason::DecodeError(e) => write!(f, "decode error: {}", e),
            DisconnectReason::WriteStalled => f.write_str("write stalled"),
            DisconnectReason::Shutdown => f.write_str("server shutdown"),
        }
    }
}

impl From<SessionError> for DisconnectReason {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Io(e) => DisconnectReason::ReadError(e.to_string()),
            SessionError::Decode(e) => DisconnectReason::DecodeError(e.to_string()),
        }
    }
}

/// Result of handling one read-ready notification.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Decoded text to relay, if any bytes were available.
    pub text: Option<String>,
    /// Set when the session must be destroyed once `text` has been relayed.
    pub close: Option<DisconnectReason>,
}

/// One connected client.
pub struct Session<S> {
    id: SessionId,
    token: Token,
    stream: S,
    inbound: Vec<u8>,
    connected_at: Instant,
}

impl<S> Session<S> {
    /// Wrap an accepted stream.
    pub fn new(id: SessionId, token: Token, stream: S) -> Self {
        Self {
            id,
            token,
            stream,
            inbound: Vec::new(),
            connected_at: Instant::now(),
        }
    }

    /// Returns the session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the multiplexer token of the connection.
    pub fn token(&self) -> Token {
        self.token
    }

    /// When the connection was accepted.
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Mutable access to the connection.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Give up the session and return the connection.
    pub fn into_stream(self) -> S {
        self.stream
    }
}

impl<S: Read> Session<S> {
    /// Drain everything currently available and decode it as one message.
    ///
    /// Bytes read before an end-of-stream or read error are still returned
    /// for relaying; `close` tells the caller to destroy the session after.
    /// A read that finds nothing and no end-of-stream yields an empty outcome.
    /// A character cut off at the end of the drain stays buffered until the
    /// next read completes it.
    pub fn read_available(&mut self, chunk: usize) -> ReadOutcome {
        let drain = drain_available(&mut self.stream, &mut self.inbound, chunk);

        let mut outcome = ReadOutcome::default();
        if let Some(err) = drain.error {
            outcome.close = Some(SessionError::Io(err).into());
        } else if drain.closed {
            outcome.close = Some(DisconnectReason::Closed);
        }

        if drain.read == 0 {
            return outcome;
        }

        match decode_prefix(&self.inbound) {
            Ok((text, used)) => {
                self.inbound.drain(..used);
                if !self.inbound.is_empty() {
                    tracing::trace!(
                        session = %self.id,
                        pending = self.inbound.len(),
                        "Holding partial character"
                    );
                }
                if text.is_empty() {
                    return outcome;
                }
                if is_quit(&text) && outcome.close.is_none() {
                    outcome.close = Some(DisconnectReason::Quit);
                }
                outcome.text = Some(text);
            }
            Err(err) => {
                tracing::warn!(
                    session = %self.id,
                    error = %err,
                    "Dropping undecodable message"
                );
                self.inbound.clear();
                outcome.close = Some(SessionError::Decode(err).into());
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStream;
    use std::io::ErrorKind;

    fn session(stream: FakeStream) -> Session<FakeStream> {
        Session::new(SessionId::new("peer"), Token(7), stream)
    }

    #[test]
    fn test_session_id_from_peer() {
        let addr: SocketAddr = "127.0.0.1:40112".parse().unwrap();
        let id = SessionId::from_peer(addr);
        assert_eq!(id.as_str(), "127.0.0.1:40112");
        assert_eq!(id.to_string(), "127.0.0.1:40112");
    }

    #[test]
    fn test_session_accessors() {
        let s = session(FakeStream::new());
        assert_eq!(s.id(), &SessionId::new("peer"));
        assert_eq!(s.token(), Token(7));
        assert!(s.connected_at() <= Instant::now());
    }

    #[test]
    fn test_read_message() {
        let stream = FakeStream::new();
        stream.push_incoming(b"hello\n");
        let mut s = session(stream);

        let outcome = s.read_available(4);

        assert_eq!(outcome.text.as_deref(), Some("hello\n"));
        assert_eq!(outcome.close, None);
    }

    #[test]
    fn test_read_coalesced_lines_stay_one_message() {
        let stream = FakeStream::new();
        stream.push_incoming(b"hello");
        stream.push_incoming(b"world");
        let mut s = session(stream);

        let outcome = s.read_available(1024);

        assert_eq!(outcome.text.as_deref(), Some("helloworld"));
    }

    #[test]
    fn test_read_quit_sentinel() {
        let stream = FakeStream::new();
        stream.push_incoming(b"quit");
        let mut s = session(stream);

        let outcome = s.read_available(1024);

        assert_eq!(outcome.text.as_deref(), Some("quit"));
        assert_eq!(outcome.close, Some(DisconnectReason::Quit));
    }

    #[test]
    fn test_read_eof_without_data() {
        let stream = FakeStream::new();
        stream.push_eof();
        let mut s = session(stream);

        let outcome = s.read_available(1024);

        assert_eq!(outcome.text, None);
        assert_eq!(outcome.close, Some(DisconnectReason::Closed));
    }

    #[test]
    fn test_read_data_then_eof() {
        let stream = FakeStream::new();
        stream.push_incoming(b"last words");
        stream.push_eof();
        let mut s = session(stream);

        let outcome = s.read_available(1024);

        assert_eq!(outcome.text.as_deref(), Some("last words"));
        assert_eq!(outcome.close, Some(DisconnectReason::Closed));
    }

    #[test]
    fn test_read_error_closes() {
        let stream = FakeStream::new();
        stream.push_error(ErrorKind::ConnectionReset);
        let mut s = session(stream);

        let outcome = s.read_available(1024);

        assert_eq!(outcome.text, None);
        assert!(matches!(outcome.close, Some(DisconnectReason::ReadError(_))));
    }

    #[test]
    fn test_read_invalid_utf8_closes_without_text() {
        let stream = FakeStream::new();
        stream.push_incoming(&[0x66, 0x6f, 0xff]);
        let mut s = session(stream);

        let outcome = s.read_available(1024);

        assert_eq!(outcome.text, None);
        assert!(matches!(
            outcome.close,
            Some(DisconnectReason::DecodeError(_))
        ));
    }

    #[test]
    fn test_read_character_split_across_reads() {
        let stream = FakeStream::new();
        let handle = stream.clone();
        let mut s = session(stream);
        let bytes = "a世".as_bytes();

        handle.push_incoming(&bytes[..2]);
        let outcome = s.read_available(1024);
        assert_eq!(outcome.text.as_deref(), Some("a"));
        assert_eq!(outcome.close, None);

        handle.push_incoming(&bytes[2..]);
        let outcome = s.read_available(1024);
        assert_eq!(outcome.text.as_deref(), Some("世"));
        assert_eq!(outcome.close, None);
    }

    #[test]
    fn test_read_only_partial_character_waits() {
        let stream = FakeStream::new();
        let handle = stream.clone();
        let mut s = session(stream);
        let bytes = "世界".as_bytes();

        handle.push_incoming(&bytes[..1]);
        assert_eq!(s.read_available(1024), ReadOutcome::default());

        handle.push_incoming(&bytes[1..4]);
        assert_eq!(s.read_available(1024).text.as_deref(), Some("世"));

        handle.push_incoming(&bytes[4..]);
        assert_eq!(s.read_available(1024).text.as_deref(), Some("界"));
    }

    #[test]
    fn test_long_multibyte_stream_in_odd_slices() {
        let stream = FakeStream::new();
        let handle = stream.clone();
        let mut s = session(stream);
        let text = "世".repeat(1000);

        let mut received = String::new();
        for slice in text.as_bytes().chunks(1000) {
            handle.push_incoming(slice);
            let outcome = s.read_available(1024);
            assert_eq!(outcome.close, None);
            received.push_str(outcome.text.as_deref().unwrap_or(""));
        }

        assert_eq!(received, text);
    }

    #[test]
    fn test_read_nothing_available_is_noop() {
        let mut s = session(FakeStream::new());
        assert_eq!(s.read_available(1024), ReadOutcome::default());
    }

    #[test]
    fn test_inbound_buffer_is_reset_between_reads() {
        let stream = FakeStream::new();
        let handle = stream.clone();
        let mut s = session(stream);

        handle.push_incoming(b"first");
        assert_eq!(s.read_available(2).text.as_deref(), Some("first"));

        handle.push_incoming(b"second");
        assert_eq!(s.read_available(2).text.as_deref(), Some("second"));
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(DisconnectReason::Closed.to_string(), "connection closed");
        assert_eq!(DisconnectReason::Quit.to_string(), "quit");
        assert_eq!(
            DisconnectReason::ReadError("reset".into()).to_string(),
            "read error: reset"
        );
        assert_eq!(DisconnectReason::WriteStalled.to_string(), "write stalled");
    }
}
