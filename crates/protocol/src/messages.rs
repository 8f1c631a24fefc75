//! Chat message definitions.
//!
//! The wire format has no framing: a message is whatever UTF-8 text one
//! drain of a readable socket produced, and a relayed message is that text
//! prefixed with the sender tag and a colon. Nothing is appended, so any line
//! terminator comes from the sender itself.

use crate::error::Result;

/// Text a client sends to request its own disconnection.
pub const QUIT_SENTINEL: &str = "quit";

/// Separator between the sender tag and the relayed text.
pub const TAG_SEPARATOR: char = ':';

/// Returns true if `text` is exactly the quit sentinel.
///
/// The comparison is case-sensitive and does not trim whitespace, so
/// `"quit\n"` or `"QUIT"` are ordinary messages.
#[inline]
pub fn is_quit(text: &str) -> bool {
    text == QUIT_SENTINEL
}

/// Decodes the complete UTF-8 prefix of a drained chunk.
///
/// Returns the text and the number of bytes it used. A character cut off at
/// the end of `bytes` is left unconsumed so the caller can complete it with
/// the next read; malformed bytes anywhere are an error. The decoded text is
/// one message unit even when it contains several lines.
pub fn decode_prefix(bytes: &[u8]) -> Result<(String, usize)> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok((text.to_owned(), bytes.len())),
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let text = std::str::from_utf8(&bytes[..valid])?;
            Ok((text.to_owned(), valid))
        }
        Err(e) => Err(e.into()),
    }
}

/// A message on its way from one session to its peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Display tag of the sending session.
    pub sender: String,
    /// Decoded text exactly as received.
    pub text: String,
}

impl ChatMessage {
    /// Create a new message.
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
        }
    }

    /// The tagged payload, `"<sender>:<text>"`.
    pub fn tagged(&self) -> String {
        let mut out = String::with_capacity(self.sender.len() + 1 + self.text.len());
        out.push_str(&self.sender);
        out.push(TAG_SEPARATOR);
        out.push_str(&self.text);
        out
    }

    /// The tagged payload as bytes ready for the wire.
    pub fn encode(&self) -> Vec<u8> {
        self.tagged().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;

    #[test]
    fn test_is_quit_exact_match_only() {
        assert!(is_quit("quit"));
        assert!(!is_quit("QUIT"));
        assert!(!is_quit("quit\n"));
        assert!(!is_quit(" quit"));
        assert!(!is_quit(""));
    }

    #[test]
    fn test_tagged_format() {
        let msg = ChatMessage::new("127.0.0.1:40112", "hello");
        assert_eq!(msg.tagged(), "127.0.0.1:40112:hello");
    }

    #[test]
    fn test_encode_appends_nothing() {
        let msg = ChatMessage::new("a", "hi\n");
        assert_eq!(msg.encode(), b"a:hi\n".to_vec());
    }

    #[test]
    fn test_decode_prefix_keeps_multiple_lines_together() {
        let (text, used) = decode_prefix(b"hello\nworld").unwrap();
        assert_eq!(text, "hello\nworld");
        assert_eq!(used, 11);
    }

    #[test]
    fn test_decode_prefix_multibyte() {
        let bytes = "héllo 世界".as_bytes();
        let (text, used) = decode_prefix(bytes).unwrap();
        assert_eq!(text, "héllo 世界");
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn test_decode_prefix_empty() {
        assert_eq!(decode_prefix(b"").unwrap(), (String::new(), 0));
    }

    #[test]
    fn test_decode_prefix_leaves_cut_off_character() {
        let bytes = "ab世".as_bytes();

        let (text, used) = decode_prefix(&bytes[..4]).unwrap();
        assert_eq!(text, "ab");
        assert_eq!(used, 2);

        let (text, used) = decode_prefix(&bytes[..2 + 1]).unwrap();
        assert_eq!(text, "ab");
        assert_eq!(used, 2);
    }

    #[test]
    fn test_decode_prefix_only_partial_character() {
        let bytes = "世".as_bytes();
        assert_eq!(decode_prefix(&bytes[..2]).unwrap(), (String::new(), 0));
    }

    #[test]
    fn test_decode_prefix_invalid_utf8() {
        let err = decode_prefix(&[0xc3, 0x28]).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_decode_prefix_invalid_before_cut_off_character() {
        let mut bytes = vec![0xff];
        bytes.extend_from_slice(&"世".as_bytes()[..1]);
        assert!(decode_prefix(&bytes).is_err());
    }
}
