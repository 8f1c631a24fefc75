//! Console input forwarding.
//!
//! Runs on its own thread because reading a terminal blocks.

use std::io::BufRead;

use protocol::ProtocolError;

use crate::sender::{ClientSender, SendOutcome};

/// How forwarding ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEnd {
    /// The quit sentinel was sent.
    Quit,
    /// The input reached end of file (or failed to read).
    Exhausted,
}

/// Something that accepts user lines.
pub trait LineSink {
    /// Forward one line, without its terminator.
    fn send_line(&mut self, line: &str) -> Result<SendOutcome, ProtocolError>;
}

impl LineSink for ClientSender {
    fn send_line(&mut self, line: &str) -> Result<SendOutcome, ProtocolError> {
        self.send(line)
    }
}

/// Forward every line of `input` to `sink` until quit or end of input.
///
/// Line terminators (`\n` and `\r\n`) are stripped. A failed send ends
/// forwarding with the error.
pub fn forward_input<R, K>(input: R, sink: &mut K) -> Result<InputEnd, ProtocolError>
where
    R: BufRead,
    K: LineSink + ?Sized,
{
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read input");
                break;
            }
        };

        if sink.send_line(&line)? == SendOutcome::Quit {
            return Ok(InputEnd::Quit);
        }
    }

    tracing::debug!("Input exhausted");
    Ok(InputEnd::Exhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<String>,
        fail_on: Option<String>,
    }

    impl LineSink for Recorder {
        fn send_line(&mut self, line: &str) -> Result<SendOutcome, ProtocolError> {
            if self.fail_on.as_deref() == Some(line) {
                return Err(ProtocolError::ConnectionClosed("gone".into()));
            }
            if line.is_empty() {
                return Ok(SendOutcome::Skipped);
            }
            self.sent.push(line.to_string());
            if protocol::is_quit(line) {
                return Ok(SendOutcome::Quit);
            }
            Ok(SendOutcome::Sent(line.len()))
        }
    }

    #[test]
    fn test_terminators_stripped() {
        let mut sink = Recorder::default();
        let end = forward_input(Cursor::new("hello\r\nworld\n"), &mut sink).unwrap();

        assert_eq!(end, InputEnd::Exhausted);
        assert_eq!(sink.sent, vec!["hello", "world"]);
    }

    #[test]
    fn test_stops_after_quit() {
        let mut sink = Recorder::default();
        let end = forward_input(Cursor::new("a\nquit\nnever sent\n"), &mut sink).unwrap();

        assert_eq!(end, InputEnd::Quit);
        assert_eq!(sink.sent, vec!["a", "quit"]);
    }

    #[test]
    fn test_empty_lines_do_not_stop_forwarding() {
        let mut sink = Recorder::default();
        forward_input(Cursor::new("\n\nafter blanks"), &mut sink).unwrap();

        assert_eq!(sink.sent, vec!["after blanks"]);
    }

    #[test]
    fn test_send_failure_ends_forwarding() {
        let mut sink = Recorder {
            fail_on: Some("boom".into()),
            ..Default::default()
        };
        let err = forward_input(Cursor::new("ok\nboom\nlater\n"), &mut sink).unwrap_err();

        assert!(matches!(err, ProtocolError::ConnectionClosed(_)));
        assert_eq!(sink.sent, vec!["ok"]);
    }

    #[test]
    fn test_empty_input() {
        let mut sink = Recorder::default();
        assert_eq!(
            forward_input(Cursor::new(""), &mut sink).unwrap(),
            InputEnd::Exhausted
        );
        assert!(sink.sent.is_empty());
    }
}
