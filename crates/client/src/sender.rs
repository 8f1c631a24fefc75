//! Outbound half of the client connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::net::TcpStream;
use mio::Waker;
use protocol::{is_quit, write_fully, ProtocolError, WritePolicy};

/// What happened to one line handed to [`ClientSender::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Empty line; nothing was written.
    Skipped,
    /// The line went out in full.
    Sent(usize),
    /// The quit sentinel went out and the client is stopping.
    Quit,
}

/// Writes user lines to the server.
///
/// Shares the stream with the client's read loop; reads and writes use
/// disjoint buffers, so the two halves never contend.
#[derive(Clone)]
pub struct ClientSender {
    stream: Arc<TcpStream>,
    waker: Arc<Waker>,
    quit: Arc<AtomicBool>,
    policy: WritePolicy,
}

impl ClientSender {
    pub(crate) fn new(
        stream: Arc<TcpStream>,
        waker: Arc<Waker>,
        quit: Arc<AtomicBool>,
        policy: WritePolicy,
    ) -> Self {
        Self {
            stream,
            waker,
            quit,
            policy,
        }
    }

    /// Send one line, without its terminator.
    ///
    /// Sending the quit sentinel also wakes the read loop so the client
    /// exits, even when the write itself failed.
    pub fn send(&self, line: &str) -> Result<SendOutcome, ProtocolError> {
        if line.is_empty() {
            return Ok(SendOutcome::Skipped);
        }

        let mut stream: &TcpStream = &self.stream;
        let written = write_fully(&mut stream, line.as_bytes(), &self.policy);

        if is_quit(line) {
            self.request_quit()?;
            written?;
            tracing::debug!("Sent quit");
            return Ok(SendOutcome::Quit);
        }

        let written = written?;
        tracing::trace!(bytes = written, "Sent line");
        Ok(SendOutcome::Sent(written))
    }

    fn request_quit(&self) -> Result<(), ProtocolError> {
        self.quit.store(true, Ordering::SeqCst);
        self.waker.wake()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Events, Poll, Token};
    use std::io::{ErrorKind, Read};
    use std::net::TcpListener;
    use std::time::Duration;

    struct Harness {
        sender: ClientSender,
        server: std::net::TcpStream,
        poll: Poll,
    }

    fn harness() -> Harness {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        client.set_nonblocking(true).unwrap();
        let (server, _) = listener.accept().unwrap();
        server
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();

        let poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), Token(1)).unwrap());
        let sender = ClientSender::new(
            Arc::new(TcpStream::from_std(client)),
            waker,
            Arc::new(AtomicBool::new(false)),
            WritePolicy::default(),
        );
        Harness { sender, server, poll }
    }

    fn read_all(server: &mut std::net::TcpStream) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            match server.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
                Err(e) => panic!("read failed: {}", e),
            }
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_empty_line_is_skipped() {
        let mut h = harness();

        assert_eq!(h.sender.send("").unwrap(), SendOutcome::Skipped);
        assert_eq!(read_all(&mut h.server), "");
        assert!(!h.sender.quit.load(Ordering::SeqCst));
    }

    #[test]
    fn test_line_sent_without_terminator() {
        let mut h = harness();

        assert_eq!(h.sender.send("hello").unwrap(), SendOutcome::Sent(5));
        assert_eq!(read_all(&mut h.server), "hello");
    }

    #[test]
    fn test_quit_is_sent_and_wakes_reader() {
        let mut h = harness();

        assert_eq!(h.sender.send("quit").unwrap(), SendOutcome::Quit);
        assert!(h.sender.quit.load(Ordering::SeqCst));
        assert_eq!(read_all(&mut h.server), "quit");

        let mut events = Events::with_capacity(4);
        h.poll
            .poll(&mut events, Some(Duration::from_secs(1)))
            .unwrap();
        assert!(events.iter().any(|e| e.token() == Token(1)));
    }

    #[test]
    fn test_quit_lookalikes_are_plain_lines() {
        let mut h = harness();

        assert_eq!(h.sender.send("Quit").unwrap(), SendOutcome::Sent(4));
        assert_eq!(h.sender.send("quit ").unwrap(), SendOutcome::Sent(5));
        assert!(!h.sender.quit.load(Ordering::SeqCst));
        assert_eq!(read_all(&mut h.server), "Quitquit ");
    }
}
