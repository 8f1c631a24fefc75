//! In-memory stream used by unit tests in place of a socket.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::rc::Rc;

#[derive(Default)]
struct FakeState {
    incoming: VecDeque<io::Result<Vec<u8>>>,
    written: Vec<u8>,
    write_limit: Option<usize>,
    pause_after: Option<usize>,
    pause_left: u32,
    broken: bool,
    write_calls: usize,
}

/// A cloneable fake socket; clones share the same state so a test can keep a
/// handle after moving the stream into a session.
#[derive(Clone, Default)]
pub struct FakeStream {
    inner: Rc<RefCell<FakeState>>,
}

impl FakeStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts at most one byte per write call.
    pub fn trickle() -> Self {
        let stream = Self::new();
        stream.inner.borrow_mut().write_limit = Some(1);
        stream
    }

    /// Accepts `accept_first` bytes, then reports would-block `pause` times
    /// before accepting everything else.
    pub fn pausing(accept_first: usize, pause: u32) -> Self {
        let stream = Self::new();
        {
            let mut state = stream.inner.borrow_mut();
            state.pause_after = Some(accept_first);
            state.pause_left = pause;
        }
        stream
    }

    /// Fails every write with a broken pipe.
    pub fn broken() -> Self {
        let stream = Self::new();
        stream.inner.borrow_mut().broken = true;
        stream
    }

    pub fn push_incoming(&self, bytes: &[u8]) {
        self.inner.borrow_mut().incoming.push_back(Ok(bytes.to_vec()));
    }

    pub fn push_eof(&self) {
        self.inner.borrow_mut().incoming.push_back(Ok(Vec::new()));
    }

    pub fn push_error(&self, kind: ErrorKind) {
        self.inner
            .borrow_mut()
            .incoming
            .push_back(Err(io::Error::from(kind)));
    }

    pub fn written(&self) -> Vec<u8> {
        self.inner.borrow().written.clone()
    }

    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.inner.borrow().written).into_owned()
    }

    pub fn write_calls(&self) -> usize {
        self.inner.borrow().write_calls
    }
}

impl Read for FakeStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.inner.borrow_mut();
        match state.incoming.pop_front() {
            Some(Ok(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    state.incoming.push_front(Ok(data.split_off(n)));
                }
                Ok(n)
            }
            Some(Err(e)) => Err(e),
            None => Err(io::Error::from(ErrorKind::WouldBlock)),
        }
    }
}

impl Write for FakeStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.inner.borrow_mut();
        state.write_calls += 1;
        if state.broken {
            return Err(io::Error::from(ErrorKind::BrokenPipe));
        }
        let mut n = state.write_limit.map_or(buf.len(), |limit| buf.len().min(limit));
        if let Some(pause_after) = state.pause_after {
            let room = pause_after.saturating_sub(state.written.len());
            if room == 0 && state.pause_left > 0 {
                state.pause_left -= 1;
                return Err(io::Error::from(ErrorKind::WouldBlock));
            }
            if room > 0 {
                n = n.min(room);
            }
        }
        state.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
