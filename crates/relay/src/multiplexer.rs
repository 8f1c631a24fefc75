//! Readiness multiplexer.
//!
//! Thin wrapper over a `mio::Poll` that hands out plain snapshots of ready
//! channels instead of the borrowed event buffer, so callers can mutate their
//! own state while dispatching.
//!
//! mio reports readiness edge-triggered. Every handler in this crate drains
//! its channel until it would block (accept loop, read loop), which gives the
//! same observable behaviour as a level-triggered selector: no readiness is
//! ever left unconsumed between two waits.

use std::collections::HashSet;
use std::io::{self, ErrorKind};
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Token, Waker};

use crate::error::RelayError;

/// What a registered channel is watched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelInterest {
    /// A listening channel with pending connections.
    Accept,
    /// A connected channel with bytes to read.
    Read,
    /// An outbound connection finishing its handshake.
    Connect,
}

impl ChannelInterest {
    fn as_mio(self) -> Interest {
        match self {
            ChannelInterest::Accept | ChannelInterest::Read => Interest::READABLE,
            ChannelInterest::Connect => Interest::WRITABLE,
        }
    }
}

/// Snapshot of one ready channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// Token the channel was registered with.
    pub token: Token,
    /// Readable (or accept-ready for listeners).
    pub readable: bool,
    /// Writable (connect finished for outbound connections).
    pub writable: bool,
    /// The peer closed its write half.
    pub read_closed: bool,
    /// The channel reported an error condition.
    pub error: bool,
}

/// Owns the OS polling instance and the set of watched channels.
pub struct Multiplexer {
    poll: Poll,
    events: Events,
    watched: HashSet<Token>,
}

impl Multiplexer {
    /// Create a multiplexer collecting up to `capacity` events per wait.
    pub fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(capacity.max(1)),
            watched: HashSet::new(),
        })
    }

    /// Start watching `source`, or change its interest if already watched.
    pub fn register<S>(
        &mut self,
        source: &mut S,
        token: Token,
        interest: ChannelInterest,
    ) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        let registry = self.poll.registry();
        if self.watched.contains(&token) {
            registry.reregister(source, token, interest.as_mio())?;
        } else {
            registry.register(source, token, interest.as_mio())?;
            self.watched.insert(token);
        }
        tracing::trace!(?token, ?interest, "Registered channel");
        Ok(())
    }

    /// Stop watching `source`. Deregistering an unwatched channel is a no-op.
    pub fn deregister<S>(&mut self, source: &mut S, token: Token) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        if !self.watched.remove(&token) {
            return Ok(());
        }
        match self.poll.registry().deregister(source) {
            Ok(()) => {
                tracing::trace!(?token, "Deregistered channel");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Whether `token` is currently watched.
    pub fn is_watched(&self, token: Token) -> bool {
        self.watched.contains(&token)
    }

    /// Tokens of every watched channel.
    pub fn watched(&self) -> impl Iterator<Item = Token> + '_ {
        self.watched.iter().copied()
    }

    /// Create a waker that makes a blocked `wait` return with `token`.
    pub fn waker(&self, token: Token) -> io::Result<Waker> {
        Waker::new(self.poll.registry(), token)
    }

    /// Block until at least one channel is ready.
    ///
    /// Never returns an empty set; interrupted waits are retried.
    pub fn wait(&mut self) -> Result<Vec<Readiness>, RelayError> {
        loop {
            let ready = self.wait_timeout(None)?;
            if !ready.is_empty() {
                return Ok(ready);
            }
        }
    }

    /// Wait at most `timeout` for readiness. May return an empty set.
    pub fn wait_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Vec<Readiness>, RelayError> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(RelayError::Poll(e)),
        }

        let ready: Vec<Readiness> = self
            .events
            .iter()
            .map(|event| Readiness {
                token: event.token(),
                readable: event.is_readable(),
                writable: event.is_writable(),
                read_closed: event.is_read_closed(),
                error: event.is_error(),
            })
            .collect();

        tracing::trace!(count = ready.len(), "Readiness wait returned");
        Ok(ready)
    }
}
