//! The relay reactor.
//!
//! One `Reactor` owns the listening socket, the multiplexer, the session
//! registry and the broadcaster, and drives them from a single thread:
//! wait for readiness, take a snapshot of the ready set, dispatch each entry
//! to the accept or read handler, repeat.
//!
//! ```text
//!            ┌──────────────┐
//!            │  Multiplexer │  wait() -> Vec<Readiness>
//!            └──────┬───────┘
//!                   │
//!            ┌──────▼───────┐
//!            │   dispatch   │
//!            └──┬────────┬──┘
//!     LISTENER  │        │  session token
//!        ┌──────▼──┐  ┌──▼─────────────┐
//!        │ accept  │  │ read_available │
//!        └──────┬──┘  └──┬──────────┬──┘
//!               │        │ text     │ close
//!        ┌──────▼──┐  ┌──▼───────┐ ┌▼──────────────┐
//!        │Registry │◄─┤Broadcast │ │ close_session │
//!        └─────────┘  └──────────┘ └───────────────┘
//! ```
//!
//! Sessions are destroyed only in [`Reactor::close_session`], whatever the
//! trigger (end of stream, read error, undecodable bytes, quit sentinel,
//! shutdown).

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Token, Waker};
use protocol::ChatMessage;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crate::broadcaster::Broadcaster;
use crate::config::ReactorConfig;
use crate::error::RelayError;
use crate::multiplexer::{ChannelInterest, Multiplexer, Readiness};
use crate::registry::Registry;
use crate::session::{DisconnectReason, Session, SessionId};

/// Token of the listening socket.
const LISTENER: Token = Token(0);

/// Token of the shutdown waker.
const WAKER: Token = Token(1);

/// First token handed to an accepted connection.
const FIRST_SESSION_TOKEN: usize = 2;

/// Events published by the reactor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactorEvent {
    /// A client connected.
    ClientConnected { id: SessionId },
    /// A client session was destroyed.
    ClientDisconnected {
        id: SessionId,
        reason: DisconnectReason,
    },
    /// A message was fanned out.
    MessageRelayed {
        from: SessionId,
        delivered: usize,
        failed: Vec<SessionId>,
    },
    /// The reactor loop ended and every session was dropped.
    Stopped,
}

/// Thread-safe handle used to stop a running reactor.
#[derive(Clone)]
pub struct ReactorHandle {
    waker: Arc<Waker>,
    shutdown: Arc<AtomicBool>,
}

impl ReactorHandle {
    /// Ask the reactor to stop. The loop exits after the current dispatch.
    pub fn shutdown(&self) -> std::io::Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.waker.wake()
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Single-threaded chat relay.
pub struct Reactor {
    listener: TcpListener,
    local_addr: SocketAddr,
    multiplexer: Multiplexer,
    registry: Registry<TcpStream>,
    broadcaster: Broadcaster,
    config: ReactorConfig,
    next_token: usize,
    waker: Arc<Waker>,
    shutdown: Arc<AtomicBool>,
    event_tx: broadcast::Sender<ReactorEvent>,
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("local_addr", &self.local_addr)
            .field("next_token", &self.next_token)
            .finish_non_exhaustive()
    }
}

impl Reactor {
    /// Bind the listening socket and register it for accept readiness.
    pub fn bind(addr: SocketAddr, config: ReactorConfig) -> Result<Self, RelayError> {
        let mut listener =
            TcpListener::bind(addr).map_err(|source| RelayError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| RelayError::Bind { addr, source })?;

        let mut multiplexer = Multiplexer::new(config.event_capacity).map_err(RelayError::Poll)?;
        multiplexer
            .register(&mut listener, LISTENER, ChannelInterest::Accept)
            .map_err(RelayError::Register)?;
        let waker = Arc::new(multiplexer.waker(WAKER).map_err(RelayError::Register)?);

        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        info!(%local_addr, "Listening for connections");

        Ok(Self {
            listener,
            local_addr,
            multiplexer,
            registry: Registry::new(),
            broadcaster: Broadcaster::new(config.write_policy()),
            config,
            next_token: FIRST_SESSION_TOKEN,
            waker,
            shutdown: Arc::new(AtomicBool::new(false)),
            event_tx,
        })
    }

    /// The address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Subscribe to reactor events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReactorEvent> {
        self.event_tx.subscribe()
    }

    /// A handle that can stop the reactor from another thread.
    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            waker: Arc::clone(&self.waker),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Ids of the live sessions.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.registry.ids()
    }

    /// True when the registry holds exactly the channels the multiplexer
    /// watches, apart from the listener.
    pub fn is_consistent(&self) -> bool {
        let mut watched: Vec<Token> = self
            .multiplexer
            .watched()
            .filter(|token| *token != LISTENER)
            .collect();
        let mut registered = self.registry.tokens();
        watched.sort();
        registered.sort();
        watched == registered && self.multiplexer.is_watched(LISTENER)
    }

    /// Run until shutdown is requested or the multiplexer fails.
    ///
    /// Every session is dropped before returning, in both cases.
    pub fn run(&mut self) -> Result<(), RelayError> {
        info!(addr = %self.local_addr, "Reactor running");

        let result = loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested");
                break Ok(());
            }

            let ready = match self.multiplexer.wait() {
                Ok(ready) => ready,
                Err(e) => {
                    error!(error = %e, "Readiness wait failed, stopping reactor");
                    break Err(e);
                }
            };
            self.dispatch_all(&ready);
        };

        self.close_all(DisconnectReason::Shutdown);
        self.emit(ReactorEvent::Stopped);
        info!("Reactor stopped");
        result
    }

    /// Wait at most `timeout` and dispatch whatever became ready.
    ///
    /// Returns the number of readiness entries handled. Lets a caller drive
    /// the reactor step by step on its own thread.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> Result<usize, RelayError> {
        let ready = self.multiplexer.wait_timeout(timeout)?;
        self.dispatch_all(&ready);
        Ok(ready.len())
    }

    /// Destroy the session registered under `token`.
    ///
    /// Removes it from the registry, stops watching its channel and closes
    /// the connection. Returns false, and emits nothing, if the session was
    /// already gone.
    pub fn close_session(&mut self, token: Token, reason: DisconnectReason) -> bool {
        let Some(mut session) = self.registry.remove(token) else {
            trace!(?token, "Session already closed");
            return false;
        };

        if let Err(e) = self.multiplexer.deregister(session.stream_mut(), token) {
            warn!(session = %session.id(), error = %e, "Failed to deregister session");
        }

        let id = session.id().clone();
        let connected_for = session.connected_at().elapsed();
        drop(session.into_stream());

        info!(session = %id, %reason, ?connected_for, "Client disconnected");
        self.emit(ReactorEvent::ClientDisconnected { id, reason });
        true
    }

    fn close_all(&mut self, reason: DisconnectReason) {
        for token in self.registry.tokens() {
            self.close_session(token, reason.clone());
        }
    }

    /// Dispatch a snapshot of ready channels. Handlers may add or remove
    /// sessions; later entries for a removed session are ignored.
    fn dispatch_all(&mut self, ready: &[Readiness]) {
        for readiness in ready {
            self.dispatch(*readiness);
        }
    }

    fn dispatch(&mut self, readiness: Readiness) {
        match readiness.token {
            LISTENER => self.accept_pending(),
            WAKER => trace!("Reactor woken"),
            token => self.handle_readable(token),
        }
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => self.add_session(stream, peer_addr),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset
                    ) =>
                {
                    warn!(error = %e, "Transient accept error");
                    continue;
                }
                Err(e) => {
                    // Left for the next readiness cycle.
                    error!(error = %e, "Error accepting connection");
                    break;
                }
            }
        }
    }

    fn add_session(&mut self, mut stream: TcpStream, peer_addr: SocketAddr) {
        let token = Token(self.next_token);
        self.next_token += 1;

        let id = SessionId::from_peer(peer_addr);
        if let Err(e) = self
            .multiplexer
            .register(&mut stream, token, ChannelInterest::Read)
        {
            warn!(session = %id, error = %e, "Failed to register connection, dropping it");
            return;
        }

        self.registry.insert(Session::new(id.clone(), token, stream));
        info!(session = %id, ?token, "Client connected");
        self.emit(ReactorEvent::ClientConnected { id });
    }

    fn handle_readable(&mut self, token: Token) {
        let chunk = self.config.read_chunk_size;
        let Some(session) = self.registry.get_mut(token) else {
            trace!(?token, "Readiness for a closed session ignored");
            return;
        };

        let id = session.id().clone();
        let outcome = session.read_available(chunk);

        if let Some(text) = outcome.text {
            debug!(session = %id, len = text.len(), "Relaying message");
            let message = ChatMessage::new(id.as_str(), text);
            let report = self.broadcaster.broadcast(&mut self.registry, &message);
            self.emit(ReactorEvent::MessageRelayed {
                from: id,
                delivered: report.delivered_count(),
                failed: report.failed_ids(),
            });

            // A stalled peer holds a truncated payload and never gets a read
            // event to clean it up, so it goes now that the pass is over.
            for peer in report.stalled_ids() {
                if let Some(peer_token) = self.registry.find_by_id(&peer) {
                    self.close_session(peer_token, DisconnectReason::WriteStalled);
                }
            }
        }

        if let Some(reason) = outcome.close {
            self.close_session(token, reason);
        }
    }

    fn emit(&self, event: ReactorEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}
