//! Single-connection client reactor.

use std::io::{BufRead, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use mio::net::TcpStream;
use mio::{Token, Waker};
use protocol::{
    decode_prefix, drain_available, ProtocolError, WritePolicy, DEFAULT_READ_CHUNK,
};
use relay::{ChannelInterest, Multiplexer, ReactorConfig};

use crate::error::ClientError;
use crate::input::{forward_input, InputEnd};
use crate::sender::ClientSender;

const SERVER: Token = Token(0);
const WAKER: Token = Token(1);

/// Tuning for the client loop.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Events collected per readiness wait.
    pub event_capacity: usize,
    /// Bytes per read call while draining the connection.
    pub read_chunk_size: usize,
    /// Policy for flushing outbound lines.
    pub write_policy: WritePolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            event_capacity: 16,
            read_chunk_size: DEFAULT_READ_CHUNK,
            write_policy: WritePolicy::default(),
        }
    }
}

impl From<&ReactorConfig> for ClientOptions {
    fn from(config: &ReactorConfig) -> Self {
        Self {
            event_capacity: config.event_capacity,
            read_chunk_size: config.read_chunk_size,
            write_policy: config.write_policy(),
        }
    }
}

/// Why [`ChatClient::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// The user sent the quit sentinel.
    Quit,
    /// The server closed the connection.
    ServerClosed,
}

/// A console chat client bound to one server.
pub struct ChatClient {
    multiplexer: Multiplexer,
    stream: TcpStream,
    server_addr: SocketAddr,
    waker: Arc<Waker>,
    quit: Arc<AtomicBool>,
    options: ClientOptions,
}

impl ChatClient {
    /// Start connecting to `addr`. The handshake completes inside [`run`](Self::run).
    pub fn connect(addr: SocketAddr, options: ClientOptions) -> Result<Self, ClientError> {
        let mut multiplexer =
            Multiplexer::new(options.event_capacity).map_err(ClientError::Register)?;
        let mut stream = TcpStream::connect(addr)
            .map_err(|source| ClientError::Connect { addr, source })?;
        multiplexer
            .register(&mut stream, SERVER, ChannelInterest::Connect)
            .map_err(ClientError::Register)?;
        let waker = Arc::new(multiplexer.waker(WAKER).map_err(ClientError::Register)?);

        tracing::debug!(%addr, "Connecting");
        Ok(Self {
            multiplexer,
            stream,
            server_addr: addr,
            waker,
            quit: Arc::new(AtomicBool::new(false)),
            options,
        })
    }

    /// Address of the server.
    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Local endpoint of the connection; the server tags our messages with it.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    /// Run until the user quits or the server goes away.
    ///
    /// Once connected, lines from `input` are forwarded on a separate
    /// thread and every relayed chunk is printed to `output` on its own line.
    pub fn run<R, W>(mut self, input: R, output: &mut W) -> Result<ClientExit, ClientError>
    where
        R: BufRead + Send + 'static,
        W: Write + ?Sized,
    {
        self.finish_connect()?;

        let mut stream = self.stream;
        self.multiplexer
            .register(&mut stream, SERVER, ChannelInterest::Read)
            .map_err(ClientError::Register)?;
        let stream = Arc::new(stream);

        let sender = ClientSender::new(
            Arc::clone(&stream),
            Arc::clone(&self.waker),
            Arc::clone(&self.quit),
            self.options.write_policy,
        );
        let input_thread = spawn_input(input, sender);

        tracing::info!(server = %self.server_addr, "Connected");

        let mut inbound = Vec::with_capacity(self.options.read_chunk_size);
        let exit = 'outer: loop {
            for ready in self.multiplexer.wait()? {
                match ready.token {
                    WAKER => {
                        if self.quit.load(Ordering::SeqCst) {
                            break 'outer ClientExit::Quit;
                        }
                    }
                    SERVER => {
                        let chunk = self.options.read_chunk_size;
                        if let Some(exit) = receive(&*stream, &mut inbound, chunk, output)? {
                            break 'outer exit;
                        }
                    }
                    token => tracing::trace!(?token, "Ignoring unknown token"),
                }
            }
        };

        // After quit the input thread has already returned. When the server
        // closed first it may still be blocked reading the console.
        if exit == ClientExit::Quit {
            if let Ok(Err(e)) = input_thread.join() {
                tracing::debug!(error = %e, "Input forwarding ended with error");
            }
        }

        tracing::info!(?exit, "Disconnected");
        Ok(exit)
    }

    /// Wait for the pending connect to succeed or fail.
    fn finish_connect(&mut self) -> Result<(), ClientError> {
        let addr = self.server_addr;
        loop {
            for ready in self.multiplexer.wait()? {
                if ready.token != SERVER {
                    continue;
                }
                if let Some(source) = self
                    .stream
                    .take_error()
                    .map_err(|source| ClientError::Connect { addr, source })?
                {
                    return Err(ClientError::Connect { addr, source });
                }
                match self.stream.peer_addr() {
                    Ok(_) => return Ok(()),
                    Err(e) if e.kind() == ErrorKind::NotConnected => continue,
                    Err(source) => return Err(ClientError::Connect { addr, source }),
                }
            }
        }
    }
}

fn spawn_input<R>(input: R, mut sender: ClientSender) -> JoinHandle<Result<InputEnd, ProtocolError>>
where
    R: BufRead + Send + 'static,
{
    std::thread::spawn(move || {
        let result = forward_input(input, &mut sender);
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Failed to send input");
        }
        result
    })
}

/// Drain the connection and print what arrived.
///
/// A character cut off at the end of a drain stays in `inbound` until the
/// rest of it arrives. Returns `Some` when the connection has ended.
fn receive<R, W>(
    mut reader: R,
    inbound: &mut Vec<u8>,
    chunk: usize,
    output: &mut W,
) -> Result<Option<ClientExit>, ClientError>
where
    R: Read,
    W: Write + ?Sized,
{
    let drain = drain_available(&mut reader, inbound, chunk);

    if drain.read > 0 {
        let text = match decode_prefix(inbound) {
            Ok((text, used)) => {
                inbound.drain(..used);
                text
            }
            Err(e) => {
                tracing::debug!(error = %e, "Printing undecodable bytes lossily");
                let text = String::from_utf8_lossy(inbound).into_owned();
                inbound.clear();
                text
            }
        };
        if !text.is_empty() {
            writeln!(output, "{}", text).map_err(ClientError::Output)?;
            output.flush().map_err(ClientError::Output)?;
        }
    }

    if let Some(err) = drain.error {
        return match err {
            ProtocolError::ConnectionClosed(_) => Ok(Some(ClientExit::ServerClosed)),
            other => Err(ClientError::Connection(other)),
        };
    }
    if drain.closed {
        return Ok(Some(ClientExit::ServerClosed));
    }
    Ok(None)
}
