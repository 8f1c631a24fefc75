//! Error types for the console client.

use std::io;
use std::net::SocketAddr;

use protocol::ProtocolError;
use relay::RelayError;
use thiserror::Error;

/// Errors that end a client run.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection to the server could not be established.
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Creating the multiplexer or registering the connection failed.
    #[error("Failed to register connection: {0}")]
    Register(#[source] io::Error),

    /// The readiness wait failed.
    #[error(transparent)]
    Multiplexer(#[from] RelayError),

    /// Reading relayed messages from the server failed.
    #[error("Connection to server lost: {0}")]
    Connection(#[source] ProtocolError),

    /// Printing a relayed message failed.
    #[error("Failed to write output: {0}")]
    Output(#[source] io::Error),
}
