//! Error types for the relay server.

use std::io;
use std::net::SocketAddr;

use protocol::ProtocolError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that end the reactor or prevent it from starting.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Waiting on the readiness multiplexer failed. Fatal to the reactor loop.
    #[error("readiness wait failed: {0}")]
    Poll(#[source] io::Error),

    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },

    /// A channel could not be registered with the multiplexer.
    #[error("failed to register channel: {0}")]
    Register(#[source] io::Error),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failures scoped to a single session.
///
/// These never leave the reactor: the affected session is destroyed and the
/// loop carries on with the others.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Read, write or accept failed on this connection.
    #[error("session I/O failed: {0}")]
    Io(ProtocolError),

    /// The received bytes were not valid UTF-8.
    #[error("session sent undecodable bytes: {0}")]
    Decode(ProtocolError),
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Decode(_) => SessionError::Decode(err),
            other => SessionError::Io(other),
        }
    }
}
