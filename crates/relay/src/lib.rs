//! # ChatRelay Server Library
//!
//! This crate provides the relay server: clients connect over TCP, send
//! UTF-8 text, and every message is rebroadcast, tagged with the sender's
//! address, to every other connected client.
//!
//! ## Overview
//!
//! The server is a single-threaded reactor. One thread waits on a readiness
//! multiplexer, accepts connections and drains readable sockets without a
//! thread per connection:
//!
//! - **Sessions**: one per accepted connection, identified by `host:port`
//! - **Multiplexer**: `mio`-backed readiness wait returning snapshots
//! - **Registry**: the live sessions, kept in lockstep with the multiplexer
//! - **Broadcaster**: fan-out with partial-write handling and per-peer
//!   failure isolation
//! - **Reactor**: the loop tying everything together
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Reactor                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐   │
//! │  │ Multiplexer  │  │   Registry   │  │   Broadcaster    │   │
//! │  │  (mio Poll)  │  │  Token → S   │  │ "<id>:<text>"    │   │
//! │  └──────────────┘  └──────────────┘  └──────────────────┘   │
//! │                                                             │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │          Session (id, stream, inbound buffer)         │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relay::{Config, Reactor};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let addr = config.server.socket_addr()?;
//!
//!     let mut reactor = Reactor::bind(addr, config.reactor.clone())?;
//!     let handle = reactor.handle();
//!
//!     let worker = std::thread::spawn(move || reactor.run());
//!
//!     // ... later, from any thread:
//!     handle.shutdown()?;
//!     worker.join().expect("reactor thread panicked")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`session`]: Per-connection state
//! - [`multiplexer`]: Readiness wait
//! - [`registry`]: Live session set
//! - [`broadcaster`]: Message fan-out
//! - [`reactor`]: The event loop
//! - [`error`]: Error types

pub mod broadcaster;
pub mod config;
pub mod error;
pub mod multiplexer;
pub mod reactor;
pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError, ReactorConfig};

// Re-export core types for convenience
pub use broadcaster::{BroadcastReport, Broadcaster};
pub use error::{RelayError, SessionError};
pub use multiplexer::{ChannelInterest, Multiplexer, Readiness};
pub use reactor::{Reactor, ReactorEvent, ReactorHandle};
pub use registry::Registry;
pub use session::{DisconnectReason, ReadOutcome, Session, SessionId};
