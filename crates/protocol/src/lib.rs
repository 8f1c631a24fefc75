//! # ChatRelay Protocol Library
//!
//! Wire-level primitives shared by the relay server and the console client.
//!
//! ## Overview
//!
//! The protocol is deliberately thin:
//!
//! - **Messages**: raw UTF-8 text with no framing or length prefix
//! - **Tagging**: relayed text is prefixed with `"<sender>:"`
//! - **Quit sentinel**: the exact text `quit` ends the sender's session
//! - **I/O helpers**: drain a non-blocking reader, flush a payload across
//!   partial writes
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        ChatMessage (sender, text)       │  "<sender>:<text>"
//! ├─────────────────────────────────────────┤
//! │     drain_available / write_fully       │  non-blocking bursts
//! ├─────────────────────────────────────────┤
//! │          Stream transport (TCP)         │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{decode_prefix, write_fully, ChatMessage, WritePolicy};
//!
//! let (text, _) = decode_prefix(b"hello").unwrap();
//! let message = ChatMessage::new("127.0.0.1:40112", text);
//!
//! let mut sink = Vec::new();
//! write_fully(&mut sink, &message.encode(), &WritePolicy::default()).unwrap();
//! assert_eq!(sink, b"127.0.0.1:40112:hello");
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Message tagging, decoding and the quit sentinel
//! - [`io`]: Drain and write helpers for non-blocking channels
//! - [`error`]: Error types

pub mod error;
pub mod io;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use io::{
    drain_available, write_fully, Drain, WritePolicy, DEFAULT_MAX_STALLS, DEFAULT_READ_CHUNK,
    DEFAULT_STALL_BACKOFF,
};
pub use messages::{decode_prefix, is_quit, ChatMessage, QUIT_SENTINEL, TAG_SEPARATOR};
