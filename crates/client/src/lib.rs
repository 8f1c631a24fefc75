//! # ChatRelay Console Client
//!
//! Connects to a relay server, forwards console lines and prints every
//! message other clients send.
//!
//! ## Overview
//!
//! - **ChatClient**: a single-connection reactor. It completes the
//!   non-blocking connect, then waits for relayed messages and prints each
//!   received chunk on its own line.
//! - **ClientSender**: writes lines to the server. Empty lines are skipped;
//!   the quit sentinel is sent and then stops the client.
//! - **Input forwarding**: a blocking console reader on its own thread.
//!
//! ## Example
//!
//! ```rust,no_run
//! use chat_client::{ChatClient, ClientOptions};
//!
//! fn main() -> anyhow::Result<()> {
//!     let client = ChatClient::connect("127.0.0.1:8888".parse()?, ClientOptions::default())?;
//!     let stdin = std::io::BufReader::new(std::io::stdin());
//!     client.run(stdin, &mut std::io::stdout())?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod input;
pub mod sender;

pub use client::{ChatClient, ClientExit, ClientOptions};
pub use error::ClientError;
pub use input::{forward_input, InputEnd, LineSink};
pub use sender::{ClientSender, SendOutcome};
