//! Non-blocking read and write helpers.
//!
//! Both helpers work on any `Read`/`Write`, so the same code drives real
//! non-blocking sockets and the in-memory fakes used in tests.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Default number of bytes requested per `read` call during a drain.
pub const DEFAULT_READ_CHUNK: usize = 1024;

/// Default number of consecutive would-block results tolerated by `write_fully`.
pub const DEFAULT_MAX_STALLS: u32 = 1000;

/// Default pause between two would-block retries.
pub const DEFAULT_STALL_BACKOFF: Duration = Duration::from_millis(1);

/// Outcome of draining a readable channel.
#[derive(Debug, Default)]
pub struct Drain {
    /// Bytes appended to the buffer.
    pub read: usize,
    /// The peer performed an orderly shutdown (a read returned zero).
    pub closed: bool,
    /// A read failed with something other than would-block.
    pub error: Option<ProtocolError>,
}

/// Reads everything currently available from `reader` into `buf`.
///
/// Stops at the first would-block, end of stream or hard error. Bytes read
/// before the stop are kept in `buf` in every case.
pub fn drain_available<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    chunk: usize,
) -> Drain {
    let chunk = chunk.max(1);
    let mut drain = Drain::default();

    loop {
        let start = buf.len();
        buf.resize(start + chunk, 0);

        match reader.read(&mut buf[start..]) {
            Ok(0) => {
                buf.truncate(start);
                drain.closed = true;
                break;
            }
            Ok(n) => {
                buf.truncate(start + n);
                drain.read += n;
                tracing::trace!(len = n, "Read data from channel");
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                buf.truncate(start);
                break;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                buf.truncate(start);
            }
            Err(e) => {
                buf.truncate(start);
                drain.error = Some(e.into());
                break;
            }
        }
    }

    drain
}

/// How `write_fully` reacts to a channel that cannot take more bytes yet.
///
/// Only stalls without progress count: every byte accepted resets the
/// counter, so a slow but live peer always gets the whole payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    /// Consecutive would-block results before the write is abandoned.
    pub max_stalls: u32,
    /// Sleep between would-block retries.
    pub stall_backoff: Duration,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            max_stalls: DEFAULT_MAX_STALLS,
            stall_backoff: DEFAULT_STALL_BACKOFF,
        }
    }
}

/// Writes all of `bytes`, looping over partial writes.
///
/// Returns the number of bytes written, which is always `bytes.len()` on
/// success. On [`ProtocolError::Stalled`] the channel holds a truncated
/// prefix of the payload and must not be written to again.
pub fn write_fully<W: Write + ?Sized>(
    writer: &mut W,
    bytes: &[u8],
    policy: &WritePolicy,
) -> Result<usize> {
    let total = bytes.len();
    let mut written = 0;
    let mut stalls = 0u32;

    while written < total {
        match writer.write(&bytes[written..]) {
            Ok(0) => return Err(ProtocolError::WriteZero { written, total }),
            Ok(n) => {
                written += n;
                stalls = 0;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                stalls += 1;
                if stalls > policy.max_stalls {
                    return Err(ProtocolError::Stalled {
                        written,
                        total,
                        stalls: stalls - 1,
                    });
                }
                if !policy.stall_backoff.is_zero() {
                    std::thread::sleep(policy.stall_backoff);
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    // Non-blocking sockets have nothing buffered; this is for wrapped writers.
    match writer.flush() {
        Ok(()) => Ok(written),
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(written),
        Err(e) => Err(e.into()),
    }
}
