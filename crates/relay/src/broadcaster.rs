//! Message fan-out.
//!
//! Writes a tagged message to every session except its sender, looping over
//! partial writes until each peer has the whole payload. A failed peer is
//! reported and skipped; the registry is never mutated while a broadcast is
//! in progress. Dead peers are torn down by their own read-ready event,
//! stalled peers by the reactor once the pass is over.

use std::io::Write;

use protocol::{write_fully, ChatMessage, ProtocolError, WritePolicy};

use crate::registry::Registry;
use crate::session::SessionId;

/// Per-peer results of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers that received the full payload.
    pub delivered: Vec<SessionId>,
    /// Peers whose write failed, with the reason.
    pub failed: Vec<(SessionId, ProtocolError)>,
}

impl BroadcastReport {
    /// Number of peers that received the message.
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }

    /// Ids of the peers whose write failed.
    pub fn failed_ids(&self) -> Vec<SessionId> {
        self.failed.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Ids of the peers that stopped accepting bytes partway through.
    ///
    /// Unlike other failures these peers are still connected, so their
    /// streams now end in a truncated payload.
    pub fn stalled_ids(&self) -> Vec<SessionId> {
        self.failed
            .iter()
            .filter(|(_, err)| matches!(err, ProtocolError::Stalled { .. }))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Fans messages out to the registry.
#[derive(Debug, Clone, Default)]
pub struct Broadcaster {
    policy: WritePolicy,
}

impl Broadcaster {
    /// Creates a broadcaster that flushes every peer under `policy`.
    pub fn new(policy: WritePolicy) -> Self {
        Self { policy }
    }

    /// Send `message` to every session whose id differs from its sender.
    ///
    /// Each peer gets the whole payload, across any number of partial writes.
    /// Never fails: per-peer errors end up in the report.
    pub fn broadcast<S: Write>(
        &self,
        registry: &mut Registry<S>,
        message: &ChatMessage,
    ) -> BroadcastReport {
        let payload = message.encode();
        let mut report = BroadcastReport::default();

        for token in registry.tokens() {
            let Some(session) = registry.get_mut(token) else {
                continue;
            };
            if session.id().as_str() == message.sender {
                continue;
            }

            let id = session.id().clone();
            match write_fully(session.stream_mut(), &payload, &self.policy) {
                Ok(written) => {
                    tracing::trace!(peer = %id, bytes = written, "Delivered message");
                    report.delivered.push(id);
                }
                Err(err) => {
                    tracing::warn!(peer = %id, error = %err, "Failed to deliver message");
                    report.failed.push((id, err));
                }
            }
        }

        tracing::debug!(
            from = %message.sender,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Broadcast complete"
        );
        report
    }
}
