//! Registry of live sessions.
//!
//! Keyed by the multiplexer token of each connection so that readiness
//! events map straight to their session. The listening channel never has an
//! entry here.

use std::collections::HashMap;

use mio::Token;

use crate::session::{Session, SessionId};

/// Every currently open session known to the reactor.
pub struct Registry<S> {
    sessions: HashMap<Token, Session<S>>,
}

impl<S> Registry<S> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Adds a session. Returns the session previously stored under the same
    /// token, which would indicate a token reuse bug in the caller.
    pub fn insert(&mut self, session: Session<S>) -> Option<Session<S>> {
        self.sessions.insert(session.token(), session)
    }

    /// Removes and returns the session for `token`.
    ///
    /// A second removal of the same token returns `None`.
    pub fn remove(&mut self, token: Token) -> Option<Session<S>> {
        self.sessions.remove(&token)
    }

    /// Returns the session for `token` mutably.
    pub fn get_mut(&mut self, token: Token) -> Option<&mut Session<S>> {
        self.sessions.get_mut(&token)
    }

    /// Finds the token of the session with display tag `id`.
    pub fn find_by_id(&self, id: &SessionId) -> Option<Token> {
        self.sessions
            .values()
            .find(|s| s.id() == id)
            .map(|s| s.token())
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of every registered token.
    pub fn tokens(&self) -> Vec<Token> {
        self.sessions.keys().copied().collect()
    }

    /// Snapshot of every session id.
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.values().map(|s| s.id().clone()).collect()
    }

    /// Iterates over sessions mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session<S>> {
        self.sessions.values_mut()
    }
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}
