//! Live connection addressing.
//!
//! The registry only knows how to reach each connection; it never owns audio.
//! Broadcasts iterate a [`ConnectionRegistry::snapshot`], never the live map,
//! so connects and disconnects that land mid-broadcast cannot disturb a pass
//! already in flight.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Identifier assigned to each WebSocket connection when it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Set of live connections and the sink used to reach each one.
#[derive(Debug)]
pub struct ConnectionRegistry<S> {
    connections: HashMap<ConnectionId, S>,
}

impl<S> Default for ConnectionRegistry<S> {
    fn default() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }
}

impl<S: Clone> ConnectionRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns `false` if the id was already present
    /// (the sink is replaced either way).
    pub fn insert(&mut self, id: ConnectionId, sink: S) -> bool {
        self.connections.insert(id, sink).is_none()
    }

    pub fn remove(&mut self, id: &ConnectionId) -> bool {
        self.connections.remove(id).is_some()
    }

    /// Remove every listed connection, returning the sinks that were present.
    pub fn remove_all(&mut self, ids: &[ConnectionId]) -> Vec<S> {
        ids.iter().filter_map(|id| self.connections.remove(id)).collect()
    }

    #[cfg(test)]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Point-in-time copy of every connection for a broadcast pass.
    pub fn snapshot(&self) -> Vec<(ConnectionId, S)> {
        self.connections
            .iter()
            .map(|(id, sink)| (*id, sink.clone()))
            .collect()
    }
}
