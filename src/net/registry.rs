//! Connection registry.
//!
//! # Responsibilities
//! - Own every open connection, keyed by `ConnectionId`
//! - Hand out identities from a monotonically increasing counter
//! - Derive the read-interest and write-interest sets
//! - Report opens and closes to the injected observer
//!
//! # Invariants
//! - Every entry is `Open`; closing removes the entry in the same call
//! - A connection is in write-interest iff it has something to write
//! - Identities are never reused, so no two entries share one

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::CloseReason;
use crate::net::connection::{Connection, ConnectionId};
use crate::net::stream::ByteStream;
use crate::observability::ChatObserver;

/// Arena of live connections.
///
/// Iteration is in identity order, which is also join order.
pub struct Registry<S> {
    connections: BTreeMap<ConnectionId, Connection<S>>,
    next_id: u64,
    observer: Arc<dyn ChatObserver>,
}

impl<S: ByteStream> Registry<S> {
    pub fn new(observer: Arc<dyn ChatObserver>) -> Self {
        Self {
            connections: BTreeMap::new(),
            next_id: 0,
            observer,
        }
    }

    /// Reserve a fresh identity. Reserved identities that never get inserted
    /// (e.g. a failed handshake) are simply skipped.
    pub fn allocate_id(&mut self) -> ConnectionId {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add an open connection.
    pub fn insert(&mut self, mut connection: Connection<S>) {
        connection.mark_open();
        let id = connection.id();
        self.observer.connection_opened(id, connection.peer_addr());
        self.connections.insert(id, connection);
    }

    /// Take a connection out of the registry and close it.
    ///
    /// The caller receives the stream so it can deregister it from the poller
    /// before dropping it. Returns `None` if `id` is not registered.
    pub fn close(&mut self, id: ConnectionId, reason: CloseReason) -> Option<S> {
        let mut connection = self.connections.remove(&id)?;
        // Undelivered messages go down with the connection.
        connection.begin_close();
        self.observer
            .connection_closed(id, connection.peer_addr(), &reason);
        Some(connection.finish_close())
    }

    /// Close every connection, returning their streams.
    pub fn close_all(&mut self, reason: fn() -> CloseReason) -> Vec<S> {
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        ids.into_iter()
            .filter_map(|id| self.close(id, reason()))
            .collect()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection<S>> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection<S>> {
        self.connections.get_mut(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection<S>> {
        self.connections.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection<S>> {
        self.connections.values_mut()
    }

    /// Connections polled for readability.
    pub fn read_interest(&self) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| c.is_open())
            .map(|c| c.id())
            .collect()
    }

    /// Connections polled for writability: exactly those with pending output.
    pub fn write_interest(&self) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| c.wants_write())
            .map(|c| c.id())
            .collect()
    }

    pub fn observer(&self) -> &Arc<dyn ChatObserver> {
        &self.observer
    }
}
