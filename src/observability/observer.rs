//! Observer dependency for the event loops.
//!
//! The server, registry and client report what happens to connections through
//! a [`ChatObserver`] handed to them at construction. [`TracingObserver`] is
//! the production implementation: structured `tracing` events plus metrics.

use std::io;
use std::net::SocketAddr;

use crate::error::{CloseReason, HandshakeError};
use crate::net::connection::ConnectionId;
use crate::observability::metrics;

/// Receives connection lifecycle and routing events.
///
/// All methods have empty defaults so observers only implement what they use.
pub trait ChatObserver: Send + Sync {
    fn listening(&self, _addr: SocketAddr) {}

    fn connection_opened(&self, _id: ConnectionId, _peer: SocketAddr) {}

    fn connection_closed(&self, _id: ConnectionId, _peer: SocketAddr, _reason: &CloseReason) {}

    /// An accepted stream was dropped before getting an identity.
    fn connection_rejected(&self, _peer: SocketAddr, _reason: &str) {}

    /// The listener failed to accept; accepting resumes on the next readiness.
    fn accept_failed(&self, _error: &io::Error) {}

    fn handshake_failed(&self, _id: ConnectionId, _peer: SocketAddr, _error: &HandshakeError) {}

    fn message_routed(&self, _sender: ConnectionId, _len: usize, _recipients: usize) {}

    fn shutting_down(&self, _open_connections: usize) {}
}

/// Observer that emits `tracing` events and updates metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ChatObserver for TracingObserver {
    fn listening(&self, addr: SocketAddr) {
        tracing::info!(address = %addr, "Listening for connections");
    }

    fn connection_opened(&self, id: ConnectionId, peer: SocketAddr) {
        tracing::info!(connection_id = %id, peer_addr = %peer, "Connection opened");
        metrics::connection_opened();
    }

    fn connection_closed(&self, id: ConnectionId, peer: SocketAddr, reason: &CloseReason) {
        if reason.is_clean() {
            tracing::info!(connection_id = %id, peer_addr = %peer, %reason, "Connection closed");
        } else {
            tracing::warn!(connection_id = %id, peer_addr = %peer, %reason, "Connection dropped");
        }
        metrics::connection_closed(reason.is_clean());
    }

    fn connection_rejected(&self, peer: SocketAddr, reason: &str) {
        tracing::warn!(peer_addr = %peer, reason, "Connection rejected");
        metrics::connection_rejected();
    }

    fn accept_failed(&self, error: &io::Error) {
        tracing::error!(%error, "Accept failed");
    }

    fn handshake_failed(&self, id: ConnectionId, peer: SocketAddr, error: &HandshakeError) {
        tracing::warn!(connection_id = %id, peer_addr = %peer, %error, "TLS handshake failed");
        metrics::handshake_failed();
    }

    fn message_routed(&self, sender: ConnectionId, len: usize, recipients: usize) {
        tracing::debug!(connection_id = %sender, len, recipients, "Message routed");
        metrics::message_routed(len, recipients);
    }

    fn shutting_down(&self, open_connections: usize) {
        tracing::info!(open_connections, "Shutting down");
    }
}
