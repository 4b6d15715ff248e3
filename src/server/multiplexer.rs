//! The server's readiness multiplexer.
//!
//! One thread, one poller. Each iteration:
//!
//! ```text
//! poll (bounded by poll_timeout, interrupted by the shutdown waker)
//!     → accept phase: drain the listener, register new streams
//!     → read phase: drain readable connections, route complete frames
//!     → write phase: flush every connection with queued output
//!     → expire stale TLS handshakes
//!     → re-sync WRITABLE registration with each connection's queue
//! ```
//!
//! Any failure on one connection closes that connection only.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};

use crate::config::ChatConfig;
use crate::error::{CloseReason, HandshakeError, ServerError};
use crate::lifecycle::Shutdown;
use crate::net::connection::{Connection, ConnectionId};
use crate::net::listener::bind_listener;
use crate::net::registry::Registry;
use crate::net::stream::Stream;
use crate::net::tls::{TlsAcceptor, TlsStream};
use crate::observability::ChatObserver;
use crate::routing::BroadcastRouter;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);

/// Limits and sizes the loop runs with, copied out of the configuration.
#[derive(Debug, Clone, Copy)]
struct Limits {
    max_connections: usize,
    max_frame_len: usize,
    poll_timeout: Duration,
    handshake_timeout: Duration,
    events_capacity: usize,
}

/// A TLS stream whose handshake has not finished. Not yet routable.
struct PendingHandshake {
    peer_addr: SocketAddr,
    stream: Box<TlsStream>,
    started: Instant,
}

/// Broadcast chat server.
pub struct ChatServer {
    poll: Poll,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    registry: Registry<Stream>,
    handshakes: HashMap<ConnectionId, PendingHandshake>,
    router: BroadcastRouter,
    tls: Option<TlsAcceptor>,
    shutdown: Shutdown,
    observer: Arc<dyn ChatObserver>,
    recv_buf: Vec<u8>,
    limits: Limits,
}

impl ChatServer {
    /// Bind the listening socket and set up the poller.
    ///
    /// Fails with [`ServerError::Listen`] if the address cannot be resolved or
    /// bound. No connection is accepted until [`run`](Self::run).
    pub fn bind(
        config: &ChatConfig,
        tls: Option<TlsAcceptor>,
        shutdown: Shutdown,
        observer: Arc<dyn ChatObserver>,
    ) -> Result<Self, ServerError> {
        let (mut listener, local_addr) = bind_listener(&config.network)?;

        let poll = Poll::new().map_err(ServerError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(ServerError::Poll)?;
        let waker = Waker::new(poll.registry(), WAKER).map_err(ServerError::Poll)?;
        shutdown.subscribe(Arc::new(waker));

        observer.listening(local_addr);

        Ok(Self {
            poll,
            listener: Some(listener),
            local_addr,
            registry: Registry::new(Arc::clone(&observer)),
            handshakes: HashMap::new(),
            router: BroadcastRouter::new(config.server.max_queued_messages),
            tls,
            shutdown,
            observer,
            recv_buf: vec![0; config.network.recv_buffer_size],
            limits: Limits {
                max_connections: config.server.max_connections,
                max_frame_len: config.network.max_frame_len,
                poll_timeout: config.network.poll_timeout(),
                handshake_timeout: config.server.handshake_timeout(),
                events_capacity: config.server.events_capacity,
            },
        })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Open connections, not counting handshakes in progress.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Run until shutdown is triggered.
    ///
    /// Returns `Ok(())` after a clean shutdown, or an error if the poller
    /// itself fails. Per-connection failures never end the loop.
    pub fn run(&mut self) -> Result<(), ServerError> {
        let mut events = Events::with_capacity(self.limits.events_capacity);

        while !self.shutdown.is_triggered() {
            self.turn(&mut events)?;
        }

        self.close_everything();
        Ok(())
    }

    /// One iteration: poll, then accept, read, write and re-arm.
    fn turn(&mut self, events: &mut Events) -> Result<(), ServerError> {
        match self.poll.poll(events, Some(self.limits.poll_timeout)) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(()),
            Err(err) => return Err(ServerError::Poll(err)),
        }
        if self.shutdown.is_triggered() {
            return Ok(());
        }

        if events.iter().any(|event| event.token() == LISTENER) {
            self.accept_all();
        }

        for event in events.iter() {
            if let Some(id) = ConnectionId::from_token(event.token()) {
                self.on_connection_event(id, event);
            }
        }

        self.flush_writable();
        self.expire_handshakes();
        self.sync_interest();
        Ok(())
    }

    #[cfg(test)]
    fn write_registered(&self, id: ConnectionId) -> Option<bool> {
        self.registry.get(id).map(|connection| connection.write_registered())
    }

    fn accept_all(&mut self) {
        loop {
            let Some(listener) = self.listener.as_ref() else {
                return;
            };
            match listener.accept() {
                Ok((stream, peer_addr)) => self.admit(stream, peer_addr),
                Err(err) if err.kind() == ErrorKind::WouldBlock => return,
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::Interrupted | ErrorKind::ConnectionAborted
                    ) =>
                {
                    continue
                }
                Err(err) => {
                    self.observer.accept_failed(&err);
                    return;
                }
            }
        }
    }

    fn admit(&mut self, mut stream: TcpStream, peer_addr: SocketAddr) {
        if self.registry.len() + self.handshakes.len() >= self.limits.max_connections {
            self.observer
                .connection_rejected(peer_addr, "connection limit reached");
            return;
        }
        let _ = stream.set_nodelay(true);

        let id = self.registry.allocate_id();
        match self.tls.as_ref() {
            None => {
                if let Err(err) =
                    self.poll
                        .registry()
                        .register(&mut stream, id.token(), Interest::READABLE)
                {
                    self.observer
                        .connection_rejected(peer_addr, &format!("register failed: {err}"));
                    return;
                }
                self.registry.insert(Connection::new(
                    id,
                    peer_addr,
                    Stream::Plain(stream),
                    self.limits.max_frame_len,
                ));
            }
            Some(acceptor) => {
                let mut tls = match acceptor.accept(stream) {
                    Ok(tls) => Box::new(tls),
                    Err(err) => {
                        self.observer.handshake_failed(id, peer_addr, &err);
                        return;
                    }
                };
                if let Err(err) = self.poll.registry().register(
                    tls.as_mut(),
                    id.token(),
                    Interest::READABLE | Interest::WRITABLE,
                ) {
                    self.observer
                        .handshake_failed(id, peer_addr, &HandshakeError::Io(err));
                    return;
                }
                self.handshakes.insert(
                    id,
                    PendingHandshake {
                        peer_addr,
                        stream: tls,
                        started: Instant::now(),
                    },
                );
                self.drive_handshake(id);
            }
        }
    }

    fn on_connection_event(&mut self, id: ConnectionId, event: &Event) {
        if self.handshakes.contains_key(&id) {
            self.drive_handshake(id);
        } else if event.is_readable() || event.is_read_closed() || event.is_error() {
            self.read_connection(id);
        }
    }

    /// Advance a staged handshake; promote it into the registry on success.
    fn drive_handshake(&mut self, id: ConnectionId) {
        let Some(pending) = self.handshakes.get_mut(&id) else {
            return;
        };
        let outcome = pending.stream.advance_handshake();
        match outcome {
            Ok(false) => {}
            Ok(true) => {
                let Some(pending) = self.handshakes.remove(&id) else {
                    return;
                };
                let mut connection = Connection::connecting(
                    id,
                    pending.peer_addr,
                    Stream::Tls(pending.stream),
                    self.limits.max_frame_len,
                );
                // The handshake registration included WRITABLE.
                connection.set_write_registered(true);
                self.registry.insert(connection);
                // The final handshake flight may have carried application data.
                self.read_connection(id);
            }
            Err(err) => {
                if let Some(mut pending) = self.handshakes.remove(&id) {
                    self.observer
                        .handshake_failed(id, pending.peer_addr, &err);
                    let _ = self.poll.registry().deregister(pending.stream.as_mut());
                }
            }
        }
    }

    fn read_connection(&mut self, id: ConnectionId) {
        let Some(connection) = self.registry.get_mut(id) else {
            return;
        };
        let batch = connection.read_frames(&mut self.recv_buf);

        for payload in &batch.frames {
            let delivery = self.router.route(&mut self.registry, id, payload);
            for slow in delivery.overflowed {
                self.close(slow, CloseReason::QueueFull(self.router.max_queued()));
            }
        }
        if let Some(err) = batch.error {
            self.close(id, CloseReason::Read(err));
        }
    }

    /// Write phase. A connection that is not writable just reports
    /// would-block and keeps its queue.
    fn flush_writable(&mut self) {
        let mut failed = Vec::new();
        for connection in self.registry.iter_mut() {
            if !connection.wants_write() {
                continue;
            }
            if let Err(err) = connection.flush_outbound() {
                failed.push((connection.id(), err));
            }
        }
        for (id, err) in failed {
            self.close(id, CloseReason::Write(err));
        }
    }

    fn expire_handshakes(&mut self) {
        let timeout = self.limits.handshake_timeout;
        let expired: Vec<ConnectionId> = self
            .handshakes
            .iter()
            .filter(|(_, pending)| pending.started.elapsed() >= timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(mut pending) = self.handshakes.remove(&id) {
                let err = HandshakeError::Timeout(timeout.as_millis() as u64);
                self.observer.handshake_failed(id, pending.peer_addr, &err);
                let _ = self.poll.registry().deregister(pending.stream.as_mut());
            }
        }
    }

    /// Register WRITABLE exactly for connections that want to write.
    fn sync_interest(&mut self) {
        let mut failed = Vec::new();
        for connection in self.registry.iter_mut() {
            let wants_write = connection.wants_write();
            if wants_write == connection.write_registered() {
                continue;
            }
            let interest = if wants_write {
                Interest::READABLE | Interest::WRITABLE
            } else {
                Interest::READABLE
            };
            let token = connection.id().token();
            match self
                .poll
                .registry()
                .reregister(connection.stream_mut(), token, interest)
            {
                Ok(()) => connection.set_write_registered(wants_write),
                Err(err) => failed.push((connection.id(), err)),
            }
        }
        for (id, err) in failed {
            self.close(id, CloseReason::Register(err));
        }
    }

    fn close(&mut self, id: ConnectionId, reason: CloseReason) {
        if let Some(mut stream) = self.registry.close(id, reason) {
            let _ = self.poll.registry().deregister(&mut stream);
        }
    }

    fn close_everything(&mut self) {
        self.observer
            .shutting_down(self.registry.len() + self.handshakes.len());

        if let Some(mut listener) = self.listener.take() {
            let _ = self.poll.registry().deregister(&mut listener);
        }
        for (_, mut pending) in self.handshakes.drain() {
            let _ = self.poll.registry().deregister(pending.stream.as_mut());
        }
        for mut stream in self.registry.close_all(|| CloseReason::Shutdown) {
            let _ = self.poll.registry().deregister(&mut stream);
        }
    }
}

impl std::fmt::Debug for ChatServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatServer")
            .field("local_addr", &self.local_addr)
            .field("connections", &self.registry.len())
            .field("handshakes", &self.handshakes.len())
            .field("tls", &self.tls.is_some())
            .finish()
    }
}
