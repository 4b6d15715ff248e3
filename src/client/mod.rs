//! Chat client.
//!
//! # Data Flow
//! ```text
//! console / caller
//!     → OutboundSender::send (any thread; queues + wakes the poller)
//!     → NetworkLoop::run (network thread)
//!         → outbound FIFO → frames on the wire
//!         → frames off the wire → inbound channel
//!     → console / caller
//! ```
//!
//! # Design Decisions
//! - Connecting (and the TLS handshake) happens before any channel exists,
//!   so setup failures surface as errors from `connect`
//! - The network thread never calls presentation code; it only publishes
//!   payloads on the inbound channel
//! - Messages the server would refuse are rejected by `send`, before they can
//!   cost the connection

pub mod console;
mod network;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::ChatConfig;
use crate::error::{
    ClientError, ConnectError, HandshakeError, PayloadTooLarge, SendError,
};
use crate::net::connection::{Connection, ConnectionId};
use crate::net::stream::Stream;
use crate::net::tls::{TlsConnector, TlsStream};
use crate::observability::ChatObserver;

pub use network::NetworkLoop;

pub(crate) const CONNECTION: Token = Token(0);
pub(crate) const WAKER: Token = Token(1);

/// Identity the client uses for its single connection in observer events.
const CLIENT_CONNECTION_ID: ConnectionId = ConnectionId::new(0);

/// Thread-safe handle for queuing outbound messages.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    tx: UnboundedSender<Vec<u8>>,
    waker: Arc<Waker>,
    max_frame_len: usize,
}

impl OutboundSender {
    pub(crate) fn new(
        tx: UnboundedSender<Vec<u8>>,
        waker: Arc<Waker>,
        max_frame_len: usize,
    ) -> Self {
        Self {
            tx,
            waker,
            max_frame_len,
        }
    }

    /// Queue one message and wake the network loop.
    ///
    /// Payloads longer than `network.max_frame_len` are refused: the server
    /// closes any connection that announces such a frame.
    pub fn send(&self, payload: impl Into<Vec<u8>>) -> Result<(), SendError> {
        let payload = payload.into();
        if payload.len() > self.max_frame_len {
            return Err(PayloadTooLarge {
                len: payload.len(),
                max: self.max_frame_len,
            }
            .into());
        }
        self.tx.send(payload).map_err(|_| SendError::Closed)?;
        // A failed wake only delays delivery until the next poll timeout.
        let _ = self.waker.wake();
        Ok(())
    }
}

/// The application side of a split client.
#[derive(Debug)]
pub struct ClientChannels {
    pub outbound: OutboundSender,
    pub inbound: UnboundedReceiver<Vec<u8>>,
}

/// A connected (and, with TLS, handshaken) client.
pub struct ChatClient {
    poll: Poll,
    waker: Arc<Waker>,
    connection: Connection<Stream>,
    observer: Arc<dyn ChatObserver>,
    recv_buffer_size: usize,
    max_frame_len: usize,
    poll_timeout: Duration,
}

impl ChatClient {
    /// Connect to `config.network.host:config.network.port`.
    ///
    /// The connect is bounded by `client.connect_timeout_ms`; with a
    /// connector the TLS handshake must also finish within that window.
    pub fn connect(
        config: &ChatConfig,
        connector: Option<TlsConnector>,
        observer: Arc<dyn ChatObserver>,
    ) -> Result<Self, ClientError> {
        let network = &config.network;
        let timeout = config.client.connect_timeout();

        let address = network.socket_addr().map_err(|source| ConnectError::Resolve {
            address: network.address(),
            source,
        })?;
        let connect_failed = |source| ConnectError::Connect { address, source };
        let std_stream =
            std::net::TcpStream::connect_timeout(&address, timeout).map_err(connect_failed)?;
        std_stream.set_nonblocking(true).map_err(connect_failed)?;
        let _ = std_stream.set_nodelay(true);
        let sock = TcpStream::from_std(std_stream);

        let mut poll = Poll::new().map_err(ClientError::Poll)?;
        let connection = match connector {
            None => {
                let mut sock = sock;
                poll.registry()
                    .register(&mut sock, CONNECTION, Interest::READABLE)
                    .map_err(ClientError::Poll)?;
                Connection::connecting(
                    CLIENT_CONNECTION_ID,
                    address,
                    Stream::Plain(sock),
                    network.max_frame_len,
                )
            }
            Some(connector) => {
                let mut tls = Box::new(connector.connect(sock)?);
                poll.registry()
                    .register(
                        tls.as_mut(),
                        CONNECTION,
                        Interest::READABLE | Interest::WRITABLE,
                    )
                    .map_err(ClientError::Poll)?;
                complete_handshake(&mut poll, &mut tls, timeout)?;
                let mut connection = Connection::connecting(
                    CLIENT_CONNECTION_ID,
                    address,
                    Stream::Tls(tls),
                    network.max_frame_len,
                );
                connection.set_write_registered(true);
                connection
            }
        };
        Self::finish_connect(poll, connection, config, observer)
    }

    fn finish_connect(
        poll: Poll,
        mut connection: Connection<Stream>,
        config: &ChatConfig,
        observer: Arc<dyn ChatObserver>,
    ) -> Result<Self, ClientError> {
        let waker = Arc::new(Waker::new(poll.registry(), WAKER).map_err(ClientError::Poll)?);
        connection.mark_open();
        observer.connection_opened(connection.id(), connection.peer_addr());

        Ok(Self {
            poll,
            waker,
            connection,
            observer,
            recv_buffer_size: config.network.recv_buffer_size,
            max_frame_len: config.network.max_frame_len,
            poll_timeout: config.network.poll_timeout(),
        })
    }

    /// The server address this client is connected to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.connection.peer_addr()
    }

    /// Separate the application channels from the network loop.
    pub fn split(self) -> (ClientChannels, NetworkLoop) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let channels = ClientChannels {
            outbound: OutboundSender::new(
                outbound_tx,
                Arc::clone(&self.waker),
                self.max_frame_len,
            ),
            inbound: inbound_rx,
        };
        (channels, NetworkLoop::new(self, outbound_rx, inbound_tx))
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("peer_addr", &self.connection.peer_addr())
            .field("state", &self.connection.state())
            .finish()
    }
}

/// Drive a client handshake to completion, polling between steps.
fn complete_handshake(
    poll: &mut Poll,
    tls: &mut TlsStream,
    timeout: Duration,
) -> Result<(), HandshakeError> {
    let deadline = Instant::now() + timeout;
    let mut events = Events::with_capacity(8);
    loop {
        if tls.advance_handshake()? {
            return Ok(());
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(HandshakeError::Timeout(timeout.as_millis() as u64));
        }
        match poll.poll(&mut events, Some(remaining)) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => return Err(HandshakeError::Io(err)),
        }
    }
}
