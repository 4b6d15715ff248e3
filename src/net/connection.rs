//! Connection state machine and per-connection I/O.
//!
//! # Responsibilities
//! - Track connection state (Connecting → Open → Closing → Closed)
//! - Identify connections by a registry-assigned integer, never by the stream
//! - Assemble inbound frames from arbitrary read chunks
//! - Hold the FIFO of outbound frames and write them across partial writes

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use mio::Token;

use crate::error::{ReadError, WriteError};
use crate::net::codec::FrameDecoder;
use crate::net::stream::ByteStream;

/// Poller tokens below this value are reserved for the listener and waker.
const FIRST_CONNECTION_TOKEN: usize = 2;

/// Unique identifier for a connection.
///
/// Assigned from a monotonically increasing counter owned by the registry and
/// never reused, so a closed connection's identity cannot be mistaken for a
/// later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The poller token this connection is registered under.
    pub fn token(&self) -> Token {
        Token(self.0 as usize + FIRST_CONNECTION_TOKEN)
    }

    /// Map a poller token back to a connection, if it names one.
    pub fn from_token(token: Token) -> Option<Self> {
        token
            .0
            .checked_sub(FIRST_CONNECTION_TOKEN)
            .map(|raw| Self(raw as u64))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connect or handshake in progress; not yet visible to routing.
    Connecting,
    /// Established; reads are routed and queued frames are written.
    Open,
    /// A close was decided; no further I/O is issued.
    Closing,
    /// Stream released. Terminal.
    Closed,
}

/// Result of draining a readable stream.
#[derive(Debug, Default)]
pub struct ReadBatch {
    /// Complete payloads, in arrival order.
    pub frames: Vec<Vec<u8>>,
    /// Set when the connection must close; frames completed before the
    /// failure are still delivered.
    pub error: Option<ReadError>,
}

/// One peer's stream, address and outbound queue.
#[derive(Debug)]
pub struct Connection<S> {
    id: ConnectionId,
    peer_addr: SocketAddr,
    stream: S,
    state: ConnectionState,
    decoder: FrameDecoder,
    outbound: VecDeque<Arc<[u8]>>,
    /// Bytes of the head frame already written.
    head_written: usize,
    /// Whether the poller currently has WRITABLE registered for us.
    write_registered: bool,
}

impl<S: ByteStream> Connection<S> {
    /// Wrap an established stream.
    pub fn new(id: ConnectionId, peer_addr: SocketAddr, stream: S, max_frame_len: usize) -> Self {
        Self {
            id,
            peer_addr,
            stream,
            state: ConnectionState::Open,
            decoder: FrameDecoder::new(max_frame_len),
            outbound: VecDeque::new(),
            head_written: 0,
            write_registered: false,
        }
    }

    /// Wrap a stream whose connect or handshake has not finished.
    pub fn connecting(
        id: ConnectionId,
        peer_addr: SocketAddr,
        stream: S,
        max_frame_len: usize,
    ) -> Self {
        Self {
            state: ConnectionState::Connecting,
            ..Self::new(id, peer_addr, stream, max_frame_len)
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Mark a `Connecting` connection as established.
    pub fn mark_open(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Open;
        }
    }

    /// Begin closing; the queue is discarded and no more I/O is issued.
    pub fn begin_close(&mut self) {
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Closing;
            self.outbound.clear();
            self.head_written = 0;
        }
    }

    /// Release the connection, returning its stream so the caller can
    /// deregister and drop it.
    pub fn finish_close(mut self) -> S {
        self.begin_close();
        self.state = ConnectionState::Closed;
        self.stream
    }

    /// Append an encoded frame to the outbound queue.
    ///
    /// Ignored unless the connection is `Open` or `Connecting`.
    pub fn enqueue(&mut self, frame: Arc<[u8]>) {
        if matches!(self.state, ConnectionState::Open | ConnectionState::Connecting) {
            self.outbound.push_back(frame);
        }
    }

    /// Number of frames waiting to be written (including a partly written head).
    pub fn queued(&self) -> usize {
        self.outbound.len()
    }

    /// Frames waiting to be written, head first.
    pub fn outbound(&self) -> impl Iterator<Item = &[u8]> {
        self.outbound.iter().map(|frame| &frame[..])
    }

    /// Write interest: true iff there is something to put on the wire.
    pub fn wants_write(&self) -> bool {
        self.state == ConnectionState::Open
            && (!self.outbound.is_empty() || self.stream.has_pending_output())
    }

    pub fn write_registered(&self) -> bool {
        self.write_registered
    }

    pub fn set_write_registered(&mut self, registered: bool) {
        self.write_registered = registered;
    }

    /// Read until the stream would block, decoding frames as they complete.
    ///
    /// Each read requests at most `buf.len()` bytes.
    pub fn read_frames(&mut self, buf: &mut [u8]) -> ReadBatch {
        let mut batch = ReadBatch::default();
        if self.state != ConnectionState::Open {
            return batch;
        }

        loop {
            match self.stream.read(buf) {
                Ok(0) => {
                    batch.error = Some(ReadError::Eof);
                    break;
                }
                Ok(n) => {
                    if let Err(err) = self.decoder.feed(&buf[..n], &mut batch.frames) {
                        batch.error = Some(err);
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    batch.error = Some(ReadError::Io(err));
                    break;
                }
            }
        }
        batch
    }

    /// Write queued frames in order until the queue is empty or the stream
    /// would block. Returns the number of frames fully written.
    ///
    /// A frame is dequeued only after its last byte was accepted; a partial
    /// write leaves it at the head with its progress recorded.
    pub fn flush_outbound(&mut self) -> Result<usize, WriteError> {
        if self.state != ConnectionState::Open {
            return Ok(0);
        }

        let mut completed = 0;
        while let Some(head) = self.outbound.front() {
            match self.stream.write(&head[self.head_written..]) {
                Ok(0) => return Err(WriteError::Zero),
                Ok(n) => {
                    self.head_written += n;
                    if self.head_written == head.len() {
                        self.outbound.pop_front();
                        self.head_written = 0;
                        completed += 1;
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WriteError::Io(err)),
            }
        }

        match self.stream.flush() {
            Ok(()) => Ok(completed),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(completed),
            Err(err) => Err(WriteError::Io(err)),
        }
    }
}
