//! Error taxonomy for the chat service.
//!
//! # Propagation
//! - `ListenError`, `ConnectError` and `TlsSetupError` only occur at startup
//!   and are fatal to the process.
//! - `HandshakeError` rejects a candidate connection before it is registered.
//! - `ReadError` and `WriteError` are isolated to one connection, which is
//!   closed; every other connection keeps running.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to open the listening socket.
#[derive(Debug, Error)]
pub enum ListenError {
    /// The configured host/port did not resolve to a socket address.
    #[error("cannot resolve bind address {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: io::Error,
    },

    /// `bind(2)` or `listen(2)` failed.
    #[error("failed to listen on {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Failure to establish the client's initial connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("cannot resolve server address {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Transport-security negotiation failure.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("TLS protocol error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("I/O error during handshake: {0}")]
    Io(#[from] io::Error),

    #[error("peer closed the connection during handshake")]
    PeerClosed,

    #[error("handshake did not complete within {0} ms")]
    Timeout(u64),
}

/// Failure while loading certificate material.
#[derive(Debug, Error)]
pub enum TlsSetupError {
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificates found in PEM data")]
    NoCertificates,

    #[error("no private key found in PEM data")]
    NoPrivateKey,

    #[error("malformed PEM data: {0}")]
    Pem(io::Error),

    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("invalid TLS server name: {0}")]
    InvalidServerName(String),

    #[error("TLS is enabled but {0} is not configured")]
    Missing(&'static str),
}

/// A read-side failure on one connection.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Zero-length read: the peer closed its side of the stream.
    #[error("peer closed the stream")]
    Eof,

    #[error("read failed: {0}")]
    Io(#[source] io::Error),

    /// The peer announced a frame larger than the configured limit.
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
}

/// A payload that cannot travel as one frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("message of {len} bytes exceeds limit of {max} bytes")]
pub struct PayloadTooLarge {
    pub len: usize,
    pub max: usize,
}

/// A message the client refused to queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The server would drop the connection on a frame this long.
    #[error(transparent)]
    TooLarge(#[from] PayloadTooLarge),

    #[error("client network loop has stopped")]
    Closed,
}

/// A write-side failure on one connection.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("stream accepted zero bytes")]
    Zero,

    #[error("write failed: {0}")]
    Io(#[source] io::Error),
}

/// Why a connection left the registry.
#[derive(Debug, Error)]
pub enum CloseReason {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("poller registration failed: {0}")]
    Register(#[source] io::Error),

    /// The recipient stopped draining its queue.
    #[error("outbound queue reached {0} messages")]
    QueueFull(usize),

    #[error("server shutting down")]
    Shutdown,

    #[error("closed locally")]
    Local,
}

impl CloseReason {
    /// A clean close is one the peer or the local side asked for.
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            CloseReason::Read(ReadError::Eof) | CloseReason::Shutdown | CloseReason::Local
        )
    }
}

/// Errors that stop the server before or during `run()`.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listen(#[from] ListenError),

    #[error("poller failure: {0}")]
    Poll(#[source] io::Error),
}

/// Errors that stop the client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("poller failure: {0}")]
    Poll(#[source] io::Error),
}
