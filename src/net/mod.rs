//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (socket2 bind, backlog, non-blocking)
//!     → tls.rs (optional, handshake driven by the event loop)
//!     → stream.rs (Stream: plain or TLS, same byte-stream contract)
//!     → connection.rs (state machine, frame decoding, outbound queue)
//!     → registry.rs (identity, interest sets)
//!
//! Connection States:
//!     Connecting → Open → Closing → Closed
//! ```
//!
//! # Design Decisions
//! - Messages are length-prefixed frames (codec.rs); the stream is not
//!   assumed to preserve write boundaries
//! - Connections are identified by registry-assigned integers
//! - TLS is optional and invisible once established

pub mod codec;
pub mod connection;
pub mod listener;
pub mod registry;
pub mod stream;
pub mod tls;

pub use codec::{encode_frame, FrameDecoder, FRAME_HEADER_SIZE};
pub use connection::{Connection, ConnectionId, ConnectionState};
pub use listener::bind_listener;
pub use registry::Registry;
pub use stream::{ByteStream, Stream};
pub use tls::{TlsAcceptor, TlsConnector, TlsStream};
