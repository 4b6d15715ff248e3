//! Chat server.
//!
//! # Data Flow
//! ```text
//! ChatServer::bind (listener + poller + shutdown waker)
//!     → ChatServer::run (multiplexer.rs event loop)
//!         → accept: plain streams go straight to the registry,
//!           TLS streams are staged until their handshake completes
//!         → read: frames decoded per connection, routed by BroadcastRouter
//!         → write: outbound queues flushed in FIFO order
//! ```
//!
//! # Design Decisions
//! - Single-threaded: all connection state is owned by the loop, no locks
//! - Shutdown is the only cross-thread input, delivered through a mio waker

mod multiplexer;

pub use multiplexer::ChatServer;
