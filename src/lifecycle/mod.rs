//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config (validated by the binary) → TLS material → metrics
//!         → bind / connect → event loop on a blocking thread
//!
//! Shutdown (shutdown.rs):
//!     trigger() → wake every subscribed poller → loops close their
//!     connections and return
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then TLS, then sockets
//! - Shutdown is a flag plus wakers, usable from any thread or task

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::StartupError;
