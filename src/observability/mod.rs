//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! ChatServer / Registry / ChatClient
//!     → observer.rs (ChatObserver trait, injected at construction)
//!         → TracingObserver
//!             → tracing events → logging.rs subscriber (stderr, optional file)
//!             → metrics.rs (counters, gauges, histograms)
//!                 → optional Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - The core reports through the injected observer only
//! - Subscriber and exporter are installed by the binary, never by the library
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
pub mod observer;

pub use observer::{ChatObserver, TracingObserver};
