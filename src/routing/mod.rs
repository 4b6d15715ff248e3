//! Message routing subsystem.
//!
//! # Data Flow
//! ```text
//! Complete inbound frame (payload, sender id)
//!     → broadcast.rs (BroadcastRouter::route)
//!     → encode frame once
//!     → enqueue on every other open connection's outbound queue
//!     → those connections now want write
//! ```
//!
//! # Design Decisions
//! - Fire-and-forget multicast: no acknowledgement, no retry
//! - Routing only touches queues; writing is the multiplexer's job

pub mod broadcast;

pub use broadcast::{BroadcastRouter, Delivery};
