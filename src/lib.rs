//! Broadcast chat server and client library

pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod server;

pub use client::{ChatClient, ClientChannels, NetworkLoop, OutboundSender};
pub use config::schema::ChatConfig;
pub use lifecycle::Shutdown;
pub use server::ChatServer;
