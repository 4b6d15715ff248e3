//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the chat
//! service. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Root configuration for the chat service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ChatConfig {
    /// Addressing and per-socket I/O settings shared by both modes.
    pub network: NetworkConfig,

    /// Server-only settings.
    pub server: ServerConfig,

    /// Client-only settings.
    pub client: ClientConfig,

    /// Transport security material.
    pub tls: TlsConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Bind address (server) or connect address (client).
    pub host: String,

    /// TCP port. `0` lets the server pick an ephemeral port.
    pub port: u16,

    /// Maximum pending connections held by the listening socket.
    pub backlog: u32,

    /// Bytes requested per receive call.
    pub recv_buffer_size: usize,

    /// Maximum wait per multiplexer iteration, in milliseconds.
    pub poll_timeout_ms: u64,

    /// Largest accepted frame payload, in bytes.
    pub max_frame_len: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            backlog: 5,
            recv_buffer_size: 4096,
            poll_timeout_ms: 100,
            max_frame_len: 64 * 1024,
        }
    }
}

impl NetworkConfig {
    /// `host:port` as written in the configuration.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve the configured host and port to the first socket address.
    pub fn socket_addr(&self) -> io::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} resolved to no addresses", self.address()),
                )
            })
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Maximum live plus handshaking connections.
    pub max_connections: usize,

    /// Deadline for a TLS handshake to complete, in milliseconds.
    pub handshake_timeout_ms: u64,

    /// Readiness events fetched per poll.
    pub events_capacity: usize,

    /// Frames a recipient may have waiting before it is disconnected as a
    /// slow consumer.
    pub max_queued_messages: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            handshake_timeout_ms: 10_000,
            events_capacity: 256,
            max_queued_messages: 4096,
        }
    }
}

impl ServerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Deadline for the initial connect (and handshake), in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// TLS configuration.
///
/// The server presents `cert_path`/`key_path`; the client trusts `ca_path`
/// and expects the peer to identify as `server_name`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,

    /// Path to certificate chain file (PEM).
    pub cert_path: Option<String>,

    /// Path to private key file (PEM).
    pub key_path: Option<String>,

    /// Path to trusted certificate bundle (PEM).
    pub ca_path: Option<String>,

    /// Expected peer identity; defaults to the connect host.
    pub server_name: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter directives used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Optional file the logs are appended to, in addition to stderr.
    pub log_file: Option<String>,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Address of the Prometheus scrape endpoint.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "broadcast_chat=info".to_string(),
            log_file: None,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9100".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: ChatConfig = toml::from_str("").unwrap();
        assert_eq!(config.network.port, 9000);
        assert_eq!(config.network.backlog, 5);
        assert!(!config.tls.enabled);
        assert!(config.observability.log_file.is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: ChatConfig = toml::from_str(
            r#"
            [network]
            port = 7000

            [tls]
            enabled = true
            ca_path = "ca.pem"
            "#,
        )
        .unwrap();
        assert_eq!(config.network.port, 7000);
        assert_eq!(config.network.recv_buffer_size, 4096);
        assert!(config.tls.enabled);
        assert_eq!(config.tls.ca_path.as_deref(), Some("ca.pem"));
        assert_eq!(config.server.max_connections, 1024);
    }

    #[test]
    fn loopback_address_resolves() {
        let network = NetworkConfig {
            port: 4242,
            ..NetworkConfig::default()
        };
        let addr = network.socket_addr().unwrap();
        assert_eq!(addr.port(), 4242);
        assert!(addr.ip().is_loopback());
    }
}
