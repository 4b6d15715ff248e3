//! TCP listener setup.
//!
//! # Responsibilities
//! - Resolve the configured host and port
//! - Bind with address reuse and the configured accept backlog
//! - Hand back a non-blocking listener ready for the poller

use std::net::SocketAddr;

use mio::net::TcpListener;
use socket2::{Domain, Protocol, Socket, Type};

use crate::config::NetworkConfig;
use crate::error::ListenError;

/// Bind a non-blocking listener on `config.host:config.port`.
///
/// Returns the listener and the address it actually bound, which differs from
/// the configured one when port 0 was requested.
pub fn bind_listener(config: &NetworkConfig) -> Result<(TcpListener, SocketAddr), ListenError> {
    let addr = config.socket_addr().map_err(|source| ListenError::Resolve {
        address: config.address(),
        source,
    })?;

    let bind = |addr: SocketAddr| -> std::io::Result<std::net::TcpListener> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(i32::try_from(config.backlog).unwrap_or(i32::MAX))?;
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    };

    let std_listener = bind(addr).map_err(|source| ListenError::Bind {
        address: addr,
        source,
    })?;
    let local_addr = std_listener
        .local_addr()
        .map_err(|source| ListenError::Bind {
            address: addr,
            source,
        })?;

    Ok((TcpListener::from_std(std_listener), local_addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(host: &str, port: u16) -> NetworkConfig {
        NetworkConfig {
            host: host.to_string(),
            port,
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn binds_ephemeral_port() {
        let (_listener, addr) = bind_listener(&network("127.0.0.1", 0)).unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn port_in_use_is_a_bind_error() {
        let (_first, addr) = bind_listener(&network("127.0.0.1", 0)).unwrap();
        // Address reuse does not allow two active listeners on one port.
        let err = bind_listener(&network("127.0.0.1", addr.port())).unwrap_err();
        assert!(matches!(err, ListenError::Bind { .. }));
    }

    #[test]
    fn unresolvable_host_is_a_resolve_error() {
        let err = bind_listener(&network("no such host", 9000)).unwrap_err();
        assert!(matches!(err, ListenError::Resolve { .. }));
    }
}
