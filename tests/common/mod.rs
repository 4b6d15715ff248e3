//! Shared utilities for integration testing.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use broadcast_chat::config::ChatConfig;
use broadcast_chat::error::{CloseReason, HandshakeError, ServerError};
use broadcast_chat::net::tls::TlsAcceptor;
use broadcast_chat::net::ConnectionId;
use broadcast_chat::observability::ChatObserver;
use broadcast_chat::{ChatServer, Shutdown};

/// Observer that records lifecycle events as strings.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

impl ChatObserver for EventLog {
    fn connection_opened(&self, id: ConnectionId, _peer: SocketAddr) {
        self.push(format!("opened {id}"));
    }

    fn connection_closed(&self, id: ConnectionId, _peer: SocketAddr, reason: &CloseReason) {
        self.push(format!("closed {id}: {reason}"));
    }

    fn connection_rejected(&self, _peer: SocketAddr, reason: &str) {
        self.push(format!("rejected: {reason}"));
    }

    fn handshake_failed(&self, id: ConnectionId, _peer: SocketAddr, error: &HandshakeError) {
        self.push(format!("handshake failed {id}: {error}"));
    }
}

/// A chat server running on its own thread, bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub log: Arc<EventLog>,
    handle: Option<JoinHandle<Result<(), ServerError>>>,
}

impl TestServer {
    pub fn start(config: ChatConfig) -> Self {
        Self::start_with_tls(config, None)
    }

    pub fn start_with_tls(config: ChatConfig, tls: Option<TlsAcceptor>) -> Self {
        let shutdown = Shutdown::new();
        let log = Arc::new(EventLog::default());
        let mut server = ChatServer::bind(&config, tls, shutdown.clone(), log.clone()).unwrap();
        let addr = server.local_addr();
        let handle = thread::spawn(move || server.run());
        Self {
            addr,
            shutdown,
            log,
            handle: Some(handle),
        }
    }

    /// Block until the server has opened `n` connections in total.
    pub fn wait_for_opened(&self, n: usize) {
        wait_until(|| self.log.count("opened") >= n);
    }

    /// Trigger shutdown and return the loop's result.
    pub fn stop(mut self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        self.handle.take().unwrap().join().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Defaults with an ephemeral port and a short poll timeout.
pub fn test_config() -> ChatConfig {
    let mut config = ChatConfig::default();
    config.network.host = "127.0.0.1".to_string();
    config.network.port = 0;
    config.network.poll_timeout_ms = 20;
    config
}

/// Raw TCP peer with a generous read timeout.
pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.set_nodelay(true).unwrap();
    stream
}

pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = (payload.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

pub fn write_frame(stream: &mut TcpStream, payload: &[u8]) {
    stream.write_all(&frame(payload)).unwrap();
}

pub fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).unwrap();
    let mut payload = vec![0u8; u32::from_be_bytes(header) as usize];
    stream.read_exact(&mut payload).unwrap();
    payload
}

/// Assert nothing arrives within `wait`.
#[allow(dead_code)]
pub fn assert_silent(stream: &mut TcpStream, wait: Duration) {
    stream.set_read_timeout(Some(wait)).unwrap();
    let mut byte = [0u8; 1];
    match stream.read(&mut byte) {
        Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
        other => panic!("expected silence, got {other:?}"),
    }
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
}

/// Assert the server closed the stream.
#[allow(dead_code)]
pub fn assert_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 64];
    match stream.read(&mut buf) {
        Ok(0) => {}
        Err(err) if matches!(err.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted) => {}
        other => panic!("expected closed stream, got {other:?}"),
    }
}

pub fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("condition not met within 5s");
}

/// Self-signed certificate and key for `localhost`, PEM encoded.
#[allow(dead_code)]
pub fn self_signed() -> (String, String) {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    (cert.pem(), key_pair.serialize_pem())
}
