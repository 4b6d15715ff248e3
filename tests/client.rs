//! Channel-based client and TLS tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use broadcast_chat::error::{
    ClientError, ConnectError, HandshakeError, PayloadTooLarge, SendError,
};
use broadcast_chat::net::tls::{TlsAcceptor, TlsConnector};
use broadcast_chat::{ChatClient, ChatConfig, ClientChannels, Shutdown};

mod common;

use common::{connect, read_frame, self_signed, test_config, write_frame, EventLog, TestServer};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn client_config(server: &TestServer) -> ChatConfig {
    let mut config = test_config();
    config.network.port = server.addr.port();
    config
}

/// Connect, split and start the network loop on a blocking thread.
fn start_client(
    config: &ChatConfig,
    connector: Option<TlsConnector>,
) -> (
    ClientChannels,
    tokio::task::JoinHandle<Result<(), ClientError>>,
) {
    let client = ChatClient::connect(config, connector, Arc::new(EventLog::default())).unwrap();
    let (channels, network) = client.split();
    let handle = tokio::task::spawn_blocking(move || network.run());
    (channels, handle)
}

#[tokio::test]
async fn test_scenario_b_connect_without_server_fails() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let mut config = test_config();
    config.network.port = port;

    let err = ChatClient::connect(&config, None, Arc::new(EventLog::default())).unwrap_err();
    assert!(matches!(err, ClientError::Connect(ConnectError::Connect { .. })));
}

#[tokio::test]
async fn test_clients_exchange_messages_over_channels() {
    let server = TestServer::start(test_config());
    let config = client_config(&server);
    let (alice, alice_loop) = start_client(&config, None);
    let (mut bob, bob_loop) = start_client(&config, None);
    server.wait_for_opened(2);

    alice.outbound.send("hi bob").unwrap();
    alice.outbound.send("are you there?").unwrap();

    assert_eq!(
        timeout(RECV_TIMEOUT, bob.inbound.recv()).await.unwrap(),
        Some(b"hi bob".to_vec())
    );
    assert_eq!(
        timeout(RECV_TIMEOUT, bob.inbound.recv()).await.unwrap(),
        Some(b"are you there?".to_vec())
    );

    drop(alice);
    assert!(timeout(RECV_TIMEOUT, alice_loop).await.unwrap().unwrap().is_ok());
    drop(bob);
    assert!(timeout(RECV_TIMEOUT, bob_loop).await.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn test_client_interoperates_with_raw_peer() {
    let server = TestServer::start(test_config());
    let config = client_config(&server);
    let (mut client, _loop) = start_client(&config, None);
    let mut raw = connect(server.addr);
    server.wait_for_opened(2);

    write_frame(&mut raw, b"from raw");
    assert_eq!(
        timeout(RECV_TIMEOUT, client.inbound.recv()).await.unwrap(),
        Some(b"from raw".to_vec())
    );

    client.outbound.send("from client").unwrap();
    let reply = tokio::task::spawn_blocking(move || read_frame(&mut raw))
        .await
        .unwrap();
    assert_eq!(reply, b"from client");
}

#[tokio::test]
async fn test_client_loop_ends_when_server_shuts_down() {
    let server = TestServer::start(test_config());
    let config = client_config(&server);
    let (mut channels, network) = start_client(&config, None);
    server.wait_for_opened(1);

    assert!(server.stop().is_ok());

    assert!(timeout(RECV_TIMEOUT, network).await.unwrap().unwrap().is_ok());
    assert_eq!(timeout(RECV_TIMEOUT, channels.inbound.recv()).await.unwrap(), None);
    assert!(channels.outbound.send("too late").is_err());
}

#[tokio::test]
async fn test_client_loop_stops_on_shutdown() {
    let server = TestServer::start(test_config());
    let config = client_config(&server);
    let client = ChatClient::connect(&config, None, Arc::new(EventLog::default())).unwrap();
    let (_channels, network) = client.split();
    let shutdown = Shutdown::new();
    let network = network.with_shutdown(shutdown.clone());
    let handle = tokio::task::spawn_blocking(move || network.run());
    server.wait_for_opened(1);

    shutdown.trigger();
    assert!(timeout(RECV_TIMEOUT, handle).await.unwrap().unwrap().is_ok());
    wait_closed(&server);
}

#[tokio::test]
async fn test_oversized_send_is_refused_and_connection_survives() {
    let server = TestServer::start(test_config());
    let config = client_config(&server);
    let max = config.network.max_frame_len;
    let (alice, _alice_loop) = start_client(&config, None);
    let (mut bob, _bob_loop) = start_client(&config, None);
    server.wait_for_opened(2);

    assert_eq!(
        alice.outbound.send(vec![1u8; max + 1]),
        Err(SendError::TooLarge(PayloadTooLarge { len: max + 1, max }))
    );
    alice.outbound.send(vec![2u8; max]).unwrap();
    alice.outbound.send("after").unwrap();

    assert_eq!(
        timeout(RECV_TIMEOUT, bob.inbound.recv()).await.unwrap(),
        Some(vec![2u8; max])
    );
    assert_eq!(
        timeout(RECV_TIMEOUT, bob.inbound.recv()).await.unwrap(),
        Some(b"after".to_vec())
    );
    assert_eq!(server.log.count("closed"), 0);
}

fn wait_closed(server: &TestServer) {
    common::wait_until(|| server.log.count("closed") == 1);
}

#[tokio::test]
async fn test_tls_clients_exchange_messages() {
    let (cert, key) = self_signed();
    let acceptor = TlsAcceptor::from_pem(cert.as_bytes(), key.as_bytes()).unwrap();
    let server = TestServer::start_with_tls(test_config(), Some(acceptor));
    let config = client_config(&server);

    let connector = TlsConnector::from_pem(cert.as_bytes(), "localhost").unwrap();
    let (mut alice, _alice_loop) = start_client(&config, Some(connector.clone()));
    let (mut bob, _bob_loop) = start_client(&config, Some(connector));
    server.wait_for_opened(2);

    alice.outbound.send("encrypted hello").unwrap();
    assert_eq!(
        timeout(RECV_TIMEOUT, bob.inbound.recv()).await.unwrap(),
        Some(b"encrypted hello".to_vec())
    );

    bob.outbound.send("encrypted reply").unwrap();
    assert_eq!(
        timeout(RECV_TIMEOUT, alice.inbound.recv()).await.unwrap(),
        Some(b"encrypted reply".to_vec())
    );
}

#[tokio::test]
async fn test_tls_untrusted_server_fails_handshake() {
    let (cert, key) = self_signed();
    let (other_ca, _) = self_signed();
    let acceptor = TlsAcceptor::from_pem(cert.as_bytes(), key.as_bytes()).unwrap();
    let server = TestServer::start_with_tls(test_config(), Some(acceptor));
    let config = client_config(&server);

    let connector = TlsConnector::from_pem(other_ca.as_bytes(), "localhost").unwrap();
    let err = ChatClient::connect(&config, Some(connector), Arc::new(EventLog::default()))
        .unwrap_err();
    assert!(matches!(err, ClientError::Handshake(HandshakeError::Tls(_))));

    common::wait_until(|| server.log.count("handshake failed") == 1);
    assert_eq!(server.log.count("opened"), 0);
}

#[tokio::test]
async fn test_tls_handshake_times_out_on_silent_peer() {
    let (cert, key) = self_signed();
    let acceptor = TlsAcceptor::from_pem(cert.as_bytes(), key.as_bytes()).unwrap();
    let mut config = test_config();
    config.server.handshake_timeout_ms = 100;
    let server = TestServer::start_with_tls(config, Some(acceptor));

    let _silent = connect(server.addr);
    common::wait_until(|| {
        server
            .log
            .events()
            .iter()
            .any(|e| e.starts_with("handshake failed") && e.contains("did not complete"))
    });
}
