//! Startup orchestration.
//!
//! # Responsibilities
//! - Build TLS material from configuration
//! - Start the metrics exporter when enabled
//! - Run the server or client event loop on a blocking thread
//! - Wire OS signals to the shutdown primitive
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The event loops are synchronous; the async runtime only hosts signals,
//!   the console and the blocking threads

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinError;

use crate::client::{console, ChatClient};
use crate::config::{ChatConfig, ObservabilityConfig};
use crate::error::{ClientError, ServerError, TlsSetupError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::net::tls::{TlsAcceptor, TlsConnector};
use crate::observability::{metrics, ChatObserver};
use crate::server::ChatServer;

/// Errors that abort startup or end a run abnormally.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsSetupError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("metrics exporter failed: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("event loop task failed: {0}")]
    Task(#[from] JoinError),
}

/// Install the Prometheus exporter if metrics are enabled.
pub fn start_metrics(config: &ObservabilityConfig) -> Result<(), StartupError> {
    if !config.metrics_enabled {
        return Ok(());
    }
    let addr: SocketAddr = config
        .metrics_address
        .parse()
        .map_err(|_| StartupError::MetricsAddress(config.metrics_address.clone()))?;
    metrics::init_metrics(addr)?;
    Ok(())
}

/// Run the server until SIGINT/SIGTERM.
pub async fn serve(config: ChatConfig, observer: Arc<dyn ChatObserver>) -> Result<(), StartupError> {
    let tls = TlsAcceptor::from_config(&config.tls)?;
    let shutdown = Shutdown::new();
    let mut server = ChatServer::bind(&config, tls, shutdown.clone(), observer)?;

    tokio::spawn(signals::shutdown_on_signal(shutdown));

    tokio::task::spawn_blocking(move || server.run()).await??;
    tracing::info!("Server stopped");
    Ok(())
}

/// Connect, then run the console until stdin closes, the server goes away,
/// or SIGINT/SIGTERM arrives.
pub async fn chat(config: ChatConfig, observer: Arc<dyn ChatObserver>) -> Result<(), StartupError> {
    let connector = TlsConnector::from_config(&config.tls, &config.network.host)?;
    let client = tokio::task::spawn_blocking(move || {
        ChatClient::connect(&config, connector, observer)
    })
    .await??;
    tracing::info!(peer_addr = %client.peer_addr(), "Connected");

    let shutdown = Shutdown::new();
    let (channels, network) = client.split();
    let network = network.with_shutdown(shutdown.clone());
    let network_task = tokio::task::spawn_blocking(move || network.run());

    tokio::select! {
        _ = console::run_console(channels.outbound, channels.inbound) => {}
        _ = signals::wait_for_signal() => {}
    }
    shutdown.trigger();

    network_task.await??;
    tracing::info!("Disconnected");
    Ok(())
}
