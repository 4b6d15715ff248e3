//! Broadcast chat
//!
//! A minimal broadcast chat: every message a client sends is relayed to every
//! other connected client.
//!
//! # Architecture Overview
//!
//! ```text
//!   client A ──┐                    ┌──────────────────────────────┐
//!   client B ──┼── TCP / TLS ─────▶ │  ChatServer (one thread)     │
//!   client C ──┘                    │   poll → accept → read       │
//!                                   │        → BroadcastRouter     │
//!                                   │        → write → re-arm      │
//!                                   └──────────────────────────────┘
//!
//!   stdin ──▶ console ──▶ OutboundSender ──▶ NetworkLoop ──▶ server
//!   stdout ◀── console ◀── inbound channel ◀── NetworkLoop ◀── server
//! ```
//!
//! # Usage
//!
//! ```text
//! broadcast-chat --mode server [--host H] [--port P] [--config FILE]
//! broadcast-chat --mode client [--host H] [--port P] [--config FILE]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use broadcast_chat::config::{load_config, validate_config, ChatConfig};
use broadcast_chat::lifecycle::startup;
use broadcast_chat::observability::logging::init_logging;
use broadcast_chat::observability::{ChatObserver, TracingObserver};

/// How long to wait for blocking tasks (such as a pending stdin read) on exit.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Client,
    Server,
}

#[derive(Debug, Parser)]
#[command(name = "broadcast-chat", version, about = "Minimal broadcast chat server and client")]
struct Cli {
    /// Run as chat server or interactive client
    #[arg(long, value_enum)]
    mode: Mode,

    /// Host to bind (server) or connect to (client)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (server) or connect to (client)
    #[arg(long)]
    port: Option<u16>,

    /// TOML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mode = cli.mode;

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("error: failed to load {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => ChatConfig::default(),
    };
    if let Some(host) = cli.host {
        config.network.host = host;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Err(errors) = validate_config(&config) {
        for error in errors {
            eprintln!("error: {error}");
        }
        return ExitCode::FAILURE;
    }

    if let Err(err) = init_logging(&config.observability) {
        eprintln!("error: failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        mode = ?mode,
        address = %config.network.address(),
        tls = config.tls.enabled,
        "broadcast-chat v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "Failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    let metrics = {
        let _guard = runtime.enter();
        startup::start_metrics(&config.observability)
    };
    let observer: Arc<dyn ChatObserver> = Arc::new(TracingObserver);
    let result = match metrics {
        Ok(()) => runtime.block_on(async move {
            match mode {
                Mode::Server => startup::serve(config, observer).await,
                Mode::Client => startup::chat(config, observer).await,
            }
        }),
        Err(err) => Err(err),
    };
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Exiting");
            ExitCode::FAILURE
        }
    }
}
