//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, buffer sizes > 0, backlog fits the OS type)
//! - Detect incomplete TLS material
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ChatConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ChatConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{field} = {value} exceeds the maximum of {max}")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("network.host must not be empty")]
    EmptyHost,

    #[error("tls.{present} is set but tls.{missing} is not")]
    IncompleteTls {
        present: &'static str,
        missing: &'static str,
    },

    #[error("tls.enabled requires a certificate/key pair or a ca_path")]
    NoTlsMaterial,

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &ChatConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let network = &config.network;

    if network.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }

    let positive = [
        ("network.backlog", network.backlog as u64),
        ("network.recv_buffer_size", network.recv_buffer_size as u64),
        ("network.poll_timeout_ms", network.poll_timeout_ms),
        ("network.max_frame_len", network.max_frame_len as u64),
        ("server.max_connections", config.server.max_connections as u64),
        ("server.handshake_timeout_ms", config.server.handshake_timeout_ms),
        ("server.events_capacity", config.server.events_capacity as u64),
        ("server.max_queued_messages", config.server.max_queued_messages as u64),
        ("client.connect_timeout_ms", config.client.connect_timeout_ms),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    if u64::from(network.backlog) > i32::MAX as u64 {
        errors.push(ValidationError::TooLarge {
            field: "network.backlog",
            value: network.backlog.into(),
            max: i32::MAX as u64,
        });
    }
    if network.max_frame_len as u64 > u64::from(u32::MAX) {
        errors.push(ValidationError::TooLarge {
            field: "network.max_frame_len",
            value: network.max_frame_len as u64,
            max: u32::MAX.into(),
        });
    }

    let tls = &config.tls;
    if tls.enabled {
        match (&tls.cert_path, &tls.key_path) {
            (Some(_), None) => errors.push(ValidationError::IncompleteTls {
                present: "cert_path",
                missing: "key_path",
            }),
            (None, Some(_)) => errors.push(ValidationError::IncompleteTls {
                present: "key_path",
                missing: "cert_path",
            }),
            (None, None) if tls.ca_path.is_none() => errors.push(ValidationError::NoTlsMaterial),
            _ => {}
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
