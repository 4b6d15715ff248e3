//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → CLI overrides (--host, --port)
//!     → validation.rs (semantic checks)
//!     → ChatConfig (validated, immutable)
//!     → passed by reference to the server or client constructor
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the event loop never re-reads it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ChatConfig, ClientConfig, NetworkConfig, ObservabilityConfig, ServerConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
