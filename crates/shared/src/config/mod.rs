//! Configuration module for the e-sign core
//!
//! Configuration is loaded once at startup and handed to the store and the
//! services as immutable DTOs.
//!
//! # Usage
//!
//! ```ignore
//! use esign_shared::config::ConfigLoader;
//! use std::path::PathBuf;
//!
//! let loader = ConfigLoader::new(Some(PathBuf::from(".env")));
//! let config = loader.load()?;
//! println!("snapshot dsn: {:?}", config.database.dsn);
//! ```
//!
//! # Environment Variables
//!
//! All variables are optional:
//!
//! - `ESIGN_DATABASE_DSN`: SQLite DSN for the snapshot store (default: temp file)
//! - `ESIGN_SIGNING_TOKEN_TTL_HOURS`: signing token lifetime (default: 72)
//! - `ESIGN_SIGNING_TOKEN_PEPPER`: optional pepper mixed into token hashes
//! - `ESIGN_OUTBOX_CONSUMER`: consumer identity written to `locked_by`
//! - `ESIGN_OUTBOX_BATCH_SIZE`: claim limit per tick (default: 50)
//! - `ESIGN_OUTBOX_RETRY_DELAY_SECS`: retry delay (default: 30)
//! - `ESIGN_OUTBOX_PUBLISH_TIMEOUT_SECS`: per-message publish bound (default: 10)
//! - `ESIGN_OUTBOX_POLL_INTERVAL_MS`: relay tick (default: 1000)
//! - `ESIGN_CREDENTIALS_KEY`: hex AES-256 key for the credential vault
//! - `ESIGN_LOG_LEVEL` / `RUST_LOG`: log filter (default: "info")

pub mod dto;
pub mod error;
pub mod loader;
pub mod validator;

pub use dto::{
    CredentialsConfig, DatabaseConfig, EsignConfig, LoggingConfig, OutboxConfig, SigningConfig,
};
pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;
pub use validator::{validate_config, validate_database_dsn};
