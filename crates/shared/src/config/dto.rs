//! Configuration Data Transfer Objects (DTOs)

use serde::{Deserialize, Serialize};

/// Root configuration for the e-sign core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EsignConfig {
    pub database: DatabaseConfig,
    pub signing: SigningConfig,
    pub outbox: OutboxConfig,
    pub credentials: CredentialsConfig,
    pub logging: LoggingConfig,
}

/// Snapshot store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite DSN, e.g. `sqlite:///var/lib/esign/store.db`.
    /// `None` selects a process-scoped temporary file.
    pub dsn: Option<String>,

    /// SQLite busy timeout (milliseconds)
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: None,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Signing token issuance configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    pub token_ttl_hours: u64,

    /// Optional pepper appended to the raw token before hashing
    pub pepper: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            token_ttl_hours: 72,
            pepper: None,
        }
    }
}

impl std::fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfig")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("pepper", &self.pepper.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Outbox dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// Identity written to `locked_by` on claimed rows
    pub consumer: String,
    pub batch_size: usize,
    pub retry_delay_secs: u64,
    pub publish_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            consumer: "esign-worker".to_string(),
            batch_size: 50,
            retry_delay_secs: 30,
            publish_timeout_secs: 10,
            poll_interval_ms: 1_000,
        }
    }
}

/// Integration credential encryption configuration
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Hex-encoded 32 byte AES-256 key
    pub encryption_key_hex: Option<String>,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field(
                "encryption_key_hex",
                &self.encryption_key_hex.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full EnvFilter directive
    pub level: String,

    /// Emit JSON formatted log lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
