//! Configuration loader
//!
//! Loads configuration from an optional .env file and the process environment.

use std::path::PathBuf;

use super::dto::{
    CredentialsConfig, DatabaseConfig, EsignConfig, LoggingConfig, OutboxConfig, SigningConfig,
};
use super::error::{ConfigError, Result};
use super::validator::validate_config;

/// Configuration loader
///
/// Values from the .env file are exported into the process environment
/// before the environment is read; variables already set are not overridden.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    env_file_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(env_file_path: Option<PathBuf>) -> Self {
        Self { env_file_path }
    }

    /// Load and validate the full configuration
    pub fn load(&self) -> Result<EsignConfig> {
        if let Some(path) = self.env_file_path.as_deref() {
            dotenv::from_path(path).map_err(|source| ConfigError::EnvFileLoad {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let config = EsignConfig::from_env()?;
        validate_config(&config)?;
        Ok(config)
    }
}

impl EsignConfig {
    /// Build configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database: DatabaseConfig::from_env()?,
            signing: SigningConfig::from_env()?,
            outbox: OutboxConfig::from_env()?,
            credentials: CredentialsConfig::from_env(),
            logging: LoggingConfig::from_env()?,
        })
    }
}

impl DatabaseConfig {
    /// # Optional Variables
    ///
    /// - `ESIGN_DATABASE_DSN`: unset selects a temporary file
    /// - `ESIGN_DB_BUSY_TIMEOUT_MS`: Default 5000
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            dsn: optional_string("ESIGN_DATABASE_DSN"),
            busy_timeout_ms: parse_optional_var("ESIGN_DB_BUSY_TIMEOUT_MS", defaults.busy_timeout_ms)?,
        })
    }
}

impl SigningConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            token_ttl_hours: parse_optional_var(
                "ESIGN_SIGNING_TOKEN_TTL_HOURS",
                defaults.token_ttl_hours,
            )?,
            pepper: optional_string("ESIGN_SIGNING_TOKEN_PEPPER"),
        })
    }
}

impl OutboxConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            consumer: optional_string("ESIGN_OUTBOX_CONSUMER").unwrap_or(defaults.consumer),
            batch_size: parse_optional_var("ESIGN_OUTBOX_BATCH_SIZE", defaults.batch_size)?,
            retry_delay_secs: parse_optional_var(
                "ESIGN_OUTBOX_RETRY_DELAY_SECS",
                defaults.retry_delay_secs,
            )?,
            publish_timeout_secs: parse_optional_var(
                "ESIGN_OUTBOX_PUBLISH_TIMEOUT_SECS",
                defaults.publish_timeout_secs,
            )?,
            poll_interval_ms: parse_optional_var(
                "ESIGN_OUTBOX_POLL_INTERVAL_MS",
                defaults.poll_interval_ms,
            )?,
        })
    }
}

impl CredentialsConfig {
    pub fn from_env() -> Self {
        Self {
            encryption_key_hex: optional_string("ESIGN_CREDENTIALS_KEY"),
        }
    }
}

impl LoggingConfig {
    /// `RUST_LOG` wins over `ESIGN_LOG_LEVEL`.
    pub fn from_env() -> Result<Self> {
        let level = optional_string("RUST_LOG")
            .or_else(|| optional_string("ESIGN_LOG_LEVEL"))
            .unwrap_or_else(|| "info".to_string());
        let json = match optional_string("ESIGN_LOG_JSON").as_deref() {
            None | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "ESIGN_LOG_JSON".to_string(),
                    value: other.to_string(),
                });
            }
        };
        Ok(Self { level, json })
    }
}

fn optional_string(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an optional variable; unset means default, malformed is an error.
fn parse_optional_var<T>(var: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match optional_string(var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw,
        }),
    }
}
