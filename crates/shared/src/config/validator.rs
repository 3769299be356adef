//! Configuration validation

use super::dto::EsignConfig;
use super::error::{ConfigError, Result};

/// Validate a snapshot store DSN.
///
/// Only SQLite DSNs are accepted (`sqlite:` prefix, including `sqlite::memory:`).
pub fn validate_database_dsn(dsn: &str) -> Result<()> {
    let trimmed = dsn.trim();
    let reason = if trimmed.is_empty() {
        "cannot be empty"
    } else if !trimmed.starts_with("sqlite:") {
        "only sqlite: DSNs are supported"
    } else {
        return Ok(());
    };
    Err(ConfigError::InvalidDatabaseDsn {
        dsn: dsn.to_string(),
        reason: reason.to_string(),
    })
}

/// Validate a complete configuration
pub fn validate_config(config: &EsignConfig) -> Result<()> {
    if let Some(dsn) = &config.database.dsn {
        validate_database_dsn(dsn)?;
    }
    if config.signing.token_ttl_hours == 0 {
        return Err(ConfigError::rejected(
            "ESIGN_SIGNING_TOKEN_TTL_HOURS",
            "must be > 0",
        ));
    }
    if config.outbox.batch_size == 0 {
        return Err(ConfigError::rejected("ESIGN_OUTBOX_BATCH_SIZE", "must be > 0"));
    }
    if config.outbox.consumer.trim().is_empty() {
        return Err(ConfigError::rejected("ESIGN_OUTBOX_CONSUMER", "cannot be blank"));
    }
    if config.outbox.publish_timeout_secs == 0 {
        return Err(ConfigError::rejected(
            "ESIGN_OUTBOX_PUBLISH_TIMEOUT_SECS",
            "must be > 0",
        ));
    }
    Ok(())
}
