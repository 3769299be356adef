//! Configuration errors. Every variant names the environment variable (or
//! file) at fault so the operator knows what to fix.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// The variable is set but does not parse
    #[error("{var}={value:?} is not a valid value")]
    InvalidValue { var: String, value: String },

    #[error("cannot read env file {path}: {source}")]
    EnvFileLoad {
        path: PathBuf,
        #[source]
        source: dotenv::Error,
    },

    /// The value parses but is out of range
    #[error("{var} rejected: {reason}")]
    Validation { var: &'static str, reason: String },

    #[error("ESIGN_DATABASE_DSN {dsn:?} rejected: {reason}")]
    InvalidDatabaseDsn { dsn: String, reason: String },
}

impl ConfigError {
    pub(crate) fn rejected(var: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            var,
            reason: reason.into(),
        }
    }

    /// The offending environment variable, when there is one
    pub fn var(&self) -> Option<&str> {
        match self {
            Self::InvalidValue { var, .. } => Some(var),
            Self::Validation { var, .. } => Some(var),
            Self::InvalidDatabaseDsn { .. } => Some("ESIGN_DATABASE_DSN"),
            Self::EnvFileLoad { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
