//! Shared configuration for the e-sign persistence core.

pub mod config;

pub use config::{ConfigError, ConfigLoader, EsignConfig};
