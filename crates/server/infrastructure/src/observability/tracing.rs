//! Tracing subscriber setup
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//! `RUST_LOG` (folded into `LoggingConfig::level` by the config loader)
//! accepts a full `EnvFilter` directive.

use esign_shared::config::LoggingConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Result of tracing initialization
#[derive(Debug, Default)]
pub struct TracingResult {
    pub initialized: bool,
    pub errors: Vec<String>,
}

/// Install the global subscriber. A second call reports an error instead
/// of panicking.
pub fn init_tracing(config: &LoggingConfig) -> TracingResult {
    let mut result = TracingResult::default();

    let env_filter = match EnvFilter::try_new(&config.level) {
        Ok(filter) => filter,
        Err(err) => {
            result
                .errors
                .push(format!("invalid log filter {:?}: {}", config.level, err));
            EnvFilter::new("info")
        }
    };

    let builder = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    match installed {
        Ok(()) => {
            result.initialized = true;
            info!(level = %config.level, json = config.json, "Tracing initialized");
        }
        Err(err) => result.errors.push(err.to_string()),
    }
    result
}
