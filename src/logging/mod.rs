//! Structured logging setup.
//!
//! Builds the tracing filter from the typed logging configuration and
//! installs the global subscriber.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Build the tracing filter string from the logging configuration.
///
/// The base level applies crate-wide; each subsystem override targets that
/// subsystem's module tree. Components are emitted in a fixed order, so the
/// resulting filter is deterministic for a given configuration.
pub fn build_filter_directives(config: &LoggingConfig) -> String {
    let mut directives = vec![config.level.to_lowercase()];
    directives.extend(
        config
            .components
            .iter()
            .map(|(component, level)| format!("{}={}", component.target(), level.to_lowercase())),
    );
    directives.join(",")
}

/// Install the global tracing subscriber.
///
/// An explicit `RUST_LOG` wins over the configured levels. Safe to call
/// more than once; later calls are no-ops.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(build_filter_directives(config)));

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };

    if result.is_err() {
        tracing::debug!("global subscriber already installed");
    }
}
