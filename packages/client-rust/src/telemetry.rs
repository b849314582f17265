//! Tracing subscriber setup for binaries and integration harnesses embedding
//! the dispatch layer.
//!
//! Filtering comes from `RUST_LOG` when set, otherwise from
//! [`LogConfig::filter`]. Output is human-readable or one JSON object per line.

use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

use crate::config::{LogConfig, LogFormat};

/// Installs the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the configured filter does not parse or a global
/// subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .with_context(|| format!("invalid log filter {:?}", config.filter))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    let installed = match config.format {
        LogFormat::Plain => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_fails() {
        let config = LogConfig::default();
        // Another test may have installed one already; either way the second
        // attempt in this process must fail.
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
