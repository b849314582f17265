use anyhow::{ensure, Context as _};
use serde::Deserialize;

/// Output format of the tracing subscriber installed by
/// [`init_tracing`](crate::telemetry::init_tracing).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Plain,
            filter: "info".to_string(),
        }
    }
}

/// Dispatch-layer configuration.
///
/// Every field has a default, so a partial JSON document (or `{}`) is valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TubeConfig {
    /// Queue bound of a `ChannelWorker` built with `from_context`.
    /// Submissions beyond it fail with `HandoffError::Saturated` instead of
    /// blocking.
    pub worker_queue_capacity: usize,
    /// First request id handed out. Must be non-zero.
    pub first_request_id: u64,
    pub log: LogConfig,
}

impl Default for TubeConfig {
    fn default() -> Self {
        Self {
            worker_queue_capacity: 256,
            first_request_id: 1,
            log: LogConfig::default(),
        }
    }
}

impl TubeConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid JSON for this struct or
    /// fails [`validate`](Self::validate).
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(text).context("invalid dispatch configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if the queue capacity or the first request id is zero.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.worker_queue_capacity > 0,
            "worker_queue_capacity must be greater than zero"
        );
        ensure!(
            self.first_request_id > 0,
            "first_request_id must be greater than zero"
        );
        Ok(())
    }
}
