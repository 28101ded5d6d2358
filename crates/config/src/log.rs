use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};

const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// How the binary should log. `RUST_LOG`, when set, overrides `level`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of `trace`, `debug`, `info`, `warn`, `error` or `off`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::default() }
    }
}

impl LogConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if !LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            exn::bail!(ErrorKind::Invalid(format!("unknown log level {:?}", self.level)));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}
