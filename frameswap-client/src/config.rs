//! Client configuration.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use frameswap_core::{ChannelLayout, EndpointConfig, ExchangeSettings, WireEncoding};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level configuration for the exchange client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote service address.
    pub endpoint: EndpointConfig,
    /// Exchange behaviour.
    pub exchange: ExchangeConfig,
    /// HTTP client settings.
    pub transport: TransportConfig,
    /// Synthetic source frame.
    pub source: SourceConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Exchange behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// "json" or "binary".
    pub encoding: WireEncoding,
    /// Layout the source must produce, e.g. "r16_float".
    pub expected_layout: ChannelLayout,
    /// Name the output is published under.
    pub output_name: String,
    /// Host frame interval in milliseconds.
    pub tick_interval_ms: u64,
}

/// HTTP client settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Per-request deadline in milliseconds. 0 disables it.
    pub timeout_ms: u64,
}

/// Synthetic source frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub width: u32,
    pub height: u32,
    /// Layout the source reports for its frames.
    pub layout: ChannelLayout,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, used when `RUST_LOG` is unset.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ExchangeConfig {
    fn default() -> Self {
        let settings = ExchangeSettings::default();
        Self {
            encoding: settings.encoding,
            expected_layout: settings.expected_layout,
            output_name: settings.output_name,
            tick_interval_ms: 16,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            layout: ChannelLayout::R16Float,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Why a config file could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ClientConfig {
    /// Load from a TOML file. `Ok(None)` when no file exists at `path`.
    ///
    /// Nothing is logged here: the caller reports the outcome once its
    /// subscriber is installed.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&contents)
            .map(Some)
            .map_err(|source| ConfigError::Invalid {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Controller settings from the `[exchange]` section.
    pub fn settings(&self) -> ExchangeSettings {
        ExchangeSettings {
            encoding: self.exchange.encoding,
            expected_layout: self.exchange.expected_layout,
            output_name: self.exchange.output_name.clone(),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.exchange.tick_interval_ms.max(1))
    }

    /// Request deadline, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.transport.timeout_ms > 0).then(|| Duration::from_millis(self.transport.timeout_ms))
    }
}

// ── Tests ────────────────────────────────────────────────────────
