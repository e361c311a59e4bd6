//! Engine settings
//!
//! Every section and field has a serde default, so a config file only needs
//! to list what it overrides:
//!
//! ```toml
//! [logging]
//! filter = "warn,framechain=info"
//!
//! [dispatch]
//! max_poll_interval_ms = 50
//! ```

use crate::error::{FrameChainError, Result};
use crate::pipeline::event::DEFAULT_EVENT_CAPACITY;
use crate::pipeline::handoff::DEFAULT_HANDOFF_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default tracing filter directive
pub const DEFAULT_LOG_FILTER: &str = "info,framechain=debug";

/// Default upper bound on a single host poll wait
pub const DEFAULT_MAX_POLL_INTERVAL_MS: u64 = 100;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub events: EventConfig,

    #[serde(default)]
    pub chain: ChainConfig,
}

/// Logging output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Also write daily-rotated log files here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            directory: None,
        }
    }
}

/// Host event loop tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,

    /// Capacity of hand-off queues created by the host
    #[serde(default = "default_handoff_capacity")]
    pub handoff_capacity: usize,
}

fn default_max_poll_interval_ms() -> u64 {
    DEFAULT_MAX_POLL_INTERVAL_MS
}

fn default_handoff_capacity() -> usize {
    DEFAULT_HANDOFF_CAPACITY
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_poll_interval_ms: default_max_poll_interval_ms(),
            handoff_capacity: default_handoff_capacity(),
        }
    }
}

impl DispatchConfig {
    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    /// Per-subscriber channel capacity
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Chain the host builds at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain description file; a built-in chain is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<PathBuf>,

    /// Start streaming as soon as the chain is built
    #[serde(default = "default_true")]
    pub autostart: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            description: None,
            autostart: true,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.max_poll_interval_ms == 0 {
            return Err(FrameChainError::Config(
                "dispatch.max_poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.dispatch.handoff_capacity == 0 {
            return Err(FrameChainError::Config(
                "dispatch.handoff_capacity must be greater than 0".to_string(),
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(FrameChainError::Config(
                "events.channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(FrameChainError::Config("logging.filter is empty".to_string()));
        }
        Ok(())
    }
}
