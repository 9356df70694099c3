//! Gateway configuration with validation.
//!
//! Loading is left to the embedding process; these types only describe the
//! knobs and their defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Request size and batch limits
    pub limits: LimitsConfig,
    /// Notification relay behaviour
    pub relay: RelayConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_request_bytes == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_request_bytes cannot be 0".into(),
            ));
        }

        if self.limits.max_batch_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_batch_size cannot be 0".into(),
            ));
        }

        if self.relay.heartbeat_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "heartbeat_interval cannot be 0".into(),
            ));
        }

        if self.relay.probe_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "probe_timeout cannot be 0".into(),
            ));
        }

        if self.relay.max_missed_heartbeats == 0 {
            return Err(ConfigError::Invalid(
                "max_missed_heartbeats must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

/// Request validation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted input, in bytes
    pub max_request_bytes: usize,
    /// Most calls accepted in one input
    pub max_batch_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: 1024 * 1024,
            max_batch_size: 64,
        }
    }
}

/// Notification relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Time between liveness probes
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// Upper bound on a single probe
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    /// Consecutive failed probes before the relay gives up
    pub max_missed_heartbeats: u32,
    /// Relay activity generated by this session
    pub show_local: bool,
    /// Emit `chat_conv` notifications for new and joined conversations
    pub show_new_convs: bool,
    /// Drop exploding messages
    pub hide_exploding: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(1),
            max_missed_heartbeats: 1,
            show_local: false,
            show_new_convs: true,
            hide_exploding: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
