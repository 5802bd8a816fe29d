//! Chat-layer configuration.
//!
//! Loaded from the `[rate_limit]` and `[messages]` tables of a TOML file.
//! Missing fields fall back to their defaults.

use std::num::NonZeroUsize;

use reverie_core::error::ReverieError;
use serde::{Deserialize, Serialize};

use crate::error::ChatResult;

/// Top-level chat configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Per-user event throttling.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Inbound message limits.
    #[serde(default)]
    pub messages: MessageConfig,
}

impl ChatConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ChatError::Progression(ReverieError::Config)` if the TOML is
    /// invalid or a value is out of range.
    pub fn from_toml(toml_str: &str) -> ChatResult<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| ReverieError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> ChatResult<Self> {
        let content = std::fs::read_to_string(path).map_err(ReverieError::from)?;
        Self::from_toml(&content)
    }

    /// Reject zero-sized limits.
    ///
    /// # Errors
    /// Returns `ReverieError::Config` describing the first violation.
    pub fn validate(&self) -> ChatResult<()> {
        let zero = if self.rate_limit.max_tracked_users == 0 {
            Some("rate_limit.max_tracked_users")
        } else if self.rate_limit.max_events_per_window == 0 {
            Some("rate_limit.max_events_per_window")
        } else if self.rate_limit.window_seconds == 0 {
            Some("rate_limit.window_seconds")
        } else if self.messages.max_chars == 0 {
            Some("messages.max_chars")
        } else {
            None
        };

        match zero {
            Some(field) => Err(ReverieError::Config(format!("{field} must be greater than 0")).into()),
            None => Ok(()),
        }
    }
}

/// Fixed-window rate limit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Users tracked at once; the least recently active are evicted.
    #[serde(default = "default_max_tracked_users")]
    pub max_tracked_users: usize,
    /// Events a user may send per window.
    #[serde(default = "default_max_events_per_window")]
    pub max_events_per_window: u32,
    /// Window length in seconds.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

impl RateLimitConfig {
    /// Capacity of the tracking table, never zero.
    #[must_use]
    pub fn capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_tracked_users).unwrap_or(NonZeroUsize::MIN)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tracked_users: default_max_tracked_users(),
            max_events_per_window: default_max_events_per_window(),
            window_seconds: default_window_seconds(),
        }
    }
}

/// Message size limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageConfig {
    /// Longest accepted message, in chars.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

fn default_max_tracked_users() -> usize { 10_000 }
fn default_max_events_per_window() -> u32 { 30 }
fn default_window_seconds() -> u64 { 60 }
fn default_max_chars() -> usize { 2_000 }
