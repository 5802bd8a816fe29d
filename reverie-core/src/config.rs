//! Configuration for the Reverie progression system.
//!
//! Maps directly to `reverie.toml`. Every field has a default so a partial
//! (or empty) file is valid.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::affinity::{default_personality_rules, PersonalityRule};
use crate::error::{ReverieError, Result};

/// Top-level Reverie configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReverieConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Affinity arithmetic and derived-field tables.
    #[serde(default)]
    pub affinity: AffinityConfig,
    /// Unlock evaluation and progress reporting.
    #[serde(default)]
    pub unlock: UnlockConfig,
    /// Store access: timeouts, retries, SQLite pragmas.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Where the fragment catalog comes from.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl ReverieConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ReverieError::Config` if the TOML is invalid or a value is
    /// out of range.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| ReverieError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    /// Returns `ReverieError::Config` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if !(0..=100).contains(&self.affinity.balance_threshold) {
            return Err(ReverieError::Config(format!(
                "affinity.balance_threshold must be within 0..=100, got {}",
                self.affinity.balance_threshold
            )));
        }
        if self.affinity.max_delta_magnitude < 0 {
            return Err(ReverieError::Config(
                "affinity.max_delta_magnitude must not be negative".to_string(),
            ));
        }
        if self.persistence.retry_attempts == 0 {
            return Err(ReverieError::Config(
                "persistence.retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.persistence.io_timeout_ms == 0 {
            return Err(ReverieError::Config(
                "persistence.io_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Affinity tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffinityConfig {
    /// Demon/angel gap that must be exceeded for a dominant balance status.
    #[serde(default = "default_20")]
    pub balance_threshold: i32,
    /// Largest accepted magnitude for a single delta field.
    #[serde(default = "default_100")]
    pub max_delta_magnitude: i32,
    /// Ordered personality priority table; first matching row wins.
    #[serde(default = "default_personality_rules")]
    pub personality_rules: Vec<PersonalityRule>,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            balance_threshold: 20,
            max_delta_magnitude: 100,
            personality_rules: default_personality_rules(),
        }
    }
}

/// Unlock evaluation and progress reporting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockConfig {
    /// How many recent unlocks a progress report lists.
    #[serde(default = "default_5_usize")]
    pub recent_unlocks_window: usize,
    /// How many "next unlock" hints a progress report lists.
    #[serde(default = "default_3_usize")]
    pub hint_count: usize,
}

impl Default for UnlockConfig {
    fn default() -> Self {
        Self {
            recent_unlocks_window: 5,
            hint_count: 3,
        }
    }
}

/// Persistence / store access configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Use WAL mode for concurrent reads (SQLite store only).
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Store and verify CRC-32 checksums of payloads (SQLite store only).
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
    /// Deadline for any single store or session-provider call.
    #[serde(default = "default_2000")]
    pub io_timeout_ms: u64,
    /// Attempts made to persist an already-computed write.
    #[serde(default = "default_3")]
    pub retry_attempts: u32,
    /// Base backoff between write attempts; doubled per attempt.
    #[serde(default = "default_50")]
    pub retry_backoff_ms: u64,
}

impl PersistenceConfig {
    /// The I/O deadline as a [`Duration`].
    #[must_use]
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            checksum_enabled: true,
            io_timeout_ms: 2000,
            retry_attempts: 3,
            retry_backoff_ms: 50,
        }
    }
}

/// Fragment catalog source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Path to a catalog TOML file; the built-in catalog is used when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_3() -> u32 { 3 }
fn default_3_usize() -> usize { 3 }
fn default_5_usize() -> usize { 5 }
fn default_20() -> i32 { 20 }
fn default_50() -> u64 { 50 }
fn default_100() -> i32 { 100 }
fn default_2000() -> u64 { 2000 }
