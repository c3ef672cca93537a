//! Settings loading from config.toml
//!
//! Controls the allocation window, who absorbs penny rounding drift, how often
//! the deadline sweeper runs, and the bank-link precondition for starting a
//! transaction. Every field has a default, so a missing file is not fatal.

use crate::core::allocation::RemainderPolicy;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Settlement engine behavior
    #[serde(default)]
    pub settlement: SettlementSettings,
    /// Bank-link precondition for starting transactions
    #[serde(default)]
    pub bank_link: BankLinkSettings,
}

/// Settlement engine settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettlementSettings {
    /// Minutes between creation and the allocation deadline
    pub allocation_window_minutes: i64,
    /// Who absorbs the rounding remainder
    pub remainder_policy: RemainderPolicy,
    /// Seconds between deadline sweeps
    pub sweep_interval_seconds: u64,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            allocation_window_minutes: 15,
            remainder_policy: RemainderPolicy::FirstMember,
            sweep_interval_seconds: 60,
        }
    }
}

/// Stand-in for the external bank-link service
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BankLinkSettings {
    /// Whether creators must have an active bank link
    pub required: bool,
    /// Discord user IDs that have an active link
    pub linked_members: Vec<String>,
}

/// Loads settings from a TOML file.
///
/// # Errors
/// Returns [`Error::Config`] if the file cannot be read or parsed, or if a
/// value is out of range.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read settings file {}: {e}", path_ref.display()),
    })?;
    parse_settings(&contents)
}

/// Parses and checks settings from TOML text.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse settings: {e}"),
    })?;

    if settings.settlement.allocation_window_minutes <= 0 {
        return Err(Error::Config {
            message: "allocation_window_minutes must be positive".to_string(),
        });
    }
    if settings.settlement.sweep_interval_seconds == 0 {
        return Err(Error::Config {
            message: "sweep_interval_seconds must be positive".to_string(),
        });
    }

    Ok(settings)
}

/// Loads settings from `SPLIT_BUDDY_CONFIG` (default `./config.toml`).
///
/// A missing file falls back to defaults; a malformed one is an error.
pub fn load_default_settings() -> Result<Settings> {
    let path = std::env::var("SPLIT_BUDDY_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    if !Path::new(&path).exists() {
        warn!("Settings file {path} not found, using defaults");
        return Ok(Settings::default());
    }
    let settings = load_settings(&path)?;
    info!("Loaded settings from {path}");
    Ok(settings)
}
