//! # Settings
//!
//! Runtime settings for the settlement engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TURNSTILE_DB_PATH=/var/lib/turnstile/turnstile.db                  │
//! │     TURNSTILE_AMEND_MEAL_REMOVAL=clamped                               │
//! │                                                                         │
//! │  2. TOML Settings File                                                 │
//! │     ~/.config/turnstile/turnstile.toml (Linux)                         │
//! │     ~/Library/Application Support/com.turnstile.turnstile/... (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Settings File Format
//! ```toml
//! [database]
//! path = "./turnstile.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [amend]
//! meal_removal = "unclamped"   # unclamped | clamped
//! payment_check = "skip"       # skip | enforce
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use turnstile_core::{AmendOptions, MealRemoval, PaymentCheck};

use crate::error::{ConfigError, ConfigResult};
use crate::pool::DbConfig;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./turnstile.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Defaults for order amendments.
    #[serde(default)]
    pub amend: AmendOptions,
}

impl Settings {
    /// Loads settings from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Settings file (turnstile.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut settings = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading settings from file");
                let contents = std::fs::read_to_string(&path)?;
                settings = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Settings file not found, using defaults");
            }
        }

        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;

        Ok(settings)
    }

    /// Loads settings or returns defaults if loading fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load settings: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a settings document.
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Writes the settings to `config_path` (or the default location).
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::Invalid {
                key: "path".into(),
                reason: "no settings directory available".into(),
            })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, toml::to_string_pretty(self)?)?;

        info!(?path, "Settings saved");
        Ok(())
    }

    /// Validates the settings.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                key: "database.path".into(),
                reason: "must not be empty".into(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "database.max_connections".into(),
                reason: "must be greater than 0".into(),
            });
        }

        Ok(())
    }

    /// Applies `TURNSTILE_*` overrides read through `lookup`.
    ///
    /// Unparsable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("TURNSTILE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("TURNSTILE_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Invalid TURNSTILE_DB_MAX_CONNECTIONS"),
            }
        }

        if let Some(ms) = lookup("TURNSTILE_BUSY_TIMEOUT_MS") {
            match ms.parse::<u64>() {
                Ok(n) => self.database.busy_timeout_ms = n,
                Err(_) => warn!(value = %ms, "Invalid TURNSTILE_BUSY_TIMEOUT_MS"),
            }
        }

        if let Some(mode) = lookup("TURNSTILE_AMEND_MEAL_REMOVAL") {
            match mode.to_lowercase().as_str() {
                "unclamped" => self.amend.meal_removal = MealRemoval::Unclamped,
                "clamped" => self.amend.meal_removal = MealRemoval::Clamped,
                _ => warn!(mode = %mode, "Unknown meal removal mode in environment"),
            }
        }

        if let Some(mode) = lookup("TURNSTILE_AMEND_PAYMENT_CHECK") {
            match mode.to_lowercase().as_str() {
                "skip" => self.amend.payment_check = PaymentCheck::Skip,
                "enforce" => self.amend.payment_check = PaymentCheck::Enforce,
                _ => warn!(mode = %mode, "Unknown payment check mode in environment"),
            }
        }
    }

    /// Pool configuration derived from these settings.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database.path.clone())
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
            .amend_options(self.amend)
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "turnstile", "turnstile")
            .map(|dirs| dirs.config_dir().join("turnstile.toml"))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.database.max_connections, 5);
        assert_eq!(settings.amend, AmendOptions::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
            [amend]
            meal_removal = "clamped"
            "#,
        )
        .unwrap();

        assert_eq!(settings.amend.meal_removal, MealRemoval::Clamped);
        assert_eq!(settings.amend.payment_check, PaymentCheck::Skip);
        assert_eq!(settings.database.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(matches!(
            Settings::from_toml("[amend]\npayment_check = \"sometimes\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env = HashMap::from([
            ("TURNSTILE_DB_PATH", "/tmp/venue.db"),
            ("TURNSTILE_DB_MAX_CONNECTIONS", "not-a-number"),
            ("TURNSTILE_AMEND_PAYMENT_CHECK", "Enforce"),
        ]);

        let mut settings = Settings::default();
        settings.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.database.path, PathBuf::from("/tmp/venue.db"));
        assert_eq!(settings.database.max_connections, 5);
        assert_eq!(settings.amend.payment_check, PaymentCheck::Enforce);

        let config = settings.db_config();
        assert_eq!(config.amend.payment_check, PaymentCheck::Enforce);
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::default();
        settings.database.max_connections = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_save_then_read_back() {
        let dir = std::env::temp_dir().join(format!("turnstile-settings-{}", std::process::id()));
        let path = dir.join("turnstile.toml");

        let mut settings = Settings::default();
        settings.amend.meal_removal = MealRemoval::Clamped;
        settings.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(Settings::from_toml(&contents).unwrap(), settings);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
