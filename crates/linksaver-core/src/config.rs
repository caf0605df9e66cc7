//! Configuration and settings management
//!
//! Loads relay settings from config files and environment variables.

use crate::gateway::ChatRef;
use crate::store::InMemoryStore;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default quota of relays per window
pub const DEFAULT_RATE_LIMIT_COUNT: usize = 3;
/// Default rate window in seconds (5 minutes)
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 300;
/// Default progress bar increment in percent
pub const DEFAULT_PROGRESS_STEP: u8 = 10;
/// Default interval between progress bar updates
pub const DEFAULT_PROGRESS_TICK_MS: u64 = 500;
/// Default cap on simultaneously tracked rate windows
pub const DEFAULT_RATE_LIMIT_MAX_USERS: u64 = 100_000;

/// Build the layered configuration shared by every settings struct.
///
/// Sources, later ones overriding earlier ones: `config/default`,
/// `config/{RUN_MODE}`, `config/local`, `APP_*` variables and finally plain
/// environment variables.
///
/// # Errors
///
/// Returns a `ConfigError` if a present config file cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE variables map onto snake_case keys; empty values count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

/// Access and relay settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelaySettings {
    /// Administrator identity: first-hop target, exempt from the quota
    pub admin_id: i64,
    /// Channel users must join (`@handle` or numeric id)
    pub required_channel: String,
    /// Relays allowed per window
    #[serde(default = "default_rate_limit_count")]
    pub rate_limit_count: usize,
    /// Window length in seconds
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    /// Progress bar increment in percent
    #[serde(default = "default_progress_step")]
    pub progress_step: u8,
    /// Milliseconds between progress bar updates
    #[serde(default = "default_progress_tick_ms")]
    pub progress_tick_ms: u64,
    /// Most rate windows tracked at once
    #[serde(default = "default_rate_limit_max_users")]
    pub rate_limit_max_users: u64,
}

const fn default_rate_limit_count() -> usize {
    DEFAULT_RATE_LIMIT_COUNT
}

const fn default_rate_limit_window_secs() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}

const fn default_progress_step() -> u8 {
    DEFAULT_PROGRESS_STEP
}

const fn default_progress_tick_ms() -> u64 {
    DEFAULT_PROGRESS_TICK_MS
}

const fn default_rate_limit_max_users() -> u64 {
    DEFAULT_RATE_LIMIT_MAX_USERS
}

impl RelaySettings {
    /// Settings with the given identities and default limits
    #[must_use]
    pub fn with_defaults(admin_id: i64, required_channel: impl Into<String>) -> Self {
        Self {
            admin_id,
            required_channel: required_channel.into(),
            rate_limit_count: DEFAULT_RATE_LIMIT_COUNT,
            rate_limit_window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            progress_step: DEFAULT_PROGRESS_STEP,
            progress_tick_ms: DEFAULT_PROGRESS_TICK_MS,
            rate_limit_max_users: DEFAULT_RATE_LIMIT_MAX_USERS,
        }
    }

    /// Load and validate settings.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use linksaver_core::config::RelaySettings;
    ///
    /// let settings = RelaySettings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a value is out of range.
    pub fn new() -> Result<Self, ConfigError> {
        let settings: Self = build_config()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit_count == 0 {
            return Err(ConfigError::Message(
                "RATE_LIMIT_COUNT must be at least 1".to_string(),
            ));
        }
        if self.rate_limit_window_secs == 0 {
            return Err(ConfigError::Message(
                "RATE_LIMIT_WINDOW_SECS must be at least 1".to_string(),
            ));
        }
        if !(1..=100).contains(&self.progress_step) {
            return Err(ConfigError::Message(
                "PROGRESS_STEP must be between 1 and 100".to_string(),
            ));
        }
        if self.rate_limit_max_users == 0 {
            return Err(ConfigError::Message(
                "RATE_LIMIT_MAX_USERS must be at least 1".to_string(),
            ));
        }
        if self.channel().is_none() {
            return Err(ConfigError::Message(format!(
                "REQUIRED_CHANNEL '{}' is neither an @handle nor a chat id",
                self.required_channel
            )));
        }
        Ok(())
    }

    /// The required channel as a chat reference
    #[must_use]
    pub fn channel(&self) -> Option<ChatRef> {
        ChatRef::parse(&self.required_channel)
    }

    /// Rate window length
    #[must_use]
    pub const fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// Interval between progress bar updates
    #[must_use]
    pub const fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms)
    }

    /// An empty store sized for these settings
    #[must_use]
    pub fn store(&self) -> InMemoryStore {
        InMemoryStore::new(self.rate_window(), self.rate_limit_max_users)
    }
}
