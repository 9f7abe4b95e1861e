//! Configuration management for outdial
//!
//! Settings are loaded from environment variables with sensible defaults;
//! command-line flags override individual fields afterwards.
//!
//! # Environment Variables
//!
//! ## Storage
//! - `OUTDIAL_STORE_PATH`: call-id store - default: "data/call_id_track"
//! - `OUTDIAL_ANSWERS_DIR`: completion marker directory - default: "calls_answers"
//!
//! ## Dispatch
//! - `OUTDIAL_SOURCE_NUMBER`: number calls are placed from - no default
//! - `OUTDIAL_MAX_CONCURRENT`: concurrency ceiling - default: "10"
//! - `OUTDIAL_POLL_INTERVAL_MS`: completion polling interval - default: "1000"
//! - `OUTDIAL_CALL_DEADLINE_SECS`: per-call deadline, 0 waits forever - default: "0"
//!
//! ## Switch
//! - `OUTDIAL_ASTERISK_BIN`: Asterisk binary - default: "asterisk"
//! - `OUTDIAL_PLAYER_CONTEXT`: local leg context - default: "survey_example_player"
//! - `OUTDIAL_TRUNK_CONTEXT`: trunk leg context - default: "survey_example_siptrunk"
//! - `OUTDIAL_USE_SUDO`: run the switch CLI through `sudo -S` - default: "false"
//! - `OUTDIAL_SUDO_PASSWORD`: password piped to sudo - no default
//! - `OUTDIAL_ORIGINATE_TIMEOUT_SECS`: origination timeout - default: "30"
//!
//! ## Logging
//! - `OUTDIAL_LOG_LEVEL`: logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use outdial::OutdialConfig;
//!
//! let config = OutdialConfig::default();
//! config.validate().expect("Invalid configuration");
//! println!("{}", config);
//! ```

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::allocator::DEFAULT_STORE_PATH;
use crate::dispatch::{DispatchOptions, DEFAULT_MAX_CONCURRENT};
use crate::telephony::asterisk::{
    AsteriskSettings, DEFAULT_ASTERISK_BIN, DEFAULT_PLAYER_CONTEXT, DEFAULT_TRUNK_CONTEXT,
};
use crate::telephony::markers::DEFAULT_ANSWERS_DIR;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_CALL_DEADLINE_SECS: u64 = 0;
const DEFAULT_ORIGINATE_TIMEOUT_SECS: u64 = 30;

const MAX_CONCURRENT_LIMIT: usize = 1000;
const MIN_POLL_INTERVAL_MS: u64 = 10;
const MAX_POLL_INTERVAL_MS: u64 = 60_000;
const MAX_ORIGINATE_TIMEOUT_SECS: u64 = 600;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No source number in the environment or on the command line
    #[error("Source number not specified. Set OUTDIAL_SOURCE_NUMBER or pass --source")]
    MissingSourceNumber,

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Main configuration structure for outdial
#[derive(Clone)]
pub struct OutdialConfig {
    /// Call-id store path
    pub store_path: PathBuf,

    /// Directory the dialplan writes completion markers into
    pub answers_dir: PathBuf,

    /// Number calls are placed from
    pub source_number: Option<String>,

    /// Maximum number of calls in flight
    pub max_concurrent: usize,

    /// Completion polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// Per-call deadline in seconds, 0 to wait forever
    pub call_deadline_secs: u64,

    /// Asterisk binary
    pub asterisk_bin: String,

    /// Dialplan context of the local leg
    pub player_context: String,

    /// Dialplan context of the trunk leg
    pub trunk_context: String,

    /// Wrap the switch CLI in `sudo -S`
    pub use_sudo: bool,

    /// Password fed to `sudo -S`
    pub sudo_password: Option<String>,

    /// Origination command timeout in seconds
    pub originate_timeout_secs: u64,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Default for OutdialConfig {
    /// Loads OUTDIAL_* environment variables, falling back to defaults
    fn default() -> Self {
        Self {
            store_path: env_non_empty("OUTDIAL_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            answers_dir: env_non_empty("OUTDIAL_ANSWERS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ANSWERS_DIR)),
            source_number: env_non_empty("OUTDIAL_SOURCE_NUMBER"),
            max_concurrent: env_parsed("OUTDIAL_MAX_CONCURRENT").unwrap_or(DEFAULT_MAX_CONCURRENT),
            poll_interval_ms: env_parsed("OUTDIAL_POLL_INTERVAL_MS")
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            call_deadline_secs: env_parsed("OUTDIAL_CALL_DEADLINE_SECS")
                .unwrap_or(DEFAULT_CALL_DEADLINE_SECS),
            asterisk_bin: env_non_empty("OUTDIAL_ASTERISK_BIN")
                .unwrap_or_else(|| DEFAULT_ASTERISK_BIN.to_string()),
            player_context: env_non_empty("OUTDIAL_PLAYER_CONTEXT")
                .unwrap_or_else(|| DEFAULT_PLAYER_CONTEXT.to_string()),
            trunk_context: env_non_empty("OUTDIAL_TRUNK_CONTEXT")
                .unwrap_or_else(|| DEFAULT_TRUNK_CONTEXT.to_string()),
            use_sudo: env_parsed("OUTDIAL_USE_SUDO").unwrap_or(false),
            sudo_password: env::var("OUTDIAL_SUDO_PASSWORD").ok(),
            originate_timeout_secs: env_parsed("OUTDIAL_ORIGINATE_TIMEOUT_SECS")
                .unwrap_or(DEFAULT_ORIGINATE_TIMEOUT_SECS),
            log_level: env::var("OUTDIAL_LOG_LEVEL")
                .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
                .to_lowercase(),
        }
    }
}

impl OutdialConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 || self.max_concurrent > MAX_CONCURRENT_LIMIT {
            return Err(ConfigError::ValidationFailed(format!(
                "max_concurrent must be between 1 and {}, got {}",
                MAX_CONCURRENT_LIMIT, self.max_concurrent
            )));
        }

        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&self.poll_interval_ms) {
            return Err(ConfigError::ValidationFailed(format!(
                "poll interval must be between {}ms and {}ms, got {}ms",
                MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS, self.poll_interval_ms
            )));
        }

        if self.originate_timeout_secs == 0
            || self.originate_timeout_secs > MAX_ORIGINATE_TIMEOUT_SECS
        {
            return Err(ConfigError::ValidationFailed(format!(
                "origination timeout must be between 1s and {}s, got {}s",
                MAX_ORIGINATE_TIMEOUT_SECS, self.originate_timeout_secs
            )));
        }

        if self.player_context.trim().is_empty() || self.trunk_context.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "dialplan contexts cannot be empty".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-call deadline, `None` when configured to wait forever
    pub fn call_deadline(&self) -> Option<Duration> {
        (self.call_deadline_secs > 0).then(|| Duration::from_secs(self.call_deadline_secs))
    }

    /// Dispatch parameters for a run
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingSourceNumber` when no source number is set
    pub fn dispatch_options(&self) -> Result<DispatchOptions, ConfigError> {
        let source = self
            .source_number
            .clone()
            .ok_or(ConfigError::MissingSourceNumber)?;

        Ok(DispatchOptions::new(source)
            .with_max_concurrent(self.max_concurrent)
            .with_poll_interval(self.poll_interval())
            .with_call_deadline(self.call_deadline()))
    }

    /// Switch connection settings
    pub fn asterisk_settings(&self) -> AsteriskSettings {
        AsteriskSettings {
            binary: self.asterisk_bin.clone(),
            player_context: self.player_context.clone(),
            trunk_context: self.trunk_context.clone(),
            use_sudo: self.use_sudo,
            sudo_password: self.sudo_password.clone(),
            timeout: Duration::from_secs(self.originate_timeout_secs),
        }
    }

    /// Converts configuration to a display map for output formatting
    ///
    /// The sudo password is never included.
    pub fn to_display_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();

        map.insert(
            "store_path".to_string(),
            self.store_path.display().to_string(),
        );
        map.insert(
            "answers_dir".to_string(),
            self.answers_dir.display().to_string(),
        );
        if let Some(ref source) = self.source_number {
            map.insert("source_number".to_string(), source.clone());
        }
        map.insert(
            "max_concurrent".to_string(),
            self.max_concurrent.to_string(),
        );
        map.insert(
            "poll_interval_ms".to_string(),
            self.poll_interval_ms.to_string(),
        );
        map.insert(
            "call_deadline_secs".to_string(),
            self.call_deadline_secs.to_string(),
        );
        map.insert("asterisk_bin".to_string(), self.asterisk_bin.clone());
        map.insert("player_context".to_string(), self.player_context.clone());
        map.insert("trunk_context".to_string(), self.trunk_context.clone());
        map.insert("use_sudo".to_string(), self.use_sudo.to_string());
        map.insert(
            "originate_timeout_secs".to_string(),
            self.originate_timeout_secs.to_string(),
        );
        map.insert("log_level".to_string(), self.log_level.clone());

        map
    }
}

impl fmt::Debug for OutdialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutdialConfig")
            .field("store_path", &self.store_path)
            .field("answers_dir", &self.answers_dir)
            .field("source_number", &self.source_number)
            .field("max_concurrent", &self.max_concurrent)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("call_deadline_secs", &self.call_deadline_secs)
            .field("asterisk_bin", &self.asterisk_bin)
            .field("player_context", &self.player_context)
            .field("trunk_context", &self.trunk_context)
            .field("use_sudo", &self.use_sudo)
            .field(
                "sudo_password",
                &self.sudo_password.as_ref().map(|_| "<redacted>"),
            )
            .field("originate_timeout_secs", &self.originate_timeout_secs)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl fmt::Display for OutdialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Outdial Configuration:")?;
        writeln!(f, "  Store: {}", self.store_path.display())?;
        writeln!(f, "  Answers Dir: {}", self.answers_dir.display())?;
        match self.source_number {
            Some(ref source) => writeln!(f, "  Source Number: {}", source)?,
            None => writeln!(f, "  Source Number: (not set)")?,
        }
        writeln!(f, "  Max Concurrent: {}", self.max_concurrent)?;
        writeln!(f, "  Poll Interval: {}ms", self.poll_interval_ms)?;
        match self.call_deadline() {
            Some(deadline) => writeln!(f, "  Call Deadline: {}s", deadline.as_secs())?,
            None => writeln!(f, "  Call Deadline: none")?,
        }
        writeln!(
            f,
            "  Switch: {}{} (contexts {} / {})",
            if self.use_sudo { "sudo " } else { "" },
            self.asterisk_bin,
            self.player_context,
            self.trunk_context
        )?;
        writeln!(f, "  Originate Timeout: {}s", self.originate_timeout_secs)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
