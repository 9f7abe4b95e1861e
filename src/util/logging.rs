//! Structured logging setup for outdial
//!
//! Events go through `tracing` and are written to stderr, so reports printed
//! on stdout stay machine-readable. Only `outdial` events are shown at the
//! configured level; dependencies are held at `warn`. `RUST_LOG` replaces the
//! whole filter when set.
//!
//! # Example
//!
//! ```no_run
//! use outdial::util::logging;
//!
//! // Reads OUTDIAL_LOG_LEVEL and OUTDIAL_LOG_JSON
//! logging::init_from_env();
//!
//! tracing::info!(call_id = 7, "Started call");
//! ```

use std::env;
use std::io::{self, IsTerminal};
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Event rendering on stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines, colored when stderr is a terminal
    #[default]
    Text,
    /// One JSON object per event, for log shipping
    Json,
}

impl LogFormat {
    /// `Json` when `OUTDIAL_LOG_JSON` is `true`, `Text` otherwise
    pub fn from_env() -> Self {
        match env::var("OUTDIAL_LOG_JSON").ok().and_then(|v| v.parse().ok()) {
            Some(true) => Self::Json,
            _ => Self::Text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level applied to `outdial` events
    pub level: Level,
    pub format: LogFormat,
    /// Show the emitting module, e.g. `outdial::dispatch`
    pub include_target: bool,
    /// Show file and line of the emitting call site
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            include_target: true,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// ```
    /// use outdial::util::LoggingConfig;
    /// use tracing::Level;
    ///
    /// let config = LoggingConfig::with_level(Level::DEBUG);
    /// assert_eq!(config.filter_directive(), "warn,outdial=debug");
    /// ```
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Reads `OUTDIAL_LOG_LEVEL` (default "info") and `OUTDIAL_LOG_JSON`
    pub fn from_env() -> Self {
        let level = env::var("OUTDIAL_LOG_LEVEL")
            .map(|s| parse_level(&s))
            .unwrap_or(Level::INFO);
        let format = LogFormat::from_env();

        Self {
            level,
            format,
            include_location: format == LogFormat::Json,
            ..Default::default()
        }
    }

    /// Filter used when `RUST_LOG` is not set
    pub fn filter_directive(&self) -> String {
        format!(
            "warn,{}={}",
            env!("CARGO_CRATE_NAME"),
            self.level.to_string().to_lowercase()
        )
    }

    fn filter(&self) -> EnvFilter {
        if env::var_os("RUST_LOG").is_some() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(self.filter_directive())
        }
    }
}

/// Parses a level name, case-insensitively
///
/// Unknown names fall back to `INFO` with a note on stderr, since logging is
/// not up yet when this runs.
///
/// ```
/// use outdial::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("WARN"), Level::WARN);
/// assert_eq!(parse_level("loud"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    level_str.trim().parse().unwrap_or_else(|_| {
        eprintln!(
            "Invalid log level '{}', using info. Valid levels: trace, debug, info, warn, error",
            level_str
        );
        Level::INFO
    })
}

/// Installs the global subscriber; later calls are ignored
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(config.include_target)
            .with_file(config.include_location)
            .with_line_number(config.include_location);
        let registry = tracing_subscriber::registry().with(config.filter());

        match config.format {
            LogFormat::Json => registry.with(layer.json()).init(),
            LogFormat::Text => registry
                .with(layer.with_ansi(io::stderr().is_terminal()))
                .init(),
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

pub fn init_from_env() {
    init_logging(LoggingConfig::from_env());
}
