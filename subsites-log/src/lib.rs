//! Subsites Logging Setup
//!
//! Installs a `tracing` subscriber configured from `SUBSITES_*` environment
//! variables. The other subsites crates log through `tracing` macros; this
//! crate only decides where those events go.
//!
//! # Usage
//!
//! ```rust,no_run
//! subsites_log::init().expect("logging already initialized");
//!
//! tracing::info!(subsite = 2, "Resolved host");
//! ```
//!
//! # Environment Variables
//!
//! - `SUBSITES_DEBUG=1` - Enable debug logging
//! - `SUBSITES_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `SUBSITES_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `SUBSITES_LOG_COLOR=1|0` - Enable/disable colors
//! - `SUBSITES_LOG_MODULE=1|0` - Include the event target
//! - `SUBSITES_LOG` - Full `EnvFilter` directives, overriding the level

use once_cell::sync::Lazy;
use std::env;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Variable holding raw filter directives
pub const FILTER_ENV: &str = "SUBSITES_LOG";

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level that reaches the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    /// No logging
    Off,
}

impl Level {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// `EnvFilter` directive for this level
    pub fn directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.directive())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON lines for log collectors
    Json,
}

impl Format {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include the event target
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false,
            module_path: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create config from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| {
            lookup(key).map(|v| {
                let v = v.trim().to_lowercase();
                v == "1" || v == "true" || v == "yes" || v == "on"
            })
        };

        let debug = flag("SUBSITES_DEBUG").unwrap_or(false);

        let level = lookup("SUBSITES_LOG_LEVEL")
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("SUBSITES_LOG_FORMAT")
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Json);

        let color = flag("SUBSITES_LOG_COLOR")
            .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        let module_path = flag("SUBSITES_LOG_MODULE").unwrap_or(true);

        Self {
            debug,
            level,
            format,
            color: color && format != Format::Json,
            module_path,
        }
    }

    /// Filter used when `SUBSITES_LOG` is not set.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::new(self.level.directive())
    }
}

/// Configuration read from the environment on first use.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

// ============================================================================
// Initialization
// ============================================================================

/// Logging setup errors
#[derive(Error, Debug)]
pub enum LogError {
    #[error("Failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global subscriber from environment configuration.
pub fn init() -> Result<(), LogError> {
    init_with(config())
}

/// Install the global subscriber from `config`.
///
/// Fails if a global subscriber is already set.
pub fn init_with(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| config.filter());
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        Format::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_target(config.module_path),
            )
            .try_init()?,
        Format::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_ansi(config.color)
                    .with_target(config.module_path),
            )
            .try_init()?,
        Format::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(config.color)
                    .with_target(config.module_path),
            )
            .try_init()?,
    }

    tracing::debug!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
