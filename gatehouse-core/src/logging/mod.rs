//! Logging subsystem for Gatehouse
//!
//! Installs a global `tracing` subscriber. Output is either human-readable
//! or JSON lines; the level comes from `RUST_LOG` when set, otherwise from
//! the configured [`LogLevel`] or an explicit filter directive string.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

/// Configuration for the logging subsystem
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// The minimum log level to display
    pub level: LogLevel,
    /// Whether to include timestamps
    pub with_timestamp: bool,
    /// Whether to include target module information
    pub with_target: bool,
    /// Whether to use JSON formatting
    pub json_format: bool,
    /// Full `EnvFilter` directive, e.g. `gatehouse_core=debug,info`
    pub directives: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamp: true,
            with_target: true,
            json_format: false,
            directives: None,
        }
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self { level, ..Default::default() }
    }

    /// Build from the `[logging]` section of the service configuration
    pub fn from_settings(settings: &LoggingConfig) -> Self {
        Self {
            level: settings.level,
            with_timestamp: settings.with_timestamp,
            with_target: settings.with_target,
            json_format: settings.json_format,
            directives: settings.directives.clone(),
        }
    }

    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.with_timestamp = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    pub fn directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    /// Resolve the filter: explicit directives win, then `RUST_LOG`, then the level
    pub fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        match &self.directives {
            Some(directives) => EnvFilter::try_new(directives)
                .map_err(|e| LoggingError::InvalidConfiguration(e.to_string())),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))),
        }
    }
}

/// Initialize logging at `info` with human-readable output
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize the logging subsystem with custom configuration
///
/// # Example
/// ```
/// use gatehouse_core::logging::{init_logging_with_config, LogConfig, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Debug)
///     .with_timestamp(false)
///     .with_target(false);
///
/// init_logging_with_config(config).expect("Failed to initialize logging");
/// ```
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = config.env_filter()?;

    let output: Box<dyn Layer<Registry> + Send + Sync> =
        match (config.json_format, config.with_timestamp) {
            (true, true) => fmt::layer().json().with_target(config.with_target).boxed(),
            (true, false) => {
                fmt::layer().json().without_time().with_target(config.with_target).boxed()
            }
            (false, true) => fmt::layer().with_target(config.with_target).boxed(),
            (false, false) => fmt::layer().without_time().with_target(config.with_target).boxed(),
        };

    tracing_subscriber::registry()
        .with(output)
        .with(env_filter)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}
