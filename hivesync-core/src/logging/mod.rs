//! Logging subsystem for HiveSync
//!
//! This module provides a unified logging interface using the `tracing` crate.
//! Subscriber setup happens once per binary through [`init_logging`]; library
//! components never touch global state. Each component instead receives a
//! [`LogHandle`] at construction and emits its events under that handle's span,
//! so a process, its steps and the data manager calls they make nest naturally.

use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

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
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamp: true,
            with_target: true,
            json_format: false,
        }
    }
}

impl LogConfig {
    /// Create a new LogConfig with specified level
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Set whether to include timestamps
    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.with_timestamp = enabled;
        self
    }

    /// Set whether to include target information
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Set whether to use JSON formatting
    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }
}

/// Initialize the logging subsystem with default configuration
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize the logging subsystem with custom configuration
///
/// `RUST_LOG` wins over the configured level when it is set.
///
/// # Example
/// ```
/// use hivesync_core::logging::{init_logging_with_config, LogConfig, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Debug).with_target(false);
/// init_logging_with_config(config).expect("Failed to initialize logging");
/// ```
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(config.with_target);

    let result = match (config.json_format, config.with_timestamp) {
        (true, true) => registry.with(layer.json()).try_init(),
        (true, false) => registry.with(layer.json().without_time()).try_init(),
        (false, true) => registry.with(layer).try_init(),
        (false, false) => registry.with(layer.without_time()).try_init(),
    };

    result.map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}

/// Explicit logging handle handed to each component
///
/// Events are emitted with `parent: handle.span()`, so they carry the
/// component (and process/step) context without any global logger.
#[derive(Debug, Clone)]
pub struct LogHandle {
    span: Span,
}

impl LogHandle {
    /// Root handle for a top-level component
    pub fn new(component: &'static str) -> Self {
        LogHandle { span: tracing::info_span!("hivesync", component) }
    }

    /// Handle that records nothing
    pub fn disabled() -> Self {
        LogHandle { span: Span::none() }
    }

    /// Nested handle for a sub-component
    pub fn child(&self, component: &str) -> Self {
        LogHandle { span: tracing::info_span!(parent: &self.span, "component", name = %component) }
    }

    /// Nested handle for one process run
    pub fn process(&self, id: &uuid::Uuid, name: &str) -> Self {
        LogHandle { span: tracing::info_span!(parent: &self.span, "process", %id, name = %name) }
    }

    /// Nested handle for one process step
    pub fn step(&self, name: &str) -> Self {
        LogHandle { span: tracing::debug_span!(parent: &self.span, "step", name = %name) }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Default for LogHandle {
    fn default() -> Self {
        Self::disabled()
    }
}
