//! Structured logging utilities for aperture
//!
//! Provides subscriber initialization and the spans used around authentication decisions.

use thiserror::Error;
use tracing::Span;
use tracing_subscriber::{filter::ParseError, fmt::format::FmtSpan, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info,aperture=debug";

/// Errors from [`init_logging`]
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The configured filter directive does not parse
    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] ParseError),

    /// A global subscriber is already installed
    #[error("failed to initialize {format:?} logger: {reason}")]
    SubscriberInstalled { format: LogFormat, reason: String },
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors (for development)
    Pretty,
    /// Compact format without colors
    Compact,
    /// JSON format (for production)
    Json,
}

#[allow(clippy::derivable_impls)]
impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        {
            LogFormat::Pretty
        }
        #[cfg(not(debug_assertions))]
        {
            LogFormat::Json
        }
    }
}

/// Configuration for logging behavior
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format
    pub format: LogFormat,
    /// Whether to include file/line numbers
    pub include_location: bool,
    /// Whether to include target module
    pub include_target: bool,
    /// Whether to log span close events
    pub log_spans: bool,
    /// Environment filter (e.g., "info,aperture=debug")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            include_location: cfg!(debug_assertions),
            include_target: true,
            log_spans: false,
            filter: None,
        }
    }
}

/// Initialize structured logging
///
/// # Errors
///
/// [`LoggingError::InvalidFilter`] when the filter does not parse and
/// [`LoggingError::SubscriberInstalled`] when a global subscriber already exists.
pub fn init_logging(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = match config.filter {
        Some(filter) => EnvFilter::try_new(filter)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    let fmt_span = if config.log_spans {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(fmt_span);

    let installed = match config.format {
        LogFormat::Pretty => subscriber.pretty().try_init(),
        LogFormat::Compact => subscriber.compact().try_init(),
        LogFormat::Json => subscriber.json().try_init(),
    };
    installed.map_err(|e| LoggingError::SubscriberInstalled {
        format: config.format,
        reason: e.to_string(),
    })?;

    tracing::debug!(format = ?config.format, "Logging initialized");

    Ok(())
}

/// Span around one authentication decision
///
/// `outcome` and `duration_us` are recorded once the chain finishes.
pub fn auth_span(surface: &str, mode: &str) -> Span {
    tracing::debug_span!(
        "authentication",
        surface = surface,
        mode = mode,
        outcome = tracing::field::Empty,
        duration_us = tracing::field::Empty,
    )
}

/// Record the outcome of an authentication span
pub fn record_auth_outcome(span: &Span, outcome: &str, duration_us: u128) {
    span.record("outcome", outcome);
    span.record("duration_us", duration_us);
}

/// Span for a listener's accept loop
pub fn connection_span(listener: &str, classes: &str) -> Span {
    tracing::info_span!("listener", address = listener, classes = classes)
}
