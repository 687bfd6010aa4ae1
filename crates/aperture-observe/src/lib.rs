//! # Aperture Observe - Logging
//!
//! Centralized structured logging for every aperture crate.

use anyhow::Result;

pub mod logging;

pub use logging::{
    auth_span, connection_span, record_auth_outcome, LogConfig, LogFormat, LoggingError,
};

/// Initialize logging with the default configuration
///
/// Calling this more than once is not an error; later calls leave the first
/// subscriber in place.
pub fn init() -> Result<()> {
    init_with_config(LogConfig::default())
}

/// Initialize logging, tolerating an already installed subscriber
///
/// # Errors
///
/// Fails when the configured filter does not parse.
pub fn init_with_config(config: LogConfig) -> Result<()> {
    match logging::init_logging(config) {
        Ok(()) => Ok(()),
        Err(e @ LoggingError::SubscriberInstalled { .. }) => {
            tracing::debug!(error = %e, "Logging already initialized, skipping");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init().unwrap();
        init().unwrap();
    }

    #[test]
    fn test_bad_filter_is_reported_even_when_initialized() {
        init().unwrap();
        let result = init_with_config(LogConfig {
            filter: Some("[".to_string()),
            ..LogConfig::default()
        });
        assert!(result.is_err());
    }
}
