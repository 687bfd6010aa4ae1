//! # Aperture Config - Options Model and Validation
//!
//! Loads raw configuration from a file and `APERTURE__*` environment variables, then
//! validates it into an immutable [`Options`] snapshot. Validation reports every problem
//! in one pass.

pub mod address;
pub mod options;
pub mod raw;
pub mod token;
pub mod validation;

use std::path::Path;

use aperture_const::{CONFIG_ENV_PREFIX, CONFIG_ENV_SEPARATOR};
use config::{Config as ConfigBuilder, ConfigError as LoadError, Environment, File};

pub use address::{AddressError, BindAddress, Scheme};
pub use options::{
    AllowedCertificateRule, FrontendAuth, FrontendAuthMode, FrontendOptions,
    OpenIdConnectOptions, Options, OptionsSource, OtlpAuth, OtlpAuthMode, OtlpCors,
    OtlpOptions, RequiredClaim, ResourceClientAuth, ResourceServiceClientOptions, Secret,
    TelemetryLimitOptions, TlsOptions,
};
pub use raw::{parse_bool, RawOptions};
pub use validation::{ConfigError, ConfigErrors};

/// Load raw configuration from file and environment
///
/// The file is optional. Environment variables override it, for example
/// `APERTURE__OTLP__HTTP_ENDPOINT_URL=http://localhost:4318`.
pub fn load<P: AsRef<Path>>(path: P) -> Result<RawOptions, LoadError> {
    let builder = ConfigBuilder::builder()
        .add_source(File::from(path.as_ref()).required(false))
        .add_source(Environment::with_prefix(CONFIG_ENV_PREFIX).separator(CONFIG_ENV_SEPARATOR))
        .build()?;

    builder.try_deserialize()
}

/// Load raw configuration, falling back to defaults when loading fails
pub fn load_or_default<P: AsRef<Path>>(path: P) -> RawOptions {
    load(path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load configuration, using defaults");
        RawOptions::default()
    })
}
