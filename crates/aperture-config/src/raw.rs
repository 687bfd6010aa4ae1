//! Raw configuration values
//!
//! These structs mirror the configuration file and environment layout one to one.
//! Every field is optional or defaulted; [`crate::OptionsSource::build`] turns them into
//! validated [`crate::Options`].

use std::path::PathBuf;

use aperture_const::{
    DEFAULT_MAX_ATTRIBUTE_COUNT, DEFAULT_MAX_CONSOLE_LOG_COUNT, DEFAULT_MAX_LOG_COUNT,
    DEFAULT_MAX_METRICS_COUNT, DEFAULT_MAX_TRACE_COUNT, DEFAULT_NAME_CLAIM_TYPE,
    DEFAULT_OIDC_CHALLENGE_PATH, DEFAULT_USERNAME_CLAIM_TYPE,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOptions {
    pub application_name: Option<String>,

    /// Boolean-ish text, see [`parse_bool`]
    pub unsecured_allow_anonymous: Option<String>,

    pub frontend: RawFrontendOptions,
    pub otlp: RawOtlpOptions,
    pub tls: RawTlsOptions,
    pub resource_service_client: RawResourceServiceClientOptions,
    pub telemetry_limits: RawTelemetryLimitOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFrontendOptions {
    /// Semicolon-delimited list of URLs
    #[serde(default)]
    pub endpoint_urls: Option<String>,

    #[serde(default)]
    pub auth_mode: Option<String>,

    #[serde(default)]
    pub browser_token: Option<String>,

    #[serde(default = "default_max_console_log_count")]
    pub max_console_log_count: usize,

    #[serde(default)]
    pub open_id_connect: RawOpenIdConnectOptions,
}

impl Default for RawFrontendOptions {
    fn default() -> Self {
        Self {
            endpoint_urls: None,
            auth_mode: None,
            browser_token: None,
            max_console_log_count: default_max_console_log_count(),
            open_id_connect: RawOpenIdConnectOptions::default(),
        }
    }
}

fn default_max_console_log_count() -> usize {
    DEFAULT_MAX_CONSOLE_LOG_COUNT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOpenIdConnectOptions {
    /// Comma-delimited claim types searched for the display name
    #[serde(default = "default_name_claim_type")]
    pub name_claim_type: String,

    /// Comma-delimited claim types searched for the username
    #[serde(default = "default_username_claim_type")]
    pub username_claim_type: String,

    #[serde(default)]
    pub required_claim_type: Option<String>,

    #[serde(default)]
    pub required_claim_value: Option<String>,

    #[serde(default = "default_challenge_path")]
    pub challenge_path: String,
}

impl Default for RawOpenIdConnectOptions {
    fn default() -> Self {
        Self {
            name_claim_type: default_name_claim_type(),
            username_claim_type: default_username_claim_type(),
            required_claim_type: None,
            required_claim_value: None,
            challenge_path: default_challenge_path(),
        }
    }
}

fn default_name_claim_type() -> String {
    DEFAULT_NAME_CLAIM_TYPE.to_string()
}

fn default_username_claim_type() -> String {
    DEFAULT_USERNAME_CLAIM_TYPE.to_string()
}

fn default_challenge_path() -> String {
    DEFAULT_OIDC_CHALLENGE_PATH.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOtlpOptions {
    pub grpc_endpoint_url: Option<String>,
    pub http_endpoint_url: Option<String>,
    pub auth_mode: Option<String>,
    pub primary_api_key: Option<String>,
    pub secondary_api_key: Option<String>,
    pub cors: RawOtlpCors,
    pub allowed_certificates: Vec<RawAllowedCertificate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOtlpCors {
    /// Comma-delimited origins; `*` allows any origin
    pub allowed_origins: Option<String>,
    /// Comma-delimited header names; `*` allows any header
    pub allowed_headers: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAllowedCertificate {
    pub thumbprint: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTlsOptions {
    pub certificate_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub client_ca_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawResourceServiceClientOptions {
    pub url: Option<String>,
    pub auth_mode: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTelemetryLimitOptions {
    #[serde(default = "default_max_log_count")]
    pub max_log_count: usize,

    #[serde(default = "default_max_trace_count")]
    pub max_trace_count: usize,

    #[serde(default = "default_max_metrics_count")]
    pub max_metrics_count: usize,

    #[serde(default = "default_max_attribute_count")]
    pub max_attribute_count: usize,

    #[serde(default = "default_unbounded")]
    pub max_attribute_length: usize,

    #[serde(default = "default_unbounded")]
    pub max_span_event_count: usize,
}

impl Default for RawTelemetryLimitOptions {
    fn default() -> Self {
        Self {
            max_log_count: default_max_log_count(),
            max_trace_count: default_max_trace_count(),
            max_metrics_count: default_max_metrics_count(),
            max_attribute_count: default_max_attribute_count(),
            max_attribute_length: default_unbounded(),
            max_span_event_count: default_unbounded(),
        }
    }
}

fn default_max_log_count() -> usize {
    DEFAULT_MAX_LOG_COUNT
}

fn default_max_trace_count() -> usize {
    DEFAULT_MAX_TRACE_COUNT
}

fn default_max_metrics_count() -> usize {
    DEFAULT_MAX_METRICS_COUNT
}

fn default_max_attribute_count() -> usize {
    DEFAULT_MAX_ATTRIBUTE_COUNT
}

fn default_unbounded() -> usize {
    usize::MAX
}

/// Parse a boolean configuration value
///
/// Accepts `true`/`false` in any case and integers, where any non-zero integer is true.
/// Anything else yields `None`, which callers treat as unset.
pub fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        value.parse::<i64>().ok().map(|n| n != 0)
    }
}

/// Split a delimited list, trimming entries and dropping empty ones
pub(crate) fn split_list(value: &str, delimiter: char) -> Vec<String> {
    value
        .split(delimiter)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Treat blank strings as absent
pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
