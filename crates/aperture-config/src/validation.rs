//! Configuration validation
//!
//! Turns [`RawOptions`] into [`Options`]. Every rule runs even after an earlier one fails,
//! so a single pass reports every problem at once.

use std::fmt;
use std::sync::OnceLock;

use thiserror::Error;
use url::Url;

use crate::address::BindAddress;
use crate::options::{
    normalize_mode, AllowedCertificateRule, FrontendAuth, FrontendAuthMode, FrontendOptions,
    OpenIdConnectOptions, Options, OtlpAuth, OtlpAuthMode, OtlpCors, OtlpOptions,
    RequiredClaim, ResourceClientAuth, ResourceServiceClientOptions, Secret,
    TelemetryLimitOptions, TlsOptions,
};
use crate::raw::{
    non_blank, parse_bool, split_list, RawFrontendOptions, RawOptions, RawOtlpOptions,
    RawResourceServiceClientOptions, RawTelemetryLimitOptions,
};
use crate::token::generate_browser_token;
use aperture_const::DEFAULT_APPLICATION_NAME;

/// A single validation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("One or more frontend endpoint URLs are not configured. Specify frontend.endpoint_urls.")]
    MissingFrontendEndpoints,

    #[error("Failed to parse {key} URL '{url}': {reason}.")]
    InvalidEndpointUrl {
        key: &'static str,
        url: String,
        reason: String,
    },

    #[error("Neither OTLP/gRPC or OTLP/HTTP endpoint URLs are configured. Specify either otlp.grpc_endpoint_url or otlp.http_endpoint_url.")]
    MissingOtlpEndpoints,

    #[error("CORS configured without an OTLP HTTP endpoint. Either remove otlp.cors.allowed_origins or specify otlp.http_endpoint_url.")]
    CorsWithoutHttpEndpoint,

    #[error("Unknown value '{value}' for {key}.")]
    UnknownAuthMode { key: &'static str, value: String },

    #[error("OpenID Connect claim type for name not configured. Specify frontend.open_id_connect.name_claim_type.")]
    MissingNameClaimType,

    #[error("OpenID Connect claim type for username not configured. Specify frontend.open_id_connect.username_claim_type.")]
    MissingUsernameClaimType,

    #[error("frontend.open_id_connect.required_claim_value is set without frontend.open_id_connect.required_claim_type.")]
    RequiredClaimValueWithoutType,

    #[error("frontend.open_id_connect.challenge_path '{0}' must be a local path starting with '/'.")]
    InvalidChallengePath(String),

    #[error("API key authentication requires otlp.primary_api_key.")]
    MissingPrimaryApiKey,

    #[error("otlp.allowed_certificates[{index}] has neither a thumbprint nor a subject.")]
    EmptyCertificateRule { index: usize },

    #[error("otlp.allowed_certificates[{index}] thumbprint '{thumbprint}' is not hexadecimal.")]
    InvalidThumbprint { index: usize, thumbprint: String },

    #[error("Client certificate authentication requires {key} to use https, but it is '{url}'.")]
    ClientCertificateRequiresHttps { key: &'static str, url: String },

    #[error("Client certificate authentication requires tls.client_ca_path.")]
    MissingClientCa,

    #[error("Endpoint '{url}' uses https, which requires tls.certificate_path and tls.key_path.")]
    MissingTlsMaterial { url: String },

    #[error("Failed to parse resource_service_client.url '{0}'. It must be an absolute URL.")]
    InvalidResourceServiceUrl(String),

    #[error("Resource service API key authentication requires resource_service_client.api_key.")]
    MissingResourceServiceApiKey,

    #[error("{key} must be greater than zero.")]
    InvalidLimit { key: &'static str },
}

impl ConfigError {
    /// The configuration key the failure is about
    pub fn key(&self) -> &'static str {
        match self {
            Self::MissingFrontendEndpoints => "frontend.endpoint_urls",
            Self::InvalidEndpointUrl { key, .. } => key,
            Self::MissingOtlpEndpoints => "otlp",
            Self::CorsWithoutHttpEndpoint => "otlp.cors.allowed_origins",
            Self::UnknownAuthMode { key, .. } => key,
            Self::MissingNameClaimType => "frontend.open_id_connect.name_claim_type",
            Self::MissingUsernameClaimType => "frontend.open_id_connect.username_claim_type",
            Self::RequiredClaimValueWithoutType => "frontend.open_id_connect.required_claim_value",
            Self::InvalidChallengePath(_) => "frontend.open_id_connect.challenge_path",
            Self::MissingPrimaryApiKey => "otlp.primary_api_key",
            Self::EmptyCertificateRule { .. } | Self::InvalidThumbprint { .. } => {
                "otlp.allowed_certificates"
            }
            Self::ClientCertificateRequiresHttps { key, .. } => key,
            Self::MissingClientCa => "tls.client_ca_path",
            Self::MissingTlsMaterial { .. } => "tls",
            Self::InvalidResourceServiceUrl(_) => "resource_service_client.url",
            Self::MissingResourceServiceApiKey => "resource_service_client.api_key",
            Self::InvalidLimit { key } => key,
        }
    }
}

/// Every failure from one validation pass, in rule order
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigErrors(Vec<ConfigError>);

impl ConfigErrors {
    fn new(errors: Vec<ConfigError>) -> Option<Self> {
        (!errors.is_empty()).then_some(Self(errors))
    }

    /// Individual failures
    pub fn errors(&self) -> &[ConfigError] {
        &self.0
    }

    /// Human-readable message per failure
    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }

    /// Number of failures
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.0.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigErrors {}

/// Run every rule over `raw`
pub(crate) fn build_options(
    raw: &RawOptions,
    generated_token: &OnceLock<String>,
) -> Result<Options, ConfigErrors> {
    let mut errors = Vec::new();

    let allow_anonymous = raw
        .unsecured_allow_anonymous
        .as_deref()
        .and_then(parse_bool)
        .unwrap_or(false);

    let frontend = validate_frontend(&raw.frontend, allow_anonymous, generated_token, &mut errors);
    let otlp = validate_otlp(&raw.otlp, &mut errors);

    let tls = TlsOptions {
        certificate_path: raw.tls.certificate_path.clone(),
        key_path: raw.tls.key_path.clone(),
        client_ca_path: raw.tls.client_ca_path.clone(),
    };
    if let (Some(frontend), Some(otlp)) = (&frontend, &otlp) {
        validate_tls(frontend, otlp, &tls, &mut errors);
    }

    let resource_service_client =
        validate_resource_service_client(&raw.resource_service_client, &mut errors);
    let telemetry_limits = validate_limits(&raw.telemetry_limits, &mut errors);

    if let Some(errors) = ConfigErrors::new(errors) {
        return Err(errors);
    }

    match (frontend, otlp) {
        (Some(frontend), Some(otlp)) => Ok(Options {
            application_name: non_blank(&raw.application_name)
                .unwrap_or(DEFAULT_APPLICATION_NAME)
                .to_string(),
            frontend,
            otlp,
            tls,
            resource_service_client,
            telemetry_limits,
        }),
        // A section that produced no value always pushed an error above
        _ => Err(ConfigErrors(vec![ConfigError::MissingFrontendEndpoints])),
    }
}

fn parse_endpoint(key: &'static str, url: &str, errors: &mut Vec<ConfigError>) -> Option<BindAddress> {
    match BindAddress::parse(url) {
        Ok(address) => Some(address),
        Err(e) => {
            errors.push(ConfigError::InvalidEndpointUrl {
                key,
                url: url.to_string(),
                reason: e.to_string(),
            });
            None
        }
    }
}

fn validate_frontend(
    raw: &RawFrontendOptions,
    allow_anonymous: bool,
    generated_token: &OnceLock<String>,
    errors: &mut Vec<ConfigError>,
) -> Option<FrontendOptions> {
    let urls = non_blank(&raw.endpoint_urls)
        .map(|urls| split_list(urls, ';'))
        .unwrap_or_default();
    if urls.is_empty() {
        errors.push(ConfigError::MissingFrontendEndpoints);
    }
    let before = errors.len();
    let endpoints: Vec<BindAddress> = urls
        .iter()
        .filter_map(|url| parse_endpoint("frontend.endpoint_urls", url, errors))
        .collect();
    let endpoints_ok = !endpoints.is_empty() && errors.len() == before;

    if raw.max_console_log_count == 0 {
        errors.push(ConfigError::InvalidLimit {
            key: "frontend.max_console_log_count",
        });
    }

    let mode = match non_blank(&raw.auth_mode) {
        Some(value) => match FrontendAuthMode::parse(value) {
            Some(mode) => mode,
            None => {
                errors.push(ConfigError::UnknownAuthMode {
                    key: "frontend.auth_mode",
                    value: value.to_string(),
                });
                return None;
            }
        },
        None if allow_anonymous => FrontendAuthMode::Unsecured,
        None => FrontendAuthMode::BrowserToken,
    };

    let auth = match mode {
        FrontendAuthMode::BrowserToken => {
            let token = match non_blank(&raw.browser_token) {
                Some(token) => token,
                None => generated_token.get_or_init(generate_browser_token).as_str(),
            };
            FrontendAuth::BrowserToken {
                token: Secret::from_text(token),
            }
        }
        FrontendAuthMode::OpenIdConnect => {
            let oidc = &raw.open_id_connect;
            let name_claim_types = split_list(&oidc.name_claim_type, ',');
            if name_claim_types.is_empty() {
                errors.push(ConfigError::MissingNameClaimType);
            }
            let username_claim_types = split_list(&oidc.username_claim_type, ',');
            if username_claim_types.is_empty() {
                errors.push(ConfigError::MissingUsernameClaimType);
            }

            let required_value = non_blank(&oidc.required_claim_value).map(str::to_string);
            let required_claim = match non_blank(&oidc.required_claim_type) {
                Some(claim_type) => Some(RequiredClaim {
                    claim_type: claim_type.to_string(),
                    value: required_value,
                }),
                None => {
                    if required_value.is_some() {
                        errors.push(ConfigError::RequiredClaimValueWithoutType);
                    }
                    None
                }
            };

            let challenge_path = oidc.challenge_path.trim().to_string();
            if !is_local_path(&challenge_path) {
                errors.push(ConfigError::InvalidChallengePath(challenge_path.clone()));
            }

            FrontendAuth::OpenIdConnect(OpenIdConnectOptions {
                name_claim_types,
                username_claim_types,
                required_claim,
                challenge_path,
            })
        }
        FrontendAuthMode::Unsecured => FrontendAuth::Unsecured,
    };

    endpoints_ok.then_some(FrontendOptions {
        endpoints,
        auth,
        max_console_log_count: raw.max_console_log_count,
    })
}

fn validate_otlp(
    raw: &RawOtlpOptions,
    errors: &mut Vec<ConfigError>,
) -> Option<OtlpOptions> {
    let grpc_url = non_blank(&raw.grpc_endpoint_url);
    let http_url = non_blank(&raw.http_endpoint_url);

    let before = errors.len();
    if grpc_url.is_none() && http_url.is_none() {
        errors.push(ConfigError::MissingOtlpEndpoints);
    }
    let grpc_endpoint =
        grpc_url.and_then(|url| parse_endpoint("otlp.grpc_endpoint_url", url, errors));
    let http_endpoint =
        http_url.and_then(|url| parse_endpoint("otlp.http_endpoint_url", url, errors));
    let endpoints_ok = errors.len() == before;

    let cors = match non_blank(&raw.cors.allowed_origins) {
        Some(origins) => {
            if http_url.is_none() {
                errors.push(ConfigError::CorsWithoutHttpEndpoint);
            }
            Some(OtlpCors {
                allowed_origins: split_list(origins, ','),
                allowed_headers: non_blank(&raw.cors.allowed_headers)
                    .map(|headers| split_list(headers, ','))
                    .unwrap_or_default(),
            })
        }
        None => None,
    };

    let mode = match non_blank(&raw.auth_mode) {
        Some(value) => match OtlpAuthMode::parse(value) {
            Some(mode) => mode,
            None => {
                errors.push(ConfigError::UnknownAuthMode {
                    key: "otlp.auth_mode",
                    value: value.to_string(),
                });
                return None;
            }
        },
        // Telemetry defaults to unsecured whether or not anonymous access was requested
        None => OtlpAuthMode::Unsecured,
    };

    let auth = match mode {
        OtlpAuthMode::ApiKey => {
            let secondary = non_blank(&raw.secondary_api_key).map(Secret::from_text);
            match non_blank(&raw.primary_api_key) {
                Some(primary) => OtlpAuth::ApiKey {
                    primary: Secret::from_text(primary),
                    secondary,
                },
                None => {
                    errors.push(ConfigError::MissingPrimaryApiKey);
                    return None;
                }
            }
        }
        OtlpAuthMode::ClientCertificate => {
            let mut allowed = Vec::with_capacity(raw.allowed_certificates.len());
            for (index, rule) in raw.allowed_certificates.iter().enumerate() {
                let thumbprint = non_blank(&rule.thumbprint).map(normalize_thumbprint);
                let subject = non_blank(&rule.subject).map(str::to_string);
                match (&thumbprint, &subject) {
                    (None, None) => errors.push(ConfigError::EmptyCertificateRule { index }),
                    (Some(print), _) if !print.chars().all(|c| c.is_ascii_hexdigit()) => {
                        errors.push(ConfigError::InvalidThumbprint {
                            index,
                            thumbprint: print.clone(),
                        })
                    }
                    _ => allowed.push(AllowedCertificateRule { thumbprint, subject }),
                }
            }

            for (key, endpoint) in [
                ("otlp.grpc_endpoint_url", &grpc_endpoint),
                ("otlp.http_endpoint_url", &http_endpoint),
            ] {
                if let Some(endpoint) = endpoint {
                    if !endpoint.is_tls() {
                        errors.push(ConfigError::ClientCertificateRequiresHttps {
                            key,
                            url: endpoint.to_string(),
                        });
                    }
                }
            }

            OtlpAuth::ClientCertificate { allowed }
        }
        OtlpAuthMode::Unsecured => OtlpAuth::Unsecured,
    };

    endpoints_ok.then_some(OtlpOptions {
        grpc_endpoint,
        http_endpoint,
        auth,
        cors,
    })
}

fn validate_tls(
    frontend: &FrontendOptions,
    otlp: &OtlpOptions,
    tls: &TlsOptions,
    errors: &mut Vec<ConfigError>,
) {
    let has_material = tls.certificate_path.is_some() && tls.key_path.is_some();
    let mut endpoints = frontend
        .endpoints
        .iter()
        .chain(otlp.grpc_endpoint.iter())
        .chain(otlp.http_endpoint.iter());
    if !has_material {
        if let Some(endpoint) = endpoints.find(|e| e.is_tls()) {
            errors.push(ConfigError::MissingTlsMaterial {
                url: endpoint.to_string(),
            });
        }
    }

    if otlp.auth.mode() == OtlpAuthMode::ClientCertificate && tls.client_ca_path.is_none() {
        errors.push(ConfigError::MissingClientCa);
    }
}

fn validate_resource_service_client(
    raw: &RawResourceServiceClientOptions,
    errors: &mut Vec<ConfigError>,
) -> Option<ResourceServiceClientOptions> {
    let url = non_blank(&raw.url)?;
    if !is_absolute_url(url) {
        errors.push(ConfigError::InvalidResourceServiceUrl(url.to_string()));
        return None;
    }

    let auth = match non_blank(&raw.auth_mode).map(normalize_mode).as_deref() {
        Some("apikey") => match non_blank(&raw.api_key) {
            Some(key) => ResourceClientAuth::ApiKey(Secret::from_text(key)),
            None => {
                errors.push(ConfigError::MissingResourceServiceApiKey);
                return None;
            }
        },
        Some("certificate") | Some("clientcertificate") => ResourceClientAuth::Certificate,
        Some("unsecured") | None => ResourceClientAuth::Unsecured,
        Some(_) => {
            errors.push(ConfigError::UnknownAuthMode {
                key: "resource_service_client.auth_mode",
                value: raw.auth_mode.clone().unwrap_or_default(),
            });
            return None;
        }
    };

    Some(ResourceServiceClientOptions {
        url: url.to_string(),
        auth,
    })
}

fn validate_limits(
    raw: &RawTelemetryLimitOptions,
    errors: &mut Vec<ConfigError>,
) -> TelemetryLimitOptions {
    for (key, value) in [
        ("telemetry_limits.max_log_count", raw.max_log_count),
        ("telemetry_limits.max_trace_count", raw.max_trace_count),
        ("telemetry_limits.max_metrics_count", raw.max_metrics_count),
        ("telemetry_limits.max_attribute_count", raw.max_attribute_count),
        ("telemetry_limits.max_attribute_length", raw.max_attribute_length),
        ("telemetry_limits.max_span_event_count", raw.max_span_event_count),
    ] {
        if value == 0 {
            errors.push(ConfigError::InvalidLimit { key });
        }
    }

    TelemetryLimitOptions {
        max_log_count: raw.max_log_count,
        max_trace_count: raw.max_trace_count,
        max_metrics_count: raw.max_metrics_count,
        max_attribute_count: raw.max_attribute_count,
        max_attribute_length: raw.max_attribute_length,
        max_span_event_count: raw.max_span_event_count,
    }
}

fn normalize_thumbprint(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ':' | ' ' | '-'))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

fn is_absolute_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| u.has_host())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionsSource;
    use crate::raw::RawAllowedCertificate;
    use std::path::PathBuf;

    fn base() -> RawOptions {
        let mut raw = RawOptions::default();
        raw.frontend.endpoint_urls = Some("http://localhost:18888".into());
        raw.otlp.grpc_endpoint_url = Some("http://localhost:4317".into());
        raw
    }

    fn build(raw: RawOptions) -> Result<Options, ConfigErrors> {
        OptionsSource::new(raw).build()
    }

    #[test]
    fn test_valid_defaults() {
        let options = build(base()).unwrap();
        assert_eq!(options.application_name, "Aperture");
        assert_eq!(options.frontend.endpoints.len(), 1);
        assert_eq!(options.frontend.auth.mode(), FrontendAuthMode::BrowserToken);
        assert_eq!(options.otlp.auth.mode(), OtlpAuthMode::Unsecured);
        assert!(options.otlp.http_endpoint.is_none());
        assert!(options.resource_service_client.is_none());
    }

    #[test]
    fn test_missing_otlp_endpoints_is_single_error() {
        let mut raw = base();
        raw.otlp.grpc_endpoint_url = None;
        raw.otlp.http_endpoint_url = Some("   ".into());

        let errors = build(raw).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.errors()[0], ConfigError::MissingOtlpEndpoints);
        assert!(errors.messages()[0].contains("Neither OTLP/gRPC or OTLP/HTTP"));
    }

    #[test]
    fn test_cors_without_http_endpoint_is_single_error() {
        let mut raw = base();
        raw.otlp.cors.allowed_origins = Some("https://example.com".into());

        let errors = build(raw).unwrap_err();
        assert_eq!(errors.errors(), &[ConfigError::CorsWithoutHttpEndpoint]);
    }

    #[test]
    fn test_cors_with_http_endpoint() {
        let mut raw = base();
        raw.otlp.http_endpoint_url = Some("http://localhost:4318".into());
        raw.otlp.cors.allowed_origins = Some("https://a.example, https://b.example".into());
        raw.otlp.cors.allowed_headers = Some("*".into());

        let cors = build(raw).unwrap().otlp.cors.unwrap();
        assert_eq!(cors.allowed_origins.len(), 2);
        assert!(cors.allows_any_header());
    }

    #[test]
    fn test_missing_frontend_endpoints() {
        let mut raw = base();
        raw.frontend.endpoint_urls = Some(" ; ".into());
        let errors = build(raw).unwrap_err();
        assert_eq!(errors.errors(), &[ConfigError::MissingFrontendEndpoints]);
    }

    #[test]
    fn test_multiple_frontend_endpoints() {
        let mut raw = base();
        raw.frontend.endpoint_urls = Some("http://localhost:1;http://localhost:2".into());
        assert_eq!(build(raw).unwrap().frontend.endpoints.len(), 2);
    }

    #[test]
    fn test_malformed_urls_are_reported() {
        let mut raw = base();
        raw.frontend.endpoint_urls = Some("localhost:18888".into());
        raw.otlp.grpc_endpoint_url = Some("http://localhost:notaport".into());

        let errors = build(raw).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            &errors.errors()[0],
            ConfigError::InvalidEndpointUrl { key: "frontend.endpoint_urls", .. }
        ));
        assert!(matches!(
            &errors.errors()[1],
            ConfigError::InvalidEndpointUrl { key: "otlp.grpc_endpoint_url", .. }
        ));
    }

    #[test]
    fn test_invalid_hosts_fail_validation() {
        let mut raw = base();
        raw.frontend.endpoint_urls = Some("http://user@localhost:18888".into());
        raw.otlp.grpc_endpoint_url = Some("http://bad host:4317".into());

        let errors = build(raw).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            &errors.errors()[0],
            ConfigError::InvalidEndpointUrl { key: "frontend.endpoint_urls", .. }
        ));
        assert!(matches!(
            &errors.errors()[1],
            ConfigError::InvalidEndpointUrl { key: "otlp.grpc_endpoint_url", .. }
        ));
    }

    #[test]
    fn test_errors_are_aggregated() {
        let mut raw = RawOptions::default();
        raw.frontend.auth_mode = Some("open_id_connect".into());
        raw.frontend.open_id_connect.name_claim_type = " ".into();
        raw.frontend.open_id_connect.username_claim_type = ",".into();

        let errors = build(raw).unwrap_err();
        assert_eq!(
            errors.errors(),
            &[
                ConfigError::MissingFrontendEndpoints,
                ConfigError::MissingNameClaimType,
                ConfigError::MissingUsernameClaimType,
                ConfigError::MissingOtlpEndpoints,
            ]
        );
        assert_eq!(errors.to_string().lines().count(), 4);
    }

    #[test]
    fn test_allow_anonymous_makes_both_unsecured() {
        for value in ["true", "1", "TRUE"] {
            let mut raw = base();
            raw.unsecured_allow_anonymous = Some(value.into());
            let options = build(raw).unwrap();
            assert_eq!(options.frontend.auth.mode(), FrontendAuthMode::Unsecured);
            assert_eq!(options.otlp.auth.mode(), OtlpAuthMode::Unsecured);
        }
    }

    #[test]
    fn test_explicit_mode_wins_over_allow_anonymous() {
        let mut raw = base();
        raw.unsecured_allow_anonymous = Some("true".into());
        raw.otlp.auth_mode = Some("api_key".into());
        raw.otlp.primary_api_key = Some("key".into());
        assert_eq!(build(raw).unwrap().otlp.auth.mode(), OtlpAuthMode::ApiKey);
    }

    #[test]
    fn test_unparseable_allow_anonymous_is_unset() {
        let mut raw = base();
        raw.unsecured_allow_anonymous = Some("sure".into());
        assert_eq!(build(raw).unwrap().frontend.auth.mode(), FrontendAuthMode::BrowserToken);
    }

    #[test]
    fn test_unknown_auth_mode() {
        let mut raw = base();
        raw.frontend.auth_mode = Some("password".into());
        let errors = build(raw).unwrap_err();
        assert_eq!(errors.errors()[0].key(), "frontend.auth_mode");
    }

    #[test]
    fn test_configured_browser_token_is_used() {
        let mut raw = base();
        raw.frontend.browser_token = Some("my-token".into());
        let source = OptionsSource::new(raw);
        match source.build().unwrap().frontend.auth {
            FrontendAuth::BrowserToken { token } => assert_eq!(token.as_bytes(), b"my-token"),
            other => panic!("unexpected mode {other:?}"),
        }
        assert!(source.generated_browser_token().is_none());
    }

    #[test]
    fn test_generated_token_is_cached_per_source() {
        let source = OptionsSource::new(base());
        let first = token_of(&source.build().unwrap());
        let second = token_of(&source.build().unwrap());
        assert_eq!(first, second);
        assert_eq!(source.generated_browser_token(), Some(first.as_str()));

        let reloaded = source.with_raw(base());
        assert_eq!(token_of(&reloaded.build().unwrap()), first);

        let fresh = OptionsSource::new(base());
        assert_ne!(token_of(&fresh.build().unwrap()), first);
    }

    fn token_of(options: &Options) -> String {
        match &options.frontend.auth {
            FrontendAuth::BrowserToken { token } => token.expose_text().unwrap().to_string(),
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn test_open_id_connect_options() {
        let mut raw = base();
        raw.frontend.auth_mode = Some("OpenIdConnect".into());
        raw.frontend.open_id_connect.name_claim_type = "name, display_name".into();
        raw.frontend.open_id_connect.required_claim_type = Some("role".into());
        raw.frontend.open_id_connect.required_claim_value = Some("admin".into());

        match build(raw).unwrap().frontend.auth {
            FrontendAuth::OpenIdConnect(oidc) => {
                assert_eq!(oidc.name_claim_types, vec!["name", "display_name"]);
                assert_eq!(oidc.username_claim_types, vec!["preferred_username"]);
                assert_eq!(
                    oidc.required_claim,
                    Some(RequiredClaim {
                        claim_type: "role".into(),
                        value: Some("admin".into())
                    })
                );
                assert_eq!(oidc.challenge_path, "/authentication/oidc/challenge");
            }
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn test_api_key_requires_primary() {
        let mut raw = base();
        raw.otlp.auth_mode = Some("api_key".into());
        raw.otlp.secondary_api_key = Some("secondary".into());
        assert_eq!(
            build(raw).unwrap_err().errors(),
            &[ConfigError::MissingPrimaryApiKey]
        );
    }

    #[test]
    fn test_client_certificate_rules() {
        let mut raw = base();
        raw.otlp.grpc_endpoint_url = Some("https://localhost:4317".into());
        raw.otlp.auth_mode = Some("client_certificate".into());
        raw.tls.certificate_path = Some(PathBuf::from("cert.pem"));
        raw.tls.key_path = Some(PathBuf::from("key.pem"));
        raw.tls.client_ca_path = Some(PathBuf::from("ca.pem"));
        raw.otlp.allowed_certificates = vec![RawAllowedCertificate {
            thumbprint: Some("ab:cd:ef".into()),
            subject: None,
        }];

        match build(raw).unwrap().otlp.auth {
            OtlpAuth::ClientCertificate { allowed } => {
                assert_eq!(allowed[0].thumbprint.as_deref(), Some("ABCDEF"));
            }
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn test_client_certificate_misconfiguration() {
        let mut raw = base();
        raw.otlp.auth_mode = Some("client_certificate".into());
        raw.otlp.allowed_certificates = vec![
            RawAllowedCertificate::default(),
            RawAllowedCertificate {
                thumbprint: Some("xyz".into()),
                subject: None,
            },
        ];

        let errors = build(raw).unwrap_err();
        assert_eq!(
            errors.errors(),
            &[
                ConfigError::EmptyCertificateRule { index: 0 },
                ConfigError::InvalidThumbprint {
                    index: 1,
                    thumbprint: "XYZ".into()
                },
                ConfigError::ClientCertificateRequiresHttps {
                    key: "otlp.grpc_endpoint_url",
                    url: "http://localhost:4317".into()
                },
                ConfigError::MissingClientCa,
            ]
        );
    }

    #[test]
    fn test_https_requires_tls_material() {
        let mut raw = base();
        raw.frontend.endpoint_urls = Some("https://localhost:18888".into());
        assert!(matches!(
            build(raw).unwrap_err().errors(),
            [ConfigError::MissingTlsMaterial { .. }]
        ));
    }

    #[test]
    fn test_resource_service_client() {
        let mut raw = base();
        raw.resource_service_client.url = Some("http://localhost:5000".into());
        raw.resource_service_client.auth_mode = Some("ApiKey".into());
        raw.resource_service_client.api_key = Some("k".into());
        let client = build(raw).unwrap().resource_service_client.unwrap();
        assert!(matches!(client.auth, ResourceClientAuth::ApiKey(_)));

        let mut raw = base();
        raw.resource_service_client.url = Some("/relative".into());
        assert!(matches!(
            build(raw).unwrap_err().errors(),
            [ConfigError::InvalidResourceServiceUrl(_)]
        ));
    }

    #[test]
    fn test_limits_must_be_positive() {
        let mut raw = base();
        raw.telemetry_limits.max_trace_count = 0;
        raw.frontend.max_console_log_count = 0;
        let errors = build(raw).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_is_absolute_url() {
        assert!(is_absolute_url("https://host:1/path"));
        assert!(!is_absolute_url("host:1"));
        assert!(!is_absolute_url("http://"));
        assert!(!is_absolute_url("https://bad host/"));
        assert!(!is_absolute_url("mailto:ops@example.com"));
        assert!(!is_absolute_url("1http://host"));
    }
}
