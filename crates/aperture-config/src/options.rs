//! Validated options
//!
//! An [`Options`] value is only ever produced by [`OptionsSource::build`] and is never
//! mutated afterwards. A configuration change produces a new value.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use crate::address::BindAddress;
use crate::raw::RawOptions;
use crate::validation::{self, ConfigErrors};

/// Secret bytes
///
/// Holds the UTF-8 bytes of a configured secret. `Debug` never prints the contents and
/// there is deliberately no `PartialEq`; compare with a constant-time routine.
#[derive(Clone)]
pub struct Secret(Arc<[u8]>);

impl Secret {
    /// Convert configured text into secret bytes
    pub fn from_text(text: &str) -> Self {
        Self(Arc::from(text.as_bytes()))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The secret as text, for the single place that has to display it (the login URL)
    pub fn expose_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the secret is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(<{} bytes>)", self.0.len())
    }
}

/// Interactive surface authentication mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontendAuthMode {
    BrowserToken,
    OpenIdConnect,
    Unsecured,
}

impl FrontendAuthMode {
    /// Parse a configured mode name
    ///
    /// Case, `_` and `-` are ignored so `browser_token`, `BrowserToken` and `browser-token`
    /// are all accepted.
    pub fn parse(value: &str) -> Option<Self> {
        match normalize_mode(value).as_str() {
            "browsertoken" => Some(Self::BrowserToken),
            "openidconnect" | "oidc" => Some(Self::OpenIdConnect),
            "unsecured" => Some(Self::Unsecured),
            _ => None,
        }
    }

    /// Name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BrowserToken => "browser_token",
            Self::OpenIdConnect => "open_id_connect",
            Self::Unsecured => "unsecured",
        }
    }
}

/// Telemetry surface authentication mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtlpAuthMode {
    ApiKey,
    ClientCertificate,
    Unsecured,
}

impl OtlpAuthMode {
    /// Parse a configured mode name, see [`FrontendAuthMode::parse`]
    pub fn parse(value: &str) -> Option<Self> {
        match normalize_mode(value).as_str() {
            "apikey" => Some(Self::ApiKey),
            "clientcertificate" | "certificate" => Some(Self::ClientCertificate),
            "unsecured" => Some(Self::Unsecured),
            _ => None,
        }
    }

    /// Name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::ClientCertificate => "client_certificate",
            Self::Unsecured => "unsecured",
        }
    }
}

pub(crate) fn normalize_mode(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Complete validated configuration
#[derive(Debug, Clone)]
pub struct Options {
    pub application_name: String,
    pub frontend: FrontendOptions,
    pub otlp: OtlpOptions,
    pub tls: TlsOptions,
    pub resource_service_client: Option<ResourceServiceClientOptions>,
    pub telemetry_limits: TelemetryLimitOptions,
}

impl Options {
    /// Every configured address, interactive first
    pub fn all_endpoints(&self) -> impl Iterator<Item = &BindAddress> {
        self.frontend
            .endpoints
            .iter()
            .chain(self.otlp.grpc_endpoint.iter())
            .chain(self.otlp.http_endpoint.iter())
    }
}

#[derive(Debug, Clone)]
pub struct FrontendOptions {
    /// Never empty
    pub endpoints: Vec<BindAddress>,
    pub auth: FrontendAuth,
    pub max_console_log_count: usize,
}

/// Interactive authentication, exactly one mode
#[derive(Debug, Clone)]
pub enum FrontendAuth {
    BrowserToken { token: Secret },
    OpenIdConnect(OpenIdConnectOptions),
    Unsecured,
}

impl FrontendAuth {
    /// Mode tag
    pub fn mode(&self) -> FrontendAuthMode {
        match self {
            Self::BrowserToken { .. } => FrontendAuthMode::BrowserToken,
            Self::OpenIdConnect(_) => FrontendAuthMode::OpenIdConnect,
            Self::Unsecured => FrontendAuthMode::Unsecured,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenIdConnectOptions {
    /// Claim types searched, in order, for the display name. Never empty.
    pub name_claim_types: Vec<String>,
    /// Claim types searched, in order, for the username. Never empty.
    pub username_claim_types: Vec<String>,
    pub required_claim: Option<RequiredClaim>,
    /// Local path that starts the identity-provider flow
    pub challenge_path: String,
}

/// A claim that must be present, optionally with a specific value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredClaim {
    pub claim_type: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OtlpOptions {
    pub grpc_endpoint: Option<BindAddress>,
    pub http_endpoint: Option<BindAddress>,
    pub auth: OtlpAuth,
    pub cors: Option<OtlpCors>,
}

/// Telemetry authentication, exactly one mode
#[derive(Debug, Clone)]
pub enum OtlpAuth {
    ApiKey {
        primary: Secret,
        secondary: Option<Secret>,
    },
    ClientCertificate {
        /// Empty means any certificate that passes chain validation
        allowed: Vec<AllowedCertificateRule>,
    },
    Unsecured,
}

impl OtlpAuth {
    /// Mode tag
    pub fn mode(&self) -> OtlpAuthMode {
        match self {
            Self::ApiKey { .. } => OtlpAuthMode::ApiKey,
            Self::ClientCertificate { .. } => OtlpAuthMode::ClientCertificate,
            Self::Unsecured => OtlpAuthMode::Unsecured,
        }
    }
}

/// Client certificate allow rule
///
/// Every field that is set must match. At least one field is always set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedCertificateRule {
    /// Uppercase hex SHA-256 of the DER certificate, separators removed
    pub thumbprint: Option<String>,
    /// Subject distinguished name, compared exactly
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpCors {
    pub allowed_origins: Vec<String>,
    pub allowed_headers: Vec<String>,
}

impl OtlpCors {
    /// Whether any origin is allowed
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }

    /// Whether any header is allowed
    pub fn allows_any_header(&self) -> bool {
        self.allowed_headers.iter().any(|header| header == "*")
    }
}

#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    pub certificate_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub client_ca_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResourceServiceClientOptions {
    /// Absolute URL
    pub url: String,
    pub auth: ResourceClientAuth,
}

#[derive(Debug, Clone)]
pub enum ResourceClientAuth {
    ApiKey(Secret),
    Certificate,
    Unsecured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryLimitOptions {
    pub max_log_count: usize,
    pub max_trace_count: usize,
    pub max_metrics_count: usize,
    pub max_attribute_count: usize,
    pub max_attribute_length: usize,
    pub max_span_event_count: usize,
}

/// Raw configuration plus the process-lifetime browser token cache
///
/// Cloning, or calling [`OptionsSource::with_raw`], shares the cache, so a token
/// generated for one build is reused by every later build in this process.
#[derive(Debug, Clone, Default)]
pub struct OptionsSource {
    raw: RawOptions,
    generated_token: Arc<OnceLock<String>>,
}

impl OptionsSource {
    /// Wrap raw values with a fresh token cache
    pub fn new(raw: RawOptions) -> Self {
        Self {
            raw,
            generated_token: Arc::new(OnceLock::new()),
        }
    }

    /// Replace the raw values, keeping the token cache
    pub fn with_raw(&self, raw: RawOptions) -> Self {
        Self {
            raw,
            generated_token: Arc::clone(&self.generated_token),
        }
    }

    /// Raw values
    pub fn raw(&self) -> &RawOptions {
        &self.raw
    }

    /// The generated browser token, if one was ever needed
    pub fn generated_browser_token(&self) -> Option<&str> {
        self.generated_token.get().map(String::as_str)
    }

    /// Validate and build an options snapshot
    ///
    /// # Errors
    ///
    /// Returns every validation failure found, in a stable order.
    pub fn build(&self) -> Result<Options, ConfigErrors> {
        validation::build_options(&self.raw, &self.generated_token)
    }
}
