//! Composite authenticators
//!
//! One chain per surface, built once from validated options:
//!
//! - Interactive: connection-type guard, then the [`InteractiveMode`]
//! - Telemetry: connection-type guard, then zero or more [`TelemetryLink`] checks
//!
//! Links run strictly in order and the first failure ends the chain. A later link never
//! starts before the previous one has completed successfully, including across awaits.

use std::sync::Arc;

use aperture_config::{FrontendAuth, OtlpAuth, OtlpAuthMode};
use aperture_const::RETURN_URL_QUERY_PARAMETER;
use axum::http::{request::Parts, HeaderMap};

use crate::connection::{ConnectionInfo, ConnectionTypeGuard, TrafficClass};
use crate::error::AuthError;
use crate::identity::Identity;
use crate::modes::{ApiKeyCheck, ClientCertificateCheck, InteractiveMode};
use crate::session::SessionCodec;

/// What an authenticator sees of a request
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    /// Connection context, absent when the listener did not classify the connection
    pub connection: Option<&'a ConnectionInfo>,
    /// Request headers
    pub headers: &'a HeaderMap,
}

impl<'a> RequestContext<'a> {
    /// Build from parts
    pub fn new(connection: Option<&'a ConnectionInfo>, headers: &'a HeaderMap) -> Self {
        Self {
            connection,
            headers,
        }
    }

    /// Borrow from request parts
    pub fn from_parts(parts: &'a Parts) -> Self {
        Self::new(ConnectionInfo::from_extensions(&parts.extensions), &parts.headers)
    }
}

/// How a browser is sent to re-authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeAction {
    /// Local browser-token login page
    RedirectToLogin {
        /// Login page path
        path: String,
    },
    /// Start of the external identity-provider flow
    RedirectToIdentityProvider {
        /// Challenge path
        path: String,
    },
}

impl ChallengeAction {
    /// Redirect target carrying the page to come back to
    pub fn location(&self, return_url: &str) -> String {
        let path = match self {
            ChallengeAction::RedirectToLogin { path }
            | ChallengeAction::RedirectToIdentityProvider { path } => path,
        };
        format!(
            "{}?{}={}",
            path,
            RETURN_URL_QUERY_PARAMETER,
            urlencoding::encode(return_url)
        )
    }
}

/// A failed chain: the failing link's error and the challenge to issue, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    /// Failure reason
    pub error: AuthError,
    /// Challenge to issue instead of a plain rejection
    pub challenge: Option<ChallengeAction>,
}

impl AuthFailure {
    /// Failure that must never trigger a challenge
    pub fn rejected(error: AuthError) -> Self {
        Self {
            error,
            challenge: None,
        }
    }
}

impl From<AuthError> for AuthFailure {
    fn from(error: AuthError) -> Self {
        Self::rejected(error)
    }
}

/// Result of one passed link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The link is a gate and has no opinion on identity
    NoResult,
    /// The link authenticated the caller
    Authenticated,
}

/// One check in the telemetry chain
#[derive(Debug, Clone)]
pub enum TelemetryLink {
    /// Connection classification gate
    ConnectionType(ConnectionTypeGuard),
    /// Shared-secret header
    ApiKey(ApiKeyCheck),
    /// Client certificate allow-list
    ClientCertificate(ClientCertificateCheck),
}

impl TelemetryLink {
    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryLink::ConnectionType(_) => "connection_type",
            TelemetryLink::ApiKey(_) => "api_key",
            TelemetryLink::ClientCertificate(_) => "client_certificate",
        }
    }

    async fn evaluate(&self, request: &RequestContext<'_>) -> Result<LinkOutcome, AuthError> {
        match self {
            TelemetryLink::ConnectionType(guard) => {
                guard.check(request.connection).map(|()| LinkOutcome::NoResult)
            }
            TelemetryLink::ApiKey(check) => {
                check.check(request.headers).map(|()| LinkOutcome::Authenticated)
            }
            TelemetryLink::ClientCertificate(check) => check
                .check(request.connection)
                .map(|_| LinkOutcome::Authenticated),
        }
    }
}

/// Telemetry surface chain
#[derive(Debug, Clone)]
pub struct TelemetryAuthenticator {
    mode: OtlpAuthMode,
    links: Vec<TelemetryLink>,
}

impl TelemetryAuthenticator {
    /// Build the chain for the configured mode
    pub fn from_options(auth: &OtlpAuth) -> Self {
        let mut links = vec![TelemetryLink::ConnectionType(ConnectionTypeGuard::new(
            TrafficClass::Telemetry,
        ))];

        match auth {
            OtlpAuth::ApiKey { primary, secondary } => links.push(TelemetryLink::ApiKey(
                ApiKeyCheck::new(primary.clone(), secondary.clone()),
            )),
            OtlpAuth::ClientCertificate { allowed } => links.push(
                TelemetryLink::ClientCertificate(ClientCertificateCheck::new(allowed.clone())),
            ),
            OtlpAuth::Unsecured => {}
        }

        Self {
            mode: auth.mode(),
            links,
        }
    }

    /// Configured mode
    pub fn mode(&self) -> OtlpAuthMode {
        self.mode
    }

    /// Links in evaluation order
    pub fn links(&self) -> &[TelemetryLink] {
        &self.links
    }

    /// Run the chain
    ///
    /// On success the identity is always the synthesized telemetry identity; what
    /// individual links established is not propagated.
    ///
    /// # Errors
    ///
    /// The first failing link's error. Telemetry failures never carry a challenge.
    pub async fn authenticate(&self, request: &RequestContext<'_>) -> Result<Identity, AuthFailure> {
        for link in &self.links {
            if let Err(error) = link.evaluate(request).await {
                tracing::debug!(link = link.name(), error = %error, "Telemetry link failed");
                return Err(AuthFailure::rejected(error));
            }
        }
        Ok(Identity::telemetry())
    }
}

/// Interactive surface chain
#[derive(Debug, Clone)]
pub struct InteractiveAuthenticator {
    guard: ConnectionTypeGuard,
    mode: InteractiveMode,
    sessions: Arc<SessionCodec>,
}

impl InteractiveAuthenticator {
    /// Build the chain for the configured mode
    pub fn from_options(auth: &FrontendAuth, sessions: Arc<SessionCodec>) -> Self {
        Self {
            guard: ConnectionTypeGuard::new(TrafficClass::Interactive),
            mode: InteractiveMode::from_options(auth),
            sessions,
        }
    }

    /// Configured mode
    pub fn mode(&self) -> &InteractiveMode {
        &self.mode
    }

    /// Run the chain
    ///
    /// # Errors
    ///
    /// A classification failure is returned without a challenge: a browser cannot fix
    /// it by signing in. A mode failure carries the mode's challenge, if it has one.
    pub async fn authenticate(&self, request: &RequestContext<'_>) -> Result<Identity, AuthFailure> {
        self.guard
            .check(request.connection)
            .map_err(AuthFailure::rejected)?;

        self.mode
            .authenticate(request.headers, &self.sessions)
            .map_err(|error| AuthFailure {
                error,
                challenge: self.mode.challenge().cloned(),
            })
    }
}
