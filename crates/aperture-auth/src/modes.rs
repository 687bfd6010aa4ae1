//! Mode-specific authentication checks
//!
//! Each surface mode is a variant selected once from validated options. The telemetry
//! checks ([`ApiKeyCheck`], [`ClientCertificateCheck`]) only pass or fail; the interactive
//! modes ([`InteractiveMode`]) produce the request identity.

use aperture_config::{AllowedCertificateRule, FrontendAuth, Secret};
use aperture_const::{
    API_KEY_HEADER, BROWSER_TOKEN_SESSION_SCHEME, FEDERATED_SESSION_SCHEME, LOGIN_PATH,
    NAME_CLAIM, NAME_IDENTIFIER_CLAIM, USERNAME_CLAIM,
};
use axum::http::HeaderMap;

use crate::compare::compare_key;
use crate::composite::ChallengeAction;
use crate::connection::{ClientCertificate, ConnectionInfo};
use crate::error::AuthError;
use crate::identity::Identity;
use crate::session::{session_token, SessionClaims, SessionCodec};

/// Shared-secret header check
#[derive(Debug, Clone)]
pub struct ApiKeyCheck {
    primary: Secret,
    secondary: Option<Secret>,
}

impl ApiKeyCheck {
    /// Check against a primary and optional secondary key
    pub fn new(primary: Secret, secondary: Option<Secret>) -> Self {
        Self { primary, secondary }
    }

    /// Compare the request's API key header with both configured keys
    ///
    /// Both comparisons always run so timing does not reveal which key matched.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingApiKey`] when the header is absent
    /// - [`AuthError::InvalidApiKey`] when it is repeated, not text, or matches neither key
    pub fn check(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let mut values = headers.get_all(API_KEY_HEADER).iter();
        let value = values.next().ok_or(AuthError::MissingApiKey)?;
        if values.next().is_some() {
            return Err(AuthError::InvalidApiKey);
        }
        let candidate = value.to_str().map_err(|_| AuthError::InvalidApiKey)?;

        let primary = compare_key(self.primary.as_bytes(), candidate);
        let secondary = self
            .secondary
            .as_ref()
            .map(|secret| compare_key(secret.as_bytes(), candidate))
            .unwrap_or(false);

        if primary | secondary {
            Ok(())
        } else {
            Err(AuthError::InvalidApiKey)
        }
    }
}

/// Client certificate allow-list check
///
/// Chain validation happens in the TLS handshake; this check only applies the
/// configured subject and thumbprint rules to the certificate that survived it.
#[derive(Debug, Clone)]
pub struct ClientCertificateCheck {
    rules: Vec<AllowedCertificateRule>,
}

impl ClientCertificateCheck {
    /// Check with the given rules; no rules accepts any validated certificate
    pub fn new(rules: Vec<AllowedCertificateRule>) -> Self {
        Self { rules }
    }

    /// Apply the rules to the connection's peer certificate
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingClientCertificate`] when the connection has none
    /// - [`AuthError::CertificateRejected`] when no rule matches
    pub fn check<'a>(&self, connection: Option<&'a ConnectionInfo>) -> Result<&'a ClientCertificate, AuthError> {
        let certificate = connection
            .and_then(ConnectionInfo::peer_certificate)
            .ok_or(AuthError::MissingClientCertificate)?;

        if self.rules.is_empty() || self.rules.iter().any(|rule| rule_matches(rule, certificate)) {
            Ok(certificate)
        } else {
            Err(AuthError::CertificateRejected(format!(
                "'{}' is not an allowed certificate",
                certificate.subject()
            )))
        }
    }
}

fn rule_matches(rule: &AllowedCertificateRule, certificate: &ClientCertificate) -> bool {
    let thumbprint_ok = rule
        .thumbprint
        .as_deref()
        .map_or(true, |thumbprint| thumbprint == certificate.thumbprint());
    let subject_ok = rule
        .subject
        .as_deref()
        .map_or(true, |subject| subject == certificate.subject());
    thumbprint_ok && subject_ok
}

/// Federated identity settings
#[derive(Debug, Clone)]
pub struct FederatedMode {
    /// Claim types searched, in order, for the display name
    pub name_claim_types: Vec<String>,
    /// Claim types searched, in order, for the username
    pub username_claim_types: Vec<String>,
    /// Where to send a browser without a session
    pub challenge: ChallengeAction,
}

/// Interactive authentication mode
#[derive(Debug, Clone)]
pub enum InteractiveMode {
    /// Everyone is the anonymous local user
    Unsecured,
    /// Session established by the browser-token login
    BrowserToken {
        /// Where to send a browser without a session
        challenge: ChallengeAction,
    },
    /// Session established by an external identity provider
    Federated(FederatedMode),
}

impl InteractiveMode {
    /// Select the mode from validated options
    pub fn from_options(auth: &FrontendAuth) -> Self {
        match auth {
            FrontendAuth::BrowserToken { .. } => InteractiveMode::BrowserToken {
                challenge: ChallengeAction::RedirectToLogin {
                    path: LOGIN_PATH.to_string(),
                },
            },
            FrontendAuth::OpenIdConnect(oidc) => InteractiveMode::Federated(FederatedMode {
                name_claim_types: oidc.name_claim_types.clone(),
                username_claim_types: oidc.username_claim_types.clone(),
                challenge: ChallengeAction::RedirectToIdentityProvider {
                    path: oidc.challenge_path.clone(),
                },
            }),
            FrontendAuth::Unsecured => InteractiveMode::Unsecured,
        }
    }

    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            InteractiveMode::Unsecured => "unsecured",
            InteractiveMode::BrowserToken { .. } => "browser_token",
            InteractiveMode::Federated(_) => "federated",
        }
    }

    /// Challenge issued when authentication fails, if the mode has one
    pub fn challenge(&self) -> Option<&ChallengeAction> {
        match self {
            InteractiveMode::Unsecured => None,
            InteractiveMode::BrowserToken { challenge } => Some(challenge),
            InteractiveMode::Federated(federated) => Some(&federated.challenge),
        }
    }

    /// Produce the identity for a request
    ///
    /// # Errors
    ///
    /// Session modes fail with [`AuthError::MissingSession`],
    /// [`AuthError::InvalidSession`] or [`AuthError::SessionSchemeMismatch`].
    pub fn authenticate(&self, headers: &HeaderMap, sessions: &SessionCodec) -> Result<Identity, AuthError> {
        match self {
            InteractiveMode::Unsecured => Ok(Identity::unsecured()),
            InteractiveMode::BrowserToken { .. } => {
                let session = verified_session(headers, sessions, BROWSER_TOKEN_SESSION_SCHEME)?;
                Ok(Identity::new(BROWSER_TOKEN_SESSION_SCHEME)
                    .with_claim(NAME_IDENTIFIER_CLAIM, session.sub)
                    .with_claims(session.claims))
            }
            InteractiveMode::Federated(federated) => {
                let session = verified_session(headers, sessions, FEDERATED_SESSION_SCHEME)?;
                let mut identity = Identity::new(FEDERATED_SESSION_SCHEME)
                    .with_claim(NAME_IDENTIFIER_CLAIM, session.sub.clone())
                    .with_claims(session.claims);

                let name = first_claim(&identity, &federated.name_claim_types).map(str::to_string);
                let username =
                    first_claim(&identity, &federated.username_claim_types).map(str::to_string);
                if let Some(name) = name {
                    identity = identity.with_claim(NAME_CLAIM, name);
                }
                if let Some(username) = username {
                    identity = identity.with_claim(USERNAME_CLAIM, username);
                }
                Ok(identity)
            }
        }
    }
}

fn verified_session(
    headers: &HeaderMap,
    sessions: &SessionCodec,
    scheme: &str,
) -> Result<SessionClaims, AuthError> {
    let token = session_token(headers).ok_or(AuthError::MissingSession)?;
    let session = sessions.verify(token)?;
    if session.scheme != scheme {
        return Err(AuthError::SessionSchemeMismatch);
    }
    Ok(session)
}

fn first_claim<'a>(identity: &'a Identity, claim_types: &[String]) -> Option<&'a str> {
    claim_types
        .iter()
        .find_map(|claim_type| identity.claim_value(claim_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionClassification, TrafficClass};
    use crate::identity::Claim;
    use crate::session::session_cookie;
    use aperture_const::{AUTH_COOKIE_NAME, BROWSER_TOKEN_CLAIM, UNSECURED_CLAIM};
    use axum::http::{header, HeaderValue};

    fn api_key_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn api_key_check() -> ApiKeyCheck {
        ApiKeyCheck::new(
            Secret::from_text("primary"),
            Some(Secret::from_text("secondary")),
        )
    }

    #[test]
    fn test_api_key_primary_and_secondary() {
        let check = api_key_check();
        assert!(check.check(&api_key_headers("primary")).is_ok());
        assert!(check.check(&api_key_headers("secondary")).is_ok());
        assert_eq!(check.check(&api_key_headers("other")), Err(AuthError::InvalidApiKey));
        assert_eq!(check.check(&HeaderMap::new()), Err(AuthError::MissingApiKey));
    }

    #[test]
    fn test_api_key_header_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("X-OTLP-API-KEY", HeaderValue::from_static("primary"));
        assert!(api_key_check().check(&headers).is_ok());
    }

    #[test]
    fn test_api_key_repeated_header_rejected() {
        let mut headers = api_key_headers("primary");
        headers.append(API_KEY_HEADER, HeaderValue::from_static("primary"));
        assert_eq!(api_key_check().check(&headers), Err(AuthError::InvalidApiKey));
    }

    #[test]
    fn test_api_key_without_secondary() {
        let check = ApiKeyCheck::new(Secret::from_text("primary"), None);
        assert!(check.check(&api_key_headers("secondary")).is_err());
    }

    fn tls_connection(certificate: Option<ClientCertificate>) -> ConnectionInfo {
        ConnectionInfo::new(
            "10.0.0.1:443".parse().unwrap(),
            ConnectionClassification::only(TrafficClass::Telemetry),
        )
        .with_tls(certificate)
    }

    #[test]
    fn test_certificate_rules() {
        let connection = tls_connection(Some(ClientCertificate::new("CN=collector", "AABB")));
        let by_thumbprint = ClientCertificateCheck::new(vec![AllowedCertificateRule {
            thumbprint: Some("AABB".into()),
            subject: None,
        }]);
        assert!(by_thumbprint.check(Some(&connection)).is_ok());

        let by_both = ClientCertificateCheck::new(vec![AllowedCertificateRule {
            thumbprint: Some("AABB".into()),
            subject: Some("CN=other".into()),
        }]);
        assert!(matches!(
            by_both.check(Some(&connection)),
            Err(AuthError::CertificateRejected(_))
        ));

        let any = ClientCertificateCheck::new(Vec::new());
        assert_eq!(any.check(Some(&connection)).unwrap().subject(), "CN=collector");
    }

    #[test]
    fn test_certificate_required() {
        let check = ClientCertificateCheck::new(Vec::new());
        assert_eq!(
            check.check(Some(&tls_connection(None))).unwrap_err(),
            AuthError::MissingClientCertificate
        );
        assert_eq!(check.check(None).unwrap_err(), AuthError::MissingClientCertificate);
    }

    fn cookie_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("{AUTH_COOKIE_NAME}={token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_unsecured_mode() {
        let identity = InteractiveMode::Unsecured
            .authenticate(&HeaderMap::new(), &SessionCodec::new())
            .unwrap();
        assert!(identity.has_claim(UNSECURED_CLAIM));
        assert!(InteractiveMode::Unsecured.challenge().is_none());
    }

    #[test]
    fn test_browser_token_mode_trusts_session_claims() {
        let sessions = SessionCodec::new();
        let mode = InteractiveMode::from_options(&FrontendAuth::BrowserToken {
            token: Secret::from_text("token"),
        });
        assert_eq!(
            mode.authenticate(&HeaderMap::new(), &sessions),
            Err(AuthError::MissingSession)
        );

        let token = sessions
            .issue(
                BROWSER_TOKEN_SESSION_SCHEME,
                "browser",
                vec![Claim::new(BROWSER_TOKEN_CLAIM, "true")],
            )
            .unwrap();
        let identity = mode.authenticate(&cookie_headers(&token), &sessions).unwrap();
        assert_eq!(identity.claim_value(BROWSER_TOKEN_CLAIM), Some("true"));
        assert_eq!(
            mode.challenge(),
            Some(&ChallengeAction::RedirectToLogin {
                path: "/login".into()
            })
        );
    }

    #[test]
    fn test_session_scheme_must_match_mode() {
        let sessions = SessionCodec::new();
        let token = sessions.issue(FEDERATED_SESSION_SCHEME, "alice", vec![]).unwrap();
        let mode = InteractiveMode::BrowserToken {
            challenge: ChallengeAction::RedirectToLogin {
                path: LOGIN_PATH.into(),
            },
        };
        assert_eq!(
            mode.authenticate(&cookie_headers(&token), &sessions),
            Err(AuthError::SessionSchemeMismatch)
        );
    }

    #[test]
    fn test_federated_mode_resolves_names() {
        let sessions = SessionCodec::new();
        let mode = InteractiveMode::Federated(FederatedMode {
            name_claim_types: vec!["display_name".into(), "given_name".into()],
            username_claim_types: vec!["preferred_username".into()],
            challenge: ChallengeAction::RedirectToIdentityProvider {
                path: "/oidc".into(),
            },
        });
        let token = sessions
            .issue(
                FEDERATED_SESSION_SCHEME,
                "alice-id",
                vec![
                    Claim::new("given_name", "Alice"),
                    Claim::new("preferred_username", "alice"),
                    Claim::new("role", "admin"),
                ],
            )
            .unwrap();

        let identity = mode.authenticate(&cookie_headers(&token), &sessions).unwrap();
        assert_eq!(identity.name(), Some("Alice"));
        assert_eq!(identity.claim_value(USERNAME_CLAIM), Some("alice"));
        assert_eq!(identity.claim_value(NAME_IDENTIFIER_CLAIM), Some("alice-id"));
        assert_eq!(identity.claim_value("role"), Some("admin"));
    }

    #[test]
    fn test_tampered_session_rejected() {
        let sessions = SessionCodec::new();
        let token = sessions.issue(FEDERATED_SESSION_SCHEME, "alice", vec![]).unwrap();
        let tampered = format!("{token}x");
        let mode = InteractiveMode::Federated(FederatedMode {
            name_claim_types: vec![],
            username_claim_types: vec![],
            challenge: ChallengeAction::RedirectToIdentityProvider { path: "/".into() },
        });
        assert!(matches!(
            mode.authenticate(&cookie_headers(&tampered), &sessions),
            Err(AuthError::InvalidSession(_))
        ));
    }

    #[test]
    fn test_session_cookie_helper_round_trip() {
        let sessions = SessionCodec::new();
        let token = sessions.issue(BROWSER_TOKEN_SESSION_SCHEME, "b", vec![]).unwrap();
        let set_cookie = session_cookie(&token, sessions.lifetime(), false);
        let pair = set_cookie.split(';').next().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(pair).unwrap());
        assert_eq!(session_token(&headers), Some(token.as_str()));
    }
}
