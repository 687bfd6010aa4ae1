//! Interactive session cookies
//!
//! Sessions are HS256 tokens signed with a key generated once per process. Restarting
//! the process invalidates every session; reloading configuration does not.

use std::fmt;
use std::time::Duration;

use aperture_const::{AUTH_COOKIE_NAME, SESSION_KEY_BYTES, SESSION_LIFETIME};
use axum::http::{header, HeaderMap};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::identity::Claim;

/// Payload of a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject
    pub sub: String,
    /// Interactive mode that issued the session
    pub scheme: String,
    /// Claims carried into the request identity
    #[serde(default)]
    pub claims: Vec<Claim>,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// Issues and verifies session tokens
pub struct SessionCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl SessionCodec {
    /// Codec with a fresh random signing key
    pub fn new() -> Self {
        let mut secret = [0u8; SESSION_KEY_BYTES];
        rand::rng().fill(&mut secret[..]);
        Self::from_secret(&secret)
    }

    /// Codec with a caller-supplied signing key
    pub fn from_secret(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            lifetime: SESSION_LIFETIME,
        }
    }

    /// Override the session lifetime
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Session lifetime
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Issue a session token
    ///
    /// # Errors
    ///
    /// Only fails if the claims cannot be serialized.
    pub fn issue(&self, scheme: &str, subject: &str, claims: Vec<Claim>) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let session = SessionClaims {
            sub: subject.to_string(),
            scheme: scheme.to_string(),
            claims,
            iat: now,
            exp: now.saturating_add(i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX)),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &session, &self.encoding)?)
    }

    /// Verify a session token
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidSession`] for a bad signature, malformed token or expiry.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        Ok(decode::<SessionClaims>(token, &self.decoding, &self.validation)?.claims)
    }
}

impl Default for SessionCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCodec")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

/// Find a cookie value in the request headers
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
}

/// Read the session cookie
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    read_cookie(headers, AUTH_COOKIE_NAME).filter(|value| !value.is_empty())
}

/// `Set-Cookie` value establishing a session
pub fn session_cookie(token: &str, lifetime: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
        AUTH_COOKIE_NAME,
        token,
        lifetime.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value removing the session
pub fn expired_session_cookie(secure: bool) -> String {
    session_cookie("", Duration::ZERO, secure)
}
