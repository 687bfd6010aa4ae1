use thiserror::Error;

use crate::connection::TrafficClass;

/// Classification, authentication and authorization errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The connection carries no classification at all
    #[error("No type specified on this connection")]
    UnclassifiedConnection,

    /// The connection was not planned to carry this traffic class
    #[error("Connection type {0} is not enabled on this connection")]
    TrafficClassNotPermitted(TrafficClass),

    /// API key header absent
    #[error("API key from header is missing")]
    MissingApiKey,

    /// API key header present but matching no configured key
    #[error("Incoming API key doesn't match required API key")]
    InvalidApiKey,

    /// Client certificate authentication without a peer certificate
    #[error("Client certificate is required")]
    MissingClientCertificate,

    /// Peer certificate present but not acceptable
    #[error("Client certificate rejected: {0}")]
    CertificateRejected(String),

    /// No session cookie
    #[error("Authentication session is missing")]
    MissingSession,

    /// Session cookie that does not verify
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// Session issued for another interactive mode
    #[error("Session was issued for a different authentication mode")]
    SessionSchemeMismatch,

    /// Browser token supplied to the login endpoint does not match
    #[error("Invalid browser token")]
    InvalidBrowserToken,

    /// Authenticated but missing a required claim
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl AuthError {
    /// Whether the failure came from connection classification
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            AuthError::UnclassifiedConnection | AuthError::TrafficClassNotPermitted(_)
        )
    }

    /// Whether the failure is an authorization (not authentication) failure
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self, AuthError::Forbidden(_))
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::InvalidSession("session expired".into()),
            ErrorKind::InvalidSignature => AuthError::InvalidSession("invalid signature".into()),
            ErrorKind::InvalidToken => AuthError::InvalidSession("malformed session".into()),
            _ => AuthError::InvalidSession(format!("session error: {}", err)),
        }
    }
}
