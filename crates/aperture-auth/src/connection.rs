//! Per-connection classification
//!
//! Every accepted connection gets a [`ConnectionInfo`] before its first request is parsed.
//! It carries the [`ConnectionClassification`] the listener was planned with, which the
//! [`ConnectionTypeGuard`] consults on each request.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::Extensions;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Protocol surface a connection may serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficClass {
    /// Human-facing console
    Interactive,
    /// Machine telemetry ingestion
    Telemetry,
}

impl TrafficClass {
    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            TrafficClass::Interactive => "interactive",
            TrafficClass::Telemetry => "telemetry",
        }
    }
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable set of traffic classes attached to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnectionClassification {
    interactive: bool,
    telemetry: bool,
}

impl ConnectionClassification {
    /// A set with a single class
    pub const fn only(class: TrafficClass) -> Self {
        match class {
            TrafficClass::Interactive => Self {
                interactive: true,
                telemetry: false,
            },
            TrafficClass::Telemetry => Self {
                interactive: false,
                telemetry: true,
            },
        }
    }

    /// Both classes, for a shared listener
    pub const fn both() -> Self {
        Self {
            interactive: true,
            telemetry: true,
        }
    }

    /// Whether the set contains `class`
    pub const fn contains(&self, class: TrafficClass) -> bool {
        match class {
            TrafficClass::Interactive => self.interactive,
            TrafficClass::Telemetry => self.telemetry,
        }
    }

    /// Members in a fixed order
    pub fn classes(&self) -> impl Iterator<Item = TrafficClass> + '_ {
        [TrafficClass::Interactive, TrafficClass::Telemetry]
            .into_iter()
            .filter(|class| self.contains(*class))
    }
}

impl fmt::Display for ConnectionClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.classes().map(TrafficClass::as_str).collect();
        f.write_str(&names.join("+"))
    }
}

/// Peer certificate presented during the TLS handshake
///
/// The chain has already been validated by the TLS layer when this value exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    subject: String,
    thumbprint: String,
}

impl ClientCertificate {
    /// Build from already extracted values
    ///
    /// The thumbprint is normalized to uppercase hex without separators.
    pub fn new(subject: impl Into<String>, thumbprint: &str) -> Self {
        Self {
            subject: subject.into(),
            thumbprint: thumbprint
                .chars()
                .filter(char::is_ascii_hexdigit)
                .map(|c| c.to_ascii_uppercase())
                .collect(),
        }
    }

    /// Parse a DER encoded end-entity certificate
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CertificateRejected`] when the bytes are not an X.509 certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, AuthError> {
        let (_, certificate) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| AuthError::CertificateRejected(format!("unparseable certificate: {e}")))?;

        Ok(Self {
            subject: certificate.subject().to_string(),
            thumbprint: hex::encode_upper(Sha256::digest(der)),
        })
    }

    /// Subject distinguished name
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Uppercase hex SHA-256 of the DER encoding
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }
}

/// Context owned by one accepted connection
///
/// Produced by the listener at accept time and exposed to requests through axum's
/// `ConnectInfo` extension. Never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    remote_addr: SocketAddr,
    classification: ConnectionClassification,
    tls: bool,
    peer_certificate: Option<Arc<ClientCertificate>>,
}

impl ConnectionInfo {
    /// A plain-text connection
    pub fn new(remote_addr: SocketAddr, classification: ConnectionClassification) -> Self {
        Self {
            remote_addr,
            classification,
            tls: false,
            peer_certificate: None,
        }
    }

    /// Mark the connection as TLS, with the validated peer certificate if one was sent
    pub fn with_tls(mut self, peer_certificate: Option<ClientCertificate>) -> Self {
        self.tls = true;
        self.peer_certificate = peer_certificate.map(Arc::new);
        self
    }

    /// Remote socket address
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Traffic classes the connection may carry
    pub fn classification(&self) -> ConnectionClassification {
        self.classification
    }

    /// Whether the connection is TLS
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Validated peer certificate
    pub fn peer_certificate(&self) -> Option<&ClientCertificate> {
        self.peer_certificate.as_deref()
    }

    /// Read the connection context from request extensions
    pub fn from_extensions(extensions: &Extensions) -> Option<&ConnectionInfo> {
        extensions
            .get::<ConnectInfo<ConnectionInfo>>()
            .map(|ConnectInfo(info)| info)
    }
}

/// Request gate requiring one traffic class on the underlying connection
///
/// Passing the gate yields no identity; it only lets the next check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTypeGuard {
    required: TrafficClass,
}

impl ConnectionTypeGuard {
    /// Guard for `required`
    pub const fn new(required: TrafficClass) -> Self {
        Self { required }
    }

    /// The class this guard requires
    pub fn required(&self) -> TrafficClass {
        self.required
    }

    /// Check a request's connection
    ///
    /// # Errors
    ///
    /// - [`AuthError::UnclassifiedConnection`] when no connection context exists
    /// - [`AuthError::TrafficClassNotPermitted`] when the class is missing from the set
    pub fn check(&self, connection: Option<&ConnectionInfo>) -> Result<(), AuthError> {
        let connection = connection.ok_or(AuthError::UnclassifiedConnection)?;
        if connection.classification().contains(self.required) {
            Ok(())
        } else {
            Err(AuthError::TrafficClassNotPermitted(self.required))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(classification: ConnectionClassification) -> ConnectionInfo {
        ConnectionInfo::new("127.0.0.1:50000".parse().unwrap(), classification)
    }

    #[test]
    fn test_classification_membership() {
        let interactive = ConnectionClassification::only(TrafficClass::Interactive);
        assert!(interactive.contains(TrafficClass::Interactive));
        assert!(!interactive.contains(TrafficClass::Telemetry));

        let both = ConnectionClassification::both();
        assert!(both.contains(TrafficClass::Interactive));
        assert!(both.contains(TrafficClass::Telemetry));
        assert_eq!(both.to_string(), "interactive+telemetry");

        assert_eq!(ConnectionClassification::default().classes().count(), 0);
    }

    #[test]
    fn test_guard_rejects_unclassified() {
        for class in [TrafficClass::Interactive, TrafficClass::Telemetry] {
            assert_eq!(
                ConnectionTypeGuard::new(class).check(None),
                Err(AuthError::UnclassifiedConnection)
            );
        }
    }

    #[test]
    fn test_guard_rejects_wrong_class() {
        let info = connection(ConnectionClassification::only(TrafficClass::Interactive));
        assert_eq!(
            ConnectionTypeGuard::new(TrafficClass::Telemetry).check(Some(&info)),
            Err(AuthError::TrafficClassNotPermitted(TrafficClass::Telemetry))
        );
    }

    #[test]
    fn test_guard_rejects_empty_classification() {
        let info = connection(ConnectionClassification::default());
        assert!(ConnectionTypeGuard::new(TrafficClass::Interactive)
            .check(Some(&info))
            .is_err());
    }

    #[test]
    fn test_guard_passes_matching_class() {
        let info = connection(ConnectionClassification::both());
        assert!(ConnectionTypeGuard::new(TrafficClass::Telemetry)
            .check(Some(&info))
            .is_ok());
        assert!(ConnectionTypeGuard::new(TrafficClass::Interactive)
            .check(Some(&info))
            .is_ok());
    }

    #[test]
    fn test_connection_info_from_extensions() {
        let mut extensions = Extensions::new();
        assert!(ConnectionInfo::from_extensions(&extensions).is_none());

        let info = connection(ConnectionClassification::only(TrafficClass::Telemetry))
            .with_tls(Some(ClientCertificate::new("CN=collector", "ab:cd")));
        extensions.insert(ConnectInfo(info));

        let found = ConnectionInfo::from_extensions(&extensions).unwrap();
        assert!(found.is_tls());
        assert_eq!(found.peer_certificate().unwrap().thumbprint(), "ABCD");
    }

    #[test]
    fn test_from_der_rejects_garbage() {
        assert!(matches!(
            ClientCertificate::from_der(b"not a certificate"),
            Err(AuthError::CertificateRejected(_))
        ));
    }
}
