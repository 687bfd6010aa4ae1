//! Audit Logging
//!
//! Structured audit events for classification, authentication and authorization
//! decisions. Events are serialized to JSON and emitted through `tracing`.
//!
//! ## Event Types
//!
//! - **AuthenticationSuccess**: a surface chain and its policy passed
//! - **AuthenticationFailure**: a mode-specific link rejected the request
//! - **AuthorizationFailure**: authenticated, but a required claim is missing
//! - **ConnectionRejected**: the connection was not classified for the surface

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connection::TrafficClass;

/// Audit event types for the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum AuditEvent {
    /// Request authenticated and authorized
    AuthenticationSuccess {
        /// Surface accessed
        surface: TrafficClass,
        /// Active mode on that surface
        mode: String,
        /// Timestamp of the event
        timestamp: DateTime<Utc>,
        /// Remote address of the client (if available)
        #[serde(skip_serializing_if = "Option::is_none")]
        remote_addr: Option<String>,
    },

    /// Authentication failed
    AuthenticationFailure {
        /// Surface accessed
        surface: TrafficClass,
        /// Active mode on that surface
        mode: String,
        /// Failure reason
        error: String,
        /// Timestamp of the event
        timestamp: DateTime<Utc>,
        /// Remote address of the client (if available)
        #[serde(skip_serializing_if = "Option::is_none")]
        remote_addr: Option<String>,
    },

    /// Authenticated but not authorized
    AuthorizationFailure {
        /// Surface accessed
        surface: TrafficClass,
        /// Failure reason naming the missing requirement
        error: String,
        /// Timestamp of the event
        timestamp: DateTime<Utc>,
        /// Remote address of the client (if available)
        #[serde(skip_serializing_if = "Option::is_none")]
        remote_addr: Option<String>,
    },

    /// Request arrived on a connection not classified for the surface
    ConnectionRejected {
        /// Surface accessed
        surface: TrafficClass,
        /// Failure reason
        error: String,
        /// Timestamp of the event
        timestamp: DateTime<Utc>,
        /// Remote address of the client (if available)
        #[serde(skip_serializing_if = "Option::is_none")]
        remote_addr: Option<String>,
    },
}

/// Log an audit event
///
/// Success events are logged at INFO level, everything else at WARN.
pub fn log_audit_event(event: AuditEvent) {
    let json = match serde_json::to_string(&event) {
        Ok(j) => j,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize audit event");
            return;
        }
    };

    match &event {
        AuditEvent::AuthenticationSuccess {
            surface,
            mode,
            remote_addr,
            ..
        } => {
            tracing::info!(
                audit_event = %json,
                surface = %surface,
                mode = %mode,
                remote_addr = ?remote_addr,
                "Authentication succeeded"
            );
        }
        AuditEvent::AuthenticationFailure {
            surface,
            mode,
            error,
            remote_addr,
            ..
        } => {
            tracing::warn!(
                audit_event = %json,
                surface = %surface,
                mode = %mode,
                error = %error,
                remote_addr = ?remote_addr,
                "Authentication failed"
            );
        }
        AuditEvent::AuthorizationFailure {
            surface,
            error,
            remote_addr,
            ..
        } => {
            tracing::warn!(
                audit_event = %json,
                surface = %surface,
                error = %error,
                remote_addr = ?remote_addr,
                "Authorization failed"
            );
        }
        AuditEvent::ConnectionRejected {
            surface,
            error,
            remote_addr,
            ..
        } => {
            tracing::warn!(
                audit_event = %json,
                surface = %surface,
                error = %error,
                remote_addr = ?remote_addr,
                "Connection not permitted for surface"
            );
        }
    }
}
