//! Axum middleware running a surface's chain and policy
//!
//! The current [`crate::Gateway`] snapshot is loaded once per request. On success the
//! [`crate::Identity`] and the snapshot are inserted into request extensions for handlers.

use std::sync::Arc;
use std::time::Instant;

use aperture_observe::{auth_span, record_auth_outcome};
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::Instrument;

use crate::audit::{log_audit_event, AuditEvent};
use crate::composite::{AuthFailure, RequestContext};
use crate::connection::{ConnectionInfo, ConnectionTypeGuard, TrafficClass};
use crate::gateway::GatewayHandle;

/// Authenticate and authorize a request for the interactive surface
///
/// Browser failures redirect to the mode's challenge when it has one.
pub async fn interactive_auth_middleware(
    State(handle): State<Arc<GatewayHandle>>,
    request: Request,
    next: Next,
) -> Response {
    authenticate_request(TrafficClass::Interactive, &handle, request, next).await
}

/// Authenticate and authorize a request for the telemetry surface
pub async fn telemetry_auth_middleware(
    State(handle): State<Arc<GatewayHandle>>,
    request: Request,
    next: Next,
) -> Response {
    authenticate_request(TrafficClass::Telemetry, &handle, request, next).await
}

/// Reject requests whose connection is not classified as interactive
///
/// Used in front of the login and logout endpoints, which run before a session exists.
pub async fn require_interactive_connection(request: Request, next: Next) -> Response {
    let guard = ConnectionTypeGuard::new(TrafficClass::Interactive);
    let connection = ConnectionInfo::from_extensions(request.extensions());

    if let Err(error) = guard.check(connection) {
        log_audit_event(AuditEvent::ConnectionRejected {
            surface: TrafficClass::Interactive,
            error: error.to_string(),
            timestamp: Utc::now(),
            remote_addr: connection.map(|c| c.remote_addr().to_string()),
        });
        return (StatusCode::UNAUTHORIZED, error.to_string()).into_response();
    }

    next.run(request).await
}

async fn authenticate_request(
    surface: TrafficClass,
    handle: &GatewayHandle,
    request: Request,
    next: Next,
) -> Response {
    let gateway = handle.current();
    let mode = gateway.mode_name(surface);
    let (mut parts, body) = request.into_parts();

    let span = auth_span(surface.as_str(), mode);
    let start = Instant::now();
    let result = gateway
        .authenticate(surface, &RequestContext::from_parts(&parts))
        .instrument(span.clone())
        .await;
    let duration_us = start.elapsed().as_micros();

    let remote_addr = ConnectionInfo::from_extensions(&parts.extensions)
        .map(|c| c.remote_addr().to_string());

    match result {
        Ok(identity) => {
            record_auth_outcome(&span, "success", duration_us);
            log_audit_event(AuditEvent::AuthenticationSuccess {
                surface,
                mode: mode.to_string(),
                timestamp: Utc::now(),
                remote_addr,
            });

            parts.extensions.insert(identity);
            parts.extensions.insert(Arc::clone(&gateway));
            next.run(Request::from_parts(parts, body)).await
        }
        Err(failure) => {
            record_auth_outcome(&span, "failure", duration_us);
            log_audit_event(audit_failure(surface, mode, &failure, remote_addr));

            let return_url = parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            failure_response(&failure, return_url)
        }
    }
}

fn audit_failure(
    surface: TrafficClass,
    mode: &str,
    failure: &AuthFailure,
    remote_addr: Option<String>,
) -> AuditEvent {
    let error = failure.error.to_string();
    let timestamp = Utc::now();

    if failure.error.is_connection_failure() {
        AuditEvent::ConnectionRejected {
            surface,
            error,
            timestamp,
            remote_addr,
        }
    } else if failure.error.is_authorization_failure() {
        AuditEvent::AuthorizationFailure {
            surface,
            error,
            timestamp,
            remote_addr,
        }
    } else {
        AuditEvent::AuthenticationFailure {
            surface,
            mode: mode.to_string(),
            error,
            timestamp,
            remote_addr,
        }
    }
}

/// Response for a failed chain
///
/// - Authorization failures: 403, never a redirect
/// - Failures carrying a challenge: 302 to the challenge location
/// - Everything else: 401
pub fn failure_response(failure: &AuthFailure, return_url: &str) -> Response {
    if failure.error.is_authorization_failure() {
        return (StatusCode::FORBIDDEN, failure.error.to_string()).into_response();
    }

    match &failure.challenge {
        Some(challenge) => (
            StatusCode::FOUND,
            [(header::LOCATION, challenge.location(return_url))],
        )
            .into_response(),
        None => (StatusCode::UNAUTHORIZED, failure.error.to_string()).into_response(),
    }
}
