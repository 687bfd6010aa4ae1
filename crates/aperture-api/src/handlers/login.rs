//! Browser-token sign-in
//!
//! `GET /login?t=<token>&returnUrl=<path>` exchanges the browser token for a session cookie.
//! A wrong or missing token gets a plain 401: redirecting back to the login page would loop.

use aperture_auth::{
    compare_key, expired_session_cookie, log_audit_event, session_cookie, AuditEvent, AuthError,
    Claim, ConnectionInfo, TrafficClass,
};
use aperture_config::FrontendAuth;
use aperture_const::{BROWSER_TOKEN_CLAIM, BROWSER_TOKEN_SESSION_SCHEME, CLAIM_TRUE};
use axum::{
    extract::{Query, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;

use crate::{ApiError, AppState};

/// Query parameters of the login page
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    /// Browser token
    pub t: Option<String>,
    /// Local page to continue to
    #[serde(rename = "returnUrl")]
    pub return_url: Option<String>,
}

/// GET /login
///
/// Only mounted behind the interactive connection guard. Answers 404 unless the
/// interactive surface is in browser-token mode.
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
    request: Request,
) -> Result<Response, ApiError> {
    let gateway = state.gateway.current();
    let FrontendAuth::BrowserToken { token } = &gateway.options().frontend.auth else {
        return Err(ApiError::NotFound(
            "Browser token login is not enabled".to_string(),
        ));
    };

    let connection = ConnectionInfo::from_extensions(request.extensions());
    let remote_addr = connection.map(|c| c.remote_addr().to_string());

    let verified = query
        .t
        .as_deref()
        .is_some_and(|candidate| compare_key(token.as_bytes(), candidate));
    if !verified {
        log_audit_event(AuditEvent::AuthenticationFailure {
            surface: TrafficClass::Interactive,
            mode: "browser_token".to_string(),
            error: AuthError::InvalidBrowserToken.to_string(),
            timestamp: Utc::now(),
            remote_addr,
        });
        return Err(ApiError::Unauthorized(AuthError::InvalidBrowserToken.to_string()));
    }

    let sessions = state.gateway.sessions();
    let session = sessions.issue(
        BROWSER_TOKEN_SESSION_SCHEME,
        "browser",
        vec![Claim::new(BROWSER_TOKEN_CLAIM, CLAIM_TRUE)],
    )?;
    let secure = connection.is_some_and(|c| c.is_tls());

    log_audit_event(AuditEvent::AuthenticationSuccess {
        surface: TrafficClass::Interactive,
        mode: "browser_token".to_string(),
        timestamp: Utc::now(),
        remote_addr,
    });

    Ok((
        StatusCode::FOUND,
        [
            (header::LOCATION, safe_return_url(query.return_url.as_deref()).to_string()),
            (
                header::SET_COOKIE,
                session_cookie(&session, sessions.lifetime(), secure),
            ),
        ],
    )
        .into_response())
}

/// POST /logout
pub async fn logout(request: Request) -> Response {
    let secure = ConnectionInfo::from_extensions(request.extensions()).is_some_and(|c| c.is_tls());

    (
        StatusCode::FOUND,
        [
            (header::LOCATION, "/".to_string()),
            (header::SET_COOKIE, expired_session_cookie(secure)),
        ],
    )
        .into_response()
}

/// Accept only local absolute paths
///
/// `//host` and `/\host` are protocol-relative to browsers and would leave the site.
fn safe_return_url(return_url: Option<&str>) -> &str {
    match return_url {
        Some(url)
            if url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\") =>
        {
            url
        }
        _ => "/",
    }
}
