//! HTTPS redirect for interactive requests on plain connections
//!
//! The router installs this only when every configured endpoint is HTTPS. Every listener
//! then terminates TLS, so in a running server each request takes the pass-through
//! branch; the redirect branch only answers connections stamped without TLS.

use aperture_auth::ConnectionInfo;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Redirect non-TLS interactive requests to the designated HTTPS port
///
/// Requests without a `Host` header are passed through; there is nowhere to send them.
pub async fn https_redirect(State(port): State<u16>, request: Request, next: Next) -> Response {
    let is_tls = ConnectionInfo::from_extensions(request.extensions()).is_some_and(|c| c.is_tls());
    if is_tls {
        return next.run(request).await;
    }

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().host());
    let Some(host) = host else {
        return next.run(request).await;
    };

    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let location = format!("https://{}:{}{}", strip_port(host), port, path);
    tracing::debug!(location = %location, "Redirecting to HTTPS");

    (StatusCode::PERMANENT_REDIRECT, [(header::LOCATION, location)]).into_response()
}

/// Host without its port, keeping IPv6 brackets
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, _)) => name,
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aperture_auth::{ConnectionClassification, TrafficClass};
    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::Request as HttpRequest,
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/traces", get(|| async { "ok" }))
            .route_layer(middleware::from_fn_with_state(18889u16, https_redirect))
    }

    fn request(tls: bool) -> HttpRequest<Body> {
        let mut request = HttpRequest::builder()
            .uri("/traces?filter=a")
            .header(header::HOST, "dashboard.local:18888")
            .body(Body::empty())
            .unwrap();
        let mut info = ConnectionInfo::new(
            "10.0.0.5:40000".parse().unwrap(),
            ConnectionClassification::only(TrafficClass::Interactive),
        );
        if tls {
            info = info.with_tls(None);
        }
        request.extensions_mut().insert(ConnectInfo(info));
        request
    }

    #[tokio::test]
    async fn test_plain_request_is_redirected() {
        let response = app().oneshot(request(false)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://dashboard.local:18889/traces?filter=a"
        );
    }

    #[tokio::test]
    async fn test_tls_request_passes() {
        let response = app().oneshot(request(true)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("localhost:18888"), "localhost");
        assert_eq!(strip_port("localhost"), "localhost");
        assert_eq!(strip_port("[::1]:18888"), "[::1]");
        assert_eq!(strip_port("[::1]"), "[::1]");
    }
}
