//! Router-level tests for the auth middleware
//!
//! Connections are simulated by inserting `ConnectInfo<ConnectionInfo>` by hand, the
//! same extension the classifying listener attaches in production.

use std::sync::Arc;

use aperture_auth::{
    interactive_auth_middleware, telemetry_auth_middleware, ConnectionClassification,
    ConnectionInfo, GatewayHandle, RequireIdentity, TrafficClass,
};
use aperture_config::{Options, OptionsSource, RawOptions};
use aperture_const::{API_KEY_HEADER, AUTH_COOKIE_NAME, BROWSER_TOKEN_CLAIM, BROWSER_TOKEN_SESSION_SCHEME};
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceExt;

fn options(frontend_mode: &str, otlp_mode: &str) -> Options {
    let mut raw = RawOptions::default();
    raw.frontend.endpoint_urls = Some("http://localhost:18888".into());
    raw.frontend.auth_mode = Some(frontend_mode.into());
    raw.frontend.browser_token = Some("browser-secret".into());
    raw.otlp.grpc_endpoint_url = Some("http://localhost:4317".into());
    raw.otlp.auth_mode = Some(otlp_mode.into());
    raw.otlp.primary_api_key = Some("primary".into());
    raw.otlp.secondary_api_key = Some("secondary".into());
    OptionsSource::new(raw).build().unwrap()
}

fn app(handle: Arc<GatewayHandle>) -> Router {
    let interactive = Router::new()
        .route(
            "/",
            get(|RequireIdentity(identity): RequireIdentity| async move {
                identity.authentication_type().to_string()
            }),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&handle),
            interactive_auth_middleware,
        ));

    let telemetry = Router::new()
        .route("/v1/traces", post(|| async { "accepted" }))
        .route_layer(middleware::from_fn_with_state(handle, telemetry_auth_middleware));

    interactive.merge(telemetry)
}

fn on_connection(
    builder: axum::http::request::Builder,
    classes: Option<ConnectionClassification>,
) -> Request<Body> {
    let mut request = builder.body(Body::empty()).unwrap();
    if let Some(classification) = classes {
        request.extensions_mut().insert(ConnectInfo(ConnectionInfo::new(
            "127.0.0.1:50000".parse().unwrap(),
            classification,
        )));
    }
    request
}

fn interactive_only() -> Option<ConnectionClassification> {
    Some(ConnectionClassification::only(TrafficClass::Interactive))
}

fn telemetry_only() -> Option<ConnectionClassification> {
    Some(ConnectionClassification::only(TrafficClass::Telemetry))
}

#[tokio::test]
async fn test_telemetry_with_valid_key_on_telemetry_connection() {
    let handle = Arc::new(GatewayHandle::new(options("unsecured", "api_key")));
    for key in ["primary", "secondary"] {
        let request = on_connection(
            Request::post("/v1/traces").header(API_KEY_HEADER, key),
            telemetry_only(),
        );
        let response = app(Arc::clone(&handle)).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_telemetry_on_interactive_connection_is_rejected() {
    let handle = Arc::new(GatewayHandle::new(options("unsecured", "api_key")));
    let request = on_connection(
        Request::post("/v1/traces").header(API_KEY_HEADER, "primary"),
        interactive_only(),
    );
    let response = app(handle).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::LOCATION).is_none());

    let body = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(
        &body[..],
        b"Connection type telemetry is not enabled on this connection"
    );
}

#[tokio::test]
async fn test_unclassified_connection_is_rejected_on_both_surfaces() {
    let handle = Arc::new(GatewayHandle::new(options("unsecured", "unsecured")));

    let response = app(Arc::clone(&handle))
        .oneshot(on_connection(Request::get("/"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app(handle)
        .oneshot(on_connection(Request::post("/v1/traces"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_telemetry_wrong_key_gets_no_challenge() {
    let handle = Arc::new(GatewayHandle::new(options("browser_token", "api_key")));
    let request = on_connection(
        Request::post("/v1/traces").header(API_KEY_HEADER, "wrong"),
        telemetry_only(),
    );
    let response = app(handle).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::LOCATION).is_none());
}

#[tokio::test]
async fn test_unsecured_interactive_reaches_handler() {
    let handle = Arc::new(GatewayHandle::new(options("unsecured", "unsecured")));
    let response = app(handle)
        .oneshot(on_connection(Request::get("/"), interactive_only()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"unsecured");
}

#[tokio::test]
async fn test_browser_token_without_session_redirects_to_login() {
    let handle = Arc::new(GatewayHandle::new(options("browser_token", "unsecured")));
    let response = app(handle)
        .oneshot(on_connection(Request::get("/?page=2"), interactive_only()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/login?returnUrl=%2F%3Fpage%3D2"
    );
}

#[tokio::test]
async fn test_browser_token_session_is_accepted() {
    let handle = Arc::new(GatewayHandle::new(options("browser_token", "unsecured")));
    let token = handle
        .sessions()
        .issue(
            BROWSER_TOKEN_SESSION_SCHEME,
            "browser",
            vec![aperture_auth::Claim::new(BROWSER_TOKEN_CLAIM, "true")],
        )
        .unwrap();

    let request = on_connection(
        Request::get("/").header(header::COOKIE, format!("{AUTH_COOKIE_NAME}={token}")),
        interactive_only(),
    );
    let response = app(handle).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], BROWSER_TOKEN_SESSION_SCHEME.as_bytes());
}

#[tokio::test]
async fn test_reload_applies_to_new_requests() {
    let handle = Arc::new(GatewayHandle::new(options("unsecured", "unsecured")));
    let request = || on_connection(Request::post("/v1/traces"), telemetry_only());

    let response = app(Arc::clone(&handle)).oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    handle.publish(options("unsecured", "api_key"));
    let response = app(handle).oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
