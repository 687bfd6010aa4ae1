//! Session endpoints for the interactive surface

use aperture_auth::{Identity, RequireIdentity};
use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

/// Response of `GET /api/session`
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub application_name: String,
    pub identity: Identity,
}

/// GET /
pub async fn index(State(state): State<AppState>) -> String {
    state.gateway.current().options().application_name.clone()
}

/// GET /api/session
///
/// Returns who the interactive chain says the caller is.
pub async fn session_info(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
) -> Json<SessionResponse> {
    Json(SessionResponse {
        application_name: state.gateway.current().options().application_name.clone(),
        identity,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::telemetry::DiscardingSink;
    use aperture_auth::GatewayHandle;
    use aperture_config::{OptionsSource, RawOptions};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        let mut raw = RawOptions::default();
        raw.application_name = Some("Orders".into());
        raw.frontend.endpoint_urls = Some("http://localhost:18888".into());
        raw.otlp.http_endpoint_url = Some("http://localhost:4318".into());
        let options = OptionsSource::new(raw).build().unwrap();
        let state = AppState::new(Arc::new(GatewayHandle::new(options)), Arc::new(DiscardingSink));
        Router::new()
            .route("/api/session", get(session_info))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_session_info_returns_identity() {
        let mut request = Request::builder()
            .uri("/api/session")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(Identity::unsecured());

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["application_name"], "Orders");
        assert_eq!(json["identity"]["authentication_type"], "unsecured");
    }

    #[tokio::test]
    async fn test_session_info_without_identity() {
        let request = Request::builder()
            .uri("/api/session")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
