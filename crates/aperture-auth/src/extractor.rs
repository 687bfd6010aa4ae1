//! Axum extractors for the authenticated identity

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};

use crate::identity::Identity;

/// Extractor that requires an identity set by the auth middleware
///
/// Rejects with 401 when the route was not behind the middleware or authentication
/// did not run.
///
/// # Example
///
/// ```ignore
/// async fn handler(RequireIdentity(identity): RequireIdentity) -> String {
///     identity.name().unwrap_or("anonymous").to_string()
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireIdentity(pub Identity);

impl<S> FromRequestParts<S> for RequireIdentity
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(RequireIdentity)
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, "Authentication required").into_response())
    }
}
