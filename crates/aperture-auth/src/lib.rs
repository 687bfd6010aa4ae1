//! # Aperture Auth
//!
//! Connection classification and composite authentication for the two surfaces the
//! gateway serves: the interactive browser surface and the telemetry ingestion surface.
//!
//! ## Features
//!
//! - **Connection Classification**: every connection carries the traffic classes its
//!   listener was planned with; requests for another surface are refused
//! - **Composite Chains**: a connection-type guard followed by the surface's mode checks,
//!   evaluated strictly in order
//! - **Telemetry Modes**: API key (primary and secondary), client certificate allow-list,
//!   or unsecured
//! - **Interactive Modes**: browser token sessions, federated sessions, or unsecured
//! - **Claim Policies**: per-surface authorization evaluated after authentication
//! - **Atomic Reload**: versioned gateway snapshots published without locks
//!
//! ## Security
//!
//! - Secrets are compared in constant time, independent of where they first differ
//! - Session cookies are HttpOnly and SameSite=Strict
//! - No unsafe code is allowed in this crate
//!
//! ## Example
//!
//! ```ignore
//! use aperture_auth::{interactive_auth_middleware, GatewayHandle};
//!
//! let handle = Arc::new(GatewayHandle::new(options));
//! let app = Router::new()
//!     .route("/", get(index))
//!     .route_layer(middleware::from_fn_with_state(handle, interactive_auth_middleware));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Audit logging for authentication events
pub mod audit;
/// Constant-time secret comparison
pub mod compare;
/// Per-surface composite authenticators
pub mod composite;
/// Connection classification and the connection-type guard
pub mod connection;
/// Authentication errors
pub mod error;
/// Axum extractors for the authenticated identity
pub mod extractor;
/// Versioned gateway snapshots
pub mod gateway;
/// Authenticated identity and claims
pub mod identity;
/// Axum middleware for authentication
pub mod middleware;
/// Mode-specific checks
pub mod modes;
/// Claim-based authorization policies
pub mod policy;
/// Interactive session cookies
pub mod session;

pub use audit::{log_audit_event, AuditEvent};
pub use compare::compare_key;
pub use composite::{
    AuthFailure, ChallengeAction, InteractiveAuthenticator, LinkOutcome, RequestContext,
    TelemetryAuthenticator, TelemetryLink,
};
pub use connection::{
    ClientCertificate, ConnectionClassification, ConnectionInfo, ConnectionTypeGuard,
    TrafficClass,
};
pub use error::AuthError;
pub use extractor::RequireIdentity;
pub use gateway::{Gateway, GatewayHandle};
pub use identity::{Claim, Identity};
pub use middleware::{
    failure_response, interactive_auth_middleware, require_interactive_connection,
    telemetry_auth_middleware,
};
pub use modes::{ApiKeyCheck, ClientCertificateCheck, FederatedMode, InteractiveMode};
pub use policy::{ClaimRequirement, SurfacePolicy};
pub use session::{
    expired_session_cookie, read_cookie, session_cookie, session_token, SessionClaims,
    SessionCodec,
};
