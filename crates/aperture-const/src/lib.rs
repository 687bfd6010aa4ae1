//! # Aperture Constants
//!
//! Centralized constants used across the aperture gateway.
//! This crate provides a single source of truth for claim names, header names,
//! cookie parameters and configuration defaults.

use std::time::Duration;

// ============================================================================
// Claim Constants
// ============================================================================

/// Claim carried by every identity minted for an anonymous (unsecured) caller
///
/// Used by:
/// - Interactive unsecured mode
/// - Telemetry unsecured mode
pub const UNSECURED_CLAIM: &str = "unsecured";

/// Claim carried by identities that proved possession of the browser token
///
/// Used by:
/// - Login handler when issuing a session
/// - Interactive browser-token mode
pub const BROWSER_TOKEN_CLAIM: &str = "browser-token-verified";

/// Claim set on the identity produced by the telemetry composite
///
/// Its value is always [`CLAIM_TRUE`].
pub const TELEMETRY_CLAIM: &str = "telemetry-authenticated";

/// Name-identifier claim
pub const NAME_IDENTIFIER_CLAIM: &str = "nameidentifier";

/// Display-name claim copied from the federated identity
pub const NAME_CLAIM: &str = "name";

/// Username claim copied from the federated identity
pub const USERNAME_CLAIM: &str = "username";

/// Name identifier assigned to anonymous callers
pub const LOCAL_NAME_IDENTIFIER: &str = "Local";

/// Canonical value for boolean marker claims
pub const CLAIM_TRUE: &str = "true";

// ============================================================================
// Telemetry Surface Constants
// ============================================================================

/// Header carrying the telemetry API key
///
/// Header names are case-insensitive on the wire; this is the canonical form.
pub const API_KEY_HEADER: &str = "x-otlp-api-key";

/// OTLP/HTTP log export path
pub const OTLP_LOGS_PATH: &str = "/v1/logs";

/// OTLP/HTTP metric export path
pub const OTLP_METRICS_PATH: &str = "/v1/metrics";

/// OTLP/HTTP trace export path
pub const OTLP_TRACES_PATH: &str = "/v1/traces";

// ============================================================================
// Interactive Surface Constants
// ============================================================================

/// Cookie carrying the interactive session
pub const AUTH_COOKIE_NAME: &str = ".Aperture.Auth";

/// Login page path
pub const LOGIN_PATH: &str = "/login";

/// Logout path
pub const LOGOUT_PATH: &str = "/logout";

/// Query parameter carrying the browser token on the login URL
pub const TOKEN_QUERY_PARAMETER: &str = "t";

/// Query parameter carrying the post-login destination
pub const RETURN_URL_QUERY_PARAMETER: &str = "returnUrl";

/// Lifetime of an issued interactive session
///
/// Used by:
/// - Session codec (token expiry)
/// - Login handler (cookie Max-Age)
pub const SESSION_LIFETIME: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Scheme recorded in sessions issued after a browser-token login
pub const BROWSER_TOKEN_SESSION_SCHEME: &str = "browser_token";

/// Scheme recorded in sessions issued after a federated sign-in
pub const FEDERATED_SESSION_SCHEME: &str = "federated";

// ============================================================================
// Secret Constants
// ============================================================================

/// Number of random bytes in a generated browser token
///
/// Encoded as unpadded URL-safe base64 this yields a 43 character token.
pub const BROWSER_TOKEN_BYTES: usize = 32;

/// Number of random bytes in the per-process session signing key
pub const SESSION_KEY_BYTES: usize = 32;

/// Largest expected secret compared without a heap allocation
pub const COMPARE_STACK_THRESHOLD: usize = 256;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Environment variable prefix for configuration overrides
///
/// `APERTURE__OTLP__AUTH_MODE=api_key` sets `otlp.auth_mode`.
pub const CONFIG_ENV_PREFIX: &str = "APERTURE";

/// Separator between nested keys in environment variable names
pub const CONFIG_ENV_SEPARATOR: &str = "__";

/// Default application name shown in logs and the session endpoint
pub const DEFAULT_APPLICATION_NAME: &str = "Aperture";

/// Default path that starts a federated sign-in
pub const DEFAULT_OIDC_CHALLENGE_PATH: &str = "/authentication/oidc/challenge";

/// Default claim types searched for the federated display name
pub const DEFAULT_NAME_CLAIM_TYPE: &str = "name";

/// Default claim types searched for the federated username
pub const DEFAULT_USERNAME_CLAIM_TYPE: &str = "preferred_username";

/// Default maximum retained console log lines per resource
pub const DEFAULT_MAX_CONSOLE_LOG_COUNT: usize = 10_000;

/// Default maximum retained log records
pub const DEFAULT_MAX_LOG_COUNT: usize = 10_000;

/// Default maximum retained traces
pub const DEFAULT_MAX_TRACE_COUNT: usize = 10_000;

/// Default maximum retained metric points
pub const DEFAULT_MAX_METRICS_COUNT: usize = 50_000;

/// Default maximum attributes kept per telemetry item
pub const DEFAULT_MAX_ATTRIBUTE_COUNT: usize = 128;

// ============================================================================
// Listener Constants
// ============================================================================

/// Upper bound on a single TLS handshake
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Completed handshakes buffered ahead of the HTTP server
pub const TLS_ACCEPT_BACKLOG: usize = 128;

/// Pause after a failed `accept` before retrying
///
/// Accept errors are usually resource exhaustion (EMFILE) and clear up on their own.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifetime_is_three_days() {
        assert_eq!(SESSION_LIFETIME.as_secs(), 259_200);
    }

    #[test]
    fn test_generated_token_length() {
        // Unpadded base64 of N bytes is ceil(4N / 3) characters
        assert_eq!((4 * BROWSER_TOKEN_BYTES).div_ceil(3), 43);
    }
}
