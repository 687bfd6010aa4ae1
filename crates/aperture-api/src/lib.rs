//! # Aperture API - Listeners, Routing and Server Lifecycle
//!
//! Plans the listener topology, binds classifying listeners, and mounts the interactive
//! and telemetry routers behind their authentication middleware.

#![deny(unsafe_code)]

use std::future::Future;
use std::io;
use std::sync::Arc;

use aperture_auth::{
    interactive_auth_middleware, require_interactive_connection, telemetry_auth_middleware,
    AuthError, ConnectionInfo, GatewayHandle,
};
use aperture_config::{FrontendAuth, OtlpCors};
use aperture_const::{
    LOGIN_PATH, LOGOUT_PATH, OTLP_LOGS_PATH, OTLP_METRICS_PATH, OTLP_TRACES_PATH,
    TOKEN_QUERY_PARAMETER,
};
use axum::{
    http::{HeaderName, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

pub mod endpoints;
pub mod handlers;
pub mod health;
pub mod listener;
pub mod redirect;
pub mod telemetry;
pub mod tls;

use endpoints::{ListenerTopology, ResolvedEndpoint};
use health::HealthTracker;
use listener::{ClassifyingListener, TlsClassifyingListener};
use telemetry::{ExportError, TelemetrySink};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),

    #[error("Internal error: {0}")]
    Internal(String),

    // Startup errors
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("Cannot load TLS material from {path}: {reason}")]
    TlsMaterial { path: String, reason: String },

    #[error("Endpoint {0} has not been bound")]
    EndpointNotResolved(String),

    #[error("Endpoint {0} was already resolved")]
    EndpointAlreadyResolved(String),

    #[error("Server error: {0}")]
    Serve(#[from] io::Error),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Internal(format!("Authentication system error: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Export(ExportError::InvalidPayload(_)) => StatusCode::BAD_REQUEST,
            ApiError::Export(ExportError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Application state shared by every listener
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayHandle>,
    pub sink: Arc<dyn TelemetrySink>,
    pub health: Arc<HealthTracker>,
}

impl AppState {
    pub fn new(gateway: Arc<GatewayHandle>, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            gateway,
            sink,
            health: Arc::new(HealthTracker::new()),
        }
    }
}

/// Create the router mounted on every listener
///
/// Routes for both surfaces are present everywhere. Which surface a request may use is
/// decided per connection by the guards at the front of each chain.
pub fn create_router(state: AppState, topology: &ListenerTopology) -> Router {
    let gateway = state.gateway.current();

    // Interactive routes that require a signed-in browser
    let protected = Router::new()
        .route("/", get(handlers::session::index))
        .route("/api/session", get(handlers::session::session_info))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.gateway),
            interactive_auth_middleware,
        ));

    // Sign-in routes run before a session exists
    let sign_in = Router::new()
        .route(LOGIN_PATH, get(handlers::login::login))
        .route(LOGOUT_PATH, post(handlers::login::logout))
        .route_layer(middleware::from_fn(require_interactive_connection));

    let mut interactive = protected.merge(sign_in);
    if let Some(port) = topology.https_redirect_port() {
        info!(port = port, "HTTPS redirect ENABLED for interactive routes");
        interactive =
            interactive.route_layer(middleware::from_fn_with_state(port, redirect::https_redirect));
    }

    let health = Router::new()
        .route("/health", get(health::health_check_handler))
        .route_layer(middleware::from_fn(require_interactive_connection));

    let mut telemetry = Router::new()
        .route(OTLP_LOGS_PATH, post(handlers::otlp::export_logs))
        .route(OTLP_METRICS_PATH, post(handlers::otlp::export_metrics))
        .route(OTLP_TRACES_PATH, post(handlers::otlp::export_traces))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.gateway),
            telemetry_auth_middleware,
        ));

    // Outside the auth layer so preflight requests are answered without credentials
    if let Some(cors) = &gateway.options().otlp.cors {
        info!(origins = ?cors.allowed_origins, "CORS ENABLED for telemetry routes");
        telemetry = telemetry.layer(cors_layer(cors));
    }

    interactive
        .merge(health)
        .merge(telemetry)
        .with_state(state)
}

fn cors_layer(cors: &OtlpCors) -> CorsLayer {
    let origins = if cors.allows_any_origin() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            cors.allowed_origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    let headers = if cors.allowed_headers.is_empty() || cors.allows_any_header() {
        AllowHeaders::any()
    } else {
        AllowHeaders::list(
            cors.allowed_headers
                .iter()
                .filter_map(|header| HeaderName::from_bytes(header.as_bytes()).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_headers(headers)
        .allow_methods([Method::POST, Method::OPTIONS])
}

/// Graceful shutdown signal handler
///
/// Waits for SIGTERM or SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }

    info!("Shutdown signal received, draining connections...");
}

/// Everything the server needs besides its listeners
pub struct ServerComponents {
    pub gateway: Arc<GatewayHandle>,
    pub sink: Arc<dyn TelemetrySink>,
}

enum BoundListener {
    Plain(ClassifyingListener),
    Tls(TlsClassifyingListener),
}

/// Bound listeners ready to serve
pub struct Server {
    state: AppState,
    topology: Arc<ListenerTopology>,
    listeners: Vec<BoundListener>,
}

impl Server {
    /// Plan the topology from the current snapshot and bind every listener
    ///
    /// Each listener's endpoint slot is resolved as soon as its socket is bound.
    pub async fn bind(components: ServerComponents) -> Result<Self> {
        let gateway = components.gateway.current();
        let options = gateway.options();
        let topology = Arc::new(endpoints::plan(options));

        let mut listeners = Vec::with_capacity(topology.listeners().len());
        for spec in topology.listeners() {
            let tcp = TcpListener::bind(spec.address.bind_target())
                .await
                .map_err(|source| ApiError::Bind {
                    address: spec.address.to_string(),
                    source,
                })?;
            let local_addr = tcp.local_addr()?;
            let tls = spec.address.is_tls();

            let listener = if tls {
                let config =
                    tls::server_config(&options.tls, spec.require_client_certificate, spec.protocols)?;
                BoundListener::Tls(TlsClassifyingListener::new(tcp, config, spec.classes)?)
            } else {
                BoundListener::Plain(ClassifyingListener::new(tcp, spec.classes))
            };

            let resolved = ResolvedEndpoint {
                address: spec.address.clone(),
                local_addr,
                tls,
            };
            info!(
                listener = %spec.label(),
                url = %resolved.url(false),
                classes = %spec.classes,
                client_certificate = spec.require_client_certificate,
                "Now listening"
            );
            spec.slot.resolve(resolved)?;
            listeners.push(listener);
        }

        info!(
            mode = ?topology.mode(),
            listeners = listeners.len(),
            interactive_mode = gateway.mode_name(aperture_auth::TrafficClass::Interactive),
            telemetry_mode = gateway.mode_name(aperture_auth::TrafficClass::Telemetry),
            "Bound all listeners"
        );

        Ok(Self {
            state: AppState::new(components.gateway, components.sink),
            topology,
            listeners,
        })
    }

    /// Planned topology with resolved endpoints
    pub fn topology(&self) -> &Arc<ListenerTopology> {
        &self.topology
    }

    /// Shared application state
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Browser-token login URL for the first interactive endpoint
    ///
    /// `None` unless the interactive surface uses browser-token authentication. A wildcard
    /// bind host is shown as `localhost`.
    pub fn login_url(&self) -> Result<Option<String>> {
        let gateway = self.state.gateway.current();
        let FrontendAuth::BrowserToken { token } = &gateway.options().frontend.auth else {
            return Ok(None);
        };
        let Some(token) = token.expose_text() else {
            return Ok(None);
        };
        let Some(endpoint) = self.topology.frontend_endpoint(0)? else {
            return Ok(None);
        };

        Ok(Some(format!(
            "{}{}?{}={}",
            endpoint.url(true),
            LOGIN_PATH,
            TOKEN_QUERY_PARAMETER,
            urlencoding::encode(token)
        )))
    }

    /// Serve every listener until `shutdown` completes
    ///
    /// In-flight requests are drained before this returns.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = create_router(self.state.clone(), &self.topology);

        match self.login_url() {
            Ok(Some(url)) => info!("Login to the dashboard at {}", url),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Cannot build login URL"),
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown.await;
            let _ = stop_tx.send(true);
        });

        self.state.health.set_ready(true);
        let mut servers = JoinSet::new();
        for listener in self.listeners {
            let router = router.clone();
            let stop = wait_for_stop(stop_rx.clone());
            match listener {
                BoundListener::Plain(listener) => {
                    servers.spawn(async move {
                        axum::serve(
                            axum::serve::ListenerExt::tap_io(listener, |_| {}),
                            router.into_make_service_with_connect_info::<ConnectionInfo>(),
                        )
                        .with_graceful_shutdown(stop)
                        .await
                    });
                }
                BoundListener::Tls(listener) => {
                    servers.spawn(async move {
                        axum::serve(
                            axum::serve::ListenerExt::tap_io(listener, |_| {}),
                            router.into_make_service_with_connect_info::<ConnectionInfo>(),
                        )
                        .with_graceful_shutdown(stop)
                        .await
                    });
                }
            }
        }

        let mut result = Ok(());
        while let Some(joined) = servers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Listener failed");
                    result = Err(ApiError::Serve(e));
                }
                Err(e) => {
                    error!(error = %e, "Listener task failed");
                    result = Err(ApiError::Internal(format!("listener task failed: {}", e)));
                }
            }
        }

        self.state.health.set_ready(false);
        info!("All listeners stopped");
        result
    }
}

async fn wait_for_stop(mut stop: watch::Receiver<bool>) {
    // A dropped sender also means stop
    let _ = stop.wait_for(|stopped| *stopped).await;
}
