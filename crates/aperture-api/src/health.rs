//! Health check endpoints
//!
//! Served on interactive connections only. Reports the active options snapshot and the
//! authentication mode of each surface.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use aperture_auth::{GatewayHandle, TrafficClass};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};

/// Health check status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Listening and serving
    Healthy,
    /// Still starting or already draining
    Degraded,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall health status
    pub status: HealthStatus,
    /// Application name from the active options
    pub service: String,
    /// Crate version
    pub version: String,
    /// Version of the active options snapshot, bumped on every reload
    pub options_version: u64,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Per-surface authentication modes
    pub surfaces: SurfaceModes,
}

/// Active authentication mode per surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceModes {
    pub interactive: String,
    pub telemetry: String,
}

/// Health tracker for the service
#[derive(Debug, Clone)]
pub struct HealthTracker {
    /// Service start time
    started: Instant,
    /// Are listeners serving?
    ready: Arc<AtomicBool>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    /// Create a new health tracker
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Mark service as ready
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Build the health report against the current snapshot
    pub fn check_health(&self, gateway: &GatewayHandle) -> HealthResponse {
        let current = gateway.current();
        let status = if self.is_ready() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthResponse {
            status,
            service: current.options().application_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            options_version: current.version(),
            uptime_seconds: self.uptime_seconds(),
            surfaces: SurfaceModes {
                interactive: current.mode_name(TrafficClass::Interactive).to_string(),
                telemetry: current.mode_name(TrafficClass::Telemetry).to_string(),
            },
        }
    }
}

/// Health check handler
///
/// Degraded still answers 200 so the dashboard stays reachable while listeners start.
pub async fn health_check_handler(State(state): State<crate::AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.health.check_health(&state.gateway)))
}
