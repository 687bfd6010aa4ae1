//! OTLP/HTTP export handlers
//!
//! Payloads are handed to the [`TelemetrySink`](crate::telemetry::TelemetrySink) untouched.
//! Responses use the OTLP partial-success JSON shape.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use serde_json::{json, Value};

use crate::{telemetry::ExportBatch, ApiError, AppState};

fn batch(headers: &HeaderMap, payload: Bytes) -> ExportBatch {
    ExportBatch {
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        payload,
    }
}

fn partial_success(field: &str, rejected: u64) -> Json<Value> {
    Json(json!({ "partialSuccess": { field: rejected } }))
}

/// POST /v1/logs
pub async fn export_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Bytes,
) -> Result<Json<Value>, ApiError> {
    let outcome = state.sink.export_logs(batch(&headers, payload)).await?;
    Ok(partial_success("rejectedLogRecords", outcome.rejected))
}

/// POST /v1/metrics
pub async fn export_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Bytes,
) -> Result<Json<Value>, ApiError> {
    let outcome = state.sink.export_metrics(batch(&headers, payload)).await?;
    Ok(partial_success("rejectedDataPoints", outcome.rejected))
}

/// POST /v1/traces
pub async fn export_traces(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Bytes,
) -> Result<Json<Value>, ApiError> {
    let outcome = state.sink.export_traces(batch(&headers, payload)).await?;
    Ok(partial_success("rejectedSpans", outcome.rejected))
}
