//! Telemetry export boundary
//!
//! Requests reach a [`TelemetrySink`] only after the telemetry chain and policy pass.
//! Decoding and storing the payload is the sink's business.

use async_trait::async_trait;
use axum::body::Bytes;
use thiserror::Error;

/// One export request as received
#[derive(Debug, Clone)]
pub struct ExportBatch {
    /// `Content-Type` of the request, if sent
    pub content_type: Option<String>,
    /// Encoded payload
    pub payload: Bytes,
}

/// Partial-success result of an export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOutcome {
    /// Items the sink refused
    pub rejected: u64,
}

/// Errors a sink may report for a whole batch
#[derive(Debug, Error)]
pub enum ExportError {
    /// The payload could not be decoded
    #[error("Invalid export payload: {0}")]
    InvalidPayload(String),

    /// The sink cannot accept data right now
    #[error("Telemetry sink unavailable: {0}")]
    Unavailable(String),
}

/// Receiver of authenticated telemetry exports
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Export a batch of log records
    async fn export_logs(&self, batch: ExportBatch) -> Result<ExportOutcome, ExportError>;

    /// Export a batch of metric data points
    async fn export_metrics(&self, batch: ExportBatch) -> Result<ExportOutcome, ExportError>;

    /// Export a batch of spans
    async fn export_traces(&self, batch: ExportBatch) -> Result<ExportOutcome, ExportError>;
}

/// Sink that accepts and drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardingSink;

impl DiscardingSink {
    fn discard(signal: &str, batch: &ExportBatch) -> ExportOutcome {
        tracing::debug!(
            signal = signal,
            content_type = ?batch.content_type,
            bytes = batch.payload.len(),
            "Discarding telemetry export"
        );
        ExportOutcome::default()
    }
}

#[async_trait]
impl TelemetrySink for DiscardingSink {
    async fn export_logs(&self, batch: ExportBatch) -> Result<ExportOutcome, ExportError> {
        Ok(Self::discard("logs", &batch))
    }

    async fn export_metrics(&self, batch: ExportBatch) -> Result<ExportOutcome, ExportError> {
        Ok(Self::discard("metrics", &batch))
    }

    async fn export_traces(&self, batch: ExportBatch) -> Result<ExportOutcome, ExportError> {
        Ok(Self::discard("traces", &batch))
    }
}
