//! Prometheus metrics for the reconciliation job.
//!
//! Provides metrics for:
//! - Per-record reconciliation outcomes
//! - Notification attempts
//! - Blob deletions
//! - Pass duration and stage errors
//!
//! Every recording function compiles to a no-op without the `prometheus` feature.

#[cfg(feature = "prometheus")]
use metrics::{counter, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

use crate::config::MetricsConfig;

/// Install the Prometheus recorder and its `/metrics` HTTP listener.
///
/// Must be called from within a tokio runtime.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let address: std::net::SocketAddr = config
        .address
        .parse()
        .map_err(|e| MetricsError::Setup(format!("invalid metrics address {}: {e}", config.address)))?;

    PrometheusBuilder::new()
        .with_http_listener(address)
        .set_buckets_for_metric(
            Matcher::Suffix("_duration_seconds".to_string()),
            &config.duration_buckets_secs,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?
        .install()?;

    tracing::info!(%address, "Prometheus metrics exporter listening");
    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if config.enabled {
        tracing::warn!("Metrics are enabled in config but the 'prometheus' feature is not compiled in");
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record the final outcome of one record's reconciliation.
pub fn record_outcome(outcome: &'static str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("intention_reconciliation_outcomes_total", "outcome" => outcome).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = outcome;
    }
}

/// Record a notification result (`sent`, `failed` or `skipped`).
pub fn record_notification(result: &'static str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("intention_notifications_total", "result" => result).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = result;
    }
}

/// Record blob deletion results for one record.
pub fn record_blob_deletions(succeeded: u64, failed: u64) {
    #[cfg(feature = "prometheus")]
    {
        if succeeded > 0 {
            counter!("intention_blob_deletions_total", "result" => "ok").increment(succeeded);
        }
        if failed > 0 {
            counter!("intention_blob_deletions_total", "result" => "error").increment(failed);
        }
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (succeeded, failed);
    }
}

/// Record an error at a pipeline stage (e.g. `list_due`, `update_status`).
pub fn record_stage_error(stage: &'static str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("intention_reconciliation_errors_total", "stage" => stage).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = stage;
    }
}

/// Record how long a full reconciliation pass took.
pub fn record_pass_duration(duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        histogram!("intention_reconciliation_duration_seconds").record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = duration_secs;
    }
}

/// Errors that can occur during metrics setup.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
