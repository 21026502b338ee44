//! Long-lived reconciliation loop and single-pass entry point.

use std::sync::Arc;

use chrono::Utc;

use super::{Reconciler, RunSummary};

/// Starts the reconciliation worker.
///
/// Runs a pass every `interval_secs` until the task is cancelled. A failed
/// pass is logged and the loop keeps going.
pub async fn start_reconciliation_worker(reconciler: Arc<Reconciler>) {
    let config = reconciler.config();
    if !config.enabled {
        tracing::info!("Reconciliation worker disabled by configuration");
        return;
    }

    let dry_run_msg = if config.dry_run { " (DRY RUN)" } else { "" };
    tracing::info!(
        interval_secs = config.interval_secs,
        batch_size = config.batch_size,
        concurrency = config.concurrency,
        premium_days = config.retention.premium_days,
        standard_days = config.retention.standard_days,
        dry_run = config.dry_run,
        "Starting reconciliation worker{}",
        dry_run_msg
    );

    let interval = config.interval();
    loop {
        run_once(&reconciler).await;
        tokio::time::sleep(interval).await;
    }
}

/// Run a single pass now and log its summary.
///
/// Returns `None` if the pass could not start (the due query failed).
pub async fn run_once(reconciler: &Arc<Reconciler>) -> Option<RunSummary> {
    match reconciler.run_at(Utc::now()).await {
        Ok(summary) => {
            if summary.has_activity() {
                tracing::info!(
                    processed = summary.processed,
                    invalid = summary.invalid,
                    aborted = summary.aborted,
                    notified = summary.notified,
                    notify_failed = summary.notify_failed,
                    retained = summary.retained,
                    deleted = summary.deleted,
                    deletion_partial = summary.deletion_partial,
                    would_delete = summary.would_delete,
                    "Reconciliation pass complete"
                );
            } else {
                tracing::debug!("Reconciliation pass complete, nothing due");
            }
            Some(summary)
        }
        Err(e) => {
            tracing::error!(error = %e, "Error running reconciliation pass");
            None
        }
    }
}
