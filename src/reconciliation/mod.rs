//! Reconciliation of expired intentions.
//!
//! A pass selects approved intentions whose expiration is due, plus expired
//! ones still awaiting a notice or past their retention period, and runs each
//! one through a fixed sequence of steps:
//!
//! 1. validate the row
//! 2. mark the intention and its side row `expired`
//! 3. read the side row's `form_data`
//! 4. notify the owner, once
//! 5. stop unless the plan's retention period has fully elapsed
//! 6. delete every referenced blob, then the intention row
//!
//! Records are independent. A failure in one is logged and counted, never
//! propagated to the others or to the caller.

mod assets;
mod worker;

use std::{sync::Arc, time::Instant};

pub use assets::{collect_storage_keys, find_asset_urls, storage_key_from_public_url};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};
use tracing::{Instrument, debug, error, info, info_span, warn};
pub use worker::{run_once, start_reconciliation_worker};

use crate::{
    config::{NotificationRetryConfig, ReconciliationConfig},
    db::{DbError, DbResult, IntentionRepo},
    models::{DueIntentionRow, Intention, IntentionStatus},
    notifier::{ExpirationNotice, Notifier, send_with_retry},
    observability::metrics,
    services::BlobStorage,
};

/// How a single record's pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The row failed validation and was not touched.
    Invalid,
    /// A store call failed; the record is retried next pass.
    Aborted,
    /// Expired, but still inside its retention period.
    Retained,
    /// Blobs and row deleted.
    Deleted,
    /// At least one blob deletion failed, so the row was kept.
    DeletionPartial,
    /// Eligible for deletion, skipped because of dry run.
    WouldDelete,
}

impl RecordOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Invalid => "invalid",
            RecordOutcome::Aborted => "aborted",
            RecordOutcome::Retained => "retained",
            RecordOutcome::Deleted => "deleted",
            RecordOutcome::DeletionPartial => "deletion_partial",
            RecordOutcome::WouldDelete => "would_delete",
        }
    }
}

/// What happened to the owner notification for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationResult {
    /// `expiration_notified_at` was already set.
    AlreadyNotified,
    Sent,
    Failed,
    /// No notifier configured.
    Skipped,
}

impl NotificationResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationResult::AlreadyNotified => "already_notified",
            NotificationResult::Sent => "sent",
            NotificationResult::Failed => "failed",
            NotificationResult::Skipped => "skipped",
        }
    }
}

/// Result of reconciling one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordReport {
    pub outcome: RecordOutcome,
    /// `None` when the record never reached the notification step.
    pub notification: Option<NotificationResult>,
}

impl RecordReport {
    fn stopped(outcome: RecordOutcome) -> Self {
        Self {
            outcome,
            notification: None,
        }
    }
}

/// Counters for one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Due records picked up by the pass.
    pub processed: u64,
    pub invalid: u64,
    pub aborted: u64,
    pub notified: u64,
    pub notify_failed: u64,
    pub retained: u64,
    pub deleted: u64,
    pub deletion_partial: u64,
    pub would_delete: u64,
}

impl RunSummary {
    fn record(&mut self, report: RecordReport) {
        self.processed += 1;
        match report.outcome {
            RecordOutcome::Invalid => self.invalid += 1,
            RecordOutcome::Aborted => self.aborted += 1,
            RecordOutcome::Retained => self.retained += 1,
            RecordOutcome::Deleted => self.deleted += 1,
            RecordOutcome::DeletionPartial => self.deletion_partial += 1,
            RecordOutcome::WouldDelete => self.would_delete += 1,
        }
        match report.notification {
            Some(NotificationResult::Sent) => self.notified += 1,
            Some(NotificationResult::Failed) => self.notify_failed += 1,
            _ => {}
        }
    }

    fn merge(&mut self, other: RunSummary) {
        self.processed += other.processed;
        self.invalid += other.invalid;
        self.aborted += other.aborted;
        self.notified += other.notified;
        self.notify_failed += other.notify_failed;
        self.retained += other.retained;
        self.deleted += other.deleted;
        self.deletion_partial += other.deletion_partial;
        self.would_delete += other.would_delete;
    }

    /// Whether the pass changed or attempted to change anything worth an info log.
    pub fn has_activity(&self) -> bool {
        self.processed > 0
    }
}

/// Runs reconciliation passes against a store, a blob backend and an
/// optional notifier.
pub struct Reconciler {
    repo: Arc<dyn IntentionRepo>,
    blobs: Arc<dyn BlobStorage>,
    notifier: Option<Arc<dyn Notifier>>,
    config: ReconciliationConfig,
    retry: NotificationRetryConfig,
}

impl Reconciler {
    pub fn new(
        repo: Arc<dyn IntentionRepo>,
        blobs: Arc<dyn BlobStorage>,
        notifier: Option<Arc<dyn Notifier>>,
        config: ReconciliationConfig,
        retry: NotificationRetryConfig,
    ) -> Self {
        Self {
            repo,
            blobs,
            notifier,
            config,
            retry,
        }
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Run one pass as of `now`.
    ///
    /// Only a failure to list due records is returned; everything that goes
    /// wrong with an individual record is reflected in the summary.
    pub async fn run_at(self: &Arc<Self>, now: DateTime<Utc>) -> DbResult<RunSummary> {
        let started = Instant::now();

        match self.repo.ensure_notification_column().await {
            Ok(true) => info!("Added expiration_notified_at column to intentions"),
            Ok(false) => {}
            Err(e) => {
                metrics::record_stage_error("ensure_schema");
                warn!(error = %e, "Could not ensure expiration_notified_at column, continuing");
            }
        }

        let limit = i64::from(self.config.batch_size);
        let mut rows = self
            .repo
            .list_due(now, limit)
            .await
            .inspect_err(|_| metrics::record_stage_error("list_due"))?;

        // Expired rows come back until they are notified and erased. They share
        // the batch with due rows, which go first.
        let remaining = limit - rows.len() as i64;
        if remaining > 0 {
            match self
                .repo
                .list_expired_actionable(self.config.retention.cutoffs(now), remaining)
                .await
            {
                Ok(expired) => rows.extend(expired),
                Err(e) => {
                    metrics::record_stage_error("list_expired");
                    warn!(error = %e, "Could not list expired intentions, continuing with due ones");
                }
            }
        }

        if rows.is_empty() {
            debug!("No intentions to reconcile");
            metrics::record_pass_duration(started.elapsed().as_secs_f64());
            return Ok(RunSummary::default());
        }

        let total = rows.len();
        let (tx, rx) = mpsc::channel::<DueIntentionRow>(total);
        for row in rows {
            // Capacity equals the batch length and the receiver is alive.
            if tx.send(row).await.is_err() {
                break;
            }
        }
        drop(tx);

        let rx = Arc::new(Mutex::new(rx));
        let workers = self.config.concurrency.clamp(1, total);
        debug!(due = total, workers, "Dispatching due intentions");

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let this = Arc::clone(self);
            let rx = Arc::clone(&rx);
            set.spawn(
                async move {
                    let mut partial = RunSummary::default();
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(row) = next else { break };
                        partial.record(this.reconcile_record(row, now).await);
                    }
                    partial
                }
                .instrument(info_span!("reconcile_worker", worker_id)),
            );
        }

        let mut summary = RunSummary::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(partial) => summary.merge(partial),
                Err(e) => {
                    metrics::record_stage_error("worker");
                    error!(error = %e, "Reconciliation worker task failed");
                }
            }
        }

        metrics::record_pass_duration(started.elapsed().as_secs_f64());
        Ok(summary)
    }

    /// Run one record through every step, returning how far it got.
    pub async fn reconcile_record(&self, row: DueIntentionRow, now: DateTime<Utc>) -> RecordReport {
        let raw_id = row.intention_id.clone().unwrap_or_default();
        let intention = match Intention::try_from(row) {
            Ok(intention) => intention,
            Err(e) => {
                warn!(intention_id = %raw_id, error = %e, "Skipping invalid intention");
                metrics::record_outcome(RecordOutcome::Invalid.as_str());
                return RecordReport::stopped(RecordOutcome::Invalid);
            }
        };

        let span = info_span!(
            "reconcile_intention",
            intention_id = %intention.id,
            template_id = %intention.template_id,
            plan = intention.plan.as_str(),
        );
        let report = self.reconcile_valid(&intention, now).instrument(span).await;
        metrics::record_outcome(report.outcome.as_str());
        if let Some(notification) = report.notification {
            metrics::record_notification(notification.as_str());
        }
        report
    }

    async fn reconcile_valid(&self, intention: &Intention, now: DateTime<Utc>) -> RecordReport {
        if let Err(e) = self
            .repo
            .update_status(&intention.id, &intention.template_id, IntentionStatus::Expired)
            .await
        {
            metrics::record_stage_error("update_status");
            error!(error = %e, "Failed to mark intention expired");
            return RecordReport::stopped(RecordOutcome::Aborted);
        }

        let form_data = match self
            .repo
            .get_form_data(&intention.template_id, &intention.id)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                metrics::record_stage_error("get_form_data");
                error!(error = %e, "Failed to read form data");
                return RecordReport::stopped(RecordOutcome::Aborted);
            }
        };

        let notification = self.notify(intention).await;
        let report = |outcome| RecordReport {
            outcome,
            notification: Some(notification),
        };

        let days = intention.days_since_expiration(now);
        if !self.config.retention.is_eligible(intention.plan, days) {
            debug!(
                days_since_expiration = days,
                threshold_days = self.config.retention.days_for(intention.plan),
                "Retention period not reached, keeping intention"
            );
            return report(RecordOutcome::Retained);
        }

        let document = form_data.as_deref().and_then(|raw| {
            serde_json::from_str::<Value>(raw)
                .inspect_err(|e| warn!(error = %e, "Unparseable form_data, no assets extracted"))
                .ok()
        });
        let keys = collect_storage_keys(document.as_ref(), intention.qr_code.as_deref());

        if self.config.dry_run {
            info!(
                days_since_expiration = days,
                keys = ?keys,
                "DRY RUN: Would delete intention and its blobs"
            );
            return report(RecordOutcome::WouldDelete);
        }

        report(self.delete_intention(intention, &keys).await)
    }

    async fn notify(&self, intention: &Intention) -> NotificationResult {
        if intention.is_notified() {
            return NotificationResult::AlreadyNotified;
        }
        let Some(notifier) = &self.notifier else {
            info!("Notifications disabled, skipping expiration notice");
            return NotificationResult::Skipped;
        };

        let notice = ExpirationNotice {
            intention_id: intention.id.clone(),
            recipient: intention.email.clone(),
            plan: intention.plan,
            template_id: intention.template_id.as_str().to_string(),
            expires_at: intention.expires_at,
        };

        match send_with_retry(notifier.as_ref(), &self.retry, &notice).await {
            Ok(()) => {
                info!(notifier = notifier.name(), "Expiration notice sent");
                if let Err(e) = self.repo.mark_notified(&intention.id, Utc::now()).await {
                    metrics::record_stage_error("mark_notified");
                    error!(error = %e, "Notice sent but expiration_notified_at was not saved");
                }
                NotificationResult::Sent
            }
            Err(e) => {
                warn!(error = %e, "Failed to send expiration notice, will retry next pass");
                NotificationResult::Failed
            }
        }
    }

    async fn delete_intention(&self, intention: &Intention, keys: &[String]) -> RecordOutcome {
        let results = join_all(keys.iter().map(|key| async move {
            let result = self.blobs.delete(key).await;
            match &result {
                Ok(()) => debug!(key = %key, "Deleted blob"),
                Err(e) => error!(key = %key, error = %e, "Failed to delete blob"),
            }
            result.is_ok()
        }))
        .await;

        let failed = results.iter().filter(|ok| !**ok).count() as u64;
        let succeeded = results.len() as u64 - failed;
        metrics::record_blob_deletions(succeeded, failed);

        if failed > 0 {
            warn!(
                failed,
                total = keys.len(),
                "Keeping intention because some blobs could not be deleted"
            );
            return RecordOutcome::DeletionPartial;
        }

        match self.repo.delete(&intention.id).await {
            Ok(()) => {
                info!(blobs = keys.len(), "Intention deleted");
                RecordOutcome::Deleted
            }
            Err(DbError::NotFound) => {
                debug!("Intention row already gone");
                RecordOutcome::Deleted
            }
            Err(e) => {
                metrics::record_stage_error("delete");
                error!(error = %e, "Failed to delete intention row");
                RecordOutcome::Aborted
            }
        }
    }
}
