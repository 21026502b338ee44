use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::error::DbResult,
    models::{DueIntentionRow, IntentionStatus, RetentionCutoffs, TemplateId},
};

/// Access to the `intentions` table and the per-template side tables.
///
/// Side tables are addressed by [`TemplateId`], which only admits
/// `^[a-z0-9_]+$`, so implementations may interpolate it as an identifier.
#[async_trait]
pub trait IntentionRepo: Send + Sync {
    /// Approved intentions whose `expires_in` is at or before `now`,
    /// oldest first, at most `limit` rows.
    async fn list_due(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<DueIntentionRow>>;

    /// Already-expired intentions that still need work: never notified, or
    /// expired at or before their plan's cutoff. Oldest first, at most
    /// `limit` rows.
    async fn list_expired_actionable(
        &self,
        cutoffs: RetentionCutoffs,
        limit: i64,
    ) -> DbResult<Vec<DueIntentionRow>>;

    /// Set `status` on the intention row, then on its side row.
    async fn update_status(
        &self,
        intention_id: &str,
        template_id: &TemplateId,
        status: IntentionStatus,
    ) -> DbResult<()>;

    /// Raw `form_data` from the side row, if the row exists and the value is non-null.
    async fn get_form_data(
        &self,
        template_id: &TemplateId,
        intention_id: &str,
    ) -> DbResult<Option<String>>;

    /// Record that the expiration notice was delivered.
    async fn mark_notified(&self, intention_id: &str, at: DateTime<Utc>) -> DbResult<()>;

    /// Delete the intention row. Side rows go with it through `ON DELETE CASCADE`.
    ///
    /// Returns [`DbError::NotFound`](crate::db::DbError::NotFound) if no row matched.
    async fn delete(&self, intention_id: &str) -> DbResult<()>;

    /// Add `expiration_notified_at` to `intentions` if it is missing.
    ///
    /// Returns `true` if the column was added by this call.
    async fn ensure_notification_column(&self) -> DbResult<bool>;
}
