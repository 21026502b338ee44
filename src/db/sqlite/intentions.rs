use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::IntentionRepo,
    },
    models::{DueIntentionRow, IntentionStatus, RetentionCutoffs, TemplateId},
};

/// Timestamps are stored as RFC 3339 text with millisecond precision, the
/// same shape the approval flow writes, so string comparison orders them.
///
/// Only UTC values with a `Z` suffix are supported in `expires_in`. A stored
/// offset such as `-03:00` still parses when read back but compares and
/// sorts as text, so it is selected at the wrong instant.
fn to_db_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub struct SqliteIntentionRepo {
    pool: SqlitePool,
}

impl SqliteIntentionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_due(row: &SqliteRow) -> DbResult<DueIntentionRow> {
        Ok(DueIntentionRow {
            intention_id: row.try_get("intention_id")?,
            email: row.try_get("email")?,
            plan: row.try_get("plan")?,
            template_id: row.try_get("template_id")?,
            expires_in: row.try_get("expires_in")?,
            expiration_notified_at: row.try_get("expiration_notified_at")?,
            qr_code: row.try_get("qr_code")?,
        })
    }
}

#[async_trait]
impl IntentionRepo for SqliteIntentionRepo {
    async fn list_due(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<DueIntentionRow>> {
        if limit < 1 {
            return Err(DbError::Validation(format!(
                "limit must be positive, got {limit}"
            )));
        }

        // Text comparison; see `to_db_timestamp` for the UTC-only constraint.
        let rows = sqlx::query(
            r#"
            SELECT intention_id, email, plan, template_id, expires_in, expiration_notified_at, qr_code
            FROM intentions
            WHERE status = 'approved' AND expires_in IS NOT NULL AND expires_in <= ?
            ORDER BY expires_in ASC
            LIMIT ?
            "#,
        )
        .bind(to_db_timestamp(now))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_due).collect()
    }

    async fn list_expired_actionable(
        &self,
        cutoffs: RetentionCutoffs,
        limit: i64,
    ) -> DbResult<Vec<DueIntentionRow>> {
        if limit < 1 {
            return Err(DbError::Validation(format!(
                "limit must be positive, got {limit}"
            )));
        }

        let rows = sqlx::query(
            r#"
            SELECT intention_id, email, plan, template_id, expires_in, expiration_notified_at, qr_code
            FROM intentions
            WHERE status = 'expired' AND expires_in IS NOT NULL
              AND (
                expiration_notified_at IS NULL
                OR (LOWER(TRIM(COALESCE(plan, ''))) = 'premium' AND expires_in <= ?)
                OR (LOWER(TRIM(COALESCE(plan, ''))) <> 'premium' AND expires_in <= ?)
              )
            ORDER BY expires_in ASC
            LIMIT ?
            "#,
        )
        .bind(to_db_timestamp(cutoffs.premium_before))
        .bind(to_db_timestamp(cutoffs.standard_before))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_due).collect()
    }

    async fn update_status(
        &self,
        intention_id: &str,
        template_id: &TemplateId,
        status: IntentionStatus,
    ) -> DbResult<()> {
        sqlx::query("UPDATE intentions SET status = ? WHERE intention_id = ?")
            .bind(status.as_str())
            .bind(intention_id)
            .execute(&self.pool)
            .await?;

        let query = format!(
            r#"UPDATE "{}" SET status = ? WHERE intention_id = ?"#,
            template_id.table_name()
        );
        sqlx::query(&query)
            .bind(status.as_str())
            .bind(intention_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_form_data(
        &self,
        template_id: &TemplateId,
        intention_id: &str,
    ) -> DbResult<Option<String>> {
        let query = format!(
            r#"SELECT form_data FROM "{}" WHERE intention_id = ? LIMIT 1"#,
            template_id.table_name()
        );
        let row = sqlx::query(&query)
            .bind(intention_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get::<Option<String>, _>("form_data")?),
            None => Ok(None),
        }
    }

    async fn mark_notified(&self, intention_id: &str, at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE intentions SET expiration_notified_at = ? WHERE intention_id = ?")
            .bind(to_db_timestamp(at))
            .bind(intention_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, intention_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM intentions WHERE intention_id = ?")
            .bind(intention_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn ensure_notification_column(&self) -> DbResult<bool> {
        let probe = sqlx::query("SELECT expiration_notified_at FROM intentions LIMIT 1")
            .fetch_optional(&self.pool)
            .await;
        if probe.is_ok() {
            return Ok(false);
        }

        tracing::info!("Adding expiration_notified_at column to intentions");
        match sqlx::query("ALTER TABLE intentions ADD COLUMN expiration_notified_at TEXT")
            .execute(&self.pool)
            .await
            .map_err(DbError::from)
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_duplicate_column() => {
                tracing::warn!(error = %e, "expiration_notified_at column already exists");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
