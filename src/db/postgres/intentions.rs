use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::IntentionRepo,
    },
    models::{DueIntentionRow, IntentionStatus, RetentionCutoffs, TemplateId},
};

pub struct PostgresIntentionRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresIntentionRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn row_to_due(row: &PgRow) -> DbResult<DueIntentionRow> {
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
impl IntentionRepo for PostgresIntentionRepo {
    async fn list_due(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<DueIntentionRow>> {
        if limit < 1 {
            return Err(DbError::Validation(format!(
                "limit must be positive, got {limit}"
            )));
        }

        // Timestamps come back as text and are parsed during validation,
        // so a malformed row is skipped instead of failing the whole scan.
        let rows = sqlx::query(
            r#"
            SELECT intention_id::TEXT AS intention_id,
                   email,
                   plan,
                   template_id,
                   expires_in::TEXT AS expires_in,
                   expiration_notified_at::TEXT AS expiration_notified_at,
                   qr_code
            FROM intentions
            WHERE status = 'approved' AND expires_in IS NOT NULL AND expires_in <= $1
            ORDER BY expires_in ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.read_pool)
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
            SELECT intention_id::TEXT AS intention_id,
                   email,
                   plan,
                   template_id,
                   expires_in::TEXT AS expires_in,
                   expiration_notified_at::TEXT AS expiration_notified_at,
                   qr_code
            FROM intentions
            WHERE status = 'expired' AND expires_in IS NOT NULL
              AND (
                expiration_notified_at IS NULL
                OR (LOWER(TRIM(COALESCE(plan, ''))) = 'premium' AND expires_in <= $1)
                OR (LOWER(TRIM(COALESCE(plan, ''))) <> 'premium' AND expires_in <= $2)
              )
            ORDER BY expires_in ASC
            LIMIT $3
            "#,
        )
        .bind(cutoffs.premium_before)
        .bind(cutoffs.standard_before)
        .bind(limit)
        .fetch_all(&self.read_pool)
        .await?;

        rows.iter().map(Self::row_to_due).collect()
    }

    async fn update_status(
        &self,
        intention_id: &str,
        template_id: &TemplateId,
        status: IntentionStatus,
    ) -> DbResult<()> {
        sqlx::query("UPDATE intentions SET status = $1 WHERE intention_id::TEXT = $2")
            .bind(status.as_str())
            .bind(intention_id)
            .execute(&self.write_pool)
            .await?;

        let query = format!(
            r#"UPDATE "{}" SET status = $1 WHERE intention_id::TEXT = $2"#,
            template_id.table_name()
        );
        sqlx::query(&query)
            .bind(status.as_str())
            .bind(intention_id)
            .execute(&self.write_pool)
            .await?;

        Ok(())
    }

    async fn get_form_data(
        &self,
        template_id: &TemplateId,
        intention_id: &str,
    ) -> DbResult<Option<String>> {
        let query = format!(
            r#"SELECT form_data::TEXT AS form_data FROM "{}" WHERE intention_id::TEXT = $1 LIMIT 1"#,
            template_id.table_name()
        );
        // Read from the primary: the status update above must be visible.
        let row = sqlx::query(&query)
            .bind(intention_id)
            .fetch_optional(&self.write_pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get::<Option<String>, _>("form_data")?),
            None => Ok(None),
        }
    }

    async fn mark_notified(&self, intention_id: &str, at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE intentions SET expiration_notified_at = $1 WHERE intention_id::TEXT = $2")
            .bind(at)
            .bind(intention_id)
            .execute(&self.write_pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, intention_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM intentions WHERE intention_id::TEXT = $1")
            .bind(intention_id)
            .execute(&self.write_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn ensure_notification_column(&self) -> DbResult<bool> {
        let probe = sqlx::query("SELECT expiration_notified_at FROM intentions LIMIT 1")
            .fetch_optional(&self.write_pool)
            .await;
        if probe.is_ok() {
            return Ok(false);
        }

        tracing::info!("Adding expiration_notified_at column to intentions");
        match sqlx::query("ALTER TABLE intentions ADD COLUMN expiration_notified_at TIMESTAMPTZ")
            .execute(&self.write_pool)
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
