//! Test harness for database repository testing
//!
//! The `intentions` table and the template side tables belong to the main
//! application, so there are no migrations here. The harness recreates the
//! subset of that schema this crate touches:
//! - SQLite: Fast in-memory databases
//! - PostgreSQL: Testcontainers-based instances

use async_trait::async_trait;

/// Template side tables created by the harness.
pub const SIDE_TABLES: &[&str] = &["nossa_historia", "carta_aberta"];

/// An intention row to insert before a test.
#[derive(Debug, Clone)]
pub struct SeedIntention {
    pub id: String,
    pub email: String,
    pub plan: String,
    pub template_id: String,
    pub status: String,
    pub expires_in: Option<String>,
    pub qr_code: Option<String>,
}

impl SeedIntention {
    pub fn approved(id: &str, template_id: &str, expires_in: &str) -> Self {
        Self {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            plan: "standard".to_string(),
            template_id: template_id.to_string(),
            status: "approved".to_string(),
            expires_in: Some(expires_in.to_string()),
            qr_code: None,
        }
    }

    pub fn plan(mut self, plan: &str) -> Self {
        self.plan = plan.to_string();
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn qr_code(mut self, url: &str) -> Self {
        self.qr_code = Some(url.to_string());
        self
    }
}

/// Dialect-specific fixture access used by the shared tests.
#[async_trait]
pub trait IntentionFixtures: Send + Sync {
    async fn insert_intention(&self, seed: &SeedIntention);
    async fn insert_side_row(&self, table: &str, intention_id: &str, form_data: Option<&str>);
    async fn set_notified_at(&self, intention_id: &str, at: &str);
    async fn intention_status(&self, intention_id: &str) -> Option<String>;
    async fn side_status(&self, table: &str, intention_id: &str) -> Option<String>;
    async fn notified_at(&self, intention_id: &str) -> Option<String>;
    async fn side_row_exists(&self, table: &str, intention_id: &str) -> bool;

    async fn intention_exists(&self, intention_id: &str) -> bool {
        self.intention_status(intention_id).await.is_some()
    }
}

#[cfg(feature = "database-sqlite")]
pub use self::sqlite::*;

#[cfg(feature = "database-sqlite")]
mod sqlite {
    use async_trait::async_trait;
    use sqlx::{Row, SqlitePool};

    use super::{IntentionFixtures, SIDE_TABLES, SeedIntention};

    /// Create an in-memory SQLite pool for testing
    pub async fn create_sqlite_pool() -> SqlitePool {
        sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    /// Create the intentions schema.
    ///
    /// `with_notification_column = false` reproduces databases created before
    /// `expiration_notified_at` existed.
    pub async fn create_sqlite_schema(pool: &SqlitePool, with_notification_column: bool) {
        let notified = if with_notification_column {
            ", expiration_notified_at TEXT"
        } else {
            ""
        };
        sqlx::raw_sql(&format!(
            r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE intentions (
                intention_id TEXT PRIMARY KEY,
                email TEXT,
                plan TEXT,
                template_id TEXT,
                status TEXT NOT NULL DEFAULT 'approved',
                expires_in TEXT,
                qr_code TEXT{notified}
            );
            "#
        ))
        .execute(pool)
        .await
        .expect("Failed to create intentions table");

        for table in SIDE_TABLES {
            sqlx::raw_sql(&format!(
                r#"
                CREATE TABLE "{table}" (
                    intention_id TEXT PRIMARY KEY
                        REFERENCES intentions(intention_id) ON DELETE CASCADE,
                    form_data TEXT,
                    status TEXT NOT NULL DEFAULT 'approved'
                );
                "#
            ))
            .execute(pool)
            .await
            .expect("Failed to create side table");
        }
    }

    pub struct SqliteFixtures {
        pool: SqlitePool,
    }

    impl SqliteFixtures {
        pub fn new(pool: SqlitePool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl IntentionFixtures for SqliteFixtures {
        async fn insert_intention(&self, seed: &SeedIntention) {
            sqlx::query(
                r#"
                INSERT INTO intentions (intention_id, email, plan, template_id, status, expires_in, qr_code)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&seed.id)
            .bind(&seed.email)
            .bind(&seed.plan)
            .bind(&seed.template_id)
            .bind(&seed.status)
            .bind(&seed.expires_in)
            .bind(&seed.qr_code)
            .execute(&self.pool)
            .await
            .expect("Failed to insert intention");
        }

        async fn insert_side_row(&self, table: &str, intention_id: &str, form_data: Option<&str>) {
            sqlx::query(&format!(
                r#"INSERT INTO "{table}" (intention_id, form_data) VALUES (?, ?)"#
            ))
            .bind(intention_id)
            .bind(form_data)
            .execute(&self.pool)
            .await
            .expect("Failed to insert side row");
        }

        async fn set_notified_at(&self, intention_id: &str, at: &str) {
            sqlx::query("UPDATE intentions SET expiration_notified_at = ? WHERE intention_id = ?")
                .bind(at)
                .bind(intention_id)
                .execute(&self.pool)
                .await
                .expect("Failed to set expiration_notified_at");
        }

        async fn intention_status(&self, intention_id: &str) -> Option<String> {
            sqlx::query("SELECT status FROM intentions WHERE intention_id = ?")
                .bind(intention_id)
                .fetch_optional(&self.pool)
                .await
                .expect("Failed to read intention status")
                .map(|row| row.get("status"))
        }

        async fn side_status(&self, table: &str, intention_id: &str) -> Option<String> {
            sqlx::query(&format!(
                r#"SELECT status FROM "{table}" WHERE intention_id = ?"#
            ))
            .bind(intention_id)
            .fetch_optional(&self.pool)
            .await
            .expect("Failed to read side status")
            .map(|row| row.get("status"))
        }

        async fn notified_at(&self, intention_id: &str) -> Option<String> {
            sqlx::query("SELECT expiration_notified_at FROM intentions WHERE intention_id = ?")
                .bind(intention_id)
                .fetch_optional(&self.pool)
                .await
                .expect("Failed to read expiration_notified_at")
                .and_then(|row| row.get::<Option<String>, _>("expiration_notified_at"))
        }

        async fn side_row_exists(&self, table: &str, intention_id: &str) -> bool {
            sqlx::query(&format!(
                r#"SELECT 1 FROM "{table}" WHERE intention_id = ?"#
            ))
            .bind(intention_id)
            .fetch_optional(&self.pool)
            .await
            .expect("Failed to read side row")
            .is_some()
        }
    }
}

/// PostgreSQL test harness using testcontainers
#[cfg(all(test, feature = "database-postgres"))]
pub mod postgres {
    use std::sync::OnceLock;

    use async_trait::async_trait;
    use sqlx::{PgPool, Row};
    use testcontainers_modules::{
        postgres::Postgres,
        testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner},
    };
    use tokio::sync::OnceCell;

    use super::{IntentionFixtures, SIDE_TABLES, SeedIntention};

    /// Shared container state - initialized once per test run
    struct SharedContainer {
        #[allow(dead_code)] // Test infrastructure: keeps container alive
        container: ContainerAsync<Postgres>,
        connection_string: String,
    }

    /// Global shared container - lazily initialized on first use
    static SHARED_CONTAINER: OnceLock<OnceCell<SharedContainer>> = OnceLock::new();

    async fn get_shared_container() -> &'static SharedContainer {
        let cell = SHARED_CONTAINER.get_or_init(OnceCell::new);
        cell.get_or_init(|| async {
            let container = Postgres::default()
                .with_tag("18-alpine")
                .start()
                .await
                .expect("Failed to start PostgreSQL container");

            let host = container.get_host().await.expect("Failed to get host");
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("Failed to get port");

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            SharedContainer {
                container,
                connection_string,
            }
        })
        .await
    }

    /// Create an isolated schema for a single test inside the shared container.
    pub async fn create_isolated_postgres_pool() -> PgPool {
        let shared = get_shared_container().await;

        let admin_pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&shared.connection_string)
            .await
            .expect("Failed to connect to PostgreSQL");

        let schema_name = format!("test_{}", uuid::Uuid::new_v4().simple());

        sqlx::query(&format!("CREATE SCHEMA \"{}\"", schema_name))
            .execute(&admin_pool)
            .await
            .expect("Failed to create test schema");

        let isolated_url = format!(
            "{}?options=-c search_path={}",
            shared.connection_string, schema_name
        );

        sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&isolated_url)
            .await
            .expect("Failed to connect to isolated schema")
    }

    /// Create the intentions schema in the pool's search path.
    pub async fn create_postgres_schema(pool: &PgPool, with_notification_column: bool) {
        let notified = if with_notification_column {
            ", expiration_notified_at TIMESTAMPTZ"
        } else {
            ""
        };
        sqlx::raw_sql(&format!(
            r#"
            CREATE TABLE intentions (
                intention_id TEXT PRIMARY KEY,
                email TEXT,
                plan TEXT,
                template_id TEXT,
                status TEXT NOT NULL DEFAULT 'approved',
                expires_in TIMESTAMPTZ,
                qr_code TEXT{notified}
            );
            "#
        ))
        .execute(pool)
        .await
        .expect("Failed to create intentions table");

        for table in SIDE_TABLES {
            sqlx::raw_sql(&format!(
                r#"
                CREATE TABLE "{table}" (
                    intention_id TEXT PRIMARY KEY
                        REFERENCES intentions(intention_id) ON DELETE CASCADE,
                    form_data JSONB,
                    status TEXT NOT NULL DEFAULT 'approved'
                );
                "#
            ))
            .execute(pool)
            .await
            .expect("Failed to create side table");
        }
    }

    pub struct PostgresFixtures {
        pool: PgPool,
    }

    impl PostgresFixtures {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl IntentionFixtures for PostgresFixtures {
        async fn insert_intention(&self, seed: &SeedIntention) {
            sqlx::query(
                r#"
                INSERT INTO intentions (intention_id, email, plan, template_id, status, expires_in, qr_code)
                VALUES ($1, $2, $3, $4, $5, $6::TIMESTAMPTZ, $7)
                "#,
            )
            .bind(&seed.id)
            .bind(&seed.email)
            .bind(&seed.plan)
            .bind(&seed.template_id)
            .bind(&seed.status)
            .bind(&seed.expires_in)
            .bind(&seed.qr_code)
            .execute(&self.pool)
            .await
            .expect("Failed to insert intention");
        }

        async fn insert_side_row(&self, table: &str, intention_id: &str, form_data: Option<&str>) {
            sqlx::query(&format!(
                r#"INSERT INTO "{table}" (intention_id, form_data) VALUES ($1, $2::JSONB)"#
            ))
            .bind(intention_id)
            .bind(form_data)
            .execute(&self.pool)
            .await
            .expect("Failed to insert side row");
        }

        async fn set_notified_at(&self, intention_id: &str, at: &str) {
            sqlx::query(
                "UPDATE intentions SET expiration_notified_at = $1::TIMESTAMPTZ WHERE intention_id = $2",
            )
            .bind(at)
            .bind(intention_id)
            .execute(&self.pool)
            .await
            .expect("Failed to set expiration_notified_at");
        }

        async fn intention_status(&self, intention_id: &str) -> Option<String> {
            sqlx::query("SELECT status FROM intentions WHERE intention_id = $1")
                .bind(intention_id)
                .fetch_optional(&self.pool)
                .await
                .expect("Failed to read intention status")
                .map(|row| row.get("status"))
        }

        async fn side_status(&self, table: &str, intention_id: &str) -> Option<String> {
            sqlx::query(&format!(
                r#"SELECT status FROM "{table}" WHERE intention_id = $1"#
            ))
            .bind(intention_id)
            .fetch_optional(&self.pool)
            .await
            .expect("Failed to read side status")
            .map(|row| row.get("status"))
        }

        async fn notified_at(&self, intention_id: &str) -> Option<String> {
            sqlx::query(
                "SELECT expiration_notified_at::TEXT AS notified FROM intentions WHERE intention_id = $1",
            )
            .bind(intention_id)
            .fetch_optional(&self.pool)
            .await
            .expect("Failed to read expiration_notified_at")
            .and_then(|row| row.get::<Option<String>, _>("notified"))
        }

        async fn side_row_exists(&self, table: &str, intention_id: &str) -> bool {
            sqlx::query(&format!(
                r#"SELECT 1 FROM "{table}" WHERE intention_id = $1"#
            ))
            .bind(intention_id)
            .fetch_optional(&self.pool)
            .await
            .expect("Failed to read side row")
            .is_some()
        }
    }
}
