//! Durable backend over Postgres, the first link of the fallback chain.
//!
//! Per-domain schemas are out of scope here (the `judge` tool's score
//! breakdown, pattern structure, etc. are owned by callers); this backend
//! stores every domain's records in one generic table keyed by
//! `(domain, id)` with a `jsonb` payload, grounded on the teacher's
//! `r2e-data-sqlx` migration idiom.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::backend::{Backend, BackendKind};
use crate::error::DataError;

const CONNECT_ATTEMPTS: u32 = 2;
const CONNECT_BACKOFF: Duration = Duration::from_secs(3);

const MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS toolhost_records (
    domain TEXT NOT NULL,
    id TEXT NOT NULL,
    value JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (domain, id)
)
"#;

pub struct DurableBackend {
    pool: PgPool,
}

impl DurableBackend {
    /// Attempts to connect with up to [`CONNECT_ATTEMPTS`] tries and a fixed
    /// backoff between them. The manager treats any error here as "durable
    /// unavailable" and continues down the fallback chain; it is logged,
    /// never fatal.
    pub async fn connect(url: &str) -> Result<Self, DataError> {
        let mut last_err = None;
        for attempt in 1..=CONNECT_ATTEMPTS {
            match PgPoolOptions::new().max_connections(5).connect(url).await {
                Ok(pool) => {
                    sqlx::query(MIGRATION).execute(&pool).await.map_err(DataError::backend)?;
                    return Ok(Self { pool });
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "durable store connection attempt failed");
                    last_err = Some(err);
                    if attempt < CONNECT_ATTEMPTS {
                        tokio::time::sleep(CONNECT_BACKOFF).await;
                    }
                }
            }
        }
        Err(DataError::backend(last_err.expect("loop runs at least once")))
    }
}

#[async_trait]
impl Backend for DurableBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Durable
    }

    async fn get(&self, domain: &str, id: &str) -> Result<Option<Value>, DataError> {
        let row = sqlx::query("SELECT value FROM toolhost_records WHERE domain = $1 AND id = $2")
            .bind(domain)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| {
                tracing::error!(domain, id, error = %err, "durable get failed");
                DataError::backend(err)
            })?;
        Ok(row.map(|row| row.get::<Value, _>("value")))
    }

    async fn list(&self, domain: &str) -> Result<Vec<Value>, DataError> {
        let rows = sqlx::query("SELECT value FROM toolhost_records WHERE domain = $1")
            .bind(domain)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| {
                tracing::error!(domain, error = %err, "durable list failed");
                DataError::backend(err)
            })?;
        Ok(rows.into_iter().map(|row| row.get::<Value, _>("value")).collect())
    }

    async fn save(&self, domain: &str, id: &str, value: Value) -> Result<Value, DataError> {
        sqlx::query(
            "INSERT INTO toolhost_records (domain, id, value, updated_at) VALUES ($1, $2, $3, now())
             ON CONFLICT (domain, id) DO UPDATE SET value = excluded.value, updated_at = now()",
        )
        .bind(domain)
        .bind(id)
        .bind(&value)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            tracing::error!(domain, id, error = %err, "durable save failed");
            DataError::backend(err)
        })?;
        Ok(value)
    }

    async fn delete(&self, domain: &str, id: &str) -> Result<bool, DataError> {
        let result = sqlx::query("DELETE FROM toolhost_records WHERE domain = $1 AND id = $2")
            .bind(domain)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                tracing::error!(domain, id, error = %err, "durable delete failed");
                DataError::backend(err)
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, domain: &str) -> Result<u64, DataError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM toolhost_records WHERE domain = $1")
            .bind(domain)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| {
                tracing::error!(domain, error = %err, "durable count failed");
                DataError::backend(err)
            })?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
