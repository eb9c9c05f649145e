//! PostgreSQL-backed [`WorkItemStore`].
//!
//! Records are stored as JSONB payloads keyed by the WorkItem id, with a
//! bigint `version` column standing in for the document collection's opaque
//! version token. The conditional update compiles to
//! `UPDATE ... WHERE id = $1 AND version = $2`, so a stale token updates zero
//! rows and surfaces as [`UpdateResult::VersionConflict`]. Pool exhaustion is
//! reported as [`UpdateResult::Throttled`] — the claim loop's backoff covers
//! it the same way it covers a rate-limited collection.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::error::{ImportError, Result};
use crate::models::{VersionToken, VersionedWorkItem, WorkItem};
use crate::store::{InsertResult, UpdateResult, WorkItemFilter, WorkItemStore};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS import_work_items (
        id      TEXT PRIMARY KEY,
        version BIGINT NOT NULL DEFAULT 1,
        payload JSONB NOT NULL
    )
"#;

/// Work-item collection in a shared PostgreSQL database.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and bootstrap the work-item table if it does not exist yet.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| ImportError::store("connect", e.to_string()))?;
        Self::with_pool(pool).await
    }

    /// Bootstrap against an existing pool.
    pub async fn with_pool(pool: PgPool) -> Result<Self> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| ImportError::store("bootstrap", e.to_string()))?;
        info!("work-item store ready");
        Ok(Self { pool })
    }

    fn decode(payload: serde_json::Value, version: i64) -> Result<VersionedWorkItem> {
        let item: WorkItem = serde_json::from_value(payload)
            .map_err(|e| ImportError::serialization(format!("work item payload: {e}")))?;
        Ok(VersionedWorkItem {
            item,
            version: VersionToken(version.to_string()),
        })
    }

    fn parse_token(expected: &VersionToken) -> Result<i64> {
        expected
            .0
            .parse::<i64>()
            .map_err(|_| ImportError::store("conditional_update", "malformed version token"))
    }
}

#[async_trait]
impl WorkItemStore for PostgresStore {
    async fn query(&self, filter: &WorkItemFilter) -> Result<Vec<VersionedWorkItem>> {
        let limit = filter.limit.map_or(i64::MAX, |l| l as i64);
        let operation = filter.operation.map(|op| op.as_str().to_string());

        let rows = sqlx::query(
            r#"
            SELECT payload, version FROM import_work_items
            WHERE (payload->>'isInProgress')::boolean = false
              AND (payload->>'isComplete')::boolean = false
              AND ($1::text IS NULL OR payload->>'operation' = $1)
              AND ($2::text IS NULL OR payload->>'partitionId' = $2)
            LIMIT $3
            "#,
        )
        .bind(operation)
        .bind(filter.partition_id.clone())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ImportError::store("query", e.to_string()))?;

        debug!(candidates = rows.len(), "queried open work items");
        rows.into_iter()
            .map(|row| {
                let payload: serde_json::Value = row
                    .try_get("payload")
                    .map_err(|e| ImportError::store("query", e.to_string()))?;
                let version: i64 = row
                    .try_get("version")
                    .map_err(|e| ImportError::store("query", e.to_string()))?;
                Self::decode(payload, version)
            })
            .collect()
    }

    async fn conditional_update(
        &self,
        item: &WorkItem,
        expected: &VersionToken,
    ) -> Result<UpdateResult> {
        let expected_version = Self::parse_token(expected)?;
        let payload = serde_json::to_value(item)
            .map_err(|e| ImportError::serialization(e.to_string()))?;

        let updated = sqlx::query(
            r#"
            UPDATE import_work_items SET payload = $3, version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(&item.id)
        .bind(expected_version)
        .bind(payload)
        .fetch_optional(&self.pool)
        .await;

        match updated {
            Ok(Some(row)) => {
                let version: i64 = row
                    .try_get("version")
                    .map_err(|e| ImportError::store("conditional_update", e.to_string()))?;
                Ok(UpdateResult::Applied(VersionedWorkItem {
                    item: item.clone(),
                    version: VersionToken(version.to_string()),
                }))
            }
            Ok(None) => Ok(UpdateResult::VersionConflict),
            Err(sqlx::Error::PoolTimedOut) => Ok(UpdateResult::Throttled),
            Err(e) => Err(ImportError::store("conditional_update", e.to_string())),
        }
    }

    async fn insert(&self, item: &WorkItem) -> Result<InsertResult> {
        let payload = serde_json::to_value(item)
            .map_err(|e| ImportError::serialization(e.to_string()))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO import_work_items (id, version, payload) VALUES ($1, 1, $2)
            ON CONFLICT (id) DO NOTHING
            RETURNING version
            "#,
        )
        .bind(&item.id)
        .bind(payload)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ImportError::store("insert", e.to_string()))?;

        match inserted {
            Some(row) => {
                let version: i64 = row
                    .try_get("version")
                    .map_err(|e| ImportError::store("insert", e.to_string()))?;
                Ok(InsertResult::Inserted(VersionedWorkItem {
                    item: item.clone(),
                    version: VersionToken(version.to_string()),
                }))
            }
            None => Ok(InsertResult::DuplicateKey),
        }
    }
}
