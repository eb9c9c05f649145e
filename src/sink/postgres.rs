//! PostgreSQL bulk sink.
//!
//! Persists JSON documents into a JSONB table with one multi-row insert per
//! batch. Records that fail to parse are counted against the outcome rather
//! than failing the batch; connection-level faults surface as
//! [`SinkError::TopologyChanged`] so the pipeline rebuilds the handle.

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{ImportError, Result};
use crate::models::ImportOutcome;
use crate::sink::{BulkSink, SinkError, SinkProvider};

/// Connection settings for the bulk sink.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub database_url: String,
    pub table: String,
    pub max_connections: u32,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/jsonstore_import".to_string(),
            table: "import_documents".to_string(),
            max_connections: 10,
        }
    }
}

fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ImportError::configuration(format!(
            "invalid sink table name: {table}"
        )))
    }
}

/// Bulk-write handle over a PostgreSQL JSONB table.
pub struct PostgresSink {
    pool: PgPool,
    insert_sql: String,
}

impl PostgresSink {
    pub async fn connect(config: &SinkConfig) -> Result<Self> {
        validate_table_name(&config.table)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| ImportError::sink(format!("connect: {e}")))?;

        let schema = format!(
            "CREATE TABLE IF NOT EXISTS {} (id BIGSERIAL PRIMARY KEY, doc JSONB NOT NULL)",
            config.table
        );
        sqlx::query(&schema)
            .execute(&pool)
            .await
            .map_err(|e| ImportError::sink(format!("bootstrap: {e}")))?;

        info!(table = %config.table, "bulk sink ready");
        Ok(Self {
            pool,
            insert_sql: format!(
                "INSERT INTO {} (doc) SELECT value FROM jsonb_array_elements($1::jsonb)",
                config.table
            ),
        })
    }
}

#[async_trait]
impl BulkSink for PostgresSink {
    async fn submit_batch(&self, records: &[String]) -> std::result::Result<ImportOutcome, SinkError> {
        let started = Instant::now();
        let received = records.len() as u64;

        let mut docs = Vec::with_capacity(records.len());
        let mut error_messages = Vec::new();
        let mut payload_bytes = 0usize;
        for record in records {
            match serde_json::from_str::<serde_json::Value>(record) {
                Ok(doc) => {
                    payload_bytes += record.len();
                    docs.push(doc);
                }
                Err(e) => error_messages.push(format!("unparsable record: {e}")),
            }
        }

        let imported = if docs.is_empty() {
            0
        } else {
            let batch = serde_json::Value::Array(docs);
            match sqlx::query(&self.insert_sql)
                .bind(batch)
                .execute(&self.pool)
                .await
            {
                Ok(result) => result.rows_affected(),
                Err(sqlx::Error::Io(e)) => {
                    return Err(SinkError::TopologyChanged(e.to_string()));
                }
                Err(sqlx::Error::PoolClosed) => {
                    return Err(SinkError::TopologyChanged("connection pool closed".into()));
                }
                Err(e) => {
                    // Statement-level failure: nothing from this batch landed.
                    error_messages.push(e.to_string());
                    0
                }
            }
        };

        let outcome = ImportOutcome {
            docs_received: received,
            docs_imported: imported,
            elapsed_seconds: started.elapsed().as_secs(),
            consumed_units: payload_bytes as f64 / 1024.0,
            error_messages,
        };
        debug!(
            received = outcome.docs_received,
            imported = outcome.docs_imported,
            units = outcome.consumed_units,
            "batch submitted"
        );
        Ok(outcome)
    }
}

/// Builds fresh [`PostgresSink`] handles with their own connection pools.
pub struct PostgresSinkProvider {
    config: SinkConfig,
}

impl PostgresSinkProvider {
    pub fn new(config: SinkConfig) -> Result<Self> {
        validate_table_name(&config.table)?;
        Ok(Self { config })
    }
}

#[async_trait]
impl SinkProvider for PostgresSinkProvider {
    async fn create(&self) -> Result<Box<dyn BulkSink>> {
        info!("initiating bulk sink");
        Ok(Box::new(PostgresSink::connect(&self.config).await?))
    }
}
