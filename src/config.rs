//! # Configuration
//!
//! Layered configuration for the importer: defaults (matching the original
//! deployment's property file), overridden by an optional TOML file,
//! overridden by `JSONSTORE_`-prefixed environment variables
//! (`JSONSTORE__QUEUE__CLAIM_PAGE_SIZE=25` maps to `queue.claim_page_size`).

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{ImportError, Result};
use crate::pipeline::PipelineConfig;
use crate::queue::QueueConfig;
use crate::reader::ReaderConfig;
use crate::sink::postgres::SinkConfig;
use crate::source::http::HttpSourceConfig;
use crate::source::s3::S3SourceConfig;
use crate::source::RecordTransform;

/// Work-item store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store; single-worker runs and tests
    Memory,
    /// Shared PostgreSQL collection; multi-worker deployments
    Postgres,
}

/// Work-item store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: "postgresql://localhost/jsonstore_import".to_string(),
            max_connections: 5,
        }
    }
}

/// Scale-test generator settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScaleTestSettings {
    /// Single-line JSON template replicated into synthetic batches
    pub template_path: String,
    /// Name recorded on scale-test run work items
    pub run_tag: String,
}

impl Default for ScaleTestSettings {
    fn default() -> Self {
        Self {
            template_path: "template.json".to_string(),
            run_tag: "scale-test".to_string(),
        }
    }
}

/// Source backend and record-transformation settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub s3: S3SourceConfig,
    pub http: HttpSourceConfig,
    pub scale_test: ScaleTestSettings,
    /// CSV column holding the JSON document, for partition files produced by
    /// the upstream sorting jobs
    pub json_column_index: Option<usize>,
    pub use_uuid_for_id: bool,
    pub id_field: String,
    pub use_uuid_for_partition_key: bool,
    pub partition_key_field: Option<String>,
}

/// Claim-loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub claim_page_size: usize,
    pub backoff_ms: u64,
    pub max_claim_attempts: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            claim_page_size: 10,
            backoff_ms: 300,
            max_claim_attempts: 10,
        }
    }
}

/// Ingestion pipeline settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    /// Records per streamed chunk
    pub chunk_records: usize,
    /// Chunks buffered ahead of the writer per reader
    pub prefetch_depth: usize,
    /// Polling backoff for reader and pipeline loops
    pub poll_interval_ms: u64,
    /// Batch size for the queue-drain path; `None` submits a whole file at once
    pub bulk_batch_size: Option<usize>,
    /// Partitions processed concurrently per worker process
    pub partitions_limit_for_worker: usize,
    /// Upper bound when probing a partition's file sequence
    pub max_files_per_partition: usize,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            chunk_records: 1000,
            prefetch_depth: 3,
            poll_interval_ms: 300,
            bulk_batch_size: None,
            partitions_limit_for_worker: 2,
            max_files_per_partition: 200,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub store: StoreSettings,
    pub sink: SinkConfig,
    pub source: SourceSettings,
    pub queue: QueueSettings,
    pub ingestion: IngestionSettings,
}

impl ImportConfig {
    /// Load configuration: defaults, then the given TOML file (or
    /// `jsonstore-import.toml` in the working directory when present), then
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name("jsonstore-import").required(false)),
        };
        builder = builder.add_source(
            Environment::with_prefix("JSONSTORE")
                .prefix_separator("__")
                .separator("__"),
        );

        builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| ImportError::configuration(e.to_string()))
    }

    /// Record transform derived from the source settings.
    pub fn transform(&self) -> RecordTransform {
        RecordTransform {
            json_column_index: self.source.json_column_index,
            use_uuid_for_id: self.source.use_uuid_for_id,
            id_field: if self.source.id_field.is_empty() {
                "id".to_string()
            } else {
                self.source.id_field.clone()
            },
            use_uuid_for_partition_key: self.source.use_uuid_for_partition_key,
            partition_key_field: self.source.partition_key_field.clone(),
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            claim_page_size: self.queue.claim_page_size,
            backoff: Duration::from_millis(self.queue.backoff_ms),
            max_claim_attempts: self.queue.max_claim_attempts,
        }
    }

    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            chunk_records: self.ingestion.chunk_records,
            prefetch_depth: self.ingestion.prefetch_depth,
            poll_interval: Duration::from_millis(self.ingestion.poll_interval_ms),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            reader: self.reader_config(),
            poll_interval: Duration::from_millis(self.ingestion.poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_deployment_profile() {
        let config = ImportConfig::default();
        assert_eq!(config.queue.claim_page_size, 10);
        assert_eq!(config.queue.backoff_ms, 300);
        assert_eq!(config.ingestion.prefetch_depth, 3);
        assert_eq!(config.ingestion.partitions_limit_for_worker, 2);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.sink.table, "import_documents");
    }

    #[test]
    fn file_settings_override_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        use std::io::Write;
        write!(
            file,
            r#"
            [queue]
            claim_page_size = 25

            [ingestion]
            prefetch_depth = 5

            [source]
            json_column_index = 2
            "#
        )
        .unwrap();

        let config = ImportConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.queue.claim_page_size, 25);
        assert_eq!(config.ingestion.prefetch_depth, 5);
        assert_eq!(config.transform().json_column_index, Some(2));
        // Untouched sections keep defaults.
        assert_eq!(config.queue.backoff_ms, 300);
    }

    #[test]
    fn transform_falls_back_to_the_id_field() {
        let mut config = ImportConfig::default();
        config.source.use_uuid_for_id = true;
        assert_eq!(config.transform().id_field, "id");
    }
}
