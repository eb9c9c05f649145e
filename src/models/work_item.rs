//! # WorkItem Model
//!
//! The persisted record representing one unit of importable work — a source
//! file or a whole partition — stored in the shared work-item collection.
//!
//! ## Identity-based Deduplication
//!
//! A WorkItem's `id` is a SHA-256 hash of its source location, so enqueueing
//! the same location twice hits the store's uniqueness constraint and is
//! treated as already-queued rather than as an error.
//!
//! ## Claim Lifecycle
//!
//! `queued → claimed (is_in_progress) → completed (is_complete)`. Exactly one
//! worker may hold `is_in_progress = true` for an item at any instant; this is
//! enforced by the store's conditional-write semantics, never by in-memory
//! locking. `partition_id`, `location`, `store_type` and `operation` are
//! immutable after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::ImportOutcome;

/// Storage backend a WorkItem's source bytes live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreType {
    /// Local filesystem path
    Local,
    /// S3-compatible object store
    S3,
    /// HTTP blob store (listing via a JSON index document)
    Http,
    /// The shared document collection itself (queue-driven ingestion)
    DocStore,
    /// Synthetic records replicated from a template (scale testing)
    ScaleTest,
    /// Synthetic records consumed from the precooked partition-test queue
    PartitionTest,
}

impl StoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreType::Local => "local",
            StoreType::S3 => "s3",
            StoreType::Http => "http",
            StoreType::DocStore => "doc-store",
            StoreType::ScaleTest => "scale-test",
            StoreType::PartitionTest => "partition-test",
        }
    }
}

impl std::str::FromStr for StoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(StoreType::Local),
            "s3" => Ok(StoreType::S3),
            "http" => Ok(StoreType::Http),
            "doc-store" | "docstore" => Ok(StoreType::DocStore),
            "scale-test" | "scaletest" => Ok(StoreType::ScaleTest),
            "partition-test" | "partitiontest" => Ok(StoreType::PartitionTest),
            other => Err(format!("unknown store type: {other}")),
        }
    }
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of write a WorkItem represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// A standalone file with no ordering requirements
    UnpartitionedWrite,
    /// A whole partition; claiming it grants its file items
    PartitionedWrite,
    /// One file belonging to a partition's ordered sequence
    PartitionFileWrite,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::UnpartitionedWrite => "unpartitioned-write",
            Operation::PartitionedWrite => "partitioned-write",
            Operation::PartitionFileWrite => "partition-file-write",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of importable work, persisted in the shared collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: String,
    pub name: String,
    pub location: String,
    pub store_type: StoreType,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_id: Option<String>,
    pub is_in_progress: bool,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_outcome: Option<ImportOutcome>,
}

impl WorkItem {
    /// Create a queued WorkItem for a source location. The id is derived
    /// from the location so repeated enqueues deduplicate in the store.
    pub fn new(location: impl Into<String>, store_type: StoreType, operation: Operation) -> Self {
        let location = location.into();
        Self {
            id: Self::identity_hash(&location),
            name: location.clone(),
            location,
            store_type,
            operation,
            partition_id: None,
            is_in_progress: false,
            is_complete: false,
            owner: None,
            created_at: Utc::now(),
            completed_at: None,
            import_outcome: None,
        }
    }

    /// Attach a partition id (builder style, used at enqueue time only).
    pub fn with_partition(mut self, partition_id: impl Into<String>) -> Self {
        self.partition_id = Some(partition_id.into());
        self
    }

    /// Override the derived id. Scale-test run records are identified by a
    /// random UUID instead of a location hash, one record per run.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Override the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// SHA-256 identity hash of a source location.
    pub fn identity_hash(location: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(location.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Opaque version token supplied by the store with every read. Conditional
/// updates must present the token read at claim time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionToken(pub String);

impl VersionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A WorkItem paired with the version token it was read at. Claims are
/// versioned items whose `is_in_progress` flag this worker flipped.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedWorkItem {
    pub item: WorkItem,
    pub version: VersionToken,
}
