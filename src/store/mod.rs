//! # WorkItem Store
//!
//! Thin conditional-read/write/query façade over the shared work-item
//! collection. This is the single source of truth for claim safety: the
//! queue's "at most one claim" guarantee rests entirely on
//! [`WorkItemStore::conditional_update`] refusing a write whose version token
//! is stale.
//!
//! Expected contention outcomes are typed results ([`UpdateResult`],
//! [`InsertResult`]); only genuine faults travel through `Err`.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Operation, VersionToken, VersionedWorkItem, WorkItem};

/// Filter for open work items (`is_in_progress = false`, `is_complete =
/// false` is implied — completed or claimed records are never candidates).
/// The store guarantees no ordering over the returned page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkItemFilter {
    pub operation: Option<Operation>,
    pub partition_id: Option<String>,
    pub limit: Option<usize>,
}

impl WorkItemFilter {
    /// Match any open work item.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn with_partition(mut self, partition_id: impl Into<String>) -> Self {
        self.partition_id = Some(partition_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Outcome of a conditional update.
#[derive(Debug)]
pub enum UpdateResult {
    /// The write applied; carries the record with its fresh version token.
    Applied(VersionedWorkItem),
    /// The presented token was stale — another worker won the race.
    VersionConflict,
    /// The store signalled rate-limit backpressure; back off and retry.
    Throttled,
}

/// Outcome of an insert.
#[derive(Debug)]
pub enum InsertResult {
    Inserted(VersionedWorkItem),
    /// A record with the same id already exists (idempotent enqueue).
    DuplicateKey,
}

/// Conditional-write document collection holding [`WorkItem`] records.
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    /// Query open work items matching the filter. No ordering guarantee.
    async fn query(&self, filter: &WorkItemFilter) -> Result<Vec<VersionedWorkItem>>;

    /// Replace a record if and only if its current version matches
    /// `expected`. The record's `id` addresses it.
    async fn conditional_update(
        &self,
        item: &WorkItem,
        expected: &VersionToken,
    ) -> Result<UpdateResult>;

    /// Insert a new record; duplicate ids surface as
    /// [`InsertResult::DuplicateKey`], never as errors.
    async fn insert(&self, item: &WorkItem) -> Result<InsertResult>;
}
