//! Shared test doubles: scripted sinks and store decorators used by the
//! claim-protocol and pipeline suites.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use jsonstore_import::models::{ImportOutcome, VersionToken, VersionedWorkItem, WorkItem};
use jsonstore_import::sink::{BulkSink, SinkError, SinkProvider};
use jsonstore_import::store::{InsertResult, UpdateResult, WorkItemFilter, WorkItemStore};
use jsonstore_import::Result;

/// Sink that records every submitted batch and always succeeds.
#[derive(Default)]
pub struct CollectingSink {
    pub batches: Arc<Mutex<Vec<Vec<String>>>>,
}

#[async_trait]
impl BulkSink for CollectingSink {
    async fn submit_batch(&self, records: &[String]) -> std::result::Result<ImportOutcome, SinkError> {
        self.batches.lock().push(records.to_vec());
        Ok(ImportOutcome {
            docs_received: records.len() as u64,
            docs_imported: records.len() as u64,
            elapsed_seconds: 0,
            consumed_units: records.len() as f64,
            error_messages: vec![],
        })
    }
}

/// Provider handing out [`CollectingSink`]s that share one batch log.
#[derive(Default)]
pub struct CollectingSinkProvider {
    pub batches: Arc<Mutex<Vec<Vec<String>>>>,
    pub creations: AtomicUsize,
}

impl CollectingSinkProvider {
    pub fn collected(&self) -> Vec<Vec<String>> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl SinkProvider for CollectingSinkProvider {
    async fn create(&self) -> Result<Box<dyn BulkSink>> {
        self.creations.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CollectingSink {
            batches: Arc::clone(&self.batches),
        }))
    }
}

/// Sink that drops one record from every `fail_every`-th batch, counting
/// submissions across rebuilds the way a real degraded target would.
pub struct FlakySink {
    state: Arc<FlakyState>,
}

pub struct FlakyState {
    pub fail_every: usize,
    pub submissions: AtomicUsize,
    pub rebuilds: AtomicUsize,
}

#[async_trait]
impl BulkSink for FlakySink {
    async fn submit_batch(&self, records: &[String]) -> std::result::Result<ImportOutcome, SinkError> {
        let n = self.state.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        let received = records.len() as u64;
        if self.state.fail_every > 0 && n % self.state.fail_every == 0 && received > 0 {
            Ok(ImportOutcome {
                docs_received: received,
                docs_imported: received - 1,
                elapsed_seconds: 0,
                consumed_units: 1.0,
                error_messages: vec![format!("write rejected for 1 record in batch {n}")],
            })
        } else {
            Ok(ImportOutcome {
                docs_received: received,
                docs_imported: received,
                elapsed_seconds: 0,
                consumed_units: 1.0,
                error_messages: vec![],
            })
        }
    }
}

/// Provider for [`FlakySink`]; the failure schedule survives sink rebuilds.
pub struct FlakySinkProvider {
    pub state: Arc<FlakyState>,
}

impl FlakySinkProvider {
    pub fn failing_every(fail_every: usize) -> Self {
        Self {
            state: Arc::new(FlakyState {
                fail_every,
                submissions: AtomicUsize::new(0),
                rebuilds: AtomicUsize::new(0),
            }),
        }
    }
}

#[async_trait]
impl SinkProvider for FlakySinkProvider {
    async fn create(&self) -> Result<Box<dyn BulkSink>> {
        self.state.rebuilds.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FlakySink {
            state: Arc::clone(&self.state),
        }))
    }
}

/// Store decorator that reports throttling for the first `remaining`
/// conditional updates, then delegates.
pub struct ThrottlingStore {
    inner: Arc<dyn WorkItemStore>,
    remaining: AtomicUsize,
    pub throttles_served: AtomicUsize,
}

impl ThrottlingStore {
    pub fn new(inner: Arc<dyn WorkItemStore>, throttles: usize) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(throttles),
            throttles_served: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WorkItemStore for ThrottlingStore {
    async fn query(&self, filter: &WorkItemFilter) -> Result<Vec<VersionedWorkItem>> {
        self.inner.query(filter).await
    }

    async fn conditional_update(
        &self,
        item: &WorkItem,
        expected: &VersionToken,
    ) -> Result<UpdateResult> {
        let remaining = self.remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining.store(remaining - 1, Ordering::SeqCst);
            self.throttles_served.fetch_add(1, Ordering::SeqCst);
            return Ok(UpdateResult::Throttled);
        }
        self.inner.conditional_update(item, expected).await
    }

    async fn insert(&self, item: &WorkItem) -> Result<InsertResult> {
        self.inner.insert(item).await
    }
}

/// Store decorator where every conditional update loses its race.
pub struct AlwaysConflictStore {
    inner: Arc<dyn WorkItemStore>,
}

impl AlwaysConflictStore {
    pub fn new(inner: Arc<dyn WorkItemStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl WorkItemStore for AlwaysConflictStore {
    async fn query(&self, filter: &WorkItemFilter) -> Result<Vec<VersionedWorkItem>> {
        self.inner.query(filter).await
    }

    async fn conditional_update(
        &self,
        _item: &WorkItem,
        _expected: &VersionToken,
    ) -> Result<UpdateResult> {
        Ok(UpdateResult::VersionConflict)
    }

    async fn insert(&self, item: &WorkItem) -> Result<InsertResult> {
        self.inner.insert(item).await
    }
}
