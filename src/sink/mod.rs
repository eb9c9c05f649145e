//! # Bulk-Write Sink
//!
//! Boundary to the batched-write service that persists records into the
//! target store. The sink owns its internal retry/throttling; callers only
//! see the per-batch [`ImportOutcome`] and two fault classes:
//!
//! - a **degraded outcome** (`is_error()`): some records were not persisted.
//!   The pipeline records it and rebuilds the sink handle — covering
//!   topology changes (e.g. a shard split) that invalidate the handle's
//!   routing state.
//! - a [`SinkError`]: the submission failed wholesale; the caller records a
//!   failed outcome and likewise rebuilds.
//!
//! Within a worker process the sink connection is a singleton reused across
//! partitions ([`SharedSink`]); rebuild is synchronous and blocks the
//! pipeline that requested it while other pipelines keep submitting.

pub mod postgres;

pub use postgres::{PostgresSink, PostgresSinkProvider};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::models::ImportOutcome;

/// Submission faults below the outcome level.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The target's topology changed underneath this handle; discard it and
    /// build a fresh one.
    #[error("sink topology changed: {0}")]
    TopologyChanged(String),

    #[error("sink fault: {0}")]
    Fault(String),
}

/// Batched-write handle into the target store.
#[async_trait]
pub trait BulkSink: Send + Sync {
    /// Submit one batch. Partial failures are reported inside the outcome,
    /// not as errors.
    async fn submit_batch(&self, records: &[String]) -> Result<ImportOutcome, SinkError>;
}

/// Builds fresh sink handles; used to discard and reconstruct the sink after
/// degraded batches.
#[async_trait]
pub trait SinkProvider: Send + Sync {
    async fn create(&self) -> crate::error::Result<Box<dyn BulkSink>>;
}

/// Process-wide sink singleton. Initialized lazily on first submission and
/// shared by every pipeline in the worker; [`SharedSink::rebuild`] swaps in
/// a fresh handle while in-flight submissions finish against the old one.
pub struct SharedSink {
    provider: Arc<dyn SinkProvider>,
    current: RwLock<Option<Arc<dyn BulkSink>>>,
}

impl SharedSink {
    pub fn new(provider: Arc<dyn SinkProvider>) -> Self {
        Self {
            provider,
            current: RwLock::new(None),
        }
    }

    async fn handle(&self) -> Result<Arc<dyn BulkSink>, SinkError> {
        if let Some(sink) = self.current.read().await.as_ref() {
            return Ok(Arc::clone(sink));
        }
        let mut slot = self.current.write().await;
        // Another pipeline may have initialized while we waited.
        if let Some(sink) = slot.as_ref() {
            return Ok(Arc::clone(sink));
        }
        info!("initiating bulk sink");
        let sink: Arc<dyn BulkSink> = Arc::from(
            self.provider
                .create()
                .await
                .map_err(|e| SinkError::Fault(e.to_string()))?,
        );
        *slot = Some(Arc::clone(&sink));
        Ok(sink)
    }

    /// Submit one batch through the current handle.
    pub async fn submit_batch(&self, records: &[String]) -> Result<ImportOutcome, SinkError> {
        self.handle().await?.submit_batch(records).await
    }

    /// Tear the current handle down and build a fresh one. Blocks the
    /// caller until the rebuild finishes; a rebuild failure keeps the stale
    /// handle so the next degraded batch tries again.
    pub async fn rebuild(&self) {
        info!("closing bulk sink and re-initiating");
        let mut slot = self.current.write().await;
        match self.provider.create().await {
            Ok(fresh) => *slot = Some(Arc::from(fresh)),
            Err(e) => error!(error = %e, "re-initializing bulk sink failed"),
        }
    }
}
