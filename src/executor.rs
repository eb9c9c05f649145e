//! # Import Executor
//!
//! Wires the queue, coordinator, readers, and sink into the operations the
//! CLI exposes: folder enqueueing, single-file import, unpartitioned queue
//! draining, concurrent partition import, and the scale-test loop.
//!
//! One executor is built per worker process with explicitly constructed
//! collaborators — no process-wide singletons except the bulk sink, which is
//! deliberately one shared connection reused across partitions and rebuilt
//! through its provider on detected faults.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{ImportConfig, StoreBackend};
use crate::coordinator::PartitionCoordinator;
use crate::error::{ImportError, Result};
use crate::models::{ImportOutcome, Operation, StoreType, VersionedWorkItem, WorkItem};
use crate::pipeline::PartitionPipeline;
use crate::queue::WorkQueue;
use crate::sink::{PostgresSinkProvider, SharedSink, SinkError, SinkProvider};
use crate::source::{
    read_all_records, HttpStore, LocalStore, S3Store, ScaleTestSource, SourceStore,
};
use crate::store::{MemoryStore, PostgresStore, WorkItemFilter, WorkItemStore};

/// Top-level operation driver for one worker process.
pub struct ImportExecutor {
    config: ImportConfig,
    store: Arc<dyn WorkItemStore>,
    queue: Arc<WorkQueue>,
    sink: Arc<SharedSink>,
    cancel: CancellationToken,
}

/// Worker identity recorded as claim owner: pid plus a per-process nonce.
fn worker_identity() -> String {
    format!("worker-{}-{}", std::process::id(), Uuid::new_v4())
}

impl ImportExecutor {
    /// Build an executor from configuration, connecting the configured
    /// work-item store backend and the bulk sink provider.
    pub async fn new(config: ImportConfig, cancel: CancellationToken) -> Result<Self> {
        let store: Arc<dyn WorkItemStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Postgres => Arc::new(
                PostgresStore::connect(&config.store.database_url, config.store.max_connections)
                    .await?,
            ),
        };
        let provider = Arc::new(PostgresSinkProvider::new(config.sink.clone())?);
        Ok(Self::with_parts(config, store, provider, cancel))
    }

    /// Build an executor over injected collaborators. Tests plug in memory
    /// stores and scripted sinks here.
    pub fn with_parts(
        config: ImportConfig,
        store: Arc<dyn WorkItemStore>,
        provider: Arc<dyn SinkProvider>,
        cancel: CancellationToken,
    ) -> Self {
        let queue = Arc::new(WorkQueue::with_config(
            Arc::clone(&store),
            worker_identity(),
            config.queue_config(),
        ));
        Self {
            config,
            store,
            queue,
            sink: Arc::new(SharedSink::new(provider)),
            cancel,
        }
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    fn source_for(&self, store_type: StoreType) -> Result<Arc<dyn SourceStore>> {
        match store_type {
            StoreType::Local => Ok(Arc::new(LocalStore::new())),
            StoreType::S3 => Ok(Arc::new(S3Store::connect(&self.config.source.s3)?)),
            StoreType::Http => Ok(Arc::new(HttpStore::connect(&self.config.source.http)?)),
            other => Err(ImportError::UnsupportedSource(format!(
                "{other} is not a listable byte source"
            ))),
        }
    }

    async fn scale_test_source(&self) -> Result<ScaleTestSource> {
        ScaleTestSource::from_template_file(
            &self.config.source.scale_test.template_path,
            self.config.ingestion.chunk_records,
            self.config.ingestion.prefetch_depth,
            self.config.transform(),
        )
        .await
    }

    /// Read a work item's records in one pass (the non-streaming paths).
    async fn read_records(&self, item: &WorkItem) -> Result<Vec<String>> {
        match item.store_type {
            StoreType::ScaleTest | StoreType::PartitionTest => {
                self.scale_test_source().await?.next_batch()
            }
            StoreType::DocStore => Err(ImportError::UnsupportedSource(
                "doc-store items are drained from the queue, not read as files".into(),
            )),
            _ => {
                let source = self.source_for(item.store_type)?;
                read_all_records(source.as_ref(), &item.location, &self.config.transform()).await
            }
        }
    }

    /// Enqueue every file under a source folder; with `partitioned`, treat
    /// entries as partition folders and enqueue their files as ordered
    /// partition members.
    #[instrument(skip(self))]
    pub async fn enqueue_folder(
        &self,
        store_type: StoreType,
        folder: &str,
        partitioned: bool,
    ) -> Result<usize> {
        let source = self.source_for(store_type)?;
        if partitioned {
            self.queue
                .enqueue_folder_by_partition(source.as_ref(), store_type, folder)
                .await
        } else {
            self.queue
                .enqueue_folder(source.as_ref(), store_type, folder, Operation::UnpartitionedWrite)
                .await
        }
    }

    /// Import a single location straight into the sink, without queue
    /// tracking.
    #[instrument(skip(self))]
    pub async fn import_location(
        &self,
        store_type: StoreType,
        location: &str,
    ) -> Result<ImportOutcome> {
        let item = WorkItem::new(location, store_type, Operation::UnpartitionedWrite);
        let records = self.read_records(&item).await?;
        let outcome = self.submit_in_batches(&records).await;
        info!(
            received = outcome.docs_received,
            imported = outcome.docs_imported,
            "single-location import finished"
        );
        Ok(outcome)
    }

    /// Drain unpartitioned queue items: while the current item's records are
    /// written, the next item is already being claimed and read in the
    /// background.
    #[instrument(skip(self))]
    pub async fn drain_queue(&self) -> Result<()> {
        let filter = WorkItemFilter::open().with_operation(Operation::UnpartitionedWrite);
        let Some(first) = self.queue.claim_next(&filter).await? else {
            info!("work queue is empty, please add items");
            return Ok(());
        };
        let records = self.read_records(&first.item).await?;
        let mut current: (VersionedWorkItem, Vec<String>) = (first, records);

        loop {
            if self.cancel.is_cancelled() {
                warn!("queue drain cancelled");
                return Ok(());
            }

            // Overlap: claim and read the next item while writing this one.
            let next_handle = tokio::spawn(claim_and_read(
                Arc::clone(&self.queue),
                self.config.clone(),
                filter.clone(),
            ));

            let (claim, records) = &current;
            debug!(name = %claim.item.name, "writing documents for work item");
            let outcome = self.submit_in_batches(records).await;
            self.queue.complete(claim, outcome).await?;

            match next_handle.await {
                Ok(Ok(Some(next))) => current = next,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(ImportError::store("drain", format!("reader task: {e}"))),
            }
        }
        info!("queue drain finished");
        Ok(())
    }

    /// Claim up to the configured number of partitions and run one ingestion
    /// pipeline per claim concurrently, all feeding the shared sink.
    #[instrument(skip(self))]
    pub async fn run_partition_import(&self) -> Result<()> {
        let coordinator = PartitionCoordinator::new(
            self.queue(),
            self.config.ingestion.max_files_per_partition,
        );
        let partitions = coordinator
            .claim_partitions(self.config.ingestion.partitions_limit_for_worker)
            .await?;
        if partitions.is_empty() {
            info!("no partitions available to claim");
            return Ok(());
        }

        let mut handles = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let source = match self.source_for(partition.claim.item.store_type) {
                Ok(source) => source,
                Err(e) => {
                    error!(
                        partition_id = %partition.partition_id,
                        error = %e,
                        "cannot build source for partition, skipping"
                    );
                    continue;
                }
            };
            let pipeline = PartitionPipeline::new(
                self.queue(),
                source,
                Arc::clone(&self.sink),
                self.config.transform(),
                self.config.pipeline_config(),
                self.cancel.child_token(),
            );
            let partition_id = partition.partition_id.clone();
            handles.push((
                partition_id,
                tokio::spawn(async move { pipeline.run(&partition).await }),
            ));
        }

        let (partition_ids, joins): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        for (partition_id, joined) in partition_ids.into_iter().zip(join_all(joins).await) {
            match joined {
                Ok(Ok(outcome)) => info!(
                    partition_id = %partition_id,
                    received = outcome.docs_received,
                    imported = outcome.docs_imported,
                    degraded = outcome.is_error(),
                    "partition pipeline finished"
                ),
                Ok(Err(e)) => error!(partition_id = %partition_id, error = %e, "partition pipeline failed"),
                Err(e) => error!(partition_id = %partition_id, error = %e, "partition pipeline panicked"),
            }
        }
        Ok(())
    }

    /// Scale-test loop: bulk-write precooked synthetic batches until
    /// cancelled, recording one completed work item per run.
    #[instrument(skip(self))]
    pub async fn run_scale_test(&self) -> Result<()> {
        let source = Arc::new(self.scale_test_source().await?);
        let precook = source.spawn_precook(self.cancel.child_token());
        let run_tag = self.config.source.scale_test.run_tag.clone();

        let mut run = 1u64;
        while !self.cancel.is_cancelled() {
            info!(run, "initiating scale-test import");
            let batch = source.next_batch()?;
            let outcome = self.submit_in_batches(&batch).await;

            let mut record = WorkItem::new(
                format!("run {run}"),
                StoreType::ScaleTest,
                Operation::UnpartitionedWrite,
            )
            .with_id(Uuid::new_v4().to_string())
            .with_name(&run_tag);
            record.owner = Some(self.queue.owner().to_string());
            record.is_complete = true;
            record.completed_at = Some(chrono::Utc::now());
            record.import_outcome = Some(outcome);
            self.store.insert(&record).await?;

            run += 1;
        }
        precook.abort();
        info!(runs = run - 1, "scale test stopped");
        Ok(())
    }

    /// Submit records in batches through the shared sink, recording
    /// outcomes. A degraded or failed batch forces a sink rebuild and skips
    /// the item's remaining batches.
    async fn submit_in_batches(&self, records: &[String]) -> ImportOutcome {
        let batch_size = self
            .config
            .ingestion
            .bulk_batch_size
            .unwrap_or(records.len())
            .max(1);

        let mut outcomes = Vec::new();
        for batch in records.chunks(batch_size) {
            let (outcome, degraded) = match self.sink.submit_batch(batch).await {
                Ok(outcome) => {
                    let degraded = outcome.is_error();
                    (outcome, degraded)
                }
                Err(SinkError::TopologyChanged(message)) | Err(SinkError::Fault(message)) => {
                    error!(error = %message, "bulk submission failed");
                    (ImportOutcome::failed(batch.len() as u64, message), true)
                }
            };
            outcomes.push(outcome);
            if degraded {
                self.sink.rebuild().await;
                break;
            }
        }
        ImportOutcome::aggregate(&outcomes)
    }
}

/// Background half of the queue-drain overlap: claim the next item and read
/// it fully.
async fn claim_and_read(
    queue: Arc<WorkQueue>,
    config: ImportConfig,
    filter: WorkItemFilter,
) -> Result<Option<(VersionedWorkItem, Vec<String>)>> {
    let Some(claim) = queue.claim_next(&filter).await? else {
        return Ok(None);
    };
    let source: Arc<dyn SourceStore> = match claim.item.store_type {
        StoreType::Local => Arc::new(LocalStore::new()),
        StoreType::S3 => Arc::new(S3Store::connect(&config.source.s3)?),
        StoreType::Http => Arc::new(HttpStore::connect(&config.source.http)?),
        other => {
            return Err(ImportError::UnsupportedSource(format!(
                "{other} items cannot be drained as files"
            )))
        }
    };
    let records = read_all_records(source.as_ref(), &claim.item.location, &config.transform()).await?;
    Ok(Some((claim, records)))
}
