//! # Partition Ingestion Pipeline
//!
//! Drives one claimed partition's ordered file list through the bulk sink
//! with two-deep read-ahead: while the current file's chunks are being
//! written, the next file is already being read and parsed in the
//! background. Memory stays bounded to at most two files' worth of prefetch
//! buffer, and the write path is never idle waiting on file I/O once steady
//! state is reached.
//!
//! Fault handling: a degraded or failed batch is recorded in the per-file
//! outcome and forces a synchronous rebuild of the shared sink (the sink's
//! own reconnect/recovery), then processing continues — the pipeline never
//! retries a batch locally and never rolls back a partially imported file.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::coordinator::ClaimedPartition;
use crate::error::Result;
use crate::models::ImportOutcome;
use crate::queue::WorkQueue;
use crate::reader::{ReaderConfig, StreamingReader};
use crate::sink::{SharedSink, SinkError};
use crate::source::{RecordTransform, SourceStore};

/// Tuning for one partition pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub reader: ReaderConfig,
    /// Sleep between polls when the current reader has nothing ready
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reader: ReaderConfig::default(),
            poll_interval: Duration::from_millis(300),
        }
    }
}

/// Streams a claimed partition's files into the bulk sink in sequence order.
pub struct PartitionPipeline {
    queue: Arc<WorkQueue>,
    source: Arc<dyn SourceStore>,
    sink: Arc<SharedSink>,
    transform: RecordTransform,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl PartitionPipeline {
    pub fn new(
        queue: Arc<WorkQueue>,
        source: Arc<dyn SourceStore>,
        sink: Arc<SharedSink>,
        transform: RecordTransform,
        config: PipelineConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            source,
            sink,
            transform,
            config,
            cancel,
        }
    }

    fn start_reader(&self, location: &str) -> StreamingReader {
        StreamingReader::spawn(
            Arc::clone(&self.source),
            location,
            self.transform.clone(),
            self.config.reader.clone(),
            self.cancel.child_token(),
        )
    }

    /// Run the partition to completion. Returns the partition-level
    /// aggregate outcome (partial if cancelled mid-flight).
    #[instrument(skip(self, partition), fields(partition_id = %partition.partition_id))]
    pub async fn run(&self, partition: &ClaimedPartition) -> Result<ImportOutcome> {
        let files = &partition.files;
        if files.is_empty() {
            info!("partition has no file items");
            return Ok(ImportOutcome::default());
        }
        info!(files = files.len(), "starting partition ingestion");

        let mut current = self.start_reader(&files[0].item.location);
        // Read-ahead: the second file loads while the first one is written.
        let mut next = files
            .get(1)
            .map(|file| self.start_reader(&file.item.location));

        let mut partition_outcomes = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let mut file_outcomes = Vec::new();

            while !current.is_done() {
                if self.cancel.is_cancelled() {
                    warn!("partition ingestion cancelled");
                    return Ok(ImportOutcome::aggregate(&partition_outcomes));
                }
                match current.take() {
                    Some(chunk) if !chunk.is_empty() => {
                        self.submit(&chunk, &mut file_outcomes).await;
                    }
                    _ => tokio::time::sleep(self.config.poll_interval).await,
                }
            }

            let aggregate = ImportOutcome::aggregate(&file_outcomes);
            info!(
                file = %file.item.name,
                received = aggregate.docs_received,
                imported = aggregate.docs_imported,
                units = aggregate.consumed_units,
                "file ingestion finished"
            );
            if let Err(e) = self.queue.complete(file, aggregate.clone()).await {
                error!(file = %file.item.name, error = %e, "failed to record file completion");
            }
            partition_outcomes.push(aggregate);

            current = match next.take() {
                Some(reader) => reader,
                None => break,
            };
            if let Some(upcoming) = files.get(index + 2) {
                next = Some(self.start_reader(&upcoming.item.location));
            }
        }

        let total = ImportOutcome::aggregate(&partition_outcomes);
        info!(
            received = total.docs_received,
            imported = total.docs_imported,
            errors = total.error_messages.len(),
            "partition ingestion finished"
        );
        Ok(total)
    }

    /// Submit one chunk, record its outcome, and rebuild the sink when the
    /// submission came back degraded or failed.
    async fn submit(&self, chunk: &[String], file_outcomes: &mut Vec<ImportOutcome>) {
        debug!(records = chunk.len(), "received data, starting bulk import");
        match self.sink.submit_batch(chunk).await {
            Ok(outcome) => {
                let degraded = outcome.is_error();
                file_outcomes.push(outcome);
                if degraded {
                    warn!("batch came back degraded");
                    self.sink.rebuild().await;
                }
            }
            Err(SinkError::TopologyChanged(message)) => {
                warn!(error = %message, "sink topology changed mid-batch");
                file_outcomes.push(ImportOutcome::failed(chunk.len() as u64, message));
                self.sink.rebuild().await;
            }
            Err(SinkError::Fault(message)) => {
                error!(error = %message, "bulk submission failed");
                file_outcomes.push(ImportOutcome::failed(chunk.len() as u64, message));
                self.sink.rebuild().await;
            }
        }
    }
}
