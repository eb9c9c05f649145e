//! # Streaming Reader
//!
//! Decouples record production (parsing a source file) from record
//! consumption (submission to the bulk sink) so that file-read latency never
//! stalls the write path.
//!
//! The reader runs as an independent background task against a bounded
//! lock-free queue of pre-parsed record chunks. The producer checks capacity
//! before reading the next chunk and sleeps briefly when the buffer is full;
//! the consumer's [`StreamingReader::take`] is non-blocking and returns
//! `None` when nothing is ready. Both sides are polling backoffs, not
//! condition-variable waits — claim and chunk rates are low relative to the
//! backoff granularity.
//!
//! Line-level parse failures are logged and skipped; the reader degrades
//! gracefully rather than aborting on the first malformed record.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::queue::ArrayQueue;
use tokio::io::AsyncBufReadExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::source::{RecordTransform, SourceStore};

/// Tuning for one streaming reader.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Records per chunk handed to the sink
    pub chunk_records: usize,
    /// Chunks buffered ahead of the consumer
    pub prefetch_depth: usize,
    /// Sleep between capacity/availability polls
    pub poll_interval: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            chunk_records: 1000,
            prefetch_depth: 3,
            poll_interval: Duration::from_millis(300),
        }
    }
}

/// Background prefetching reader over one source file.
pub struct StreamingReader {
    buffer: Arc<ArrayQueue<Vec<String>>>,
    exhausted: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    location: String,
}

impl StreamingReader {
    /// Start reading `location` in the background.
    pub fn spawn(
        source: Arc<dyn SourceStore>,
        location: impl Into<String>,
        transform: RecordTransform,
        config: ReaderConfig,
        cancel: CancellationToken,
    ) -> Self {
        let location = location.into();
        let buffer = Arc::new(ArrayQueue::new(config.prefetch_depth.max(1)));
        let exhausted = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn(produce(
            source,
            location.clone(),
            transform,
            config,
            cancel,
            Arc::clone(&buffer),
            Arc::clone(&exhausted),
        ));

        Self {
            buffer,
            exhausted,
            handle,
            location,
        }
    }

    /// Pop one chunk without blocking; `None` means nothing is ready yet
    /// (poll again) or the reader is done (check [`Self::is_done`]).
    pub fn take(&self) -> Option<Vec<String>> {
        self.buffer.pop()
    }

    /// True once the source is exhausted **and** the buffer has been fully
    /// drained by the consumer.
    pub fn is_done(&self) -> bool {
        self.exhausted.load(Ordering::Acquire) && self.buffer.is_empty()
    }

    /// Unconsumed chunks currently buffered. Diagnostic only.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Wait for the background task to exit. Useful after cancellation.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn produce(
    source: Arc<dyn SourceStore>,
    location: String,
    transform: RecordTransform,
    config: ReaderConfig,
    cancel: CancellationToken,
    buffer: Arc<ArrayQueue<Vec<String>>>,
    exhausted: Arc<AtomicBool>,
) {
    let stream = match source.open_stream(&location).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(location = %location, error = %e, "failed to open source stream");
            exhausted.store(true, Ordering::Release);
            return;
        }
    };
    let mut lines = stream.lines();

    loop {
        if cancel.is_cancelled() {
            debug!(location = %location, "reader cancelled");
            break;
        }
        if buffer.is_full() {
            tokio::time::sleep(config.poll_interval).await;
            continue;
        }

        let mut chunk = Vec::with_capacity(config.chunk_records);
        let mut at_end = false;
        while chunk.len() < config.chunk_records {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match transform.apply(&line) {
                        Ok(record) => chunk.push(record),
                        Err(e) => warn!(location = %location, error = %e, "skipping malformed record"),
                    }
                }
                Ok(None) => {
                    at_end = true;
                    break;
                }
                Err(e) => {
                    error!(location = %location, error = %e, "source read error, stopping reader");
                    at_end = true;
                    break;
                }
            }
        }

        if !chunk.is_empty() {
            let mut pending = chunk;
            // Capacity was free at the check above, but a racing consumer
            // pattern can still fill it; poll until the push lands.
            while let Err(returned) = buffer.push(pending) {
                pending = returned;
                if cancel.is_cancelled() {
                    break;
                }
                tokio::time::sleep(config.poll_interval).await;
            }
        }

        if at_end {
            info!(location = %location, "source file finished");
            break;
        }
    }

    exhausted.store(true, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LocalStore;
    use std::io::Write;

    fn write_records(count: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..count {
            writeln!(file, r#"{{"n":{i}}}"#).unwrap();
        }
        file
    }

    fn reader_for(file: &tempfile::NamedTempFile, config: ReaderConfig) -> StreamingReader {
        StreamingReader::spawn(
            Arc::new(LocalStore::new()),
            file.path().to_str().unwrap(),
            RecordTransform::default(),
            config,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn delivers_all_chunks_in_order() {
        let file = write_records(25);
        let reader = reader_for(
            &file,
            ReaderConfig {
                chunk_records: 10,
                prefetch_depth: 3,
                poll_interval: Duration::from_millis(5),
            },
        );

        let mut total = 0;
        let mut chunks = 0;
        while !reader.is_done() {
            match reader.take() {
                Some(chunk) => {
                    chunks += 1;
                    total += chunk.len();
                }
                None => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        }
        assert_eq!(total, 25);
        assert_eq!(chunks, 3);
    }

    #[tokio::test]
    async fn buffer_never_exceeds_prefetch_depth() {
        let file = write_records(100);
        let reader = reader_for(
            &file,
            ReaderConfig {
                chunk_records: 10,
                prefetch_depth: 3,
                poll_interval: Duration::from_millis(2),
            },
        );

        let mut consumed = 0;
        while !reader.is_done() {
            assert!(reader.buffered() <= 3);
            // Consume slowly so the producer runs into the capacity bound.
            tokio::time::sleep(Duration::from_millis(10)).await;
            if reader.take().is_some() {
                consumed += 1;
            }
        }
        assert_eq!(consumed, 10);
    }

    #[tokio::test]
    async fn done_only_after_last_chunk_is_consumed() {
        let file = write_records(5);
        let reader = reader_for(
            &file,
            ReaderConfig {
                chunk_records: 10,
                prefetch_depth: 3,
                poll_interval: Duration::from_millis(2),
            },
        );

        // Give the producer time to read everything.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!reader.is_done());
        assert_eq!(reader.take().map(|c| c.len()), Some(5));
        assert!(reader.is_done());
    }

    #[tokio::test]
    async fn cancellation_stops_the_producer() {
        let file = write_records(10_000);
        let cancel = CancellationToken::new();
        let reader = StreamingReader::spawn(
            Arc::new(LocalStore::new()),
            file.path().to_str().unwrap(),
            RecordTransform::default(),
            ReaderConfig {
                chunk_records: 10,
                prefetch_depth: 1,
                poll_interval: Duration::from_millis(2),
            },
            cancel.clone(),
        );
        cancel.cancel();
        reader.join().await;
    }
}
