//! Synthetic record generator for scale testing.
//!
//! Replicates a single-line JSON template into batches, stamping fresh UUIDs
//! through the record transform. A background task precooks batches into a
//! bounded queue so record generation never stalls the write path being
//! measured.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::queue::ArrayQueue;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ImportError, Result};
use crate::source::RecordTransform;

/// Template-backed batch generator with a precooked-batch queue.
pub struct ScaleTestSource {
    template: String,
    batch_records: usize,
    transform: RecordTransform,
    precooked: Arc<ArrayQueue<Vec<String>>>,
}

impl ScaleTestSource {
    /// Load the template file; it must hold one well-formed JSON document on
    /// a single line.
    pub async fn from_template_file(
        path: &str,
        batch_records: usize,
        queue_depth: usize,
        transform: RecordTransform,
    ) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ImportError::source(path, e.to_string()))?;
        let mut lines = contents.lines().filter(|l| !l.trim().is_empty());
        let template = lines
            .next()
            .ok_or_else(|| ImportError::source(path, "template file is empty"))?
            .to_string();
        if lines.next().is_some() {
            return Err(ImportError::source(
                path,
                "template must be a single json line",
            ));
        }
        serde_json::from_str::<serde_json::Value>(&template)
            .map_err(|e| ImportError::source(path, format!("template is not json: {e}")))?;

        Ok(Self {
            template,
            batch_records: batch_records.max(1),
            transform,
            precooked: Arc::new(ArrayQueue::new(queue_depth.max(1))),
        })
    }

    /// Generate one batch synchronously.
    pub fn cook_batch(&self) -> Result<Vec<String>> {
        let mut records = Vec::with_capacity(self.batch_records);
        for _ in 0..self.batch_records {
            records.push(self.transform.apply(&self.template)?);
        }
        Ok(records)
    }

    /// Pop a precooked batch, or cook one inline when the queue is empty.
    pub fn next_batch(&self) -> Result<Vec<String>> {
        match self.precooked.pop() {
            Some(batch) => Ok(batch),
            None => {
                debug!("precooked queue empty, cooking a batch inline");
                self.cook_batch()
            }
        }
    }

    /// Pop a precooked batch, polling until one is available or the token is
    /// cancelled.
    pub async fn wait_batch(&self, cancel: &CancellationToken) -> Option<Vec<String>> {
        loop {
            if let Some(batch) = self.precooked.pop() {
                return Some(batch);
            }
            if cancel.is_cancelled() {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
    }

    /// Start the background precooking task. It keeps the queue topped up
    /// until cancelled.
    pub fn spawn_precook(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let source = Arc::clone(self);
        tokio::spawn(async move {
            info!("precooking scale-test batches");
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                if source.precooked.is_full() {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    continue;
                }
                match source.cook_batch() {
                    Ok(batch) => {
                        // Push can only fail if a racer filled the queue
                        // between the check and now; drop and re-check.
                        let _ = source.precooked.push(batch);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "precooking failed, stopping");
                        break;
                    }
                }
            }
            debug!("precook task exiting");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn transform() -> RecordTransform {
        RecordTransform {
            use_uuid_for_id: true,
            id_field: "id".into(),
            ..RecordTransform::default()
        }
    }

    async fn source_with(template: &str) -> Result<ScaleTestSource> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{template}").unwrap();
        ScaleTestSource::from_template_file(file.path().to_str().unwrap(), 4, 2, transform()).await
    }

    #[tokio::test]
    async fn cooks_batches_with_fresh_ids() {
        let source = source_with(r#"{"id":"seed","v":1}"#).await.unwrap();
        let batch = source.cook_batch().unwrap();
        assert_eq!(batch.len(), 4);
        let first: serde_json::Value = serde_json::from_str(&batch[0]).unwrap();
        let second: serde_json::Value = serde_json::from_str(&batch[1]).unwrap();
        assert_ne!(first["id"], second["id"]);
        assert_eq!(first["v"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn rejects_multi_line_templates() {
        assert!(source_with("{}\n{}\n").await.is_err());
    }

    #[tokio::test]
    async fn rejects_non_json_templates() {
        assert!(source_with("not json").await.is_err());
    }

    #[tokio::test]
    async fn next_batch_cooks_inline_when_queue_is_empty() {
        let source = source_with(r#"{"id":"seed"}"#).await.unwrap();
        assert_eq!(source.next_batch().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn precook_task_fills_queue_and_stops_on_cancel() {
        let source = Arc::new(source_with(r#"{"id":"seed"}"#).await.unwrap());
        let cancel = CancellationToken::new();
        let handle = source.spawn_precook(cancel.clone());

        let batch = source.wait_batch(&cancel).await;
        assert!(batch.is_some());

        cancel.cancel();
        handle.await.unwrap();
    }
}
