//! HTTP blob-store source backend.
//!
//! Folder listing fetches the folder URL and expects a JSON array of entry
//! names (absolute URLs or names relative to the folder). File streaming
//! downloads the body and serves it as a line stream.

use async_trait::async_trait;
use serde::Deserialize;
use std::io::Cursor;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::debug;

use crate::error::{ImportError, Result};
use crate::source::{SourceStore, SourceStream};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSourceConfig {
    pub request_timeout_secs: u64,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
        }
    }
}

/// Reads import files from an HTTP blob store.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
}

impl HttpStore {
    pub fn connect(config: &HttpSourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ImportError::configuration(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

fn join_entry(folder: &str, entry: &str) -> String {
    if entry.starts_with("http://") || entry.starts_with("https://") {
        entry.to_string()
    } else {
        format!("{}/{}", folder.trim_end_matches('/'), entry)
    }
}

#[async_trait]
impl SourceStore for HttpStore {
    async fn list_entries(&self, folder: &str) -> Result<Vec<String>> {
        let names: Vec<String> = self
            .client
            .get(folder)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ImportError::source(folder, e.to_string()))?
            .json()
            .await
            .map_err(|e| ImportError::source(folder, format!("folder index: {e}")))?;

        let entries: Vec<String> = names
            .into_iter()
            .map(|name| join_entry(folder, &name))
            .collect();
        debug!(folder, count = entries.len(), "listed blob folder");
        Ok(entries)
    }

    async fn open_stream(&self, location: &str) -> Result<SourceStream> {
        let data = self
            .client
            .get(location)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ImportError::source(location, e.to_string()))?
            .bytes()
            .await
            .map_err(|e| ImportError::source(location, e.to_string()))?
            .to_vec();
        debug!(location, bytes = data.len(), "downloaded blob");
        Ok(Box::new(BufReader::new(Cursor::new(data))))
    }
}
