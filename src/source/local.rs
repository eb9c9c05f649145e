//! Local-filesystem source backend.

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::BufReader;

use crate::error::{ImportError, Result};
use crate::source::{SourceStore, SourceStream};

/// Reads import files from the local filesystem.
#[derive(Debug, Default, Clone)]
pub struct LocalStore;

impl LocalStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SourceStore for LocalStore {
    async fn list_entries(&self, folder: &str) -> Result<Vec<String>> {
        let mut dir = tokio::fs::read_dir(folder)
            .await
            .map_err(|e| ImportError::source(folder, e.to_string()))?;
        let mut entries = Vec::new();
        loop {
            let entry = dir
                .next_entry()
                .await
                .map_err(|e| ImportError::source(folder, e.to_string()))?;
            let Some(entry) = entry else { break };
            entries.push(entry.path().to_string_lossy().into_owned());
        }
        Ok(entries)
    }

    async fn open_stream(&self, location: &str) -> Result<SourceStream> {
        let file = File::open(location)
            .await
            .map_err(|e| ImportError::source(location, e.to_string()))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{read_all_records, RecordTransform};
    use std::io::Write;

    #[tokio::test]
    async fn streams_lines_and_skips_malformed_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"n":1}}"#).unwrap();
        writeln!(file, "not json at all").unwrap();
        writeln!(file, r#"{{"n":2}}"#).unwrap();

        let store = LocalStore::new();
        let records = read_all_records(
            &store,
            file.path().to_str().unwrap(),
            &RecordTransform::default(),
        )
        .await
        .unwrap();
        assert_eq!(records, vec![r#"{"n":1}"#, r#"{"n":2}"#]);
    }

    #[tokio::test]
    async fn lists_folder_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("batch_0.json"), "{}\n").unwrap();
        std::fs::write(dir.path().join("batch_1.json"), "{}\n").unwrap();

        let store = LocalStore::new();
        let mut entries = store
            .list_entries(dir.path().to_str().unwrap())
            .await
            .unwrap();
        entries.sort();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].ends_with("batch_0.json"));
    }

    #[tokio::test]
    async fn missing_file_is_a_source_error() {
        let store = LocalStore::new();
        assert!(store.open_stream("/nonexistent/nope.json").await.is_err());
    }
}
