//! S3-compatible object-store source backend.
//!
//! Locations are `s3://bucket/key` URLs. Listing walks the bucket with the
//! folder key as prefix; streaming downloads the object body and serves it
//! as a line stream.

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::Client;
use serde::Deserialize;
use std::io::Cursor;
use tokio::io::BufReader;
use tracing::{debug, info};

use crate::error::{ImportError, Result};
use crate::source::{SourceStore, SourceStream};

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct S3SourceConfig {
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

/// Reads import files from an S3-compatible object store.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn connect(config: &S3SourceConfig) -> Result<Self> {
        if config.access_key.is_empty() || config.secret_key.is_empty() {
            return Err(ImportError::configuration(
                "s3 source requires access_key and secret_key",
            ));
        }
        let region = if config.region.is_empty() {
            "us-east-1".to_string()
        } else {
            config.region.clone()
        };

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "jsonstore-import",
        );
        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(region))
            .force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!("object-store source client initialized");
        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }
}

fn parse_location(location: &str) -> Result<(String, String)> {
    let stripped = location
        .strip_prefix("s3://")
        .ok_or_else(|| ImportError::source(location, "expected s3://bucket/key"))?;
    let (bucket, key) = stripped
        .split_once('/')
        .ok_or_else(|| ImportError::source(location, "expected s3://bucket/key"))?;
    Ok((bucket.to_string(), key.to_string()))
}

#[async_trait]
impl SourceStore for S3Store {
    async fn list_entries(&self, folder: &str) -> Result<Vec<String>> {
        let (bucket, prefix) = parse_location(folder)?;
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&bucket)
                .prefix(&prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }
            let output = request
                .send()
                .await
                .map_err(|e| ImportError::source(folder, e.to_string()))?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    if !key.ends_with('/') {
                        entries.push(format!("s3://{bucket}/{key}"));
                    }
                }
            }

            continuation = output.next_continuation_token().map(str::to_string);
            if continuation.is_none() {
                break;
            }
        }

        debug!(folder, count = entries.len(), "listed object-store folder");
        Ok(entries)
    }

    async fn open_stream(&self, location: &str) -> Result<SourceStream> {
        let (bucket, key) = parse_location(location)?;
        let response = self
            .client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| ImportError::source(location, e.to_string()))?;
        let data = response
            .body
            .collect()
            .await
            .map_err(|e| ImportError::source(location, e.to_string()))?
            .into_bytes()
            .to_vec();
        debug!(location, bytes = data.len(), "downloaded object");
        Ok(Box::new(BufReader::new(Cursor::new(data))))
    }
}
