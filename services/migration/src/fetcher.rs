//! Asset retrieval from the source backend's public object namespace.

use crate::config::SourceConfig;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while fetching an asset
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Asset fetch failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Asset fetch for {path} returned status {status}")]
    Status { path: String, status: StatusCode },
}

/// Retrieval of raw asset content by source path
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetFetch: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Bytes, FetchError>;
}

/// Fetches assets over HTTP from the source backend
pub struct AssetFetcher {
    client: Client,
    public_base_url: String,
}

impl AssetFetcher {
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.fetch_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AssetFetch for AssetFetcher {
    /// Single attempt, no retry; any non-200 response is a failure
    async fn fetch(&self, path: &str) -> Result<Bytes, FetchError> {
        let url = format!("{}/{}", self.public_base_url, path.trim_start_matches('/'));

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                path: path.to_string(),
                status,
            });
        }

        let content = response.bytes().await?;
        debug!(path = %path, size_bytes = content.len(), "Fetched asset from source backend");

        Ok(content)
    }
}
