//! Artifact blob downloads.

use async_trait::async_trait;
use bytes::Bytes;

/// Reasons a blob download fails.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// The request could not be completed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Downloads artifact bytes by URL.
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    /// Fetch the full body at `url`.
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// [`BlobFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Wrap a configured client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlobFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        Ok(response.bytes().await?)
    }
}
