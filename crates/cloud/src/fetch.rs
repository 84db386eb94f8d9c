//! Download finished artifacts from provider URLs.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Download of {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("Downloaded artifact from {0} is empty")]
    Empty(String),
}

/// A downloaded artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Download `url`. `fallback_content_type` is used when the server does
    /// not send one.
    async fn fetch(&self, url: &str, fallback_content_type: &str) -> Result<Artifact, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, fallback_content_type: &str) -> Result<Artifact, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty() && !v.starts_with("application/octet-stream"))
            .unwrap_or(fallback_content_type)
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(FetchError::Empty(url.to_string()));
        }

        tracing::debug!(url, size = bytes.len(), content_type = %content_type, "Downloaded artifact");
        Ok(Artifact {
            bytes,
            content_type,
        })
    }
}
