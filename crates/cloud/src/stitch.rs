//! Stitching collaborator: concatenates ordered scene clips.
//!
//! The HTTP service accepts `POST {base}/stitch` with
//! `{ "clips": [{ "url", "duration", "order", "prompt" }] }` and answers
//! `{ "url": "<combined video>" }`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StitchError {
    #[error("Nothing to stitch")]
    NoClips,

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Stitching service error ({status}): {body}")]
    Service { status: u16, body: String },

    #[error("Stitching service returned no URL")]
    MissingUrl,
}

/// One clip in concatenation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StitchClip {
    pub url: String,
    #[serde(rename = "duration")]
    pub duration_secs: f64,
    pub order: usize,
    pub prompt: String,
}

#[async_trait]
pub trait Stitcher: Send + Sync {
    /// Combine `clips` (already sorted by `order`) into a single video URL.
    async fn stitch(&self, clips: &[StitchClip]) -> Result<String, StitchError>;
}

pub struct HttpStitcher {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct StitchResponse {
    #[serde(default)]
    url: Option<String>,
}

impl HttpStitcher {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Stitcher for HttpStitcher {
    async fn stitch(&self, clips: &[StitchClip]) -> Result<String, StitchError> {
        if clips.is_empty() {
            return Err(StitchError::NoClips);
        }

        let response = self
            .client
            .post(format!("{}/stitch", self.base_url))
            .json(&serde_json::json!({ "clips": clips }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StitchError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: StitchResponse = response.json().await?;
        parsed
            .url
            .filter(|u| !u.is_empty())
            .ok_or(StitchError::MissingUrl)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
