//! REST client for providers speaking the predictions protocol.
//!
//! - `POST {base}/predictions` starts a prediction
//! - `GET {base}/predictions/{id}` reports its state
//! - `POST {base}/predictions/{id}/cancel` cancels it
//!
//! A provider may answer the create call with an already finished
//! prediction, in which case the output is returned as
//! [`Submission::Completed`].

use async_trait::async_trait;
use mediaflow_core::job::BackendRole;
use serde::Deserialize;
use serde_json::Value;

use crate::backend::{
    BackendRequest, GenerationBackend, PredictionHandle, PredictionState, PredictionStatus,
    Submission,
};
use crate::config::BackendConfig;
use crate::error::{is_content_policy_message, BackendError};
use crate::output::OutputAdapter;

/// HTTP client for a single configured backend.
pub struct HttpBackend {
    client: reqwest::Client,
    name: String,
    role: BackendRole,
    base_url: String,
    model: Option<String>,
    api_token: Option<String>,
    output: OutputAdapter,
}

/// Prediction object returned by every endpoint of the protocol.
#[derive(Debug, Deserialize)]
struct PredictionResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl HttpBackend {
    /// Create a backend from its configuration, reusing an existing
    /// [`reqwest::Client`] for connection pooling across backends.
    pub fn new(client: reqwest::Client, config: &BackendConfig, api_token: Option<String>) -> Self {
        Self {
            client,
            name: config.name.clone(),
            role: config.role,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_token,
            output: config.output.clone(),
        }
    }

    fn payload(&self, request: &BackendRequest) -> Result<Value, BackendError> {
        let input = serde_json::to_value(request)
            .map_err(|e| BackendError::InvalidResponse(format!("unserializable request: {e}")))?;
        let mut body = serde_json::json!({ "input": input });
        if let Some(model) = &self.model {
            body["model"] = Value::String(model.clone());
        }
        if let Some(webhook) = &request.webhook_url {
            body["webhook"] = Value::String(webhook.clone());
        }
        Ok(body)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, classifying the body
    /// of failed responses into a [`BackendError`].
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BackendError::classify(status.as_u16(), body));
        }
        Ok(response)
    }

    async fn parse_prediction(response: reqwest::Response) -> Result<PredictionResponse, BackendError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<PredictionResponse>().await?)
    }
}

fn error_text(error: Option<&Value>) -> String {
    match error {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "prediction failed".to_string(),
        Some(other) => other.to_string(),
    }
}

fn into_status(prediction: PredictionResponse) -> PredictionStatus {
    let state = prediction
        .status
        .as_deref()
        .map(PredictionState::parse)
        .unwrap_or(PredictionState::Processing);
    match state {
        PredictionState::Succeeded => PredictionStatus::succeeded(prediction.output.unwrap_or(Value::Null)),
        PredictionState::Failed => PredictionStatus::failed(error_text(prediction.error.as_ref())),
        other => PredictionStatus {
            state: other,
            output: None,
            error: prediction.error.as_ref().map(|e| error_text(Some(e))),
        },
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> BackendRole {
        self.role
    }

    async fn generate(&self, request: &BackendRequest) -> Result<Submission, BackendError> {
        let body = self.payload(request)?;
        let response = self
            .authorized(self.client.post(format!("{}/predictions", self.base_url)))
            .json(&body)
            .send()
            .await?;
        let prediction = Self::parse_prediction(response).await?;

        let state = prediction.status.as_deref().map(PredictionState::parse);
        match state {
            Some(PredictionState::Succeeded) => {
                return Ok(Submission::Completed(prediction.output.unwrap_or(Value::Null)));
            }
            Some(PredictionState::Failed) | Some(PredictionState::Canceled) => {
                let message = error_text(prediction.error.as_ref());
                if is_content_policy_message(&message) {
                    return Err(BackendError::ContentPolicy(message));
                }
                return Err(BackendError::Rejected(message));
            }
            _ => {}
        }

        let id = prediction
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BackendError::InvalidResponse("prediction without id".to_string()))?;
        tracing::debug!(backend = %self.name, prediction_id = %id, "Prediction accepted");
        Ok(Submission::Pending(PredictionHandle {
            id,
            backend: self.name.clone(),
            role: self.role,
        }))
    }

    async fn status(&self, prediction_id: &str) -> Result<PredictionStatus, BackendError> {
        let response = self
            .authorized(
                self.client
                    .get(format!("{}/predictions/{}", self.base_url, prediction_id)),
            )
            .send()
            .await?;
        Ok(into_status(Self::parse_prediction(response).await?))
    }

    async fn cancel(&self, prediction_id: &str) -> Result<(), BackendError> {
        let response = self
            .authorized(
                self.client
                    .post(format!("{}/predictions/{}/cancel", self.base_url, prediction_id)),
            )
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    fn extract_urls(&self, output: &Value) -> Vec<String> {
        self.output.extract(output)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn backend(model: Option<&str>) -> HttpBackend {
        let config = BackendConfig {
            name: "mesh-a".into(),
            role: BackendRole::Mesh,
            base_url: "http://provider.local/v1/".into(),
            api_token_env: None,
            model: model.map(str::to_string),
            output: OutputAdapter::fields(["mesh", "glb"]),
            priority: 0,
        };
        HttpBackend::new(reqwest::Client::new(), &config, None)
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(backend(None).base_url, "http://provider.local/v1");
    }

    #[test]
    fn payload_wraps_input_and_passes_webhook() {
        let request = BackendRequest::new("a chair")
            .with_image("https://cdn/ref.png")
            .with_webhook(Some("https://api/hooks/1".into()));
        let body = backend(Some("acme/mesh-v2")).payload(&request).unwrap();

        assert_eq!(body["model"], "acme/mesh-v2");
        assert_eq!(body["webhook"], "https://api/hooks/1");
        assert_eq!(body["input"]["prompt"], "a chair");
        assert_eq!(body["input"]["image"], "https://cdn/ref.png");
    }

    #[test]
    fn status_mapping() {
        let done = into_status(PredictionResponse {
            id: Some("p1".into()),
            status: Some("succeeded".into()),
            output: Some(json!({ "glb": "https://cdn/m.glb" })),
            error: None,
        });
        assert_eq!(done.state, PredictionState::Succeeded);
        assert_eq!(
            backend(None).extract_urls(done.output.as_ref().unwrap()),
            vec!["https://cdn/m.glb"]
        );

        let failed = into_status(PredictionResponse {
            id: Some("p1".into()),
            status: Some("failed".into()),
            output: None,
            error: Some(json!({ "detail": "oom" })),
        });
        assert_eq!(failed.state, PredictionState::Failed);
        assert!(failed.error.unwrap().contains("oom"));
    }
}
