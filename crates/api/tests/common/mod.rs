//! Shared helpers for API integration tests: an in-memory pipeline behind
//! the real router and middleware stack.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mediaflow_cloud::{
    Artifact, ArtifactFetcher, BlobStore, FetchError, StitchClip, StitchError, Stitcher,
    StorageError,
};
use mediaflow_core::backoff::PollSchedule;
use mediaflow_core::job::{BackendRole, Job};
use mediaflow_core::store::NoopFileRecorder;
use mediaflow_core::types::JobId;
use mediaflow_events::UpdateNotifier;
use mediaflow_pipeline::{
    BackendSet, JobRegistry, Pipeline, PipelineConfig, PipelineDeps, PollProfiles,
};
use mediaflow_providers::{
    BackendError, BackendRequest, GenerationBackend, OutputAdapter, PredictionHandle,
    PredictionState, PredictionStatus, Submission,
};
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use mediaflow_api::config::{ServerConfig, StorageConfig};
use mediaflow_api::routes;
use mediaflow_api::state::AppState;
use mediaflow_api::ws::WsManager;

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

/// A backend that either answers synchronously with a fixed URL or accepts
/// predictions that never finish.
pub struct ScriptedBackend {
    name: String,
    role: BackendRole,
    url: Option<String>,
    pub calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn immediate(name: &str, role: BackendRole, url: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            role,
            url: Some(url.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn hanging(name: &str, role: BackendRole) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            role,
            url: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> BackendRole {
        self.role
    }

    async fn generate(&self, _request: &BackendRequest) -> Result<Submission, BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(match &self.url {
            Some(url) => Submission::Completed(serde_json::json!(url)),
            None => Submission::Pending(PredictionHandle {
                id: format!("{}-{n}", self.name),
                backend: self.name.clone(),
                role: self.role,
            }),
        })
    }

    async fn status(&self, _prediction_id: &str) -> Result<PredictionStatus, BackendError> {
        Ok(PredictionStatus::in_progress(PredictionState::Processing))
    }

    async fn cancel(&self, _prediction_id: &str) -> Result<(), BackendError> {
        Ok(())
    }

    fn extract_urls(&self, output: &serde_json::Value) -> Vec<String> {
        OutputAdapter::Direct.extract(output)
    }
}

// ---------------------------------------------------------------------------
// In-memory collaborators
// ---------------------------------------------------------------------------

struct MemoryBlobStore;

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        path: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        Ok(format!("mem://{path}"))
    }

    async fn url_for(&self, path: &str) -> Result<String, StorageError> {
        Ok(format!("mem://{path}"))
    }
}

struct StaticFetcher;

#[async_trait]
impl ArtifactFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str, fallback_content_type: &str) -> Result<Artifact, FetchError> {
        Ok(Artifact {
            bytes: b"artifact".to_vec(),
            content_type: fallback_content_type.to_string(),
        })
    }
}

struct CountingStitcher {
    calls: AtomicUsize,
}

#[async_trait]
impl Stitcher for CountingStitcher {
    async fn stitch(&self, _clips: &[StitchClip]) -> Result<String, StitchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("https://stitched/{n}.mp4"))
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        database_url: None,
        providers_config: None,
        storage: StorageConfig::Local {
            root: std::env::temp_dir().join("mediaflow-api-tests"),
            public_base_url: "http://localhost/artifacts".to_string(),
        },
        stitcher_url: "http://localhost:8090".to_string(),
        public_webhook_base_url: None,
    }
}

fn fast_pipeline_config() -> PipelineConfig {
    let tick = PollSchedule::fixed(Duration::from_millis(5));
    PipelineConfig {
        poll: PollProfiles {
            image: tick.clone(),
            video: tick.clone(),
            mesh: tick.clone(),
            cad: tick,
        },
        max_attempts: 2_000,
        deadline_secs: 10,
        grace_checks: 1,
        grace_interval_ms: 5,
        ..PipelineConfig::default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub pipeline: Pipeline,
    pub ws_manager: Arc<WsManager>,
}

/// Build the full application router with all middleware layers over an
/// in-memory pipeline using `backends`.
///
/// Mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack production uses.
pub fn build_test_app(backends: Vec<Arc<ScriptedBackend>>) -> TestApp {
    let notifier = Arc::new(UpdateNotifier::default());
    let pipeline = Pipeline::new(
        PipelineDeps {
            registry: Arc::new(JobRegistry::new(notifier)),
            backends: BackendSet::from_backends(
                backends
                    .into_iter()
                    .map(|b| b as Arc<dyn GenerationBackend>),
            ),
            blob_store: Arc::new(MemoryBlobStore),
            fetcher: Arc::new(StaticFetcher),
            stitcher: Arc::new(CountingStitcher {
                calls: AtomicUsize::new(0),
            }),
            recorder: Arc::new(NoopFileRecorder),
        },
        fast_pipeline_config(),
    );
    let ws_manager = Arc::new(WsManager::new());

    let state = AppState {
        pool: None,
        config: Arc::new(test_config()),
        pipeline: pipeline.clone(),
        ws_manager: Arc::clone(&ws_manager),
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    TestApp {
        router,
        pipeline,
        ws_manager,
    }
}

/// An app with an instant image backend and a video backend that answers
/// synchronously with `https://p/clip.mp4`.
pub fn default_app() -> TestApp {
    build_test_app(vec![
        ScriptedBackend::immediate("img", BackendRole::Image, "https://p/img.png"),
        ScriptedBackend::immediate("vid", BackendRole::Video, "https://p/clip.mp4"),
    ])
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &TestApp, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn post_empty(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll the pipeline until `pred` holds for the job, or panic after 5s.
pub async fn wait_for(pipeline: &Pipeline, id: JobId, pred: impl Fn(&Job) -> bool) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(job) = pipeline.get(id).await {
            if pred(&job) {
                return job;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} did not reach the expected state"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_terminal(pipeline: &Pipeline, id: JobId) -> Job {
    wait_for(pipeline, id, Job::is_terminal).await
}
