//! Shared harness for pipeline integration tests: scripted backends and
//! in-memory collaborators, no network.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mediaflow_cloud::{
    Artifact, ArtifactFetcher, BlobStore, FetchError, StitchClip, StitchError, Stitcher,
    StorageError,
};
use mediaflow_core::backoff::PollSchedule;
use mediaflow_core::job::{BackendRole, Job};
use mediaflow_core::store::{FileRecorder, JobStore, RetainedFile, StoreError};
use mediaflow_core::types::JobId;
use mediaflow_events::UpdateNotifier;
use mediaflow_pipeline::{
    BackendSet, JobRegistry, Pipeline, PipelineConfig, PipelineDeps, PollProfiles,
};
use mediaflow_providers::{
    BackendError, BackendRequest, GenerationBackend, OutputAdapter, PredictionHandle,
    PredictionState, PredictionStatus, Submission,
};

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

/// What a [`FakeBackend`] does for one `generate` call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Accept and return a prediction that succeeds with this URL.
    Pending(String),
    /// Answer synchronously with this URL.
    Immediate(String),
    /// Accept and return a prediction that fails with this reason.
    PredictionFails(String),
    /// Accept and return a prediction that succeeds with no usable URL.
    SucceedsWithoutUrl,
    /// Accept and return a prediction that never finishes.
    Hang,
    /// Refuse with an HTTP error.
    Error(u16, String),
    Panic,
}

struct Prediction {
    polls_left: u32,
    reply: Reply,
}

pub struct FakeBackend {
    name: String,
    role: BackendRole,
    replies: Mutex<VecDeque<Reply>>,
    /// Processing polls before a prediction resolves.
    polls_before_done: u32,
    predictions: Mutex<HashMap<String, Prediction>>,
    /// Time each `generate` call takes before answering.
    generate_delay: Duration,
    pub generate_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub requests: Mutex<Vec<BackendRequest>>,
    pub cancelled: Mutex<Vec<String>>,
}

impl FakeBackend {
    /// Replies are used in order; the last one repeats.
    pub fn new(name: &str, role: BackendRole, replies: Vec<Reply>) -> Arc<Self> {
        Self::slow(name, role, replies, Duration::ZERO)
    }

    /// Like [`FakeBackend::new`], but every `generate` call takes `delay`.
    pub fn slow(name: &str, role: BackendRole, replies: Vec<Reply>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            role,
            replies: Mutex::new(replies.into()),
            polls_before_done: 1,
            generate_delay: delay,
            predictions: Mutex::new(HashMap::new()),
            generate_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }

    /// Register a prediction as if it had been issued before a restart.
    pub fn seed_prediction(&self, id: &str, reply: Reply) {
        self.predictions.lock().unwrap().insert(
            id.to_string(),
            Prediction {
                polls_left: self.polls_before_done,
                reply,
            },
        );
    }

    fn next_reply(&self) -> Reply {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap_or(Reply::Hang)
        }
    }
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> BackendRole {
        self.role
    }

    async fn generate(&self, request: &BackendRequest) -> Result<Submission, BackendError> {
        let n = self.generate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());
        if !self.generate_delay.is_zero() {
            tokio::time::sleep(self.generate_delay).await;
        }

        let reply = self.next_reply();
        match reply {
            Reply::Immediate(url) => Ok(Submission::Completed(serde_json::json!({ "url": url }))),
            Reply::Error(status, body) => Err(BackendError::classify(status, body)),
            Reply::Panic => panic!("backend {} exploded", self.name),
            reply => {
                let id = format!("{}-{n}", self.name);
                self.seed_prediction(&id, reply);
                Ok(Submission::Pending(PredictionHandle {
                    id,
                    backend: self.name.clone(),
                    role: self.role,
                }))
            }
        }
    }

    async fn status(&self, id: &str) -> Result<PredictionStatus, BackendError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut predictions = self.predictions.lock().unwrap();
        let prediction = predictions
            .get_mut(id)
            .ok_or_else(|| BackendError::classify(404, format!("unknown prediction {id}")))?;

        if prediction.polls_left > 0 {
            prediction.polls_left -= 1;
            return Ok(PredictionStatus::in_progress(PredictionState::Processing));
        }
        Ok(match &prediction.reply {
            Reply::Pending(url) => PredictionStatus::succeeded(serde_json::json!({ "url": url })),
            Reply::PredictionFails(reason) => PredictionStatus::failed(reason.clone()),
            Reply::SucceedsWithoutUrl => {
                PredictionStatus::succeeded(serde_json::json!({ "status": "stored" }))
            }
            _ => PredictionStatus::in_progress(PredictionState::Processing),
        })
    }

    async fn cancel(&self, id: &str) -> Result<(), BackendError> {
        self.cancelled.lock().unwrap().push(id.to_string());
        Ok(())
    }

    fn extract_urls(&self, output: &serde_json::Value) -> Vec<String> {
        OutputAdapter::fields(["url"]).extract(output)
    }
}

// ---------------------------------------------------------------------------
// In-memory collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBlobStore {
    pub objects: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        path: &str,
        _bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), content_type.to_string());
        Ok(format!("mem://{path}"))
    }

    async fn url_for(&self, path: &str) -> Result<String, StorageError> {
        Ok(format!("mem://{path}"))
    }
}

/// Serves every URL except those listed in `broken`.
#[derive(Default)]
pub struct FakeFetcher {
    pub broken: Mutex<Vec<String>>,
}

#[async_trait]
impl ArtifactFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, fallback_content_type: &str) -> Result<Artifact, FetchError> {
        if self.broken.lock().unwrap().iter().any(|b| b == url) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            });
        }
        Ok(Artifact {
            bytes: url.as_bytes().to_vec(),
            content_type: fallback_content_type.to_string(),
        })
    }
}

#[derive(Default)]
pub struct FakeStitcher {
    pub calls: Mutex<Vec<Vec<StitchClip>>>,
    pub fail: AtomicBool,
    /// Time each `stitch` call takes before answering.
    pub delay: Mutex<Duration>,
}

#[async_trait]
impl Stitcher for FakeStitcher {
    async fn stitch(&self, clips: &[StitchClip]) -> Result<String, StitchError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut calls = self.calls.lock().unwrap();
        calls.push(clips.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(StitchError::Service {
                status: 500,
                body: "ffmpeg crashed".into(),
            });
        }
        Ok(format!("https://stitched/{}.mp4", calls.len()))
    }
}

#[derive(Default)]
pub struct MemoryRecorder {
    pub files: Mutex<Vec<RetainedFile>>,
}

#[async_trait]
impl FileRecorder for MemoryRecorder {
    async fn record_file(&self, file: &RetainedFile) -> Result<(), StoreError> {
        self.files.lock().unwrap().push(file.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub jobs: Mutex<HashMap<JobId, Job>>,
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn read_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn write_job(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn list_unfinished(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| !j.is_terminal())
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub pipeline: Pipeline,
    pub blob_store: Arc<MemoryBlobStore>,
    pub fetcher: Arc<FakeFetcher>,
    pub stitcher: Arc<FakeStitcher>,
    pub recorder: Arc<MemoryRecorder>,
}

/// Millisecond poll intervals so scenarios finish quickly.
pub fn fast_config() -> PipelineConfig {
    let tick = PollSchedule::fixed(Duration::from_millis(2));
    PipelineConfig {
        poll: PollProfiles {
            image: tick.clone(),
            video: tick.clone(),
            mesh: tick.clone(),
            cad: PollSchedule::growing(Duration::from_millis(2), 1.5, Duration::from_millis(5)),
        },
        max_attempts: 20,
        deadline_secs: 5,
        grace_checks: 1,
        grace_interval_ms: 2,
        ..PipelineConfig::default()
    }
}

pub fn harness(backends: Vec<Arc<FakeBackend>>) -> Harness {
    harness_with(backends, None, fast_config())
}

pub fn harness_with(
    backends: Vec<Arc<FakeBackend>>,
    store: Option<Arc<MemoryStore>>,
    config: PipelineConfig,
) -> Harness {
    let mut registry = JobRegistry::new(Arc::new(UpdateNotifier::default()));
    if let Some(store) = store {
        registry = registry.with_store(store);
    }
    let blob_store = Arc::new(MemoryBlobStore::default());
    let fetcher = Arc::new(FakeFetcher::default());
    let stitcher = Arc::new(FakeStitcher::default());
    let recorder = Arc::new(MemoryRecorder::default());

    let deps = PipelineDeps {
        registry: Arc::new(registry),
        backends: BackendSet::from_backends(
            backends
                .into_iter()
                .map(|b| b as Arc<dyn GenerationBackend>),
        ),
        blob_store: blob_store.clone(),
        fetcher: fetcher.clone(),
        stitcher: stitcher.clone(),
        recorder: recorder.clone(),
    };

    Harness {
        pipeline: Pipeline::new(deps, config),
        blob_store,
        fetcher,
        stitcher,
        recorder,
    }
}

/// Wait until the job is terminal, panicking after a few seconds.
pub async fn wait_terminal(pipeline: &Pipeline, id: JobId) -> Job {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(job) = pipeline.get(id).await {
                if job.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("job did not finish in time")
}

/// Wait until `predicate` holds for the job.
pub async fn wait_for(pipeline: &Pipeline, id: JobId, predicate: impl Fn(&Job) -> bool) -> Job {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(job) = pipeline.get(id).await {
                if predicate(&job) {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}
