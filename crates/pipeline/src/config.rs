//! Pipeline tuning: default dimensions, poll profiles, deadlines.

use std::time::Duration;

use mediaflow_core::backoff::PollSchedule;
use mediaflow_core::job::BackendRole;
use mediaflow_core::options::DEFAULT_DIMENSION;
use mediaflow_core::types::JobId;
use serde::{Deserialize, Serialize};

use crate::poller::PollConfig;

/// Poll schedules per backend family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollProfiles {
    pub image: PollSchedule,
    pub video: PollSchedule,
    pub mesh: PollSchedule,
    /// CAD conversion runs long; its interval grows up to a ceiling.
    pub cad: PollSchedule,
}

impl Default for PollProfiles {
    fn default() -> Self {
        let fixed = PollSchedule::fixed(Duration::from_secs(5));
        Self {
            image: fixed.clone(),
            video: fixed.clone(),
            mesh: fixed,
            cad: PollSchedule::growing(Duration::from_secs(5), 1.5, Duration::from_secs(10)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Dimensions below which no enhancement pass is needed.
    pub default_width: u32,
    pub default_height: u32,
    pub poll: PollProfiles,
    /// Status queries per prediction before giving up.
    pub max_attempts: u32,
    /// Hard wall-clock ceiling for a single polled prediction.
    pub deadline_secs: u64,
    /// Registry re-checks after a success without an output URL.
    pub grace_checks: u32,
    pub grace_interval_ms: u64,
    /// Scene length when the request does not specify one.
    pub scene_duration_secs: f64,
    /// Public base URL of this service, used to build prediction webhooks.
    pub webhook_base_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_width: DEFAULT_DIMENSION,
            default_height: DEFAULT_DIMENSION,
            poll: PollProfiles::default(),
            max_attempts: 120,
            deadline_secs: 600,
            grace_checks: 3,
            grace_interval_ms: 2000,
            scene_duration_secs: 5.0,
            webhook_base_url: None,
        }
    }
}

impl PipelineConfig {
    pub fn schedule_for(&self, role: BackendRole) -> &PollSchedule {
        match role {
            BackendRole::Image | BackendRole::Enhance => &self.poll.image,
            BackendRole::Video => &self.poll.video,
            BackendRole::Mesh => &self.poll.mesh,
            BackendRole::CadMesh => &self.poll.cad,
        }
    }

    pub fn poll_config(&self, role: BackendRole) -> PollConfig {
        PollConfig {
            schedule: self.schedule_for(role).clone(),
            max_attempts: self.max_attempts,
            deadline: Duration::from_secs(self.deadline_secs),
            grace_checks: self.grace_checks,
            grace_interval: Duration::from_millis(self.grace_interval_ms),
        }
    }

    /// Webhook URL a provider should call when a prediction for `job_id`
    /// finishes.
    pub fn webhook_url(&self, job_id: JobId) -> Option<String> {
        self.webhook_base_url.as_ref().map(|base| {
            format!(
                "{}/api/v1/webhooks/predictions/{job_id}",
                base.trim_end_matches('/')
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cad_grows_others_fixed() {
        let config = PipelineConfig::default();
        let cad = config.schedule_for(BackendRole::CadMesh);
        assert_eq!(
            cad.next_interval(cad.initial_interval()),
            Duration::from_millis(7500)
        );
        let mesh = config.schedule_for(BackendRole::Mesh);
        assert_eq!(
            mesh.next_interval(mesh.initial_interval()),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn webhook_url_only_when_configured() {
        let mut config = PipelineConfig::default();
        let id = JobId::nil();
        assert!(config.webhook_url(id).is_none());

        config.webhook_base_url = Some("https://api.example.com/".into());
        assert_eq!(
            config.webhook_url(id).unwrap(),
            format!("https://api.example.com/api/v1/webhooks/predictions/{id}")
        );
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{ "max_attempts": 10 }"#).unwrap();
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.deadline_secs, 600);
    }
}
