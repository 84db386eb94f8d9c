//! Provider configuration.
//!
//! Backends are declared in a JSON file:
//!
//! ```json
//! { "backends": [
//!   { "name": "flux-schnell", "role": "image", "base_url": "https://...",
//!     "api_token_env": "IMAGE_API_TOKEN", "priority": 0 },
//!   { "name": "trellis", "role": "mesh", "base_url": "https://...",
//!     "output": { "kind": "fields", "keys": ["mesh", "glb", "url"] } }
//! ] }
//! ```
//!
//! Chains are built per role in ascending `priority` order (cheapest or
//! fastest first).

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use mediaflow_core::job::BackendRole;
use serde::{Deserialize, Serialize};

use crate::backend::GenerationBackend;
use crate::http::HttpBackend;
use crate::output::OutputAdapter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub role: BackendRole,
    pub base_url: String,
    /// Environment variable holding the bearer token, if the provider needs one.
    #[serde(default)]
    pub api_token_env: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub output: OutputAdapter,
    /// Lower values are tried first.
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read providers config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid providers config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate backend name: {0}")]
    DuplicateName(String),
}

impl ProvidersConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.check_unique_names()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Backends for `role`, in chain order.
    pub fn for_role(&self, role: BackendRole) -> Vec<&BackendConfig> {
        let mut entries: Vec<&BackendConfig> =
            self.backends.iter().filter(|b| b.role == role).collect();
        entries.sort_by_key(|b| b.priority);
        entries
    }

    /// Instantiate an [`HttpBackend`] for every entry, in ascending
    /// `priority` order, resolving API tokens from the environment. A
    /// missing token variable is logged and the backend is created without
    /// authentication.
    pub fn build_http_backends(&self, client: &reqwest::Client) -> Vec<Arc<dyn GenerationBackend>> {
        let mut entries: Vec<&BackendConfig> = self.backends.iter().collect();
        entries.sort_by_key(|b| b.priority);
        entries
            .into_iter()
            .map(|config| {
                let token = config.api_token_env.as_deref().and_then(|var| {
                    let value = std::env::var(var).ok();
                    if value.is_none() {
                        tracing::warn!(backend = %config.name, env = var, "API token variable not set");
                    }
                    value
                });
                Arc::new(HttpBackend::new(client.clone(), config, token)) as Arc<dyn GenerationBackend>
            })
            .collect()
    }

    fn check_unique_names(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.name.as_str()) {
                return Err(ConfigError::DuplicateName(backend.name.clone()));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
