use std::path::PathBuf;
use std::str::FromStr;

/// Error raised when an environment variable holds an unusable value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value: {value}")]
    Invalid { var: &'static str, value: String },

    #[error("{var} must be set when {when}")]
    Missing {
        var: &'static str,
        when: &'static str,
    },
}

/// Where generated artifacts are stored.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    /// Files on local disk, served from `public_base_url` by a reverse proxy.
    Local {
        root: PathBuf,
        public_base_url: String,
    },
    /// An S3 bucket; objects are exposed through presigned URLs.
    S3 { bucket: String, url_expiry_secs: u64 },
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for running jobs to park (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// PostgreSQL URL. Without it jobs live only in memory.
    pub database_url: Option<String>,
    /// Path to the JSON file describing generation backends.
    pub providers_config: Option<PathBuf>,
    pub storage: StorageConfig,
    /// Base URL of the scene stitching service.
    pub stitcher_url: String,
    /// Public base URL of this server, handed to providers for webhooks.
    pub public_webhook_base_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                           |
    /// |---------------------------|-----------------------------------|
    /// | `HOST`                    | `0.0.0.0`                         |
    /// | `PORT`                    | `3000`                            |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`           |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                              |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `30`                              |
    /// | `DATABASE_URL`            | unset (in-memory only)            |
    /// | `PROVIDERS_CONFIG`        | unset (no backends)               |
    /// | `STORAGE_BACKEND`         | `local`                           |
    /// | `STORAGE_LOCAL_ROOT`      | `./data/artifacts`                |
    /// | `STORAGE_PUBLIC_BASE_URL` | `http://localhost:3000/artifacts` |
    /// | `S3_BUCKET`               | required when backend is `s3`     |
    /// | `S3_URL_EXPIRY_SECS`      | `604800`                          |
    /// | `STITCHER_URL`            | `http://localhost:8090`           |
    /// | `PUBLIC_WEBHOOK_BASE_URL` | unset (webhooks disabled)         |
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_or("HOST", "0.0.0.0");
        let port = parse_env("PORT", "3000")?;

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = parse_env("REQUEST_TIMEOUT_SECS", "30")?;
        let shutdown_timeout_secs = parse_env("SHUTDOWN_TIMEOUT_SECS", "30")?;

        let storage = match env_or("STORAGE_BACKEND", "local").as_str() {
            "local" => StorageConfig::Local {
                root: env_or("STORAGE_LOCAL_ROOT", "./data/artifacts").into(),
                public_base_url: env_or(
                    "STORAGE_PUBLIC_BASE_URL",
                    "http://localhost:3000/artifacts",
                ),
            },
            "s3" => StorageConfig::S3 {
                bucket: optional_env("S3_BUCKET").ok_or(ConfigError::Missing {
                    var: "S3_BUCKET",
                    when: "STORAGE_BACKEND is s3",
                })?,
                url_expiry_secs: parse_env("S3_URL_EXPIRY_SECS", "604800")?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    var: "STORAGE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            database_url: optional_env("DATABASE_URL"),
            providers_config: optional_env("PROVIDERS_CONFIG").map(PathBuf::from),
            storage,
            stitcher_url: env_or("STITCHER_URL", "http://localhost:8090"),
            public_webhook_base_url: optional_env("PUBLIC_WEBHOOK_BASE_URL"),
        })
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.into())
}

fn optional_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: FromStr>(var: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = env_or(var, default);
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value })
}
