use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::Router;
use mediaflow_cloud::{BlobStore, HttpFetcher, HttpStitcher, LocalBlobStore, S3BlobStore};
use mediaflow_core::store::{FileRecorder, NoopFileRecorder};
use mediaflow_events::UpdateNotifier;
use mediaflow_pipeline::{BackendSet, JobRegistry, Pipeline, PipelineConfig, PipelineDeps};
use mediaflow_providers::ProvidersConfig;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediaflow_api::config::{ServerConfig, StorageConfig};
use mediaflow_api::{routes, state, ws};

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mediaflow_api=debug,mediaflow_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database (optional) ---
    let pool = match &config.database_url {
        Some(url) => {
            let pool = mediaflow_db::create_pool(url)
                .await
                .context("Failed to connect to database")?;
            mediaflow_db::health_check(&pool)
                .await
                .context("Database health check failed")?;
            mediaflow_db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database ready, jobs are durable");
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs are kept in memory only");
            None
        }
    };

    // --- Generation backends ---
    let http = reqwest::Client::new();
    let providers = match &config.providers_config {
        Some(path) => ProvidersConfig::load(path).context("Failed to load providers config")?,
        None => {
            tracing::warn!("PROVIDERS_CONFIG not set, no generation backends configured");
            ProvidersConfig::default()
        }
    };
    let backends = BackendSet::from_backends(providers.build_http_backends(&http));
    tracing::info!(count = backends.len(), "Generation backends configured");

    // --- Storage and collaborators ---
    let blob_store: Arc<dyn BlobStore> = match &config.storage {
        StorageConfig::Local {
            root,
            public_base_url,
        } => {
            tracing::info!(root = %root.display(), "Using local artifact storage");
            Arc::new(LocalBlobStore::new(root.clone(), public_base_url.clone()))
        }
        StorageConfig::S3 {
            bucket,
            url_expiry_secs,
        } => {
            tracing::info!(bucket = %bucket, "Using S3 artifact storage");
            Arc::new(
                S3BlobStore::from_env(bucket.clone(), Duration::from_secs(*url_expiry_secs))
                    .await,
            )
        }
    };
    let fetcher = Arc::new(HttpFetcher::new(http.clone()));
    let stitcher = Arc::new(HttpStitcher::new(http.clone(), config.stitcher_url.clone()));

    // --- Pipeline ---
    let notifier = Arc::new(UpdateNotifier::default());
    let mut registry = JobRegistry::new(Arc::clone(&notifier));
    let recorder: Arc<dyn FileRecorder> = match &pool {
        Some(pool) => {
            let store = Arc::new(mediaflow_db::PgJobStore::new(pool.clone()));
            registry = registry.with_store(store.clone());
            store
        }
        None => Arc::new(NoopFileRecorder),
    };

    let pipeline_config = PipelineConfig {
        webhook_base_url: config.public_webhook_base_url.clone(),
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(
        PipelineDeps {
            registry: Arc::new(registry),
            backends,
            blob_store,
            fetcher,
            stitcher,
            recorder,
        },
        pipeline_config,
    );

    let resumed = pipeline
        .resume_unfinished()
        .await
        .context("Failed to resume unfinished jobs")?;
    if resumed > 0 {
        tracing::info!(resumed, "Resumed unfinished jobs");
    }

    // --- WebSocket manager, heartbeat and update bridge ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));
    let bridge_handle = ws::start_update_bridge(&notifier, Arc::clone(&ws_manager));

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        pipeline: pipeline.clone(),
        ws_manager: Arc::clone(&ws_manager),
    };

    let cors = build_cors_layer(&config)?;
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
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

    // --- Start server ---
    let host = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST address: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Running jobs park in place and are resumed on the next start.
    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(drain, pipeline.shutdown()).await.is_err() {
        tracing::warn!(timeout_secs = config.shutdown_timeout_secs, "Job tasks did not stop in time");
    } else {
        tracing::info!("Pipeline shut down");
    }

    bridge_handle.abort();

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
fn build_cors_layer(config: &ServerConfig) -> anyhow::Result<CorsLayer> {
    let origins = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin '{o}'"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600)))
}
