//! HTTP server: routes, shared state, startup and shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::{middleware, Router};
use koe_conf::KoeConfig;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::artifacts::{ArtifactStore, FsArtifactStore};
use crate::auth::require_api_key;
use crate::fetch::Fetcher;
use crate::handlers;
use crate::service::ChordService;

/// Shared state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<KoeConfig>,
    pub service: ChordService,
    pub fetcher: Fetcher,
    pub artifacts: Arc<dyn ArtifactStore>,
}

impl AppState {
    /// Build state from configuration, opening the artifact store on disk.
    pub fn from_config(config: KoeConfig) -> Result<Self> {
        let artifacts = FsArtifactStore::open(&config.paths.artifact_dir)?;
        Self::with_store(config, Arc::new(artifacts))
    }

    pub fn with_store(config: KoeConfig, artifacts: Arc<dyn ArtifactStore>) -> Result<Self> {
        let service =
            ChordService::from_config(&config).context("Failed to set up transcription client")?;
        let fetcher = Fetcher::new(&config.fetch).context("Failed to set up HTTP client")?;
        Ok(Self {
            config: Arc::new(config),
            service,
            fetcher,
            artifacts,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/analyze", post(handlers::analyze))
        .route("/extract-chords-midi", post(handlers::extract_chords_midi))
        .route("/download-midi/{artifact}", get(handlers::download_midi))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until SIGINT or SIGTERM.
pub async fn run(config: KoeConfig) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.http_port);

    info!("koe chord service starting");
    info!("   Artifacts: {}", config.paths.artifact_dir.display());
    match &config.transcriber.endpoint {
        Some(endpoint) => info!("   Transcriber: {}", endpoint),
        None => info!("   Transcriber: none, every run uses the classical fallback"),
    }
    if config.server.api_key.is_none() {
        tracing::warn!("no API key configured, protected routes will answer 500");
    }

    let app = router(AppState::from_config(config)?);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("koe ready on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
