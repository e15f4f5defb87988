//! HTTP surface: multipart intake, NDJSON tutorial streaming and export
//! download.

pub mod api;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use api::{ApiError, AppState, SharedState, api_router};

use crate::config::{PartsmithConfig, ServerConfig};
use crate::model::build_client;
use crate::pipeline::PipelineOrchestrator;

/// Build the full application router.
pub fn build_router(state: SharedState, config: &ServerConfig) -> Router {
    api_router(&config.api_prefix)
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_upload_mb * 1024 * 1024))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// CORS for the configured origins; `"*"` allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the HTTP service and run until Ctrl+C.
pub async fn start_server(config: PartsmithConfig) -> Result<()> {
    let model = build_client(&config.model).context("Failed to create model client")?;
    let orchestrator = PipelineOrchestrator::from_config(&config.pipeline, model.clone())
        .context("Failed to load stage catalog")?;
    let stages = orchestrator.catalog().len();
    let state = Arc::new(AppState::new(&config, model, orchestrator));

    let app = build_router(state, &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        provider = %config.model.provider,
        model = %config.model.name,
        stages,
        "partsmith listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
