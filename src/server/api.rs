use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Multipart, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use partsmith_common::{IdeasReport, ProjectRequest};
use tracing::{error, info, warn};

use crate::config::PartsmithConfig;
use crate::errors::PipelineError;
use crate::export::write_markdown;
use crate::ideas::IdeasService;
use crate::model::ModelClient;
use crate::pipeline::PipelineOrchestrator;
use crate::storage::ImageStore;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub orchestrator: PipelineOrchestrator,
    pub ideas: IdeasService,
    pub images: ImageStore,
    /// Well-known location of the last finished tutorial
    pub export_path: PathBuf,
}

impl AppState {
    pub fn new(config: &PartsmithConfig, model: Arc<dyn ModelClient>, orchestrator: PipelineOrchestrator) -> Self {
        Self {
            orchestrator,
            ideas: IdeasService::new(model),
            images: ImageStore::new(config.uploads_dir()),
            export_path: config.export_path(),
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Error type ────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::EmptyProjectName => ApiError::BadRequest(err.to_string()),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

/// API routes mounted under `prefix` (e.g. `/api/v1`), plus `/health`.
pub fn api_router(prefix: &str) -> Router<SharedState> {
    let prefix = prefix.trim_end_matches('/');
    Router::new()
        .route("/health", get(health))
        .route(&format!("{}/analyze_image/", prefix), post(analyze_image))
        .route(&format!("{}/project_details/", prefix), post(project_details))
        .route(&format!("{}/download_tutorial/", prefix), get(download_tutorial))
}

// ── Multipart form ────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct UploadForm {
    project: Option<String>,
    file: Option<Bytes>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("project") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid project field: {}", e)))?;
                form.project = Some(text);
            }
            Some("file") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid file field: {}", e)))?;
                form.file = Some(bytes).filter(|b| !b.is_empty());
            }
            _ => {}
        }
    }
    Ok(form)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

async fn analyze_image(State(state): State<SharedState>, multipart: Multipart) -> Result<Json<IdeasReport>, ApiError> {
    let form = read_form(multipart).await?;
    let bytes = form
        .file
        .ok_or_else(|| ApiError::BadRequest("No image file provided".into()))?;

    let upload = state
        .images
        .save(&bytes)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    info!(path = %upload.image().path().display(), "Analyzing image");

    let report = state.ideas.analyze(upload.image().clone()).await.map_err(|e| {
        warn!(error = %e, "Image analysis failed");
        ApiError::Internal("Failed to generate project ideas".into())
    })?;
    if report.is_empty() {
        return Err(ApiError::Internal("Failed to generate project ideas".into()));
    }
    Ok(Json(report))
}

/// Stream the tutorial for a project as NDJSON, one event per line.
///
/// The export file is written once the run has finished; a client that
/// disconnects early cancels the run and leaves the previous export alone.
/// The uploaded photo is removed when the body stream ends or is dropped.
async fn project_details(State(state): State<SharedState>, multipart: Multipart) -> Result<Response, ApiError> {
    let form = read_form(multipart).await?;
    let project = form.project.unwrap_or_default();
    if project.trim().is_empty() {
        return Err(PipelineError::EmptyProjectName.into());
    }

    let mut request = ProjectRequest::new(project);
    let upload = match form.file {
        Some(bytes) => Some(
            state
                .images
                .save(&bytes)
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?,
        ),
        None => None,
    };
    if let Some(upload) = &upload {
        request = request.with_image(upload.image().clone());
    }

    info!(project = request.project(), image = request.image().is_some(), "Project details requested");
    let (mut events, document) = state.orchestrator.run_with_document(request)?;
    let export_path = state.export_path.clone();

    let body = async_stream::stream! {
        let _upload = upload;
        while let Some(event) = events.next().await {
            match event.to_ndjson_line() {
                Ok(line) => {
                    yield Ok::<_, std::io::Error>(line);
                }
                Err(e) => error!(error = %e, "Failed to serialize pipeline event"),
            }
        }
        if let Ok(document) = document.await {
            match write_markdown(&document, &export_path).await {
                Ok(()) => info!(path = %export_path.display(), "Tutorial exported"),
                Err(e) => warn!(error = %e, "Failed to export tutorial"),
            }
        }
    };

    Ok(([(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)], Body::from_stream(body)).into_response())
}

async fn download_tutorial(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let content = match tokio::fs::read(&state.export_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("Tutorial not found".into()));
        }
        Err(e) => return Err(ApiError::Internal(format!("Failed to read tutorial: {}", e))),
    };
    let file_name = state
        .export_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project_tutorial.md".to_string());

    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        content,
    )
        .into_response())
}

// ── Tests ─────────────────────────────────────────────────────────────
