// src/server.rs
//
// HTTP surface: multipart batch submission over axum.
//
// POST /process (alias /api/process)
//   files     repeated file parts
//   settings  JSON ProcessingSettings
// GET /health

use crate::engine::{BatchExecutor, InputItem, ResultRecord};
use crate::error::BatchError;
use crate::settings::ProcessingSettings;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const FILES_FIELD: &str = "files";
const SETTINGS_FIELD: &str = "settings";

/// Client-facing message for any batch-level failure. The cause is logged.
const BATCH_FAILURE_MESSAGE: &str = "Failed to process images";

#[derive(Clone, Debug)]
pub struct AppState {
    executor: Arc<BatchExecutor>,
}

impl AppState {
    pub fn new(executor: Arc<BatchExecutor>) -> Self {
        Self { executor }
    }
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    images: Vec<ResultRecord>,
}

pub fn router(state: AppState, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/process", post(process))
        .route("/api/process", post(process))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[tracing::instrument(skip_all)]
async fn process(State(state): State<AppState>, multipart: Multipart) -> Response {
    match run_request(&state, multipart).await {
        Ok(images) => Json(BatchResponse { images }).into_response(),
        Err(err) => {
            error!(error = %err, "batch request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": BATCH_FAILURE_MESSAGE })),
            )
                .into_response()
        }
    }
}

async fn run_request(
    state: &AppState,
    multipart: Multipart,
) -> Result<Vec<ResultRecord>, BatchError> {
    let (items, settings) = read_form(multipart).await?;
    info!(files = items.len(), format = %settings.format, "batch received");

    // codec work is CPU-bound; keep it off the async workers
    let executor = Arc::clone(&state.executor);
    tokio::task::spawn_blocking(move || executor.run(&items, &settings))
        .await
        .map_err(|e| BatchError::Join(e.to_string()))?
}

async fn read_form(
    mut multipart: Multipart,
) -> Result<(Vec<InputItem>, ProcessingSettings), BatchError> {
    let mut items = Vec::new();
    let mut settings = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| BatchError::Multipart(e.to_string()))?
    {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some(FILES_FIELD) => {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| BatchError::Multipart(e.to_string()))?;
                items.push(InputItem::new(name, bytes.to_vec()));
            }
            Some(SETTINGS_FIELD) => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| BatchError::Multipart(e.to_string()))?;
                settings = Some(ProcessingSettings::from_json(&raw)?);
            }
            _ => {}
        }
    }

    let settings = settings.ok_or(BatchError::MissingField(SETTINGS_FIELD))?;
    Ok((items, settings))
}
