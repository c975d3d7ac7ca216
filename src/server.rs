use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    config::{AppConfig, ModelMeta},
    error::ServiceError,
    model::{InferenceRuntime, PredictionResponse},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub runtime: Arc<InferenceRuntime>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
    num_classes: usize,
    classes: Vec<String>,
    model_path: String,
    model_meta: ModelMeta,
}

#[derive(Serialize)]
struct LabelsResponse {
    num_classes: usize,
    classes: Vec<String>,
}

pub fn build_router(config: Arc<AppConfig>, runtime: Arc<InferenceRuntime>) -> Router {
    let body_limit = config.max_upload_bytes;
    let state = AppState { runtime, config };

    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/labels", get(labels))
        .route("/predict", post(predict))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn home(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "Fruit Quality Classification API (VGG16)",
        "classes": state.runtime.classes(),
        "endpoints": {
            "health": "GET  /health",
            "labels": "GET  /labels",
            "predict": "POST /predict  form-data: file=<image>",
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let runtime = &state.runtime;
    Json(HealthResponse {
        status: "healthy",
        model_loaded: runtime.is_loaded(),
        num_classes: runtime.classes().len(),
        classes: runtime.classes().to_vec(),
        model_path: state.config.model_path.display().to_string(),
        model_meta: runtime.meta().clone(),
    })
}

async fn labels(State(state): State<AppState>) -> Json<LabelsResponse> {
    let classes = state.runtime.classes().to_vec();
    Json(LabelsResponse {
        num_classes: classes.len(),
        classes,
    })
}

async fn predict(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PredictionResponse>, ServiceError> {
    if !state.runtime.is_loaded() {
        return Err(ServiceError::ModelUnavailable);
    }

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        // parts without a filename are plain form values, not uploads
        let Some(file_name) = field
            .file_name()
            .filter(|_| field.name() == Some("file"))
            .map(str::to_string)
        else {
            continue;
        };
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, data));
        break;
    }

    let (file_name, data) =
        upload.ok_or_else(|| ServiceError::BadRequest("No file uploaded".into()))?;
    if file_name.is_empty() {
        return Err(ServiceError::BadRequest("No file selected".into()));
    }
    info!(file = %file_name, bytes = data.len(), "received image");

    let response = state.runtime.predict(data.to_vec()).await?;
    Ok(Json(response))
}

fn multipart_error(err: MultipartError) -> ServiceError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge(err.body_text())
    } else {
        ServiceError::BadRequest(err.body_text())
    }
}
