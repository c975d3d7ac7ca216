use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Model not loaded")]
    ModelUnavailable,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
    #[error("model execution failed: {0}")]
    Inference(String),
    #[error("dataset error: {0}")]
    Dataset(String),
    #[error("invalid class file: {0}")]
    Labels(String),
    #[error("torch error: {0}")]
    Torch(#[from] tch::TchError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("other: {0}")]
    Other(String),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::BadRequest(_) | ServiceError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            ServiceError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::ModelUnavailable
            | ServiceError::Checkpoint(_)
            | ServiceError::Inference(_)
            | ServiceError::Torch(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Dataset(_) | ServiceError::Labels(_) | ServiceError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
