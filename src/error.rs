//! Request-level error taxonomy and its single transport mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Closed set of failures a request can surface.
///
/// Layers construct their own narrow variants; the [`IntoResponse`] impl
/// below is the only place variants turn into status codes and wire
/// envelopes.
#[derive(Debug, Error)]
pub enum AppError {
    /// Client sent something we refuse to process (bad extension, missing
    /// field, malformed multipart).
    #[error("{0}")]
    Validation(String),

    /// The staging write to object storage failed.
    #[error("{0}")]
    FileUpload(String),

    /// The requested prompt id is not in the catalog.
    #[error("{0}")]
    PromptNotFound(String),

    /// The OCR provider rejected or failed the request.
    #[error("{0}")]
    OcrProcessing(String),

    /// A staged object could not be read back.
    #[error("{0}")]
    FileNotFound(String),

    /// Object storage is unreachable or refused to provision the bucket.
    #[error("{0}")]
    StorageConnection(String),

    /// The prompt definitions could not be loaded.
    #[error("{0}")]
    CatalogUnavailable(String),

    /// Anything that escaped the taxonomy above.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code reported in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::FileUpload(_) => "FILE_UPLOAD_ERROR",
            AppError::PromptNotFound(_) => "PROMPT_NOT_FOUND",
            AppError::OcrProcessing(_) => "OCR_PROCESSING_ERROR",
            AppError::FileNotFound(_)
            | AppError::StorageConnection(_)
            | AppError::CatalogUnavailable(_)
            | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg)
            | AppError::FileUpload(msg)
            | AppError::PromptNotFound(msg)
            | AppError::OcrProcessing(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            // Operational faults: log the detail, return an opaque message.
            _ => {
                tracing::error!("internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected internal error occurred.".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

// ============================================================================
// Tests
// ============================================================================
