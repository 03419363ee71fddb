//! Error types for DocSign API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docsign_core::{CaptureError, SessionError, StoreError, SubmitError, TemplateError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Session not found")]
    SessionNotFound,

    #[error("Session expired")]
    SessionExpired,

    #[error("Document already signed")]
    SessionSigned,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Capture rejected: {0}")]
    Capture(CaptureError),

    #[error("Submit failed: {0}")]
    Submit(SubmitError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => ApiError::SessionNotFound,
            SessionError::Expired => ApiError::SessionExpired,
            SessionError::Signed => ApiError::SessionSigned,
            SessionError::Template(TemplateError::NotFound(id)) => {
                ApiError::NotFound(format!("Template {}", id))
            }
            SessionError::Template(e) => ApiError::Internal(e.into()),
            SessionError::Store(e) => ApiError::Store(e),
        }
    }
}

impl From<CaptureError> for ApiError {
    fn from(err: CaptureError) -> Self {
        ApiError::Capture(err)
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        ApiError::Submit(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut first_incomplete = None;
        let (status, message) = match &self {
            ApiError::SessionNotFound => {
                (StatusCode::NOT_FOUND, "Session not found".to_string())
            }
            ApiError::SessionExpired => (StatusCode::GONE, "Session has expired".to_string()),
            ApiError::SessionSigned => (
                StatusCode::GONE,
                "Document has already been signed".to_string(),
            ),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Capture(err) => match err {
                CaptureError::UnknownField(_) => (StatusCode::NOT_FOUND, err.to_string()),
                CaptureError::Locked(_) => (StatusCode::CONFLICT, err.to_string()),
                CaptureError::WrongFieldType { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
                CaptureError::Surface(_) => {
                    tracing::error!("Signature surface error: {}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                }
            },
            ApiError::Submit(err) => match err {
                SubmitError::AlreadyInProgress => (StatusCode::CONFLICT, err.to_string()),
                SubmitError::AlreadyTerminal => (StatusCode::GONE, err.to_string()),
                SubmitError::Incomplete { first_incomplete: field } => {
                    first_incomplete = Some(field.clone());
                    (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
                }
                SubmitError::Bake(_) => {
                    tracing::error!("Bake failed: {}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                }
                SubmitError::TemplateUnavailable(_) | SubmitError::Publish(_) => {
                    tracing::error!("Submission failed: {}", err);
                    let status = if err.is_retryable() {
                        StatusCode::SERVICE_UNAVAILABLE
                    } else {
                        StatusCode::GONE
                    };
                    (status, err.to_string())
                }
            },
            ApiError::Store(e) => {
                tracing::error!("Storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                )
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        let mut body = json!({
            "error": message,
            "status": status.as_u16(),
        });
        if let (Some(field), Some(obj)) = (first_incomplete, body.as_object_mut()) {
            obj.insert("first_incomplete".to_string(), json!(field));
        }

        (status, Json(body)).into_response()
    }
}
