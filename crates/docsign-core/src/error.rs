//! Error types for docsign-core

use crate::lifecycle::LifecycleState;
use shared_pdf::BakeError;
use shared_types::{FieldId, FieldType};
use thiserror::Error;

/// Signature raster could not be produced
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SurfaceError {
    #[error("Failed to encode signature image: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("A submission is already in progress")]
    AlreadyInProgress,

    #[error("Session is already {0}")]
    AlreadyTerminal(LifecycleState),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlobError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Blob storage failed: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A conditional write found the session already signed or expired
    #[error("Session is no longer pending")]
    AlreadyTerminal,

    #[error("Database error: {0}")]
    Database(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(String),

    #[error("Invalid config: {0}")]
    Parse(String),
}

/// Why a signing link cannot be used
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("Signing session not found")]
    NotFound,

    #[error("Signing link has expired")]
    Expired,

    #[error("Document has already been signed")]
    Signed,

    #[error("Session template unavailable: {0}")]
    Template(#[from] TemplateError),

    #[error("Session store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Rejected capture input
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    #[error("Unknown field: {0}")]
    UnknownField(FieldId),

    #[error("Field {field_id} is a {actual} field, not {expected}")]
    WrongFieldType {
        field_id: FieldId,
        expected: FieldType,
        actual: FieldType,
    },

    #[error("Session is {0}; captures are locked")]
    Locked(LifecycleState),

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PublishError {
    #[error("Failed to upload signed document: {0}")]
    Upload(BlobError),

    #[error("Failed to record completion: {0}")]
    Persist(StoreError),

    #[error("Session was completed elsewhere")]
    AlreadyTerminal,
}

/// Outcome of a failed submission
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("A submission is already in progress")]
    AlreadyInProgress,

    #[error("Session is no longer open for signing")]
    AlreadyTerminal,

    #[error("Required field {first_incomplete} is not complete")]
    Incomplete { first_incomplete: FieldId },

    #[error("Template document unavailable: {0}")]
    TemplateUnavailable(String),

    #[error("Failed to bake document: {0}")]
    Bake(#[from] BakeError),

    #[error(transparent)]
    Publish(PublishError),
}

impl SubmitError {
    /// Whether the same session can submit again.
    ///
    /// `false` means the link is dead (or a submission is still running).
    pub fn is_retryable(&self) -> bool {
        match self {
            SubmitError::AlreadyInProgress | SubmitError::AlreadyTerminal => false,
            SubmitError::Incomplete { .. }
            | SubmitError::TemplateUnavailable(_)
            | SubmitError::Bake(_) => true,
            SubmitError::Publish(PublishError::AlreadyTerminal) => false,
            SubmitError::Publish(_) => true,
        }
    }
}

impl From<LifecycleError> for SubmitError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::AlreadyInProgress => SubmitError::AlreadyInProgress,
            LifecycleError::AlreadyTerminal(_) => SubmitError::AlreadyTerminal,
        }
    }
}
