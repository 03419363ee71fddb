//! Request and response bodies for DocSign API

use chrono::{DateTime, Utc};
use docsign_core::validator::ValidationSummary;
use docsign_core::{BlobReference, CaptureSnapshot, SessionStatus, TemplateField};
use serde::{Deserialize, Serialize};

/// Register an authored template
#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub title: String,
    pub pdf_base64: String,
    pub fields: Vec<TemplateField>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateResponse {
    pub id: String,
    pub title: String,
    pub pdf_reference: BlobReference,
    pub fields: Vec<TemplateField>,
}

/// Send a template to one recipient
#[derive(Debug, Deserialize)]
pub struct CreateSigningRequest {
    pub template_id: String,
    pub document_title: Option<String>,
    pub recipient_name: String,
    pub recipient_email: String,
    pub owner_email: Option<String>,
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SigningRequestResponse {
    pub signing_request_id: String,
    pub session_id: String,
    /// Link token for the recipient
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// What a recipient sees when opening their link
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub status: SessionStatus,
    pub document_title: String,
    pub recipient_name: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub fields: Vec<TemplateField>,
    pub captures: CaptureSnapshot,
    pub validation: ValidationSummary,
}

#[derive(Debug, Deserialize)]
pub struct FieldValueRequest {
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct SignatureImageRequest {
    /// Base64 PNG or `data:image/png;base64,` URL
    pub image: String,
}

/// One pointer stroke, in overlay coordinates relative to the field
#[derive(Debug, Deserialize)]
pub struct StrokeRequest {
    pub points: Vec<[f64; 2]>,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StrokeResponse {
    /// Whether the field now holds a signature
    pub captured: bool,
    pub validation: ValidationSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub signing_request_id: String,
    pub recipient_id: String,
    pub output_blob_reference: BlobReference,
    pub output_url: String,
    pub output_sha256: String,
    pub completed_at: DateTime<Utc>,
}
