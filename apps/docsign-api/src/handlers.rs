//! HTTP handlers for DocSign API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use docsign_core::validator::ValidationSummary;
use docsign_core::shared_pdf::PdfDocument;
use docsign_core::{
    ActiveSession, BlobStore, CompletedDocument, Recipient, SessionRecord, SessionStatus,
    SigningRequest, SigningSession, SubmitError, Template, TemplateField, TemplateSource,
    MAX_STROKE_POINTS,
};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Register a template whose fields were authored elsewhere
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<TemplateResponse>), ApiError> {
    let pdf_data = BASE64
        .decode(&req.pdf_base64)
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid PDF base64: {}", e)))?;
    check_template_fields(&pdf_data, &req.fields)?;

    let template_id = Uuid::new_v4().to_string();
    let pdf_reference = state
        .blobs
        .upload(&format!("templates/{}.pdf", template_id), pdf_data)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    let template = Template {
        id: template_id,
        title: req.title,
        pdf_reference,
        fields: req.fields,
    };
    state.store.create_template(&template).await?;

    tracing::info!("Created template: {}", template.id);

    Ok((
        StatusCode::CREATED,
        Json(TemplateResponse {
            id: template.id,
            title: template.title,
            pdf_reference: template.pdf_reference,
            fields: template.fields,
        }),
    ))
}

/// Every field must have a unique id and lie on a page of the document
fn check_template_fields(pdf_data: &[u8], fields: &[TemplateField]) -> Result<(), ApiError> {
    let invalid = |msg: String| -> Result<(), ApiError> { Err(ApiError::InvalidRequest(msg)) };

    let document = PdfDocument::from_bytes(pdf_data)
        .map_err(|e| ApiError::InvalidRequest(format!("Document is not a readable PDF: {}", e)))?;
    let page_count = document.page_count();

    let mut seen = HashSet::new();
    for field in fields {
        if field.id.is_empty() {
            return invalid("Field ids must not be empty".to_string());
        }
        if !seen.insert(field.id.as_str()) {
            return invalid(format!("Duplicate field id {}", field.id));
        }

        let rect = field.rect();
        let finite = [rect.x, rect.y, rect.width, rect.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite || rect.width <= 0.0 || rect.height <= 0.0 {
            return invalid(format!("Field {} must have a positive size", field.id));
        }

        if field.page_number == 0 || field.page_number as usize > page_count {
            return invalid(format!(
                "Field {} is on page {}; the document has pages 1 to {}",
                field.id, field.page_number, page_count
            ));
        }
        let page = document.page_box(field.page_number).map_err(|e| {
            ApiError::InvalidRequest(format!("Page {} has no usable size: {}", field.page_number, e))
        })?;
        if !field.fits_within(page.width, page.height) {
            return invalid(format!(
                "Field {} extends outside page {} ({} x {})",
                field.id, field.page_number, page.width, page.height
            ));
        }
    }
    Ok(())
}

/// Create a signing request and the recipient's session link
pub async fn create_signing_request(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSigningRequest>,
) -> Result<(StatusCode, Json<SigningRequestResponse>), ApiError> {
    let template = state
        .store
        .template(&req.template_id)
        .await
        .map_err(|_| ApiError::NotFound(format!("Template {}", req.template_id)))?;

    let expires_at = match req.expires_in_hours {
        None => None,
        Some(hours) if hours <= 0 => {
            return Err(ApiError::InvalidRequest(
                "expires_in_hours must be positive".to_string(),
            ))
        }
        Some(hours) => Some(
            chrono::Duration::try_hours(hours)
                .and_then(|d| Utc::now().checked_add_signed(d))
                .ok_or_else(|| {
                    ApiError::InvalidRequest(format!("expires_in_hours {} is too large", hours))
                })?,
        ),
    };

    let request_id = Uuid::new_v4().to_string();
    let recipient_id = Uuid::new_v4().to_string();
    let record = SessionRecord {
        session: SigningSession {
            id: Uuid::new_v4().to_string(),
            token: Uuid::new_v4().simple().to_string(),
            recipient_id: recipient_id.clone(),
            signing_request_id: request_id.clone(),
            status: SessionStatus::Pending,
            access_count: 0,
            expires_at,
            signed_at: None,
            expired_at: None,
        },
        recipient: Recipient {
            id: recipient_id,
            name: req.recipient_name,
            email: req.recipient_email,
        },
        request: SigningRequest {
            id: request_id,
            template_id: template.id,
            document_title: req.document_title.unwrap_or(template.title),
            owner_email: req.owner_email,
        },
    };
    state.store.create_session(&record).await?;

    tracing::info!("Created signing request: {}", record.request.id);

    Ok((
        StatusCode::CREATED,
        Json(SigningRequestResponse {
            signing_request_id: record.request.id,
            session_id: record.session.id,
            token: record.session.token,
            expires_at,
        }),
    ))
}

async fn active(state: &AppState, token: &str) -> Result<Arc<ActiveSession>, ApiError> {
    Ok(state.sessions.get_or_open(&state.engine, token).await?)
}

/// Open a signing link
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.sessions.view(&state.engine, &token).await?;
    let record = session.record();

    Ok(Json(SessionView {
        session_id: record.session.id.clone(),
        status: record.session.status,
        document_title: record.request.document_title.clone(),
        recipient_name: record.recipient.name.clone(),
        expires_at: record.session.expires_at,
        fields: session.fields().to_vec(),
        captures: session.captures(),
        validation: session.validate(),
    }))
}

/// Set a text, date or checkbox value
pub async fn put_field(
    State(state): State<Arc<AppState>>,
    Path((token, field_id)): Path<(String, String)>,
    Json(req): Json<FieldValueRequest>,
) -> Result<Json<ValidationSummary>, ApiError> {
    let session = active(&state, &token).await?;
    session.capture_field(&field_id, req.value)?;
    Ok(Json(session.validate()))
}

/// Store a finished signature image
pub async fn put_signature(
    State(state): State<Arc<AppState>>,
    Path((token, field_id)): Path<(String, String)>,
    Json(req): Json<SignatureImageRequest>,
) -> Result<Json<ValidationSummary>, ApiError> {
    let session = active(&state, &token).await?;
    session.capture_signature(&field_id, req.image)?;
    Ok(Json(session.validate()))
}

pub async fn delete_signature(
    State(state): State<Arc<AppState>>,
    Path((token, field_id)): Path<(String, String)>,
) -> Result<Json<ValidationSummary>, ApiError> {
    let session = active(&state, &token).await?;
    session.clear_signature(&field_id)?;
    Ok(Json(session.validate()))
}

/// Draw one stroke on a signature field
pub async fn post_stroke(
    State(state): State<Arc<AppState>>,
    Path((token, field_id)): Path<(String, String)>,
    Json(req): Json<StrokeRequest>,
) -> Result<Json<StrokeResponse>, ApiError> {
    if !(req.scale.is_finite() && req.scale > 0.0) {
        return Err(ApiError::InvalidRequest("Scale must be positive".to_string()));
    }
    if req.points.len() > MAX_STROKE_POINTS {
        return Err(ApiError::InvalidRequest(format!(
            "A stroke may have at most {} points",
            MAX_STROKE_POINTS
        )));
    }
    if req.points.iter().flatten().any(|v| !v.is_finite()) {
        return Err(ApiError::InvalidRequest(
            "Stroke coordinates must be finite".to_string(),
        ));
    }
    let points: Vec<(f64, f64)> = req.points.iter().map(|[x, y]| (*x, *y)).collect();

    let session = active(&state, &token).await?;
    let captured = session.draw_stroke(&field_id, &points, req.scale)?;
    Ok(Json(StrokeResponse {
        captured,
        validation: session.validate(),
    }))
}

pub async fn undo_stroke(
    State(state): State<Arc<AppState>>,
    Path((token, field_id)): Path<(String, String)>,
) -> Result<Json<StrokeResponse>, ApiError> {
    let session = active(&state, &token).await?;
    let captured = session.undo_stroke(&field_id)?;
    Ok(Json(StrokeResponse {
        captured,
        validation: session.validate(),
    }))
}

pub async fn get_validation(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<ValidationSummary>, ApiError> {
    let session = active(&state, &token).await?;
    Ok(Json(session.validate()))
}

async fn completion_response(
    state: &AppState,
    document: CompletedDocument,
) -> Result<CompletionResponse, ApiError> {
    let output_url = state
        .blobs
        .resolve(&document.output_blob_reference)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(CompletionResponse {
        signing_request_id: document.signing_request_id,
        recipient_id: document.recipient_id,
        output_blob_reference: document.output_blob_reference,
        output_url,
        output_sha256: document.output_sha256,
        completed_at: document.completed_at,
    })
}

/// Bake and publish the recipient's document
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<CompletionResponse>, ApiError> {
    let session = active(&state, &token).await?;
    match session.submit().await {
        Ok(document) => {
            state.sessions.remove(&token).await;
            Ok(Json(completion_response(&state, document).await?))
        }
        Err(err @ SubmitError::AlreadyTerminal) => {
            state.sessions.remove(&token).await;
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

/// Look up the completed document for a signing request
pub async fn get_completed(
    State(state): State<Arc<AppState>>,
    Path(signing_request_id): Path<String>,
) -> Result<Json<CompletionResponse>, ApiError> {
    use docsign_core::SessionStore;

    let document = state
        .store
        .completed_document(&signing_request_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Completion for {}", signing_request_id)))?;
    Ok(Json(completion_response(&state, document).await?))
}
