//! End-to-end signing flows over the in-memory collaborators

use async_trait::async_trait;
use docsign_core::memory::{
    InMemoryBlobStore, InMemorySessionStore, InMemoryTemplateSource, RecordingNotifier,
};
use docsign_core::shared_pdf::document::testing::blank_pdf;
use docsign_core::shared_pdf::image::testing::rgba_png_data_url;
use docsign_core::shared_pdf::BakeError;
use docsign_core::{
    BlobError, BlobStore, BlobReference, CaptureError, EngineConfig, EnginePorts, FieldType,
    LifecycleState, Position, PublishError, Recipient, SessionError, SessionRecord, SessionStatus,
    SigningEngine, SigningRequest, SigningSession, Size, SubmitError, Template, TemplateField,
};
use lopdf::content::Content;
use lopdf::{Document, Object};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const TEMPLATE_PATH: &str = "templates/lease.pdf";

fn field(id: &str, field_type: FieldType, required: bool, y: f64) -> TemplateField {
    TemplateField {
        id: id.to_string(),
        field_name: id.to_string(),
        field_type,
        page_number: 1,
        position: Position { x: 72.0, y },
        size: Size {
            width: 180.0,
            height: 36.0,
        },
        required,
        placeholder_text: None,
    }
}

fn record(token: &str) -> SessionRecord {
    SessionRecord {
        session: SigningSession {
            id: format!("sess-{}", token),
            token: token.to_string(),
            recipient_id: "r1".to_string(),
            signing_request_id: format!("req-{}", token),
            status: SessionStatus::Pending,
            access_count: 0,
            expires_at: None,
            signed_at: None,
            expired_at: None,
        },
        recipient: Recipient {
            id: "r1".to_string(),
            name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
        },
        request: SigningRequest {
            id: format!("req-{}", token),
            template_id: "lease".to_string(),
            document_title: "Residential Lease".to_string(),
            owner_email: None,
        },
    }
}

/// Delegates to the in-memory store but yields before every fetch
struct YieldingBlobStore(Arc<InMemoryBlobStore>);

#[async_trait]
impl BlobStore for YieldingBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<BlobReference, BlobError> {
        self.0.upload(path, bytes).await
    }

    async fn resolve(&self, reference: &BlobReference) -> Result<String, BlobError> {
        self.0.resolve(reference).await
    }

    async fn fetch(&self, reference: &BlobReference) -> Result<Vec<u8>, BlobError> {
        tokio::task::yield_now().await;
        self.0.fetch(reference).await
    }

    async fn delete(&self, reference: &BlobReference) -> Result<(), BlobError> {
        self.0.delete(reference).await
    }
}

struct Fixture {
    engine: SigningEngine,
    blobs: Arc<InMemoryBlobStore>,
    sessions: Arc<InMemorySessionStore>,
    notifier: Arc<RecordingNotifier>,
}

fn fixture_with(
    fields: Vec<TemplateField>,
    config: EngineConfig,
    notifier: RecordingNotifier,
) -> Fixture {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let pdf_reference = blobs.put(TEMPLATE_PATH, blank_pdf(&[(612.0, 792.0)]));

    let templates = Arc::new(InMemoryTemplateSource::new());
    templates.insert(Template {
        id: "lease".to_string(),
        title: "Residential Lease".to_string(),
        pdf_reference,
        fields,
    });

    let sessions = Arc::new(InMemorySessionStore::new());
    sessions.insert(record("tok1"));
    let notifier = Arc::new(notifier);

    let engine = SigningEngine::new(
        config,
        EnginePorts {
            templates,
            blobs: Arc::new(YieldingBlobStore(blobs.clone())),
            sessions: sessions.clone(),
            notifier: notifier.clone(),
        },
    );

    Fixture {
        engine,
        blobs,
        sessions,
        notifier,
    }
}

fn fixture(fields: Vec<TemplateField>) -> Fixture {
    fixture_with(fields, EngineConfig::default(), RecordingNotifier::new())
}

fn signature_and_notes() -> Vec<TemplateField> {
    vec![
        field("sig1", FieldType::Signature, true, 600.0),
        field("notes", FieldType::Text, false, 100.0),
    ]
}

async fn output_pdf(f: &Fixture, reference: &BlobReference) -> Document {
    let bytes = f.blobs.fetch(reference).await.unwrap();
    Document::load_mem(&bytes).unwrap()
}

fn shown_text(doc: &Document) -> Vec<String> {
    let page_id = *doc.get_pages().get(&1).unwrap();
    let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
    content
        .operations
        .iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| match op.operands.first() {
            Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        })
        .collect()
}

fn image_count(doc: &Document) -> usize {
    doc.objects
        .values()
        .filter_map(|o| o.as_stream().ok())
        .filter(|s| matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image"))
        .count()
}

#[tokio::test]
async fn test_signature_only_submission_completes_once() {
    let f = fixture(signature_and_notes());
    let session = f.engine.open_session("tok1").await.unwrap();

    session
        .capture_signature("sig1", rgba_png_data_url(60, 20))
        .unwrap();
    let summary = session.validate();
    assert!(summary.complete);
    assert_eq!((summary.required, summary.satisfied), (1, 1));

    let document = session.submit().await.unwrap();
    assert_eq!(document.signing_request_id, "req-tok1");
    assert_eq!(document.recipient_id, "r1");
    assert!(document.completion_data.contains_key("sig1"));
    assert!(!document.completion_data.contains_key("notes"));

    let output = output_pdf(&f, &document.output_blob_reference).await;
    assert_eq!(image_count(&output), 2);

    assert_eq!(session.state(), LifecycleState::Signed);
    assert_eq!(session.submit().await.unwrap_err(), SubmitError::AlreadyTerminal);
    assert_eq!(f.sessions.completion_count(), 1);

    let stored = f.sessions.peek("tok1").unwrap().session;
    assert_eq!(stored.status, SessionStatus::Signed);
    assert!(stored.expired_at.is_some());
    assert_eq!(f.engine.get_session("tok1").await.unwrap_err(), SessionError::Signed);
}

#[tokio::test]
async fn test_template_bytes_unchanged_by_submission() {
    let f = fixture(signature_and_notes());
    let before = f.blobs.fetch(&BlobReference::new(TEMPLATE_PATH)).await.unwrap();

    let session = f.engine.open_session("tok1").await.unwrap();
    session.capture_signature("sig1", rgba_png_data_url(4, 4)).unwrap();
    session.capture_field("notes", "Pets allowed").unwrap();
    let document = session.submit().await.unwrap();

    let after = f.blobs.fetch(&BlobReference::new(TEMPLATE_PATH)).await.unwrap();
    assert_eq!(before, after);
    let output = output_pdf(&f, &document.output_blob_reference).await;
    assert_eq!(shown_text(&output), vec!["Pets allowed".to_string()]);
}

#[tokio::test]
async fn test_unchecked_required_checkbox_counts_as_complete() {
    let f = fixture(vec![field("agree", FieldType::Checkbox, true, 200.0)]);
    let session = f.engine.open_session("tok1").await.unwrap();

    assert!(!session.validate().complete);
    session.capture_field("agree", "false").unwrap();
    assert!(session.validate().complete);
    assert!(session.submit().await.is_ok());
}

#[tokio::test]
async fn test_incomplete_submission_reports_first_missing_field() {
    let f = fixture(vec![
        field("name", FieldType::Text, true, 100.0),
        field("sig1", FieldType::Signature, true, 600.0),
    ]);
    let session = f.engine.open_session("tok1").await.unwrap();
    session.capture_field("name", "Jane Doe").unwrap();

    let err = session.submit().await.unwrap_err();
    assert_eq!(
        err,
        SubmitError::Incomplete {
            first_incomplete: "sig1".to_string()
        }
    );
    assert!(err.is_retryable());
    assert_eq!(session.state(), LifecycleState::Pending);
    assert_eq!(session.first_incomplete().unwrap().id, "sig1");
}

#[tokio::test]
async fn test_upload_failure_keeps_session_pending_then_retry_succeeds() {
    let f = fixture(signature_and_notes());
    let session = f.engine.open_session("tok1").await.unwrap();
    session.capture_signature("sig1", rgba_png_data_url(8, 8)).unwrap();

    f.blobs.set_fail_uploads(true);
    let err = session.submit().await.unwrap_err();
    assert!(matches!(err, SubmitError::Publish(PublishError::Upload(_))));
    assert!(err.is_retryable());
    assert_eq!(session.state(), LifecycleState::Pending);
    assert_eq!(f.sessions.peek("tok1").unwrap().session.status, SessionStatus::Pending);
    assert_eq!(f.sessions.completion_count(), 0);
    // Captures survive a failed attempt
    assert!(session.captures().contains_key("sig1"));

    f.blobs.set_fail_uploads(false);
    assert!(session.submit().await.is_ok());
    assert_eq!(f.sessions.completion_count(), 1);
}

#[tokio::test]
async fn test_unreadable_template_keeps_session_pending_then_retry_succeeds() {
    let f = fixture(signature_and_notes());
    let session = f.engine.open_session("tok1").await.unwrap();
    session.capture_signature("sig1", rgba_png_data_url(8, 8)).unwrap();

    let original = f.blobs.fetch(&BlobReference::new(TEMPLATE_PATH)).await.unwrap();
    f.blobs.put(TEMPLATE_PATH, b"<!DOCTYPE html><html></html>".to_vec());
    let err = session.submit().await.unwrap_err();
    assert!(matches!(err, SubmitError::Bake(BakeError::Load(_))), "{:?}", err);
    assert!(err.is_retryable());
    assert_eq!(session.state(), LifecycleState::Pending);
    assert_eq!(f.sessions.peek("tok1").unwrap().session.status, SessionStatus::Pending);
    assert_eq!(f.sessions.completion_count(), 0);
    assert_eq!(f.blobs.paths(), vec![TEMPLATE_PATH.to_string()]);
    assert!(session.captures().contains_key("sig1"));

    f.blobs.put(TEMPLATE_PATH, original);
    assert!(session.submit().await.is_ok());
    assert_eq!(session.state(), LifecycleState::Signed);
    assert_eq!(f.sessions.completion_count(), 1);
}

#[tokio::test]
async fn test_missing_template_blob_is_retryable() {
    let f = fixture(signature_and_notes());
    let session = f.engine.open_session("tok1").await.unwrap();
    session.capture_signature("sig1", rgba_png_data_url(8, 8)).unwrap();

    let reference = BlobReference::new(TEMPLATE_PATH);
    let original = f.blobs.fetch(&reference).await.unwrap();
    f.blobs.delete(&reference).await.unwrap();

    let err = session.submit().await.unwrap_err();
    assert!(matches!(err, SubmitError::TemplateUnavailable(_)), "{:?}", err);
    assert!(err.is_retryable());
    assert_eq!(session.state(), LifecycleState::Pending);
    assert_eq!(f.sessions.completion_count(), 0);

    f.blobs.put(TEMPLATE_PATH, original);
    assert!(session.submit().await.is_ok());
    assert_eq!(f.sessions.completion_count(), 1);
}

#[tokio::test]
async fn test_notification_failure_still_signs() {
    let f = fixture_with(
        signature_and_notes(),
        EngineConfig::default(),
        RecordingNotifier::failing(),
    );
    let session = f.engine.open_session("tok1").await.unwrap();
    session.capture_signature("sig1", rgba_png_data_url(8, 8)).unwrap();

    assert!(session.submit().await.is_ok());
    assert_eq!(session.state(), LifecycleState::Signed);
    assert!(f.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_recipient_is_notified() {
    let f = fixture(signature_and_notes());
    let session = f.engine.open_session("tok1").await.unwrap();
    session.capture_signature("sig1", rgba_png_data_url(8, 8)).unwrap();
    session.submit().await.unwrap();

    for _ in 0..100 {
        if !f.notifier.sent().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    let sent = f.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].document_title, "Residential Lease");
    assert_eq!(sent[0].recipient_email, "jane@example.com");
}

#[tokio::test]
async fn test_concurrent_submits_bake_once() {
    let f = fixture(signature_and_notes());
    let session = f.engine.open_session("tok1").await.unwrap();
    session.capture_signature("sig1", rgba_png_data_url(8, 8)).unwrap();

    let (first, second) = tokio::join!(session.submit(), session.submit());
    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(SubmitError::AlreadyInProgress))));
    assert_eq!(f.sessions.completion_count(), 1);
    // Template plus exactly one signed output
    assert_eq!(f.blobs.paths().len(), 2);
}

#[tokio::test]
async fn test_corrupt_signature_does_not_block_completion() {
    let f = fixture(vec![
        field("sig1", FieldType::Signature, true, 600.0),
        field("name", FieldType::Text, true, 100.0),
    ]);
    let session = f.engine.open_session("tok1").await.unwrap();
    session
        .capture_signature("sig1", "data:image/png;base64,bm90IGEgcG5n")
        .unwrap();
    session.capture_field("name", "Jane Doe").unwrap();

    let document = session.submit().await.unwrap();
    let output = output_pdf(&f, &document.output_blob_reference).await;
    assert_eq!(shown_text(&output), vec!["Jane Doe".to_string()]);
    assert_eq!(image_count(&output), 0);
}

#[tokio::test]
async fn test_drawn_signature_is_embedded() {
    let f = fixture(signature_and_notes());
    let session = f.engine.open_session("tok1").await.unwrap();

    let drawn = session
        .draw_stroke("sig1", &[(10.0, 10.0), (60.0, 25.0), (120.0, 12.0)], 1.5)
        .unwrap();
    assert!(drawn);
    assert!(session.validate().complete);

    let document = session.submit().await.unwrap();
    let output = output_pdf(&f, &document.output_blob_reference).await;
    assert_eq!(image_count(&output), 2);
}

#[tokio::test]
async fn test_cleared_signature_is_not_captured() {
    let f = fixture(signature_and_notes());
    let session = f.engine.open_session("tok1").await.unwrap();
    session.draw_stroke("sig1", &[(5.0, 5.0), (40.0, 20.0)], 1.0).unwrap();
    session.clear_signature("sig1").unwrap();

    assert!(!session.captures().contains_key("sig1"));
    assert!(matches!(
        session.submit().await,
        Err(SubmitError::Incomplete { .. })
    ));
}

#[tokio::test]
async fn test_undo_last_stroke_clears_capture() {
    let f = fixture(signature_and_notes());
    let session = f.engine.open_session("tok1").await.unwrap();
    session.draw_stroke("sig1", &[(5.0, 5.0), (40.0, 20.0)], 1.0).unwrap();
    assert!(!session.undo_stroke("sig1").unwrap());
    assert!(!session.captures().contains_key("sig1"));
}

#[tokio::test]
async fn test_capture_rejects_unknown_and_mistyped_fields() {
    let f = fixture(signature_and_notes());
    let session = f.engine.open_session("tok1").await.unwrap();

    assert_eq!(
        session.capture_field("ghost", "x").unwrap_err(),
        CaptureError::UnknownField("ghost".to_string())
    );
    assert!(matches!(
        session.capture_signature("notes", "AAAA"),
        Err(CaptureError::WrongFieldType { .. })
    ));
}

#[tokio::test]
async fn test_captures_locked_after_signing() {
    let f = fixture(signature_and_notes());
    let session = f.engine.open_session("tok1").await.unwrap();
    session.capture_signature("sig1", rgba_png_data_url(8, 8)).unwrap();
    session.submit().await.unwrap();

    assert!(session.captures().is_empty());
    assert_eq!(
        session.capture_field("notes", "late").unwrap_err(),
        CaptureError::Locked(LifecycleState::Signed)
    );
}

#[tokio::test]
async fn test_unknown_token() {
    let f = fixture(signature_and_notes());
    assert_eq!(f.engine.get_session("nope").await.unwrap_err(), SessionError::NotFound);
}

#[tokio::test]
async fn test_past_deadline_expires_link() {
    let f = fixture(signature_and_notes());
    let mut expired = record("old");
    expired.session.expires_at = Some(chrono::Utc::now() - chrono::Duration::hours(1));
    f.sessions.insert(expired);

    assert_eq!(f.engine.get_session("old").await.unwrap_err(), SessionError::Expired);
    let stored = f.sessions.peek("old").unwrap().session;
    assert_eq!(stored.status, SessionStatus::Expired);
    assert!(stored.expired_at.is_some());
    assert_eq!(f.engine.get_session("old").await.unwrap_err(), SessionError::Expired);
}

#[tokio::test]
async fn test_access_count_policy() {
    let config = EngineConfig {
        max_access_count: Some(2),
        ..EngineConfig::default()
    };
    let f = fixture_with(signature_and_notes(), config, RecordingNotifier::new());

    assert!(f.engine.get_session("tok1").await.is_ok());
    assert!(f.engine.get_session("tok1").await.is_ok());
    assert_eq!(f.engine.get_session("tok1").await.unwrap_err(), SessionError::Expired);
    assert_eq!(f.sessions.peek("tok1").unwrap().session.access_count, 3);
}

#[tokio::test]
async fn test_views_never_expire_by_default() {
    let f = fixture(signature_and_notes());
    for _ in 0..10 {
        f.engine.get_session("tok1").await.unwrap();
    }
    assert_eq!(f.sessions.peek("tok1").unwrap().session.access_count, 10);
}

#[tokio::test]
async fn test_get_fields_preserves_order() {
    let f = fixture(signature_and_notes());
    let ids: Vec<String> = f
        .engine
        .get_fields("lease")
        .await
        .unwrap()
        .into_iter()
        .map(|field| field.id)
        .collect();
    assert_eq!(ids, vec!["sig1".to_string(), "notes".to_string()]);
}
