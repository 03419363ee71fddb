//! Signing engine: session lookup, capture and submission
//!
//! [`SigningEngine`] resolves link tokens into [`ActiveSession`]s. An active
//! session owns the recipient's captures and signature surfaces, and runs the
//! submit pipeline: validate, fetch the template, bake, publish.

use crate::capture::FieldCaptureStore;
use crate::config::EngineConfig;
use crate::error::{
    CaptureError, PublishError, SessionError, StoreError, SubmitError, TemplateError,
};
use crate::lifecycle::{LifecycleState, SessionLifecycle};
use crate::ports::{BlobStore, Notifier, SessionRecord, SessionStore, TemplateSource};
use crate::publisher::CompletionPublisher;
use crate::signature_pad::SignaturePad;
use crate::validator::{self, ValidationSummary};
use chrono::Utc;
use shared_pdf::DocumentBaker;
use shared_types::{
    CaptureSnapshot, CompletedDocument, FieldId, FieldType, SessionStatus, SigningSession,
    Template, TemplateField,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// The collaborators an engine is wired to
#[derive(Clone)]
pub struct EnginePorts {
    pub templates: Arc<dyn TemplateSource>,
    pub blobs: Arc<dyn BlobStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub notifier: Arc<dyn Notifier>,
}

struct EngineInner {
    config: EngineConfig,
    ports: EnginePorts,
    baker: DocumentBaker,
    publisher: CompletionPublisher,
}

#[derive(Clone)]
pub struct SigningEngine {
    inner: Arc<EngineInner>,
}

impl SigningEngine {
    pub fn new(config: EngineConfig, ports: EnginePorts) -> Self {
        let publisher = CompletionPublisher::new(
            Arc::clone(&ports.blobs),
            Arc::clone(&ports.sessions),
            Arc::clone(&ports.notifier),
            config.signed_blob_prefix.clone(),
        );
        let baker = DocumentBaker::new(config.bake.clone());
        Self {
            inner: Arc::new(EngineInner {
                config,
                ports,
                baker,
                publisher,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Resolve a link token to a usable session.
    ///
    /// A pending session whose deadline has passed, or whose view allowance
    /// is exhausted, is marked expired in the store on the way out.
    pub async fn get_session(&self, token: &str) -> Result<SessionRecord, SessionError> {
        let record = self
            .inner
            .ports
            .sessions
            .load_session(token)
            .await?
            .ok_or(SessionError::NotFound)?;

        match record.session.status {
            SessionStatus::Signed => return Err(SessionError::Signed),
            SessionStatus::Expired => return Err(SessionError::Expired),
            SessionStatus::Pending => {}
        }

        let now = Utc::now();
        let session = &record.session;
        let exhausted = self.inner.config.access_exhausted(session.access_count);
        if session.is_past_deadline(now) || exhausted {
            info!(
                session_id = %session.id,
                access_count = session.access_count,
                "Signing link expired"
            );
            match self
                .inner
                .ports
                .sessions
                .update_session_status(&session.id, SessionStatus::Expired, now)
                .await
            {
                Ok(()) | Err(StoreError::AlreadyTerminal) => {}
                Err(err) => {
                    warn!(session_id = %session.id, "Failed to mark session expired: {}", err)
                }
            }
            return Err(SessionError::Expired);
        }

        Ok(record)
    }

    pub async fn get_fields(&self, template_id: &str) -> Result<Vec<TemplateField>, TemplateError> {
        Ok(self.inner.ports.templates.template(template_id).await?.fields)
    }

    /// Resolve a token and start a capture workspace for it
    pub async fn open_session(&self, token: &str) -> Result<ActiveSession, SessionError> {
        let record = self.get_session(token).await?;
        self.activate(record).await
    }

    /// Start a capture workspace for a record already returned by
    /// [`get_session`](Self::get_session)
    pub async fn activate(&self, record: SessionRecord) -> Result<ActiveSession, SessionError> {
        let template = self
            .inner
            .ports
            .templates
            .template(&record.request.template_id)
            .await?;

        info!(
            session_id = %record.session.id,
            template_id = %template.id,
            fields = template.fields.len(),
            "Signing session opened"
        );

        let lifecycle = SessionLifecycle::new(LifecycleState::from(record.session.status));
        Ok(ActiveSession {
            engine: Arc::clone(&self.inner),
            record,
            template: Arc::new(template),
            workspace: Mutex::new(Workspace::default()),
            lifecycle,
        })
    }
}

#[derive(Default)]
struct Workspace {
    captures: FieldCaptureStore,
    pads: HashMap<FieldId, SignaturePad>,
}

/// One recipient's open signing session
pub struct ActiveSession {
    engine: Arc<EngineInner>,
    record: SessionRecord,
    template: Arc<Template>,
    workspace: Mutex<Workspace>,
    lifecycle: SessionLifecycle,
}

impl ActiveSession {
    /// The session as loaded when it was opened
    pub fn session(&self) -> &SigningSession {
        &self.record.session
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn fields(&self) -> &[TemplateField] {
        &self.template.fields
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    fn workspace(&self) -> MutexGuard<'_, Workspace> {
        self.workspace.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn field(&self, field_id: &str) -> Result<&TemplateField, CaptureError> {
        self.template
            .fields
            .iter()
            .find(|f| f.id == field_id)
            .ok_or_else(|| CaptureError::UnknownField(field_id.to_string()))
    }

    fn editable_field(&self, field_id: &str) -> Result<&TemplateField, CaptureError> {
        let state = self.lifecycle.state();
        if state != LifecycleState::Pending {
            return Err(CaptureError::Locked(state));
        }
        self.field(field_id)
    }

    fn signature_field(&self, field_id: &str) -> Result<&TemplateField, CaptureError> {
        let field = self.editable_field(field_id)?;
        if field.field_type != FieldType::Signature {
            return Err(CaptureError::WrongFieldType {
                field_id: field.id.clone(),
                expected: FieldType::Signature,
                actual: field.field_type,
            });
        }
        Ok(field)
    }

    /// Record a text, date or checkbox value
    pub fn capture_field(
        &self,
        field_id: &str,
        value: impl Into<String>,
    ) -> Result<(), CaptureError> {
        let field = self.editable_field(field_id)?;
        self.workspace().captures.set(field.id.clone(), value);
        Ok(())
    }

    pub fn clear_field(&self, field_id: &str) -> Result<(), CaptureError> {
        let field = self.editable_field(field_id)?;
        let mut workspace = self.workspace();
        workspace.captures.clear(&field.id);
        workspace.pads.remove(&field.id);
        Ok(())
    }

    /// Record a finished signature raster (base64 PNG or data URL).
    /// An empty image clears the signature.
    pub fn capture_signature(
        &self,
        field_id: &str,
        image: impl Into<String>,
    ) -> Result<(), CaptureError> {
        let field = self.signature_field(field_id)?;
        let image = image.into();
        let mut workspace = self.workspace();
        workspace.pads.remove(&field.id);
        if image.is_empty() {
            workspace.captures.clear(&field.id);
        } else {
            workspace.captures.set(field.id.clone(), image);
        }
        Ok(())
    }

    /// Draw one pointer stroke on a signature field's surface. Points are in
    /// overlay space relative to the field's top-left corner, at zoom `scale`.
    pub fn draw_stroke(
        &self,
        field_id: &str,
        points: &[(f64, f64)],
        scale: f64,
    ) -> Result<bool, CaptureError> {
        let field = self.signature_field(field_id)?;
        let mut guard = self.workspace();
        let workspace = &mut *guard;
        let pad = workspace
            .pads
            .entry(field.id.clone())
            .or_insert_with(|| {
                SignaturePad::new(field.id.clone(), field.size.width, field.size.height)
            });

        let Some(((x, y), rest)) = points.split_first() else {
            return Ok(false);
        };
        pad.pointer_down(*x, *y, scale);
        for (x, y) in rest {
            pad.pointer_move(*x, *y, scale);
        }
        Ok(pad.pointer_up(&mut workspace.captures)?)
    }

    /// Remove the last stroke drawn on a signature field
    pub fn undo_stroke(&self, field_id: &str) -> Result<bool, CaptureError> {
        let field = self.signature_field(field_id)?;
        let mut guard = self.workspace();
        let workspace = &mut *guard;
        match workspace.pads.get_mut(&field.id) {
            Some(pad) => Ok(pad.undo_stroke(&mut workspace.captures)?),
            None => Ok(false),
        }
    }

    pub fn clear_signature(&self, field_id: &str) -> Result<(), CaptureError> {
        let field = self.signature_field(field_id)?;
        let mut guard = self.workspace();
        let workspace = &mut *guard;
        match workspace.pads.get_mut(&field.id) {
            Some(pad) => pad.clear(&mut workspace.captures),
            None => workspace.captures.clear(&field.id),
        }
        Ok(())
    }

    pub fn captures(&self) -> CaptureSnapshot {
        self.workspace().captures.snapshot()
    }

    pub fn validate(&self) -> ValidationSummary {
        validator::validate(&self.template.fields, self.workspace().captures.values())
    }

    pub fn first_incomplete(&self) -> Option<TemplateField> {
        let workspace = self.workspace();
        validator::first_incomplete(&self.template.fields, workspace.captures.values()).cloned()
    }

    /// Bake and publish the captured document.
    ///
    /// Any failure before the completion is persisted returns the session
    /// to `pending` so the recipient can retry.
    pub async fn submit(&self) -> Result<CompletedDocument, SubmitError> {
        let now = Utc::now();
        if self.record.session.is_past_deadline(now) {
            if self.lifecycle.expire() {
                self.mark_expired(now).await;
            }
            return Err(SubmitError::AlreadyTerminal);
        }

        let guard = self.lifecycle.begin_submit()?;
        let session_id = &self.record.session.id;

        let captures = self.captures();
        if let Some(field) = validator::first_incomplete(&self.template.fields, &captures) {
            return Err(SubmitError::Incomplete {
                first_incomplete: field.id.clone(),
            });
        }

        info!(session_id = %session_id, captures = captures.len(), "Submitting document");

        let original = self
            .engine
            .ports
            .blobs
            .fetch(&self.template.pdf_reference)
            .await
            .map_err(|e| SubmitError::TemplateUnavailable(e.to_string()))?;

        let report = self
            .engine
            .baker
            .bake(&original, &self.template.fields, &captures)?;
        if !report.warnings.is_empty() {
            warn!(
                session_id = %session_id,
                warnings = report.warnings.len(),
                "Document baked with skipped fields"
            );
        }

        let document = match self
            .engine
            .publisher
            .publish(&self.record, report.bytes, captures)
            .await
        {
            Ok(document) => document,
            Err(PublishError::AlreadyTerminal) => {
                drop(guard);
                self.lifecycle.observe_terminal(SessionStatus::Signed);
                return Err(SubmitError::AlreadyTerminal);
            }
            Err(err) => return Err(SubmitError::Publish(err)),
        };

        if let Err(err) = guard.commit_signed() {
            // The completion is already durable
            warn!(session_id = %session_id, "Session changed state during submission: {}", err);
            self.lifecycle.observe_terminal(SessionStatus::Signed);
        }

        let mut workspace = self.workspace();
        workspace.captures.discard();
        workspace.pads.clear();

        Ok(document)
    }

    async fn mark_expired(&self, now: chrono::DateTime<Utc>) {
        let session_id = &self.record.session.id;
        match self
            .engine
            .ports
            .sessions
            .update_session_status(session_id, SessionStatus::Expired, now)
            .await
        {
            Ok(()) | Err(StoreError::AlreadyTerminal) => {}
            Err(err) => {
                warn!(session_id = %session_id, "Failed to mark session expired: {}", err)
            }
        }
    }
}
