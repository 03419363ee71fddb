//! In-memory collaborators for tests and embedding without a database
//!
//! Each store can be told to fail its write path, so callers can exercise
//! the engine's failure handling.

use crate::error::{BlobError, NotifyError, StoreError, TemplateError};
use crate::ports::{BlobStore, Notifier, SessionRecord, SessionStore, TemplateSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{BlobReference, CompletedDocument, SessionStatus, Template};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct InMemoryTemplateSource {
    templates: Mutex<HashMap<String, Template>>,
}

impl InMemoryTemplateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, template: Template) {
        lock(&self.templates).insert(template.id.clone(), template);
    }
}

#[async_trait]
impl TemplateSource for InMemoryTemplateSource {
    async fn template(&self, template_id: &str) -> Result<Template, TemplateError> {
        lock(&self.templates)
            .get(template_id)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(template_id.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: AtomicBool,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, bytes: Vec<u8>) -> BlobReference {
        lock(&self.blobs).insert(path.to_string(), bytes);
        BlobReference::new(path)
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Stored paths, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = lock(&self.blobs).keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<BlobReference, BlobError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(BlobError::Storage("upload rejected".to_string()));
        }
        Ok(self.put(path, bytes))
    }

    async fn resolve(&self, reference: &BlobReference) -> Result<String, BlobError> {
        if !lock(&self.blobs).contains_key(reference.as_str()) {
            return Err(BlobError::NotFound(reference.to_string()));
        }
        Ok(format!("memory://{}", reference))
    }

    async fn fetch(&self, reference: &BlobReference) -> Result<Vec<u8>, BlobError> {
        lock(&self.blobs)
            .get(reference.as_str())
            .cloned()
            .ok_or_else(|| BlobError::NotFound(reference.to_string()))
    }

    async fn delete(&self, reference: &BlobReference) -> Result<(), BlobError> {
        lock(&self.blobs).remove(reference.as_str());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    /// Keyed by link token
    sessions: Mutex<HashMap<String, SessionRecord>>,
    /// Keyed by signing request id
    completions: Mutex<HashMap<String, CompletedDocument>>,
    fail_persist: AtomicBool,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: SessionRecord) {
        lock(&self.sessions).insert(record.session.token.clone(), record);
    }

    pub fn set_fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    /// Current record without counting an access
    pub fn peek(&self, token: &str) -> Option<SessionRecord> {
        lock(&self.sessions).get(token).cloned()
    }

    pub fn completion_count(&self) -> usize {
        lock(&self.completions).len()
    }
}

fn apply_status(record: &mut SessionRecord, status: SessionStatus, at: DateTime<Utc>) {
    record.session.status = status;
    match status {
        SessionStatus::Signed => {
            record.session.signed_at = Some(at);
            record.session.expired_at = Some(at);
        }
        SessionStatus::Expired => record.session.expired_at = Some(at),
        SessionStatus::Pending => {}
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load_session(&self, token: &str) -> Result<Option<SessionRecord>, StoreError> {
        let mut sessions = lock(&self.sessions);
        Ok(sessions.get_mut(token).map(|record| {
            record.session.access_count = record.session.access_count.saturating_add(1);
            record.clone()
        }))
    }

    async fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut sessions = lock(&self.sessions);
        let record = sessions
            .values_mut()
            .find(|r| r.session.id == session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        if record.session.status != SessionStatus::Pending {
            return Err(StoreError::AlreadyTerminal);
        }
        apply_status(record, status, at);
        Ok(())
    }

    async fn record_completion(
        &self,
        session_id: &str,
        document: &CompletedDocument,
    ) -> Result<(), StoreError> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(StoreError::Database("write rejected".to_string()));
        }
        let mut sessions = lock(&self.sessions);
        let mut completions = lock(&self.completions);

        let record = sessions
            .values_mut()
            .find(|r| r.session.id == session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        if record.session.status != SessionStatus::Pending
            || completions.contains_key(&document.signing_request_id)
        {
            return Err(StoreError::AlreadyTerminal);
        }

        apply_status(record, SessionStatus::Signed, document.completed_at);
        completions.insert(document.signing_request_id.clone(), document.clone());
        Ok(())
    }

    async fn completed_document(
        &self,
        signing_request_id: &str,
    ) -> Result<Option<CompletedDocument>, StoreError> {
        Ok(lock(&self.completions).get(signing_request_id).cloned())
    }
}

/// A notice handed to [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotice {
    pub document_title: String,
    pub recipient_name: String,
    pub recipient_email: String,
}

/// Records notices instead of sending them
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotice>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn sent(&self) -> Vec<SentNotice> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_completion(
        &self,
        document_title: &str,
        recipient_name: &str,
        recipient_email: &str,
    ) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("mail relay unreachable".to_string()));
        }
        lock(&self.sent).push(SentNotice {
            document_title: document_title.to_string(),
            recipient_name: recipient_name.to_string(),
            recipient_email: recipient_email.to_string(),
        });
        Ok(())
    }
}
