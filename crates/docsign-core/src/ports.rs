//! Contracts for the collaborators the engine depends on

use crate::error::{BlobError, NotifyError, StoreError, TemplateError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{
    BlobReference, CompletedDocument, Recipient, SessionStatus, SigningRequest, SigningSession,
    Template,
};

/// Template metadata, ordered fields and where the original PDF lives
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn template(&self, template_id: &str) -> Result<Template, TemplateError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path`, returning an opaque reference
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<BlobReference, BlobError>;

    /// A URL the reference can be fetched from
    async fn resolve(&self, reference: &BlobReference) -> Result<String, BlobError>;

    async fn fetch(&self, reference: &BlobReference) -> Result<Vec<u8>, BlobError>;

    async fn delete(&self, reference: &BlobReference) -> Result<(), BlobError>;
}

/// A session together with who it belongs to and what it is for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session: SigningSession,
    pub recipient: Recipient,
    pub request: SigningRequest,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a session by link token, counting the read as one access
    async fn load_session(&self, token: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Move a pending session to `status`, stamping the matching timestamps
    /// with `at`. Fails with [`StoreError::AlreadyTerminal`] when the
    /// session is no longer pending.
    async fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// In one transaction: mark the session signed and access-expired, then
    /// insert `document`. Nothing is written when the session is no longer
    /// pending.
    async fn record_completion(
        &self,
        session_id: &str,
        document: &CompletedDocument,
    ) -> Result<(), StoreError>;

    async fn completed_document(
        &self,
        signing_request_id: &str,
    ) -> Result<Option<CompletedDocument>, StoreError>;
}

/// Best-effort completion notices
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_completion(
        &self,
        document_title: &str,
        recipient_name: &str,
        recipient_email: &str,
    ) -> Result<(), NotifyError>;
}
