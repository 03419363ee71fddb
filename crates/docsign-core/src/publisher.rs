//! Completion publisher: upload, persist, notify
//!
//! Upload and persist are the durable path; a failure in either leaves no
//! `CompletedDocument` behind. The notification runs as a detached task and
//! its outcome never reaches the caller.

use crate::error::{PublishError, StoreError};
use crate::ports::{BlobStore, Notifier, SessionRecord, SessionStore};
use chrono::Utc;
use shared_types::{hash_document, CaptureSnapshot, CompletedDocument};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct CompletionPublisher {
    blobs: Arc<dyn BlobStore>,
    sessions: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    prefix: String,
}

impl CompletionPublisher {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        sessions: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            blobs,
            sessions,
            notifier,
            prefix: prefix.into(),
        }
    }

    /// Fresh output path for one signing request
    fn output_path(&self, signing_request_id: &str) -> String {
        format!(
            "{}/{}/{}.pdf",
            self.prefix.trim_end_matches('/'),
            signing_request_id,
            Uuid::new_v4()
        )
    }

    pub async fn publish(
        &self,
        record: &SessionRecord,
        baked: Vec<u8>,
        captures: CaptureSnapshot,
    ) -> Result<CompletedDocument, PublishError> {
        let signing_request_id = record.session.signing_request_id.clone();
        let output_sha256 = hash_document(&baked);

        let path = self.output_path(&signing_request_id);
        let reference = self
            .blobs
            .upload(&path, baked)
            .await
            .map_err(PublishError::Upload)?;

        let document = CompletedDocument {
            signing_request_id,
            recipient_id: record.session.recipient_id.clone(),
            output_blob_reference: reference,
            completion_data: captures,
            output_sha256,
            completed_at: Utc::now(),
        };

        if let Err(err) = self
            .sessions
            .record_completion(&record.session.id, &document)
            .await
        {
            // The upload is unreferenced now
            if let Err(cleanup) = self.blobs.delete(&document.output_blob_reference).await {
                warn!(
                    blob = %document.output_blob_reference,
                    "Failed to remove orphaned upload: {}", cleanup
                );
            }
            return Err(match err {
                StoreError::AlreadyTerminal => PublishError::AlreadyTerminal,
                other => PublishError::Persist(other),
            });
        }

        info!(
            session_id = %record.session.id,
            signing_request_id = %document.signing_request_id,
            blob = %document.output_blob_reference,
            "Document completed"
        );

        self.spawn_notifications(record);
        Ok(document)
    }

    /// Tell the recipient, and the request owner when known, without waiting
    fn spawn_notifications(&self, record: &SessionRecord) {
        let notifier = Arc::clone(&self.notifier);
        let title = record.request.document_title.clone();
        let name = record.recipient.name.clone();
        let mut addresses = vec![record.recipient.email.clone()];
        if let Some(owner) = record.request.owner_email.clone() {
            if owner != record.recipient.email {
                addresses.push(owner);
            }
        }

        tokio::spawn(async move {
            for email in addresses {
                // Don't fail the signing process if email fails
                if let Err(e) = notifier.notify_completion(&title, &name, &email).await {
                    error!(email = %email, "Completion notification failed: {}", e);
                }
            }
        });
    }
}
