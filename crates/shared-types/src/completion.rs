//! Completion records and blob references

use crate::field::FieldId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Captured values keyed by field id, as persisted for audit
pub type CaptureSnapshot = BTreeMap<FieldId, String>;

/// Opaque handle to a stored blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobReference(pub String);

impl BlobReference {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted output of a successful bake. At most one exists per signing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedDocument {
    pub signing_request_id: String,
    pub recipient_id: String,
    pub output_blob_reference: BlobReference,
    pub completion_data: CaptureSnapshot,
    /// SHA-256 of the baked PDF bytes, hex encoded
    pub output_sha256: String,
    pub completed_at: DateTime<Utc>,
}

/// Compute SHA-256 hash of document bytes
pub fn hash_document(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
