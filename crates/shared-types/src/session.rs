//! Signing sessions and the parties attached to them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Persisted status of a signing session.
///
/// `Signed` and `Expired` are terminal. The transient "signing in progress"
/// state is never persisted; it exists only in the submission state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Pending,
    Signed,
    Expired,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Signed | SessionStatus::Expired)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Signed => "signed",
            SessionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown session status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for SessionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "signed" => Ok(SessionStatus::Signed),
            "expired" => Ok(SessionStatus::Expired),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// The person asked to complete a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// A request to have one template completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningRequest {
    pub id: String,
    pub template_id: String,
    pub document_title: String,
    /// Staff member who sent the request, notified on completion
    #[serde(default)]
    pub owner_email: Option<String>,
}

/// One recipient's single-use attempt at one signing request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningSession {
    pub id: String,
    /// Opaque link token handed to the recipient
    pub token: String,
    pub recipient_id: String,
    pub signing_request_id: String,
    pub status: SessionStatus,
    /// Incremented on every view, never decremented
    pub access_count: u32,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signed_at: Option<DateTime<Utc>>,
    /// Set when the link stops being usable, including after signing
    #[serde(default)]
    pub expired_at: Option<DateTime<Utc>>,
}

impl SigningSession {
    /// Whether the link's deadline has passed at `now`
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}
