//! Shared data model for template-based document completion.
//!
//! Everything here is plain data: templates and their positioned fields,
//! signing sessions, and the persisted completion record.

pub mod completion;
pub mod field;
pub mod session;

pub use completion::{hash_document, BlobReference, CaptureSnapshot, CompletedDocument};
pub use field::{FieldId, FieldRect, FieldType, Position, Size, Template, TemplateField};
pub use session::{ParseStatusError, Recipient, SessionStatus, SigningRequest, SigningSession};
