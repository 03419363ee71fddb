//! Document completion and signing core
//!
//! A recipient opens a signing link, fills the template's fields and draws
//! their signature, then submits. Submission validates the captures, bakes
//! them into a copy of the template PDF, stores the result and records the
//! completion, at most once per session.
//!
//! Storage, templates and notifications are reached through the traits in
//! [`ports`]; [`memory`] has in-process implementations.

pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod ports;
pub mod publisher;
pub mod signature_pad;
pub mod validator;

pub use capture::FieldCaptureStore;
pub use config::EngineConfig;
pub use engine::{ActiveSession, EnginePorts, SigningEngine};
pub use error::{
    BlobError, CaptureError, ConfigError, LifecycleError, NotifyError, PublishError,
    SessionError, StoreError, SubmitError, SurfaceError, TemplateError,
};
pub use lifecycle::{LifecycleState, SessionLifecycle, SubmitGuard};
pub use ports::{BlobStore, Notifier, SessionRecord, SessionStore, TemplateSource};
pub use publisher::CompletionPublisher;
pub use signature_pad::{SignaturePad, MAX_STROKE_POINTS};
pub use validator::{first_incomplete, is_complete, ValidationSummary};

// Re-export the shared crates so callers need only this one
pub use shared_pdf::{self, BakeOptions, BakeReport, BakeWarning};
pub use shared_types::{self, *};
