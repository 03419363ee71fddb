//! Shared PDF handling utilities
//!
//! This crate provides PDF loading, coordinate transformation between the
//! on-screen overlay and PDF page space, and the document baker that draws
//! captured field values onto a copy of a template.

pub mod bake;
pub mod coords;
pub mod document;
pub mod error;
pub mod image;

pub use bake::{bake, BakeOptions, BakeReport, BakeWarning, DocumentBaker};
pub use coords::{from_overlay, from_pdf_space, to_overlay, to_page_space, to_pdf_space};
pub use coords::{OverlayRect, PdfPoint, PdfRect};
pub use document::{PageBox, PdfDocument};
pub use error::{BakeError, ImageError, PdfError};
pub use image::{decode_signature_payload, SignatureImage};
