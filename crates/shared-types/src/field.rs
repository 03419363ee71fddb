//! Template field definitions

use crate::completion::BlobReference;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a field, unique within its template
pub type FieldId = String;

/// The closed set of field kinds a template can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Date,
    Checkbox,
    Signature,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text => write!(f, "text"),
            FieldType::Date => write!(f, "date"),
            FieldType::Checkbox => write!(f, "checkbox"),
            FieldType::Signature => write!(f, "signature"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Axis-aligned rectangle, origin at its top-left in template space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One positioned placeholder authored against a template page.
///
/// `position` is measured from the top-left corner of the page, in the same
/// units as the page's MediaBox (PDF points).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateField {
    pub id: FieldId,
    pub field_name: String,
    pub field_type: FieldType,
    /// 1-based page index within the template
    pub page_number: u32,
    pub position: Position,
    pub size: Size,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub placeholder_text: Option<String>,
}

impl TemplateField {
    pub fn rect(&self) -> FieldRect {
        FieldRect {
            x: self.position.x,
            y: self.position.y,
            width: self.size.width,
            height: self.size.height,
        }
    }

    /// Whether the field lies entirely inside a page of the given size
    pub fn fits_within(&self, page_width: f64, page_height: f64) -> bool {
        let r = self.rect();
        r.x >= 0.0
            && r.y >= 0.0
            && r.width > 0.0
            && r.height > 0.0
            && r.x + r.width <= page_width
            && r.y + r.height <= page_height
    }
}

/// A template as served by the template source: metadata, ordered fields,
/// and where the original PDF bytes live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub title: String,
    pub pdf_reference: BlobReference,
    /// Natural authoring order; validation and navigation depend on it
    pub fields: Vec<TemplateField>,
}
