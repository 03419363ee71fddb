//! Completion validation: are all required fields satisfied?
//!
//! Per-type rules:
//! - signature: a non-empty capture exists
//! - checkbox: any capture exists; an explicit unchecked value still counts
//! - text and date: the capture is non-empty after trimming whitespace

use serde::{Deserialize, Serialize};
use shared_types::{CaptureSnapshot, FieldId, FieldType, TemplateField};

/// Result of validating captures against a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub complete: bool,
    /// Earliest required field, in template order, that is not satisfied
    pub first_incomplete: Option<FieldId>,
    pub required: usize,
    pub satisfied: usize,
}

pub fn is_satisfied(field: &TemplateField, captures: &CaptureSnapshot) -> bool {
    let value = captures.get(&field.id);
    match field.field_type {
        FieldType::Signature => value.is_some_and(|v| !v.is_empty()),
        FieldType::Checkbox => value.is_some(),
        FieldType::Text | FieldType::Date => value.is_some_and(|v| !v.trim().is_empty()),
    }
}

pub fn is_complete(fields: &[TemplateField], captures: &CaptureSnapshot) -> bool {
    first_incomplete(fields, captures).is_none()
}

pub fn first_incomplete<'a>(
    fields: &'a [TemplateField],
    captures: &CaptureSnapshot,
) -> Option<&'a TemplateField> {
    fields
        .iter()
        .filter(|f| f.required)
        .find(|f| !is_satisfied(f, captures))
}

pub fn validate(fields: &[TemplateField], captures: &CaptureSnapshot) -> ValidationSummary {
    let required: Vec<&TemplateField> = fields.iter().filter(|f| f.required).collect();
    let satisfied = required
        .iter()
        .filter(|f| is_satisfied(f, captures))
        .count();
    let first_incomplete = first_incomplete(fields, captures).map(|f| f.id.clone());

    ValidationSummary {
        complete: first_incomplete.is_none(),
        first_incomplete,
        required: required.len(),
        satisfied,
    }
}
