//! Per-session field capture store

use shared_types::{CaptureSnapshot, FieldId};

/// Captured values for one signing session, keyed by field id.
///
/// Last write wins. A cleared field is absent, never stored as empty.
#[derive(Debug, Clone, Default)]
pub struct FieldCaptureStore {
    values: CaptureSnapshot,
}

impl FieldCaptureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field_id: impl Into<FieldId>, value: impl Into<String>) {
        self.values.insert(field_id.into(), value.into());
    }

    pub fn get(&self, field_id: &str) -> Option<&str> {
        self.values.get(field_id).map(String::as_str)
    }

    pub fn clear(&mut self, field_id: &str) {
        self.values.remove(field_id);
    }

    /// Copy of every captured value
    pub fn snapshot(&self) -> CaptureSnapshot {
        self.values.clone()
    }

    /// Borrow the values without copying
    pub fn values(&self) -> &CaptureSnapshot {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn discard(&mut self) {
        self.values.clear();
    }
}
