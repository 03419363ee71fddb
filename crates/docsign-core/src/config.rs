//! Engine configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use shared_pdf::BakeOptions;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Expire a link once it has been viewed more than this many times.
    /// `None` means views never expire a link.
    pub max_access_count: Option<u32>,
    pub bake: BakeOptions,
    /// Blob path prefix for baked outputs
    pub signed_blob_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_access_count: None,
            bake: BakeOptions::default(),
            signed_blob_prefix: "signed".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Whether `access_count` views exceed the configured allowance
    pub fn access_exhausted(&self, access_count: u32) -> bool {
        self.max_access_count
            .is_some_and(|max| access_count > max)
    }
}
