//! Server configuration from the environment

use anyhow::{Context, Result};
use docsign_core::EngineConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::state::DEFAULT_SESSION_IDLE_TIMEOUT;

const DEFAULT_PORT: u16 = 3001;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Directory holding template and signed PDFs
    pub blob_root: PathBuf,
    /// Public URL prefix for blobs; `file://` URLs are handed out when unset
    pub blob_public_base_url: Option<String>,
    pub engine: EngineConfig,
    /// Open capture workspaces untouched this long are dropped
    pub session_idle_timeout: Duration,
}

impl Config {
    /// Read configuration from the process environment.
    ///
    /// `DOCSIGN_CONFIG` may name a TOML file with engine settings;
    /// `SIGNING_MAX_ACCESS_COUNT` overrides the file's view allowance.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut engine = match lookup("DOCSIGN_CONFIG") {
            Some(path) => EngineConfig::from_file(Path::new(&path))
                .with_context(|| format!("Failed to load engine config from {}", path))?,
            None => EngineConfig::default(),
        };

        if let Some(max) = lookup("SIGNING_MAX_ACCESS_COUNT") {
            engine.max_access_count = Some(
                max.parse::<u32>()
                    .with_context(|| format!("Invalid SIGNING_MAX_ACCESS_COUNT: {}", max))?,
            );
        }

        let port = match lookup("PORT") {
            Some(port) => port
                .parse::<u16>()
                .with_context(|| format!("Invalid PORT: {}", port))?,
            None => DEFAULT_PORT,
        };

        let session_idle_timeout = match lookup("SESSION_IDLE_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(
                secs.parse::<u64>()
                    .with_context(|| format!("Invalid SESSION_IDLE_TIMEOUT_SECS: {}", secs))?,
            ),
            None => DEFAULT_SESSION_IDLE_TIMEOUT,
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or_else(default_database_url),
            port,
            blob_root: lookup("BLOB_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./blobs")),
            blob_public_base_url: lookup("BLOB_PUBLIC_BASE_URL"),
            engine,
            session_idle_timeout,
        })
    }
}

fn default_database_url() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docsign-api");
    std::fs::create_dir_all(&data_dir).ok();
    format!("sqlite:{}/docsign.db?mode=rwc", data_dir.display())
}

/// Get platform-specific data directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            None
        }
    }
}
