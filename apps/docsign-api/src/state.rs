//! Application state for DocSign API

use crate::blob::FsBlobStore;
use crate::config::Config;
use crate::notify::LogNotifier;
use crate::store::SqliteStore;
use anyhow::Result;
use chrono::Utc;
use docsign_core::{ActiveSession, EngineConfig, EnginePorts, SessionError, SigningEngine};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// How long an untouched workspace stays open
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub blobs: Arc<FsBlobStore>,
    pub engine: SigningEngine,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub async fn new(config: &Config) -> Result<Self> {
        tracing::info!("Connecting to database: {}", config.database_url);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url)
            .await?;

        let blobs = FsBlobStore::new(&config.blob_root, config.blob_public_base_url.clone());
        let state = Self::with_pool(pool, blobs, config.engine.clone()).await?;
        Ok(state.with_session_idle_timeout(config.session_idle_timeout))
    }

    /// Build state over an existing pool, running migrations first
    pub async fn with_pool(
        pool: SqlitePool,
        blobs: FsBlobStore,
        engine_config: EngineConfig,
    ) -> Result<Self> {
        run_migrations(&pool).await?;

        let store = Arc::new(SqliteStore::new(pool.clone()));
        let blobs = Arc::new(blobs);
        let engine = SigningEngine::new(
            engine_config,
            EnginePorts {
                templates: store.clone(),
                blobs: blobs.clone(),
                sessions: store.clone(),
                notifier: Arc::new(LogNotifier),
            },
        );

        Ok(Self {
            store,
            blobs,
            engine,
            sessions: SessionRegistry::default(),
        })
    }

    pub fn with_session_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.sessions = SessionRegistry::new(idle_timeout);
        self
    }
}

struct OpenSession {
    session: Arc<ActiveSession>,
    last_used: Instant,
}

impl OpenSession {
    fn touch(&mut self) -> Arc<ActiveSession> {
        self.last_used = Instant::now();
        Arc::clone(&self.session)
    }
}

/// Open sessions by link token, so captures persist between requests.
///
/// Workspaces left idle past the timeout, or whose link has reached a
/// terminal state or its deadline, are dropped on the next access.
pub struct SessionRegistry {
    active: Mutex<HashMap<String, OpenSession>>,
    idle_timeout: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_IDLE_TIMEOUT)
    }
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    fn evict_stale(&self, active: &mut HashMap<String, OpenSession>) {
        let now = Utc::now();
        active.retain(|_, open| {
            let session = &open.session;
            let keep = open.last_used.elapsed() < self.idle_timeout
                && !session.state().is_terminal()
                && !session.session().is_past_deadline(now);
            if !keep {
                tracing::debug!(session_id = %session.session().id, "Closing signing workspace");
            }
            keep
        });
    }

    /// Load the session for `token`, counting the view, and reuse the open
    /// workspace when there is one
    pub async fn view(
        &self,
        engine: &SigningEngine,
        token: &str,
    ) -> Result<Arc<ActiveSession>, SessionError> {
        let record = match engine.get_session(token).await {
            Ok(record) => record,
            Err(err) => {
                self.remove(token).await;
                return Err(err);
            }
        };

        let mut active = self.active.lock().await;
        self.evict_stale(&mut active);
        if let Some(open) = active.get_mut(token) {
            return Ok(open.touch());
        }
        let session = Arc::new(engine.activate(record).await?);
        active.insert(
            token.to_string(),
            OpenSession {
                session: Arc::clone(&session),
                last_used: Instant::now(),
            },
        );
        Ok(session)
    }

    /// The open workspace for `token`, opening one if needed
    pub async fn get_or_open(
        &self,
        engine: &SigningEngine,
        token: &str,
    ) -> Result<Arc<ActiveSession>, SessionError> {
        {
            let mut active = self.active.lock().await;
            self.evict_stale(&mut active);
            if let Some(open) = active.get_mut(token) {
                return Ok(open.touch());
            }
        }
        self.view(engine, token).await
    }

    pub async fn remove(&self, token: &str) {
        self.active.lock().await.remove(token);
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    tracing::info!("Running database migrations...");

    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS templates (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            pdf_reference TEXT NOT NULL,
            fields_json TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS recipients (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS signing_requests (
            id TEXT PRIMARY KEY,
            template_id TEXT NOT NULL REFERENCES templates(id),
            document_title TEXT NOT NULL,
            owner_email TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS signing_sessions (
            id TEXT PRIMARY KEY,
            token TEXT NOT NULL UNIQUE,
            recipient_id TEXT NOT NULL REFERENCES recipients(id),
            signing_request_id TEXT NOT NULL REFERENCES signing_requests(id),
            status TEXT NOT NULL DEFAULT 'pending',
            access_count INTEGER NOT NULL DEFAULT 0,
            expires_at TEXT,
            signed_at TEXT,
            expired_at TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS completed_documents (
            signing_request_id TEXT PRIMARY KEY REFERENCES signing_requests(id),
            recipient_id TEXT NOT NULL,
            session_id TEXT NOT NULL REFERENCES signing_sessions(id),
            output_blob_reference TEXT NOT NULL,
            completion_data TEXT NOT NULL,
            output_sha256 TEXT NOT NULL,
            completed_at TEXT NOT NULL
        )
        "#,
        // Index for fast lookups
        "CREATE INDEX IF NOT EXISTS idx_sessions_status ON signing_sessions(status)",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Migrations complete");
    Ok(())
}
