//! SQLite-backed templates, sessions and completions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docsign_core::{
    BlobReference, CaptureSnapshot, CompletedDocument, Recipient, SessionRecord, SessionStatus,
    SessionStore, SigningRequest, SigningSession, StoreError, Template, TemplateError,
    TemplateField, TemplateSource,
};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn db_error(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

fn timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|t| t.to_rfc3339())
}

fn parse_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| StoreError::Database(format!("Invalid timestamp {}: {}", s, e)))
        })
        .transpose()
}

#[derive(FromRow)]
struct SessionRow {
    id: String,
    token: String,
    recipient_id: String,
    signing_request_id: String,
    status: String,
    access_count: i64,
    expires_at: Option<String>,
    signed_at: Option<String>,
    expired_at: Option<String>,
    recipient_name: String,
    recipient_email: String,
    template_id: String,
    document_title: String,
    owner_email: Option<String>,
}

impl SessionRow {
    fn into_record(self) -> Result<SessionRecord, StoreError> {
        let status: SessionStatus = self
            .status
            .parse()
            .map_err(|e: docsign_core::ParseStatusError| StoreError::Database(e.to_string()))?;
        Ok(SessionRecord {
            session: SigningSession {
                id: self.id,
                token: self.token,
                recipient_id: self.recipient_id.clone(),
                signing_request_id: self.signing_request_id.clone(),
                status,
                access_count: u32::try_from(self.access_count).unwrap_or(u32::MAX),
                expires_at: parse_timestamp(self.expires_at)?,
                signed_at: parse_timestamp(self.signed_at)?,
                expired_at: parse_timestamp(self.expired_at)?,
            },
            recipient: Recipient {
                id: self.recipient_id,
                name: self.recipient_name,
                email: self.recipient_email,
            },
            request: SigningRequest {
                id: self.signing_request_id,
                template_id: self.template_id,
                document_title: self.document_title,
                owner_email: self.owner_email,
            },
        })
    }
}

#[derive(FromRow)]
struct TemplateRow {
    id: String,
    title: String,
    pdf_reference: String,
    fields_json: String,
}

#[derive(FromRow)]
struct CompletionRow {
    signing_request_id: String,
    recipient_id: String,
    output_blob_reference: String,
    completion_data: String,
    output_sha256: String,
    completed_at: String,
}

const SESSION_SELECT: &str = r#"
    SELECT s.id, s.token, s.recipient_id, s.signing_request_id, s.status, s.access_count,
           s.expires_at, s.signed_at, s.expired_at,
           r.name AS recipient_name, r.email AS recipient_email,
           q.template_id, q.document_title, q.owner_email
    FROM signing_sessions s
    JOIN recipients r ON r.id = s.recipient_id
    JOIN signing_requests q ON q.id = s.signing_request_id
"#;

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_template(&self, template: &Template) -> Result<(), StoreError> {
        let fields_json = serde_json::to_string(&template.fields)
            .map_err(|e| StoreError::Database(format!("Invalid fields: {}", e)))?;
        sqlx::query(
            r#"
            INSERT INTO templates (id, title, pdf_reference, fields_json, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&template.id)
        .bind(&template.title)
        .bind(template.pdf_reference.as_str())
        .bind(&fields_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    /// Insert a session together with its recipient and signing request
    pub async fn create_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query("INSERT OR REPLACE INTO recipients (id, name, email) VALUES (?, ?, ?)")
            .bind(&record.recipient.id)
            .bind(&record.recipient.name)
            .bind(&record.recipient.email)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO signing_requests (id, template_id, document_title, owner_email, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.request.id)
        .bind(&record.request.template_id)
        .bind(&record.request.document_title)
        .bind(&record.request.owner_email)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        let session = &record.session;
        sqlx::query(
            r#"
            INSERT INTO signing_sessions
                (id, token, recipient_id, signing_request_id, status, access_count, expires_at, signed_at, expired_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.token)
        .bind(&session.recipient_id)
        .bind(&session.signing_request_id)
        .bind(session.status.as_str())
        .bind(i64::from(session.access_count))
        .bind(timestamp(session.expires_at))
        .bind(timestamp(session.signed_at))
        .bind(timestamp(session.expired_at))
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)
    }

    /// Session by token without counting an access
    pub async fn peek_session(&self, token: &str) -> Result<Option<SessionRecord>, StoreError> {
        let query = format!("{} WHERE s.token = ?", SESSION_SELECT);
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(SessionRow::into_record)
            .transpose()
    }

    async fn session_exists(&self, session_id: &str) -> Result<bool, StoreError> {
        let found: Option<(String,)> = sqlx::query_as("SELECT id FROM signing_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(found.is_some())
    }

    async fn not_pending(&self, session_id: &str) -> StoreError {
        match self.session_exists(session_id).await {
            Ok(true) => StoreError::AlreadyTerminal,
            Ok(false) => StoreError::NotFound(session_id.to_string()),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl TemplateSource for SqliteStore {
    async fn template(&self, template_id: &str) -> Result<Template, TemplateError> {
        let row: Option<TemplateRow> = sqlx::query_as(
            "SELECT id, title, pdf_reference, fields_json FROM templates WHERE id = ?",
        )
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TemplateError::Unavailable(e.to_string()))?;

        let row = row.ok_or_else(|| TemplateError::NotFound(template_id.to_string()))?;
        let fields: Vec<TemplateField> = serde_json::from_str(&row.fields_json)
            .map_err(|e| TemplateError::Unavailable(format!("Invalid fields: {}", e)))?;

        Ok(Template {
            id: row.id,
            title: row.title,
            pdf_reference: BlobReference::new(row.pdf_reference),
            fields,
        })
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn load_session(&self, token: &str) -> Result<Option<SessionRecord>, StoreError> {
        sqlx::query("UPDATE signing_sessions SET access_count = access_count + 1 WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        self.peek_session(token).await
    }

    async fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let at = at.to_rfc3339();
        let signed_at = (status == SessionStatus::Signed).then(|| at.clone());
        let expired_at = status.is_terminal().then(|| at.clone());

        let result = sqlx::query(
            r#"
            UPDATE signing_sessions
            SET status = ?, signed_at = COALESCE(?, signed_at), expired_at = COALESCE(?, expired_at)
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(signed_at)
        .bind(expired_at)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(self.not_pending(session_id).await);
        }
        Ok(())
    }

    async fn record_completion(
        &self,
        session_id: &str,
        document: &CompletedDocument,
    ) -> Result<(), StoreError> {
        let completion_data = serde_json::to_string(&document.completion_data)
            .map_err(|e| StoreError::Database(format!("Invalid completion data: {}", e)))?;
        let completed_at = document.completed_at.to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let updated = sqlx::query(
            r#"
            UPDATE signing_sessions
            SET status = 'signed', signed_at = ?, expired_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(&completed_at)
        .bind(&completed_at)
        .bind(session_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(db_error)?;
            return Err(self.not_pending(session_id).await);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO completed_documents
                (signing_request_id, recipient_id, session_id, output_blob_reference, completion_data, output_sha256, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&document.signing_request_id)
        .bind(&document.recipient_id)
        .bind(session_id)
        .bind(document.output_blob_reference.as_str())
        .bind(&completion_data)
        .bind(&document.output_sha256)
        .bind(&completed_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => tx.commit().await.map_err(db_error),
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await.map_err(db_error)?;
                Err(StoreError::AlreadyTerminal)
            }
            Err(e) => Err(db_error(e)),
        }
    }

    async fn completed_document(
        &self,
        signing_request_id: &str,
    ) -> Result<Option<CompletedDocument>, StoreError> {
        let row: Option<CompletionRow> = sqlx::query_as(
            r#"
            SELECT signing_request_id, recipient_id, output_blob_reference, completion_data, output_sha256, completed_at
            FROM completed_documents WHERE signing_request_id = ?
            "#,
        )
        .bind(signing_request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let completion_data: CaptureSnapshot = serde_json::from_str(&row.completion_data)
            .map_err(|e| StoreError::Database(format!("Invalid completion data: {}", e)))?;
        let completed_at = parse_timestamp(Some(row.completed_at))?
            .ok_or_else(|| StoreError::Database("Missing completed_at".to_string()))?;

        Ok(Some(CompletedDocument {
            signing_request_id: row.signing_request_id,
            recipient_id: row.recipient_id,
            output_blob_reference: BlobReference::new(row.output_blob_reference),
            completion_data,
            output_sha256: row.output_sha256,
            completed_at,
        }))
    }
}
