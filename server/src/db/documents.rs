//! Database operations for the documents table.

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tally_engine::{Counters, RemoteDocument, WriteRequest};

/// A stored document row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub collection: String,
    pub document_id: String,
    pub correct_count: i64,
    pub incorrect_count: i64,
    pub reset: bool,
    pub last_updated: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredDocument {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredDocument {
            collection: row.try_get("collection")?,
            document_id: row.try_get("document_id")?,
            correct_count: row.try_get("correct_count")?,
            incorrect_count: row.try_get("incorrect_count")?,
            reset: row.try_get("reset")?,
            last_updated: row.try_get("last_updated")?,
        })
    }
}

impl StoredDocument {
    /// Build the row a write request produces when stamped at `at`.
    pub fn from_request(
        collection: &str,
        document_id: &str,
        request: &WriteRequest,
        at: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let to_column = |name: &str, value: u64| {
            i64::try_from(value)
                .map_err(|_| AppError::BadRequest(format!("{name} is too large: {value}")))
        };

        Ok(Self {
            collection: collection.to_string(),
            document_id: document_id.to_string(),
            correct_count: to_column("correctCount", request.correct_count)?,
            incorrect_count: to_column("incorrectCount", request.incorrect_count)?,
            reset: request.is_reset(),
            last_updated: at,
        })
    }

    /// Convert the row to its wire form.
    pub fn to_document(&self) -> Result<RemoteDocument, AppError> {
        let from_column = |name: &str, value: i64| {
            u64::try_from(value).map_err(|_| {
                AppError::Internal(format!(
                    "{}/{} has a negative {name}",
                    self.collection, self.document_id
                ))
            })
        };

        let counters = Counters::new(
            from_column("correct_count", self.correct_count)?,
            from_column("incorrect_count", self.incorrect_count)?,
        );
        Ok(RemoteDocument::written(counters, self.reset, self.last_updated))
    }
}

/// Storage backend for counter documents.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Short backend name reported by the health check.
    fn backend(&self) -> &'static str;

    async fn get(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Option<StoredDocument>, sqlx::Error>;

    /// Insert the document, or replace it wholesale.
    async fn upsert(&self, document: &StoredDocument) -> Result<(), sqlx::Error>;
}

/// PostgreSQL-backed repository.
#[derive(Debug, Clone)]
pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn get(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Option<StoredDocument>, sqlx::Error> {
        sqlx::query_as::<_, StoredDocument>(
            r#"
            SELECT collection, document_id, correct_count, incorrect_count, reset, last_updated
            FROM documents
            WHERE collection = $1 AND document_id = $2
            "#,
        )
        .bind(collection)
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn upsert(&self, document: &StoredDocument) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO documents (
                collection, document_id, correct_count, incorrect_count, reset, last_updated
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (collection, document_id) DO UPDATE SET
                correct_count = EXCLUDED.correct_count,
                incorrect_count = EXCLUDED.incorrect_count,
                reset = EXCLUDED.reset,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(&document.collection)
        .bind(&document.document_id)
        .bind(document.correct_count)
        .bind(document.incorrect_count)
        .bind(document.reset)
        .bind(document.last_updated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
