//! Document handlers - read and stamp counter documents.

use crate::db::{DocumentRepository, StoredDocument};
use crate::error::{AppError, Result};
use chrono::Utc;
use tally_engine::{RemoteDocument, WriteRequest};

/// Longest accepted collection or document id.
const MAX_KEY_LEN: usize = 256;

/// Fetch a document.
pub async fn handle_get(
    repo: &dyn DocumentRepository,
    collection: &str,
    document_id: &str,
) -> Result<RemoteDocument> {
    validate_key(collection, document_id)?;

    match repo.get(collection, document_id).await? {
        Some(stored) => stored.to_document(),
        None => Err(AppError::NotFound(format!(
            "Document {collection}/{document_id} does not exist"
        ))),
    }
}

/// Write a document, stamping it with the server clock.
///
/// The write replaces the whole document, so a later update drops the
/// reset marker left by an earlier reset.
pub async fn handle_put(
    repo: &dyn DocumentRepository,
    collection: &str,
    document_id: &str,
    request: WriteRequest,
) -> Result<RemoteDocument> {
    validate_key(collection, document_id)?;

    let stored = StoredDocument::from_request(collection, document_id, &request, Utc::now())?;
    repo.upsert(&stored).await?;

    tracing::debug!(
        collection,
        document_id,
        correct = request.correct_count,
        incorrect = request.incorrect_count,
        reset = request.is_reset(),
        "Stored document"
    );

    stored.to_document()
}

fn validate_key(collection: &str, document_id: &str) -> Result<()> {
    for (name, value) in [("collection", collection), ("document id", document_id)] {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("{name} must not be blank")));
        }
        if value.len() > MAX_KEY_LEN {
            return Err(AppError::BadRequest(format!(
                "{name} exceeds {MAX_KEY_LEN} bytes"
            )));
        }
    }
    Ok(())
}
