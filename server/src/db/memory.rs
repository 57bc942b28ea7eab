//! In-memory repository, used when no database is configured and in tests.

use super::{DocumentRepository, StoredDocument};
use async_trait::async_trait;
use dashmap::DashMap;

/// Documents keyed by `(collection, document_id)`. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryDocumentRepository {
    documents: DashMap<(String, String), StoredDocument>,
}

impl MemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRepository for MemoryDocumentRepository {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Option<StoredDocument>, sqlx::Error> {
        let key = (collection.to_string(), document_id.to_string());
        Ok(self.documents.get(&key).map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, document: &StoredDocument) -> Result<(), sqlx::Error> {
        let key = (document.collection.clone(), document.document_id.clone());
        self.documents.insert(key, document.clone());
        Ok(())
    }
}
