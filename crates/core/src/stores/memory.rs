use crate::error::StorageError;
use crate::models::{validate_chunk_batch, ChunkRecord, DocumentRecord, EmbeddingStatus};
use crate::store::{ChunkStore, DocumentStatusStore, SearchableChunk};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process store backed by plain maps. Used by the test suite and by
/// single-process deployments that keep the corpus resident.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<Uuid, DocumentRecord>>,
    chunks: RwLock<Vec<ChunkRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a document's chunks in index order.
    pub async fn chunks_for(&self, document_id: Uuid) -> Vec<ChunkRecord> {
        let chunks = self.chunks.read().await;
        let mut rows: Vec<ChunkRecord> = chunks
            .iter()
            .filter(|chunk| chunk.document_id == document_id)
            .cloned()
            .collect();
        rows.sort_by_key(|chunk| chunk.chunk_index);
        rows
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn delete_for_document(&self, document_id: Uuid) -> Result<(), StorageError> {
        let mut chunks = self.chunks.write().await;
        chunks.retain(|chunk| chunk.document_id != document_id);
        Ok(())
    }

    async fn insert_chunks(&self, batch: &[ChunkRecord]) -> Result<(), StorageError> {
        validate_chunk_batch(batch).map_err(StorageError::InvalidBatch)?;
        let mut chunks = self.chunks.write().await;
        chunks.extend_from_slice(batch);
        Ok(())
    }

    async fn count_for_document(&self, document_id: Uuid) -> Result<usize, StorageError> {
        let chunks = self.chunks.read().await;
        Ok(chunks
            .iter()
            .filter(|chunk| chunk.document_id == document_id)
            .count())
    }

    async fn list_for_search(
        &self,
        department: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchableChunk>, StorageError> {
        let documents = self.documents.read().await;
        let chunks = self.chunks.read().await;

        let rows = chunks
            .iter()
            .filter_map(|chunk| {
                let document = documents.get(&chunk.document_id)?;
                if !document.is_searchable() {
                    return None;
                }
                if let Some(department) = department {
                    if document.department.as_deref() != Some(department) {
                        return None;
                    }
                }
                Some(SearchableChunk {
                    document_id: chunk.document_id,
                    document_title: document.original_name.clone(),
                    department: document.department.clone(),
                    chunk_index: chunk.chunk_index,
                    text: chunk.text.clone(),
                    embedding: chunk.embedding.clone(),
                })
            })
            .take(limit)
            .collect();

        Ok(rows)
    }
}

#[async_trait]
impl DocumentStatusStore for MemoryStore {
    async fn insert_document(&self, document: &DocumentRecord) -> Result<(), StorageError> {
        let mut documents = self.documents.write().await;
        documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn get_document(
        &self,
        document_id: Uuid,
    ) -> Result<Option<DocumentRecord>, StorageError> {
        let documents = self.documents.read().await;
        Ok(documents.get(&document_id).cloned())
    }

    async fn set_status(
        &self,
        document_id: Uuid,
        status: EmbeddingStatus,
        total_chunks: Option<usize>,
    ) -> Result<(), StorageError> {
        let mut documents = self.documents.write().await;
        if let Some(document) = documents.get_mut(&document_id) {
            document.embedding_status = status;
            if let Some(total_chunks) = total_chunks {
                document.total_chunks = total_chunks;
            }
        }
        Ok(())
    }

    async fn list_with_status(
        &self,
        status: EmbeddingStatus,
    ) -> Result<Vec<DocumentRecord>, StorageError> {
        let documents = self.documents.read().await;
        let mut rows: Vec<DocumentRecord> = documents
            .values()
            .filter(|document| document.embedding_status == status && document.deleted_at.is_none())
            .cloned()
            .collect();
        rows.sort_by_key(|document| document.created_at);
        Ok(rows)
    }
}
