use crate::error::StorageError;
use crate::models::{ChunkRecord, DocumentRecord, EmbeddingStatus};
use async_trait::async_trait;
use uuid::Uuid;

/// Chunk row joined with the owning document's display metadata, as
/// returned to the query path. Only completed, non-deleted documents
/// contribute rows.
#[derive(Debug, Clone)]
pub struct SearchableChunk {
    pub document_id: Uuid,
    pub document_title: String,
    pub department: Option<String>,
    pub chunk_index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Idempotent; removing zero rows is fine.
    async fn delete_for_document(&self, document_id: Uuid) -> Result<(), StorageError>;

    async fn insert_chunks(&self, chunks: &[ChunkRecord]) -> Result<(), StorageError>;

    async fn count_for_document(&self, document_id: Uuid) -> Result<usize, StorageError>;

    async fn list_for_search(
        &self,
        department: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchableChunk>, StorageError>;
}

#[async_trait]
pub trait DocumentStatusStore: Send + Sync {
    async fn insert_document(&self, document: &DocumentRecord) -> Result<(), StorageError>;

    async fn get_document(&self, document_id: Uuid)
        -> Result<Option<DocumentRecord>, StorageError>;

    /// `total_chunks` is written only when provided; a bare status change
    /// leaves the previous count in place.
    async fn set_status(
        &self,
        document_id: Uuid,
        status: EmbeddingStatus,
        total_chunks: Option<usize>,
    ) -> Result<(), StorageError>;

    async fn list_with_status(
        &self,
        status: EmbeddingStatus,
    ) -> Result<Vec<DocumentRecord>, StorageError>;
}
