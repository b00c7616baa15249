use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Chunk text stored per row is capped; longer chunks are truncated on insert.
pub const MAX_CHUNK_TEXT_CHARS: usize = 5_000;

pub const DEFAULT_MAX_RESULTS: usize = 5;
pub const MAX_RESULTS_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EmbeddingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingStatus::Pending => "pending",
            EmbeddingStatus::Processing => "processing",
            EmbeddingStatus::Completed => "completed",
            EmbeddingStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub storage_path: String,
    pub original_name: String,
    pub department: Option<String>,
    pub embedding_status: EmbeddingStatus,
    pub total_chunks: usize,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn new(
        storage_path: impl Into<String>,
        original_name: impl Into<String>,
        department: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            storage_path: storage_path.into(),
            original_name: original_name.into(),
            department,
            embedding_status: EmbeddingStatus::Pending,
            total_chunks: 0,
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    /// Only completed, non-deleted documents are eligible for search.
    pub fn is_searchable(&self) -> bool {
        self.embedding_status == EmbeddingStatus::Completed && self.deleted_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_length: usize,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub document_id: Uuid,
    pub chunk_index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl ChunkRecord {
    /// `total_chunks` is the chunk count of the whole split at creation
    /// time, not the count that eventually survives persistence.
    pub fn new(
        document_id: Uuid,
        chunk_index: usize,
        text: String,
        embedding: Vec<f32>,
        total_chunks: usize,
    ) -> Self {
        let chunk_length = text.chars().count();
        let text = if chunk_length > MAX_CHUNK_TEXT_CHARS {
            text.chars().take(MAX_CHUNK_TEXT_CHARS).collect()
        } else {
            text
        };

        Self {
            id: make_chunk_id(document_id, chunk_index, &text),
            document_id,
            chunk_index,
            text,
            embedding,
            metadata: ChunkMetadata {
                chunk_length,
                total_chunks,
            },
        }
    }
}

fn make_chunk_id(document_id: Uuid, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rejects a batch whose rows disagree on embedding dimension or whose
/// indexes are not strictly increasing. Gaps are allowed: a chunk whose
/// embedding failed keeps its original position absent.
pub fn validate_chunk_batch(chunks: &[ChunkRecord]) -> Result<(), String> {
    let Some(first) = chunks.first() else {
        return Ok(());
    };

    let dimension = first.embedding.len();
    for chunk in chunks {
        if chunk.embedding.len() != dimension {
            return Err(format!(
                "chunk {} has embedding dimension {}, batch started with {}",
                chunk.chunk_index,
                chunk.embedding.len(),
                dimension
            ));
        }
    }

    for pair in chunks.windows(2) {
        if pair[1].chunk_index <= pair[0].chunk_index {
            return Err(format!(
                "chunk indexes must be strictly increasing, got {} after {}",
                pair[1].chunk_index, pair[0].chunk_index
            ));
        }
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub max_results: usize,
    pub department: Option<String>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            max_results: DEFAULT_MAX_RESULTS,
            department: None,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn clamped_limit(&self) -> usize {
        self.max_results.clamp(1, MAX_RESULTS_LIMIT)
    }
}

/// Per-query scoring detail for one fused candidate.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub document_id: Uuid,
    pub document_title: String,
    pub department: Option<String>,
    pub text: String,
    pub keyword_score: f64,
    pub vector_score: f64,
    pub fused_score: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document_title: String,
    pub department: Option<String>,
    pub chunk_text: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub hits: Vec<SearchHit>,
    /// True when the dense arm failed and only keyword results are returned.
    pub degraded: bool,
}

impl SearchResponse {
    pub fn empty(query: &SearchQuery) -> Self {
        Self {
            query: query.text.clone(),
            hits: Vec::new(),
            degraded: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionOutcome {
    pub success: bool,
    pub chunks_processed: usize,
    pub error: Option<String>,
}

impl IngestionOutcome {
    pub fn completed(chunks_processed: usize) -> Self {
        Self {
            success: true,
            chunks_processed,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            chunks_processed: 0,
            error: Some(error.into()),
        }
    }
}
