pub mod bm25;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod store;
pub mod stores;
pub mod vector;

pub use bm25::{KeywordHit, KeywordScorer, BM25_B, BM25_K1};
pub use chunking::{split_text, ChunkingConfig};
pub use embeddings::{
    EmbeddingConfig, EmbeddingProvider, HttpEmbeddingClient, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    EmbeddingError, ExtractionError, IngestError, QueryError, Result, StorageError,
};
pub use extractor::{extract_text, join_pages, LopdfExtractor, PageText, PdfExtractor};
pub use fetch::{discover_pdf_files, DocumentSource, FileSystemSource};
pub use models::{
    ChunkMetadata, ChunkRecord, DocumentRecord, EmbeddingStatus, IngestionOutcome, ScoredChunk,
    SearchHit, SearchQuery, SearchResponse, DEFAULT_MAX_RESULTS, MAX_CHUNK_TEXT_CHARS,
    MAX_RESULTS_LIMIT,
};
pub use pipeline::{IngestionPipeline, RepairAction, INSERT_BATCH_SIZE};
pub use search::{fuse, FusionWeights, SearchEngine, RRF_K};
pub use store::{ChunkStore, DocumentStatusStore, SearchableChunk};
pub use stores::{MemoryStore, RestTableStore};
pub use vector::{cosine_similarity, rank_by_similarity, VectorHit, SIMILARITY_FLOOR};
