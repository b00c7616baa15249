use crate::chunking::{split_text, ChunkingConfig};
use crate::embeddings::EmbeddingProvider;
use crate::error::{EmbeddingError, IngestError, StorageError};
use crate::extractor::{join_pages, LopdfExtractor, PdfExtractor};
use crate::fetch::DocumentSource;
use crate::models::{ChunkRecord, EmbeddingStatus, IngestionOutcome};
use crate::store::{ChunkStore, DocumentStatusStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The storage backend rejects oversized payloads, so chunk rows are
/// written in fixed-size batches.
pub const INSERT_BATCH_SIZE: usize = 10;

/// Total attempts per chunk before it is skipped and counted.
const EMBED_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy)]
struct RunStats {
    attempted: usize,
    persisted: usize,
    skipped: usize,
}

#[derive(Debug, Clone)]
pub struct RepairAction {
    pub document_id: Uuid,
    pub status: EmbeddingStatus,
    pub chunks: usize,
}

/// Owns the document processing lifecycle: `pending -> processing ->
/// completed | failed`. Reprocessing deletes the existing chunk set before
/// inserting, so retries never duplicate or leave stale rows.
pub struct IngestionPipeline<S, E, D, X = LopdfExtractor>
where
    S: ChunkStore + DocumentStatusStore,
    E: EmbeddingProvider,
    D: DocumentSource,
    X: PdfExtractor,
{
    store: Arc<S>,
    embedder: Arc<E>,
    source: Arc<D>,
    extractor: X,
    chunking: ChunkingConfig,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl<S, E, D> IngestionPipeline<S, E, D>
where
    S: ChunkStore + DocumentStatusStore,
    E: EmbeddingProvider,
    D: DocumentSource,
{
    pub fn new(store: Arc<S>, embedder: Arc<E>, source: Arc<D>) -> Self {
        Self::with_extractor(store, embedder, source, LopdfExtractor)
    }
}

impl<S, E, D, X> IngestionPipeline<S, E, D, X>
where
    S: ChunkStore + DocumentStatusStore,
    E: EmbeddingProvider,
    D: DocumentSource,
    X: PdfExtractor,
{
    pub fn with_extractor(store: Arc<S>, embedder: Arc<E>, source: Arc<D>, extractor: X) -> Self {
        Self {
            store,
            embedder,
            source,
            extractor,
            chunking: ChunkingConfig::default(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    /// Runs one ingestion attempt for a document. Never propagates an
    /// error to the caller; the outcome carries the resolved status.
    ///
    /// A run that persists at least one chunk completes the document with
    /// `total_chunks` set to what was actually saved, even if the run was
    /// cut short. Only a run that persists nothing marks the document
    /// failed. Concurrent runs for the same document are serialized.
    pub async fn process_document(
        &self,
        document_id: Uuid,
        storage_path: &str,
    ) -> IngestionOutcome {
        let lock = self.lock_for(document_id).await;
        let _guard = lock.lock().await;

        info!(%document_id, storage_path, "ingestion started");
        if let Err(status_error) = self
            .store
            .set_status(document_id, EmbeddingStatus::Processing, None)
            .await
        {
            error!(%document_id, error = %status_error, "unable to mark document as processing");
            return IngestionOutcome::failed(status_error.to_string());
        }

        match self.run(document_id, storage_path).await {
            Ok(stats) if stats.persisted > 0 => {
                self.mark(document_id, EmbeddingStatus::Completed, Some(stats.persisted))
                    .await;
                info!(
                    %document_id,
                    persisted = stats.persisted,
                    skipped = stats.skipped,
                    attempted = stats.attempted,
                    "ingestion completed"
                );
                IngestionOutcome::completed(stats.persisted)
            }
            Ok(stats) => {
                self.mark(document_id, EmbeddingStatus::Failed, None).await;
                error!(
                    %document_id,
                    attempted = stats.attempted,
                    "ingestion failed: no chunk could be embedded"
                );
                IngestionOutcome::failed("no chunk could be embedded")
            }
            Err(run_error) => {
                let persisted = self
                    .store
                    .count_for_document(document_id)
                    .await
                    .unwrap_or(0);

                if persisted > 0 {
                    self.mark(document_id, EmbeddingStatus::Completed, Some(persisted))
                        .await;
                    warn!(
                        %document_id,
                        persisted,
                        error = %run_error,
                        "ingestion aborted after partial progress, keeping persisted chunks"
                    );
                    IngestionOutcome {
                        success: true,
                        chunks_processed: persisted,
                        error: Some(run_error.to_string()),
                    }
                } else {
                    self.mark(document_id, EmbeddingStatus::Failed, None).await;
                    error!(%document_id, error = %run_error, "ingestion failed");
                    IngestionOutcome::failed(run_error.to_string())
                }
            }
        }
    }

    /// Reconciles documents stuck in `processing`, e.g. after a crash
    /// mid-run: completed if chunks exist, failed otherwise. Idempotent.
    pub async fn reconcile_stale(&self) -> Result<Vec<RepairAction>, StorageError> {
        let stuck = self
            .store
            .list_with_status(EmbeddingStatus::Processing)
            .await?;

        let mut actions = Vec::new();
        for document in stuck {
            let lock = self.lock_for(document.id).await;
            let _guard = lock.lock().await;

            let persisted = self.store.count_for_document(document.id).await?;
            let status = if persisted > 0 {
                self.store
                    .set_status(document.id, EmbeddingStatus::Completed, Some(persisted))
                    .await?;
                EmbeddingStatus::Completed
            } else {
                self.store
                    .set_status(document.id, EmbeddingStatus::Failed, None)
                    .await?;
                EmbeddingStatus::Failed
            };

            info!(
                document_id = %document.id,
                status = status.as_str(),
                chunks = persisted,
                "reconciled stale document"
            );
            actions.push(RepairAction {
                document_id: document.id,
                status,
                chunks: persisted,
            });
        }

        Ok(actions)
    }

    async fn run(&self, document_id: Uuid, storage_path: &str) -> Result<RunStats, IngestError> {
        let bytes = self.source.get_document_bytes(storage_path).await?;
        debug!(%document_id, bytes = bytes.len(), "document payload fetched");

        let pages = self.extractor.extract_pages(&bytes)?;
        let text = join_pages(&pages);
        let pieces = split_text(&text, self.chunking);
        info!(
            %document_id,
            pages = pages.len(),
            chunk_count = pieces.len(),
            "document text split"
        );

        self.store.delete_for_document(document_id).await?;

        let total = pieces.len();
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (index, piece) in pieces.into_iter().enumerate() {
            match self.embed_with_retry(&piece).await {
                Ok(embedding) => {
                    records.push(ChunkRecord::new(document_id, index, piece, embedding, total));
                }
                Err(embed_error) => {
                    skipped += 1;
                    warn!(
                        %document_id,
                        chunk_index = index,
                        error = %embed_error,
                        "skipping chunk after repeated embedding failures"
                    );
                }
            }
        }

        let mut persisted = 0usize;
        for batch in records.chunks(INSERT_BATCH_SIZE) {
            self.store.insert_chunks(batch).await?;
            persisted += batch.len();
        }

        Ok(RunStats {
            attempted: total,
            persisted,
            skipped,
        })
    }

    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.embedder.embed(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(embed_error) if attempt < EMBED_ATTEMPTS => {
                    debug!(attempt, error = %embed_error, "embedding attempt failed, retrying");
                }
                Err(embed_error) => return Err(embed_error),
            }
        }
    }

    async fn mark(&self, document_id: Uuid, status: EmbeddingStatus, total_chunks: Option<usize>) {
        if let Err(status_error) = self.store.set_status(document_id, status, total_chunks).await {
            warn!(
                %document_id,
                status = status.as_str(),
                error = %status_error,
                "failed to update document status"
            );
        }
    }

    async fn lock_for(&self, document_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(document_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
