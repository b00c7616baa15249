use crate::bm25::{KeywordHit, KeywordScorer};
use crate::embeddings::EmbeddingProvider;
use crate::error::{EmbeddingError, QueryError};
use crate::models::{ScoredChunk, SearchHit, SearchQuery, SearchResponse};
use crate::store::{ChunkStore, SearchableChunk};
use crate::vector::{rank_by_similarity, VectorHit};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

pub const RRF_K: f64 = 60.0;

/// Outer bound on the dense arm, independent of the embedding client's
/// own HTTP timeout. A timed-out arm degrades to keyword-only results.
const VECTOR_ARM_TIMEOUT: Duration = Duration::from_secs(45);

/// Rank assigned to a candidate absent from one arm; its RRF term is
/// negligible but still defined.
const UNRANKED_POSITION: usize = 999;

const DISPLAY_TEXT_CHARS: usize = 300;
const IDENTITY_PREFIX_CHARS: usize = 100;
const CORPUS_SCAN_LIMIT: usize = 5_000;

#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub vector: f64,
    pub keyword: f64,
    pub vector_rrf: f64,
    pub keyword_rrf: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vector: 0.8,
            keyword: 0.2,
            vector_rrf: 0.3,
            keyword_rrf: 0.1,
        }
    }
}

pub fn rrf_term(rank: usize) -> f64 {
    1.0 / (RRF_K + rank as f64)
}

/// Hybrid query engine. The keyword and vector arms run concurrently; a
/// dense-arm failure degrades to keyword-only results instead of erroring.
pub struct SearchEngine<S, E> {
    store: Arc<S>,
    embedder: Arc<E>,
    scorer: KeywordScorer,
    weights: FusionWeights,
}

impl<S, E> SearchEngine<S, E>
where
    S: ChunkStore,
    E: EmbeddingProvider,
{
    pub fn new(store: Arc<S>, embedder: Arc<E>) -> Result<Self, QueryError> {
        Ok(Self {
            store,
            embedder,
            scorer: KeywordScorer::new()?,
            weights: FusionWeights::default(),
        })
    }

    pub fn with_weights(mut self, weights: FusionWeights) -> Self {
        self.weights = weights;
        self
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, QueryError> {
        if query.text.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let corpus = self
            .store
            .list_for_search(query.department.as_deref(), CORPUS_SCAN_LIMIT)
            .await?;
        if corpus.is_empty() {
            return Ok(SearchResponse::empty(query));
        }

        let keyword_arm = async { self.scorer.score(&query.text, &corpus) };
        let vector_arm = async {
            match tokio::time::timeout(
                VECTOR_ARM_TIMEOUT,
                self.vector_arm(&query.text, &corpus),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(EmbeddingError::Unreachable(
                    "vector arm timed out".to_string(),
                )),
            }
        };
        let (keyword_hits, vector_outcome) = tokio::join!(keyword_arm, vector_arm);

        let (vector_hits, degraded) = match vector_outcome {
            Ok(hits) => (hits, false),
            Err(error) => {
                warn!(%error, "dense arm failed, falling back to keyword-only results");
                (Vec::new(), true)
            }
        };

        let ranked = fuse(
            &corpus,
            &keyword_hits,
            &vector_hits,
            self.weights,
            query.clamped_limit(),
        );
        info!(
            query = %query.text,
            hits = ranked.len(),
            degraded,
            "search complete"
        );

        Ok(SearchResponse {
            query: query.text.clone(),
            hits: ranked.into_iter().map(display_hit).collect(),
            degraded,
        })
    }

    async fn vector_arm(
        &self,
        text: &str,
        corpus: &[SearchableChunk],
    ) -> Result<Vec<VectorHit>, EmbeddingError> {
        let query_embedding = self.embedder.embed(text).await?;
        Ok(rank_by_similarity(&query_embedding, corpus))
    }
}

#[derive(Debug, Clone)]
struct FusedCandidate {
    corpus_index: usize,
    keyword_score: f64,
    keyword_similarity: f64,
    vector_similarity: f64,
    keyword_rank: Option<usize>,
    vector_rank: Option<usize>,
}

impl FusedCandidate {
    fn new(corpus_index: usize) -> Self {
        Self {
            corpus_index,
            keyword_score: 0.0,
            keyword_similarity: 0.0,
            vector_similarity: 0.0,
            keyword_rank: None,
            vector_rank: None,
        }
    }
}

/// Merges the two ranked arms into one list. Candidates are deduplicated
/// by document id plus a text-prefix fingerprint, then scored with a
/// weighted blend of raw similarities and reciprocal-rank terms.
pub fn fuse(
    corpus: &[SearchableChunk],
    keyword_hits: &[KeywordHit],
    vector_hits: &[VectorHit],
    weights: FusionWeights,
    limit: usize,
) -> Vec<ScoredChunk> {
    let mut order: Vec<(Uuid, String)> = Vec::new();
    let mut candidates: HashMap<(Uuid, String), FusedCandidate> = HashMap::new();

    for (position, hit) in keyword_hits.iter().enumerate() {
        let key = identity_key(&corpus[hit.corpus_index]);
        let entry = candidates.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            FusedCandidate::new(hit.corpus_index)
        });
        if entry.keyword_rank.is_none() {
            entry.keyword_rank = Some(position + 1);
            entry.keyword_score = hit.score;
            entry.keyword_similarity = hit.similarity;
        }
    }

    for (position, hit) in vector_hits.iter().enumerate() {
        let key = identity_key(&corpus[hit.corpus_index]);
        let entry = candidates.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            FusedCandidate::new(hit.corpus_index)
        });
        if entry.vector_rank.is_none() {
            entry.vector_rank = Some(position + 1);
            entry.vector_similarity = hit.similarity;
        }
    }

    let mut scored: Vec<ScoredChunk> = order
        .iter()
        .map(|key| {
            let candidate = &candidates[key];
            let chunk = &corpus[candidate.corpus_index];
            let keyword_rrf = rrf_term(candidate.keyword_rank.unwrap_or(UNRANKED_POSITION));
            let vector_rrf = rrf_term(candidate.vector_rank.unwrap_or(UNRANKED_POSITION));
            let fused_score = weights.vector * candidate.vector_similarity
                + weights.keyword * candidate.keyword_similarity
                + weights.vector_rrf * vector_rrf
                + weights.keyword_rrf * keyword_rrf;

            ScoredChunk {
                document_id: chunk.document_id,
                document_title: chunk.document_title.clone(),
                department: chunk.department.clone(),
                text: chunk.text.clone(),
                keyword_score: candidate.keyword_score,
                vector_score: candidate.vector_similarity,
                fused_score,
                rank: 0,
            }
        })
        .collect();

    scored.sort_by(|left, right| right.fused_score.total_cmp(&left.fused_score));
    scored.truncate(limit);
    for (position, chunk) in scored.iter_mut().enumerate() {
        chunk.rank = position + 1;
    }
    scored
}

/// Pragmatic candidate identity: document id plus the first 100 characters
/// of the chunk text. Near-duplicate chunks inside one document collapse.
fn identity_key(chunk: &SearchableChunk) -> (Uuid, String) {
    (
        chunk.document_id,
        chunk.text.chars().take(IDENTITY_PREFIX_CHARS).collect(),
    )
}

fn display_hit(scored: ScoredChunk) -> SearchHit {
    SearchHit {
        document_title: scored.document_title,
        department: scored.department,
        chunk_text: truncate_display(&scored.text),
        score: scored.fused_score,
    }
}

fn truncate_display(text: &str) -> String {
    if text.chars().count() <= DISPLAY_TEXT_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(DISPLAY_TEXT_CHARS).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkRecord, DocumentRecord, EmbeddingStatus};
    use crate::store::DocumentStatusStore;
    use crate::stores::MemoryStore;
    use async_trait::async_trait;

    struct FixedEmbedder {
        vector: Vec<f32>,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn dimensions(&self) -> usize {
            self.vector.len()
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(self.vector.clone())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn dimensions(&self) -> usize {
            4
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::Unreachable("connection refused".to_string()))
        }
    }

    fn corpus_chunk(text: &str, embedding: Vec<f32>) -> SearchableChunk {
        SearchableChunk {
            document_id: Uuid::new_v4(),
            document_title: "doc.pdf".to_string(),
            department: None,
            chunk_index: 0,
            text: text.to_string(),
            embedding,
        }
    }

    async fn seed_store(texts: &[&str], embedding: Vec<f32>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut document = DocumentRecord::new("manual.pdf", "manual.pdf", None);
        document.embedding_status = EmbeddingStatus::Completed;
        document.total_chunks = texts.len();
        store.insert_document(&document).await.expect("document");

        let chunks: Vec<ChunkRecord> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                ChunkRecord::new(
                    document.id,
                    index,
                    (*text).to_string(),
                    embedding.clone(),
                    texts.len(),
                )
            })
            .collect();
        store.insert_chunks(&chunks).await.expect("chunks");
        store
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let engine = SearchEngine::new(store, Arc::new(FailingEmbedder)).expect("engine");
        let result = engine.search(&SearchQuery::new("   ")).await;
        assert!(matches!(result, Err(QueryError::EmptyQuery)));
    }

    #[tokio::test]
    async fn empty_corpus_returns_no_results_not_an_error() {
        let store = Arc::new(MemoryStore::new());
        let engine = SearchEngine::new(store, Arc::new(FailingEmbedder)).expect("engine");
        let response = engine
            .search(&SearchQuery::new("hydraulic pump"))
            .await
            .expect("search");
        assert!(response.hits.is_empty());
        assert!(!response.degraded);
    }

    #[tokio::test]
    async fn dense_arm_outage_falls_back_to_keyword_results() {
        let store = seed_store(
            &[
                "hydraulic pump failure pressure report",
                "unrelated cafeteria menu announcement",
            ],
            vec![1.0, 0.0],
        )
        .await;

        let engine = SearchEngine::new(store, Arc::new(FailingEmbedder)).expect("engine");
        let response = engine
            .search(&SearchQuery::new("hydraulic pump"))
            .await
            .expect("search");

        assert!(response.degraded);
        assert_eq!(response.hits.len(), 1);
        assert_eq!(response.hits[0].document_title, "manual.pdf");
    }

    #[tokio::test]
    async fn both_arms_contribute_to_the_ranking() {
        let store = seed_store(
            &["hydraulic pump failure", "pressure relief valve"],
            vec![1.0, 0.0],
        )
        .await;

        let embedder = Arc::new(FixedEmbedder {
            vector: vec![1.0, 0.0],
        });
        let engine = SearchEngine::new(store, embedder).expect("engine");
        let response = engine
            .search(&SearchQuery::new("hydraulic pump"))
            .await
            .expect("search");

        assert!(!response.degraded);
        assert!(!response.hits.is_empty());
        // The chunk matched by both arms must outrank the vector-only one.
        assert!(response.hits[0].chunk_text.contains("hydraulic"));
    }

    #[tokio::test]
    async fn display_text_is_truncated() {
        let long_text = format!("pump {}", "detail ".repeat(100));
        let store = seed_store(&[long_text.as_str()], vec![1.0, 0.0]).await;

        let engine = SearchEngine::new(store, Arc::new(FailingEmbedder)).expect("engine");
        let response = engine
            .search(&SearchQuery::new("pump"))
            .await
            .expect("search");

        assert!(response.hits[0].chunk_text.ends_with("..."));
        assert_eq!(
            response.hits[0].chunk_text.chars().count(),
            DISPLAY_TEXT_CHARS + 3
        );
    }

    #[test]
    fn fusion_deduplicates_by_document_and_prefix() {
        let document_id = Uuid::new_v4();
        let shared_prefix = "identical leading text ".repeat(10);
        let mut first = corpus_chunk(&format!("{shared_prefix} tail one"), vec![1.0, 0.0]);
        let mut second = corpus_chunk(&format!("{shared_prefix} tail two"), vec![1.0, 0.0]);
        first.document_id = document_id;
        second.document_id = document_id;
        let corpus = vec![first, second];

        let keyword_hits = vec![
            KeywordHit {
                corpus_index: 0,
                score: 2.0,
                similarity: 0.2,
            },
            KeywordHit {
                corpus_index: 1,
                score: 1.0,
                similarity: 0.1,
            },
        ];

        let scored = fuse(&corpus, &keyword_hits, &[], FusionWeights::default(), 10);
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].keyword_score, 2.0);
    }

    #[test]
    fn rrf_rewards_presence_in_both_arms() {
        let corpus = vec![
            corpus_chunk("alpha", vec![1.0, 0.0]),
            corpus_chunk("beta", vec![0.0, 1.0]),
        ];

        let keyword_hits = vec![KeywordHit {
            corpus_index: 0,
            score: 3.0,
            similarity: 0.3,
        }];
        let vector_hits = vec![
            VectorHit {
                corpus_index: 0,
                similarity: 0.9,
            },
            VectorHit {
                corpus_index: 1,
                similarity: 0.9,
            },
        ];

        let scored = fuse(
            &corpus,
            &keyword_hits,
            &vector_hits,
            FusionWeights::default(),
            10,
        );
        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].text, "alpha");
        assert!(scored[0].fused_score > scored[1].fused_score);
        assert_eq!(scored[0].rank, 1);
        assert_eq!(scored[1].rank, 2);
    }

    #[test]
    fn truncation_limits_the_result_count() {
        let corpus: Vec<SearchableChunk> = (0..8)
            .map(|index| corpus_chunk(&format!("chunk number {index}"), vec![1.0, 0.0]))
            .collect();
        let keyword_hits: Vec<KeywordHit> = (0..8)
            .map(|corpus_index| KeywordHit {
                corpus_index,
                score: (8 - corpus_index) as f64,
                similarity: 0.1,
            })
            .collect();

        let scored = fuse(&corpus, &keyword_hits, &[], FusionWeights::default(), 3);
        assert_eq!(scored.len(), 3);
    }
}
