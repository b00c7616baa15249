use crate::error::QueryError;
use crate::store::SearchableChunk;
use regex::Regex;
use std::collections::{HashMap, HashSet};

pub const BM25_K1: f64 = 1.5;
pub const BM25_B: f64 = 0.75;

/// Divisor squashing raw BM25 scores into [0, 1] for fusion. Ad hoc but
/// load-bearing: changing it shifts the keyword/vector balance.
const SCORE_NORMALIZER: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub corpus_index: usize,
    pub score: f64,
    /// `min(score / 10, 1)`, the value the fusion stage blends.
    pub similarity: f64,
}

/// Okapi BM25 recomputed over the candidate corpus per query. There is no
/// persistent inverted index; acceptable up to a few hundred documents.
pub struct KeywordScorer {
    strip: Regex,
}

impl KeywordScorer {
    pub fn new() -> Result<Self, QueryError> {
        Ok(Self {
            strip: Regex::new(r"[^\w\s가-힣]")?,
        })
    }

    /// Lowercase, strip everything outside word characters and Hangul,
    /// split on whitespace, drop single-character tokens.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let cleaned = self.strip.replace_all(&lowered, "");
        cleaned
            .split_whitespace()
            .filter(|token| token.chars().count() > 1)
            .map(str::to_string)
            .collect()
    }

    /// Scores every corpus chunk against the query and returns the hits
    /// ranked by descending score. Chunks containing no query term are
    /// dropped, not ranked at zero.
    pub fn score(&self, query: &str, corpus: &[SearchableChunk]) -> Vec<KeywordHit> {
        let query_terms: Vec<String> = {
            let mut seen = HashSet::new();
            self.tokenize(query)
                .into_iter()
                .filter(|term| seen.insert(term.clone()))
                .collect()
        };
        if query_terms.is_empty() || corpus.is_empty() {
            return Vec::new();
        }

        let documents: Vec<Vec<String>> = corpus
            .iter()
            .map(|chunk| self.tokenize(&chunk.text))
            .collect();

        let corpus_size = documents.len() as f64;
        let total_len: usize = documents.iter().map(Vec::len).sum();
        if total_len == 0 {
            return Vec::new();
        }
        let avg_len = total_len as f64 / corpus_size;

        let mut document_frequency: HashMap<&str, f64> = HashMap::new();
        for term in &query_terms {
            let df = documents
                .iter()
                .filter(|tokens| tokens.iter().any(|token| token == term))
                .count();
            document_frequency.insert(term.as_str(), df as f64);
        }

        let mut hits = Vec::new();
        for (corpus_index, tokens) in documents.iter().enumerate() {
            let doc_len = tokens.len() as f64;
            let mut score = 0.0;
            let mut matched = false;

            for term in &query_terms {
                let tf = tokens.iter().filter(|token| *token == term).count() as f64;
                if tf == 0.0 {
                    continue;
                }
                matched = true;

                let df = document_frequency[term.as_str()];
                // Smoothed IDF: the raw Okapi form goes negative once a
                // term appears in more than half the corpus, which inverts
                // rankings on corpora of a handful of chunks.
                let idf = (1.0 + (corpus_size - df + 0.5) / (df + 0.5)).ln();
                score += idf * (tf * (BM25_K1 + 1.0))
                    / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * (doc_len / avg_len)));
            }

            if matched {
                hits.push(KeywordHit {
                    corpus_index,
                    score,
                    similarity: (score / SCORE_NORMALIZER).min(1.0),
                });
            }
        }

        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scorer() -> KeywordScorer {
        KeywordScorer::new().expect("scorer")
    }

    fn corpus_chunk(text: &str) -> SearchableChunk {
        SearchableChunk {
            document_id: Uuid::new_v4(),
            document_title: "doc.pdf".to_string(),
            department: None,
            chunk_index: 0,
            text: text.to_string(),
            embedding: Vec::new(),
        }
    }

    #[test]
    fn tokenizer_lowercases_and_strips_punctuation() {
        let tokens = scorer().tokenize("Hydraulic PUMP, pressure!");
        assert_eq!(tokens, vec!["hydraulic", "pump", "pressure"]);
    }

    #[test]
    fn tokenizer_keeps_hangul_and_drops_short_tokens() {
        let tokens = scorer().tokenize("주차 문제 a 1");
        assert_eq!(tokens, vec!["주차", "문제"]);
    }

    #[test]
    fn korean_query_ranks_by_term_frequency() {
        let corpus = vec![
            corpus_chunk("주차 문제 때문에 회의를 했다. 주차 문제 해결이 필요하다."),
            corpus_chunk("주차 문제 관련 공지입니다. 다른 내용도 포함되어 있습니다."),
            corpus_chunk("복지 제도 개편 안내문이며 검색어와 무관한 내용입니다."),
        ];

        let hits = scorer().score("주차 문제", &corpus);

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].corpus_index, 0);
        assert_eq!(hits[1].corpus_index, 1);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn more_occurrences_never_score_lower() {
        let base = "pump maintenance schedule with filler text around the topic";
        let corpus = vec![
            corpus_chunk(base),
            corpus_chunk(&format!("{base} pump")),
            corpus_chunk("unrelated filler text for corpus statistics and averages"),
        ];

        let hits = scorer().score("pump", &corpus);
        let score_of = |index: usize| {
            hits.iter()
                .find(|hit| hit.corpus_index == index)
                .map(|hit| hit.score)
                .expect("hit present")
        };

        assert!(score_of(1) >= score_of(0));
    }

    #[test]
    fn similarity_is_capped_at_one() {
        let corpus = vec![
            corpus_chunk(&"pump ".repeat(200)),
            corpus_chunk("pressure relief valve description text"),
        ];

        let hits = scorer().score("pump", &corpus);
        assert!(hits.iter().all(|hit| hit.similarity <= 1.0));
    }

    #[test]
    fn chunks_without_query_terms_are_dropped() {
        let corpus = vec![
            corpus_chunk("hydraulic pump pressure"),
            corpus_chunk("completely unrelated text"),
        ];

        let hits = scorer().score("pump", &corpus);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].corpus_index, 0);
    }

    #[test]
    fn empty_query_produces_no_hits() {
        let corpus = vec![corpus_chunk("hydraulic pump pressure")];
        assert!(scorer().score("  ", &corpus).is_empty());
        assert!(scorer().score("a 1 -", &corpus).is_empty());
    }
}
