//! Search-facing types: modes, configuration, and response shapes consumed
//! by the HTTP facade.

use crate::config::{
    BM25_STAGE_DEADLINE_MS, DEFAULT_NPROBE, RERANK_MEMORY_FLOOR_BYTES, RERANK_POOL,
    RERANK_STAGE_DEADLINE_MS, RRF_BM25_WEIGHT, RRF_K, RRF_VECTOR_WEIGHT, SNIPPET_CHARS,
    VECTOR_STAGE_DEADLINE_MS,
};
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;

/// Retrieval mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Dense retrieval only.
    Vector,
    /// Dense + BM25, fused with RRF.
    #[default]
    Hybrid,
    /// Dense + BM25 + cross-encoder reranking of the fused head.
    HybridRerank,
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vector" => Ok(SearchMode::Vector),
            "hybrid" => Ok(SearchMode::Hybrid),
            "hybrid+rerank" => Ok(SearchMode::HybridRerank),
            other => Err(format!("unknown search mode: {other}")),
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SearchMode::Vector => "vector",
            SearchMode::Hybrid => "hybrid",
            SearchMode::HybridRerank => "hybrid+rerank",
        })
    }
}

/// Tunable search behaviour. Defaults are the production contract.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Inverted lists probed per vector query.
    pub nprobe: usize,
    /// RRF rank damping constant.
    pub rrf_k: f32,
    /// RRF weight of the vector list.
    pub vector_weight: f32,
    /// RRF weight of the BM25 list.
    pub bm25_weight: f32,
    /// Fused results handed to the cross-encoder.
    pub rerank_pool: usize,
    pub vector_deadline: Duration,
    pub bm25_deadline: Duration,
    pub rerank_deadline: Duration,
    /// Available-memory floor below which reranking is skipped.
    pub rerank_memory_floor_bytes: u64,
    /// Snippet window width in characters.
    pub snippet_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            nprobe: DEFAULT_NPROBE,
            rrf_k: RRF_K,
            vector_weight: RRF_VECTOR_WEIGHT,
            bm25_weight: RRF_BM25_WEIGHT,
            rerank_pool: RERANK_POOL,
            vector_deadline: Duration::from_millis(VECTOR_STAGE_DEADLINE_MS),
            bm25_deadline: Duration::from_millis(BM25_STAGE_DEADLINE_MS),
            rerank_deadline: Duration::from_millis(RERANK_STAGE_DEADLINE_MS),
            rerank_memory_floor_bytes: RERANK_MEMORY_FLOOR_BYTES,
            snippet_chars: SNIPPET_CHARS,
        }
    }
}

/// One search result, hydrated from the catalogue.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub id: u64,
    pub source: String,
    pub page: u32,
    pub score: f32,
    pub text: String,
    pub snippet: String,
}

/// Per-stage wall-clock timings, in milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StageTimings {
    pub vector: u64,
    pub bm25: u64,
    pub rerank: u64,
    pub total: u64,
}

/// A complete query response.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    /// True when a sub-retriever failed or timed out and the response was
    /// assembled from the surviving signal alone.
    pub degraded: bool,
    pub timings_ms: StageTimings,
}

/// Engine status, as served by `/status`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusReport {
    pub vectors: u64,
    pub documents: u64,
    pub files: u64,
    pub trained: bool,
    pub degraded_mode: bool,
}
