//! Hybrid search orchestration.
//!
//! A query is dispatched to the vector and BM25 sub-retrievers on worker
//! threads, each bounded by its stage deadline; whatever survives is fused
//! with weighted RRF, optionally reranked by the cross-encoder, hydrated
//! from the catalogue and decorated with snippets. A failed or timed-out
//! sub-retriever degrades the response instead of failing it; only the
//! loss of both signals is an error.

pub mod fusion;
pub mod snippet;
pub mod types;

use crate::catalog::{Catalog, PassageRecord};
use crate::config::MAX_TOP_K;
use crate::embedding::{Embedder, Reranker};
use crate::error::SearchError;
use crate::lexical::tokenize::tokenize;
use crate::lexical::Bm25Index;
use crate::vector::VectorIndex;
use fusion::{reciprocal_rank_fusion, FusedHit};
use snippet::make_snippet;
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

pub use types::{SearchConfig, SearchHit, SearchMode, SearchResponse, StageTimings, StatusReport};

/// Outcome of one sub-retrieval stage.
enum StageOutcome {
    Hits(Vec<(u64, f32)>, u64),
    Failed(String, u64),
    TimedOut(u64),
}

impl StageOutcome {
    fn elapsed_ms(&self) -> u64 {
        match self {
            StageOutcome::Hits(_, ms) | StageOutcome::Failed(_, ms) | StageOutcome::TimedOut(ms) => {
                *ms
            }
        }
    }
}

/// The hybrid searcher. Cheap to clone-per-query state lives behind `Arc`s
/// shared with the indexing driver; search takes shared read leases only.
pub struct HybridSearcher {
    catalog: Arc<Catalog>,
    vectors: Arc<RwLock<VectorIndex>>,
    lexical: Arc<Bm25Index>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    config: SearchConfig,
}

impl HybridSearcher {
    pub fn new(
        catalog: Arc<Catalog>,
        vectors: Arc<RwLock<VectorIndex>>,
        lexical: Arc<Bm25Index>,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        config: SearchConfig,
    ) -> Self {
        Self {
            catalog,
            vectors,
            lexical,
            embedder,
            reranker,
            config,
        }
    }

    /// Run one query. `top_k = 0` yields an empty response; `top_k > 50`
    /// is rejected.
    #[instrument(skip(self, mode), fields(mode = %mode))]
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        mode: SearchMode,
    ) -> Result<SearchResponse, SearchError> {
        if top_k > MAX_TOP_K {
            return Err(SearchError::InvalidTopK(top_k));
        }
        let started = Instant::now();
        if top_k == 0 || query.trim().is_empty() {
            return Ok(SearchResponse {
                results: Vec::new(),
                degraded: false,
                timings_ms: StageTimings {
                    total: started.elapsed().as_millis() as u64,
                    ..StageTimings::default()
                },
            });
        }

        let shortlist = (top_k * 4).max(40);
        let use_bm25 = mode != SearchMode::Vector;

        // Dispatch both sub-retrievers, then collect under their deadlines.
        let vector_rx = self.spawn_vector_stage(query, shortlist);
        let bm25_rx = use_bm25.then(|| self.spawn_bm25_stage(query, shortlist));

        let vector_outcome = collect_stage(vector_rx, self.config.vector_deadline);
        let bm25_outcome = bm25_rx.map(|rx| {
            let remaining = self
                .config
                .bm25_deadline
                .saturating_sub(started.elapsed());
            collect_stage(rx, remaining)
        });

        let mut timings = StageTimings {
            vector: vector_outcome.elapsed_ms(),
            bm25: bm25_outcome.as_ref().map(StageOutcome::elapsed_ms).unwrap_or(0),
            ..StageTimings::default()
        };

        let mut degraded = false;
        let (vector_hits, vector_ok) = match vector_outcome {
            StageOutcome::Hits(hits, _) => (hits, true),
            StageOutcome::Failed(reason, _) => {
                warn!(%reason, "vector stage failed");
                degraded = true;
                (Vec::new(), false)
            }
            StageOutcome::TimedOut(_) => {
                warn!("vector stage deadline expired");
                degraded = true;
                (Vec::new(), false)
            }
        };
        let (bm25_hits, bm25_ok) = match bm25_outcome {
            None => (Vec::new(), false),
            Some(StageOutcome::Hits(hits, _)) => (hits, true),
            Some(StageOutcome::Failed(reason, _)) => {
                warn!(%reason, "bm25 stage failed");
                degraded = true;
                (Vec::new(), false)
            }
            Some(StageOutcome::TimedOut(_)) => {
                warn!("bm25 stage deadline expired");
                degraded = true;
                (Vec::new(), false)
            }
        };

        if !vector_ok && !(use_bm25 && bm25_ok) {
            return Err(SearchError::Unavailable(
                "every sub-retriever failed".to_string(),
            ));
        }

        // Fuse and truncate.
        let mut fused: Vec<FusedHit> = if use_bm25 {
            reciprocal_rank_fusion(
                &vector_hits,
                &bm25_hits,
                self.config.rrf_k,
                self.config.vector_weight,
                self.config.bm25_weight,
            )
        } else {
            vector_hits
                .iter()
                .map(|&(id, score)| FusedHit {
                    id,
                    score,
                    vector_score: Some(score),
                })
                .collect()
        };
        fused.truncate(top_k);

        // Hydrate live passages; ids tombstoned since indexing are skipped.
        let ids: Vec<u64> = fused.iter().map(|h| h.id).collect();
        let records = self.catalog.try_get_passages(&ids)?;
        let by_id: HashMap<u64, &PassageRecord> =
            records.iter().map(|r| (r.id, r)).collect();
        let mut ranked: Vec<(FusedHit, &PassageRecord)> = fused
            .iter()
            .filter_map(|hit| by_id.get(&hit.id).map(|record| (*hit, *record)))
            .collect();

        // Optional rerank of the fused head.
        if mode == SearchMode::HybridRerank {
            timings.rerank = self.rerank_head(query, &mut ranked);
        }

        let query_terms = tokenize(query);
        let results: Vec<SearchHit> = ranked
            .into_iter()
            .map(|(hit, record)| SearchHit {
                id: record.id,
                source: record.source.clone(),
                page: record.page,
                score: hit.score,
                text: record.text.clone(),
                snippet: make_snippet(&record.text, &query_terms, self.config.snippet_chars),
            })
            .collect();

        timings.total = started.elapsed().as_millis() as u64;
        debug!(
            results = results.len(),
            degraded,
            total_ms = timings.total,
            "query complete"
        );
        Ok(SearchResponse {
            results,
            degraded,
            timings_ms: timings,
        })
    }

    /// Engine status for `/status`.
    pub fn status(&self) -> Result<StatusReport, SearchError> {
        let counts = self.catalog.counts()?;
        let (vectors, trained) = {
            let index = self.vectors.read().unwrap_or_else(|p| p.into_inner());
            (index.ntotal(), index.is_trained())
        };
        Ok(StatusReport {
            vectors,
            documents: counts.passages,
            files: counts.files,
            trained,
            degraded_mode: !trained || !self.rerank_allowed(),
        })
    }

    fn spawn_vector_stage(
        &self,
        query: &str,
        shortlist: usize,
    ) -> mpsc::Receiver<Result<(Vec<(u64, f32)>, u64), String>> {
        let (tx, rx) = mpsc::channel();
        let embedder = Arc::clone(&self.embedder);
        let vectors = Arc::clone(&self.vectors);
        let nprobe = self.config.nprobe;
        let query = query.to_string();
        thread::spawn(move || {
            let begun = Instant::now();
            let result = embedder
                .embed_query(&query)
                .map_err(|e| e.to_string())
                .and_then(|q| {
                    let index = vectors.read().unwrap_or_else(|p| p.into_inner());
                    index
                        .search(&q, shortlist, nprobe)
                        .map_err(|e| e.to_string())
                })
                .map(|hits| (hits, begun.elapsed().as_millis() as u64));
            let _ = tx.send(result);
        });
        rx
    }

    fn spawn_bm25_stage(
        &self,
        query: &str,
        shortlist: usize,
    ) -> mpsc::Receiver<Result<(Vec<(u64, f32)>, u64), String>> {
        let (tx, rx) = mpsc::channel();
        let lexical = Arc::clone(&self.lexical);
        let query = query.to_string();
        thread::spawn(move || {
            let begun = Instant::now();
            let result = lexical
                .search(&query, shortlist)
                .map_err(|e| e.to_string())
                .map(|hits| (hits, begun.elapsed().as_millis() as u64));
            let _ = tx.send(result);
        });
        rx
    }

    /// Rerank the head of the fused list in place. The pool is only ever
    /// reordered, never shrunk, so nothing from the fused top-k can drop
    /// out. Returns the stage's elapsed milliseconds.
    fn rerank_head(&self, query: &str, ranked: &mut [(FusedHit, &PassageRecord)]) -> u64 {
        let begun = Instant::now();
        let Some(reranker) = &self.reranker else {
            return 0;
        };
        if !self.rerank_allowed() {
            info!("available memory below floor, skipping rerank");
            return 0;
        }
        let pool = self.config.rerank_pool.min(ranked.len());
        if pool == 0 {
            return 0;
        }

        let passages: Vec<String> = ranked[..pool]
            .iter()
            .map(|(_, record)| record.text.clone())
            .collect();

        let (tx, rx) = mpsc::channel();
        let reranker = Arc::clone(reranker);
        let query_owned = query.to_string();
        thread::spawn(move || {
            let _ = tx.send(reranker.rerank(&query_owned, &passages));
        });

        let scores = match rx.recv_timeout(self.config.rerank_deadline) {
            Ok(Ok(scores)) if scores.len() == pool => scores,
            Ok(Ok(_)) => {
                warn!("reranker returned wrong score count, keeping fused order");
                return begun.elapsed().as_millis() as u64;
            }
            Ok(Err(e)) => {
                warn!("reranker failed, keeping fused order: {e}");
                return begun.elapsed().as_millis() as u64;
            }
            Err(_) => {
                warn!("rerank deadline expired, keeping fused order");
                return begun.elapsed().as_millis() as u64;
            }
        };

        // Blend normalised RRF with the sigmoid-squashed reranker score to
        // preserve lexical diversity in the final order.
        let max_rrf = ranked[..pool]
            .iter()
            .map(|(hit, _)| hit.score)
            .fold(f32::MIN, f32::max)
            .max(f32::EPSILON);
        let mut head: Vec<(FusedHit, &PassageRecord)> = ranked[..pool].to_vec();
        for (entry, &rerank_score) in head.iter_mut().zip(&scores) {
            let blended = 0.5 * (entry.0.score / max_rrf) + 0.5 * sigmoid(rerank_score);
            entry.0.score = blended;
        }
        head.sort_by(|a, b| {
            b.0.score
                .total_cmp(&a.0.score)
                .then_with(|| {
                    b.0.vector_score
                        .unwrap_or(f32::NEG_INFINITY)
                        .total_cmp(&a.0.vector_score.unwrap_or(f32::NEG_INFINITY))
                })
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        ranked[..pool].clone_from_slice(&head);

        begun.elapsed().as_millis() as u64
    }

    fn rerank_allowed(&self) -> bool {
        match available_memory_bytes() {
            Some(available) => available >= self.config.rerank_memory_floor_bytes,
            // Unknown platform: assume there is room rather than silently
            // downgrading every query.
            None => true,
        }
    }
}

fn collect_stage(
    rx: mpsc::Receiver<Result<(Vec<(u64, f32)>, u64), String>>,
    deadline: Duration,
) -> StageOutcome {
    match rx.recv_timeout(deadline) {
        Ok(Ok((hits, ms))) => StageOutcome::Hits(hits, ms),
        Ok(Err(reason)) => StageOutcome::Failed(reason, deadline.as_millis() as u64),
        Err(RecvTimeoutError::Timeout) => StageOutcome::TimedOut(deadline.as_millis() as u64),
        Err(RecvTimeoutError::Disconnected) => {
            StageOutcome::Failed("stage worker vanished".to_string(), 0)
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Available system memory, from `/proc/meminfo` where present.
fn available_memory_bytes() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}
