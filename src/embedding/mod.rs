//! Inference trait seams.
//!
//! The engine never loads model weights itself. The embedding and reranking
//! runtimes live outside this crate (an ONNX session, a llama.cpp wrapper,
//! a remote endpoint) and plug in through these traits. Both are blocking
//! calls; the searcher runs them on worker threads with per-stage deadlines.

use crate::error::{EmbedderError, RerankerError};

/// Text-to-vector embedding model.
///
/// Implementations must be `Send + Sync`: the searcher and the indexing
/// driver share one instance behind an `Arc`, and model weights are loaded
/// once and never cloned.
pub trait Embedder: Send + Sync {
    /// Output dimension; every returned vector has this length.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts into unit L2-norm vectors, one per input, in
    /// input order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Embed a single query string.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut vectors = self.embed(std::slice::from_ref(&text.to_string()))?;
        vectors.pop().ok_or_else(|| {
            EmbedderError::Inference("embedder returned no vector for query".to_string())
        })
    }
}

/// Cross-encoder relevance model.
///
/// Scores `(query, passage)` pairs jointly; higher means more relevant.
/// Scores are unbounded reals and are squashed through a sigmoid before
/// blending with fused ranks.
pub trait Reranker: Send + Sync {
    /// Score each passage against the query, in input order.
    fn rerank(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RerankerError>;
}
