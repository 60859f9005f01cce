//! Deterministic stand-ins for the inference runtimes and the PDF parser.
//!
//! Real embedding and reranking models live outside this crate; tests (and
//! downstream crates' tests) use these instead. The hash embedder projects
//! 2-gram terms onto fixed dimensions, so texts sharing vocabulary get
//! genuinely similar vectors and retrieval behaves like retrieval rather
//! than noise.

use crate::embedding::{Embedder, Reranker};
use crate::error::{EmbedderError, ExtractionError, RerankerError};
use crate::extract::{PageSource, PageText};
use crate::lexical::tokenize::tokenize;
use crate::vector::l2_normalize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Deterministic bag-of-bigrams embedder. Each token hashes to one
/// dimension; vectors are unit-normalised.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for token in tokenize(text) {
            let idx = (fnv1a(token.as_bytes()) % self.dim as u64) as usize;
            v[idx] += 1.0;
        }
        if v.iter().all(|&x| x == 0.0) {
            v[0] = 1.0;
        }
        l2_normalize(&mut v);
        v
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Embedder that always fails, for degraded-mode tests.
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn dimension(&self) -> usize {
        0
    }

    fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        Err(EmbedderError::Inference("embedder disabled".to_string()))
    }
}

/// Reranker scripted by substring rules: a passage's score is the sum of
/// the scores of every pattern it contains.
#[derive(Default)]
pub struct ScriptedReranker {
    rules: Vec<(String, f32)>,
}

impl ScriptedReranker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, pattern: &str, score: f32) -> Self {
        self.rules.push((pattern.to_string(), score));
        self
    }
}

impl Reranker for ScriptedReranker {
    fn rerank(&self, _query: &str, passages: &[String]) -> Result<Vec<f32>, RerankerError> {
        Ok(passages
            .iter()
            .map(|passage| {
                self.rules
                    .iter()
                    .filter(|(pattern, _)| passage.contains(pattern))
                    .map(|(_, score)| score)
                    .sum()
            })
            .collect())
    }
}

/// Reranker that always fails, for fallback tests.
pub struct FailingReranker;

impl Reranker for FailingReranker {
    fn rerank(&self, _query: &str, _passages: &[String]) -> Result<Vec<f32>, RerankerError> {
        Err(RerankerError("reranker disabled".to_string()))
    }
}

/// In-memory page source: maps paths to page texts, no PDFs required.
#[derive(Default)]
pub struct StubPageSource {
    documents: HashMap<PathBuf, Vec<PageText>>,
}

impl StubPageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pages` (1-based numbering applied in order) for `path`.
    pub fn with<P: Into<PathBuf>, S: AsRef<str>>(mut self, path: P, pages: &[S]) -> Self {
        let pages = pages
            .iter()
            .enumerate()
            .map(|(i, text)| PageText {
                page_number: (i + 1) as u32,
                text: text.as_ref().to_string(),
            })
            .collect();
        self.documents.insert(path.into(), pages);
        self
    }
}

impl PageSource for StubPageSource {
    fn pages(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError> {
        self.documents
            .get(path)
            .cloned()
            .ok_or_else(|| ExtractionError::Unreadable(path.display().to_string()))
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embedder_is_deterministic_and_unit_norm() {
        let embedder = HashEmbedder::new(16);
        let a = embedder.embed_one("機械学習は統計の話");
        let b = embedder.embed_one("機械学習は統計の話");
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_means_higher_similarity() {
        let embedder = HashEmbedder::new(32);
        let query = embedder.embed_one("機械学習");
        let related = embedder.embed_one("機械学習は統計と最適化の交点にある");
        let unrelated = embedder.embed_one("今日の天気は晴れです");

        let dot = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn scripted_reranker_sums_matching_rules() {
        let reranker = ScriptedReranker::new().rule("猫", 5.0).rule("犬", 2.0);
        let scores = reranker
            .rerank("q", &["猫と犬".to_string(), "魚".to_string()])
            .unwrap();
        assert_eq!(scores, vec![7.0, 0.0]);
    }

    #[test]
    fn stub_source_serves_registered_pages_only() {
        let source = StubPageSource::new().with("a.pdf", &["一ページ目", "二ページ目"]);
        let pages = source.pages(Path::new("a.pdf")).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].page_number, 2);
        assert!(source.pages(Path::new("missing.pdf")).is_err());
    }
}
