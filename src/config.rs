//! Production configuration constants.
//!
//! Every number that is part of the retrieval contract lives here so that
//! the indexer, the searcher, and the tests agree on a single source of
//! truth. Runtime-tunable knobs (shortlist sizes, deadlines, fusion
//! weights) have struct-level configuration in their owning modules with
//! these values as defaults.

// =============================================================================
// Embedding model
// =============================================================================

/// Embedding vector dimension.
///
/// The embedder contract produces 512-dimensional unit vectors; the vector
/// index refuses anything else.
pub const EMBEDDING_DIM: usize = 512;

// =============================================================================
// Page filtering and chunking
// =============================================================================

/// Minimum non-whitespace characters for a page to be indexable.
pub const MIN_PAGE_CHARS: usize = 50;

/// Maximum tolerated ratio of characters that are neither Japanese script
/// nor ASCII letters. Pages above this are scan artefacts or decoration.
pub const MAX_FOREIGN_RATIO: f32 = 0.7;

/// Dotted-leader lines (`....123`) at or above this count mark a table of
/// contents page.
pub const TOC_LEADER_LINES: usize = 5;

/// Line-initial `図N` / `表N` lines at or above this count mark a figure or
/// table directory page.
pub const FIGURE_DIRECTORY_LINES: usize = 3;

/// Sliding chunk window, in characters.
pub const CHUNK_WINDOW_CHARS: usize = 400;

/// Overlap between consecutive chunks, in characters.
pub const CHUNK_OVERLAP_CHARS: usize = 50;

// =============================================================================
// Vector index (IVF-PQ)
// =============================================================================

/// Number of coarse inverted lists.
pub const IVF_NLIST: usize = 256;

/// Product-quantiser subspace count. Must divide [`EMBEDDING_DIM`].
pub const PQ_M: usize = 16;

/// Bits per PQ code. 8 bits gives 256 codewords per subspace.
pub const PQ_NBITS: usize = 8;

/// Default number of inverted lists probed per query.
pub const DEFAULT_NPROBE: usize = 8;

/// Embeddings collected before training triggers automatically (capped by
/// the expected corpus size).
pub const TRAINING_THRESHOLD: usize = 100_000;

// =============================================================================
// Lexical index (BM25)
// =============================================================================

/// Okapi BM25 term-frequency saturation.
pub const BM25_K1: f32 = 1.2;

/// Okapi BM25 length normalisation.
pub const BM25_B: f32 = 0.75;

/// Terms with document frequency below this are pruned at build commit.
pub const MIN_DF: u64 = 2;

// =============================================================================
// Indexing driver
// =============================================================================

/// Maximum chunks buffered before an embedding flush.
pub const EMBED_BATCH_SIZE: usize = 128;

// =============================================================================
// Hybrid search
// =============================================================================

/// RRF rank damping constant, per Cormack et al. (SIGIR 2009).
pub const RRF_K: f32 = 60.0;

/// Default RRF weight of the vector candidate list.
pub const RRF_VECTOR_WEIGHT: f32 = 0.7;

/// Default RRF weight of the BM25 candidate list.
pub const RRF_BM25_WEIGHT: f32 = 0.3;

/// Cap on the fused prefix handed to the cross-encoder.
pub const RERANK_POOL: usize = 30;

/// Largest accepted `top_k`.
pub const MAX_TOP_K: usize = 50;

/// Snippet width in characters.
pub const SNIPPET_CHARS: usize = 160;

/// Per-stage deadlines, in milliseconds.
pub const VECTOR_STAGE_DEADLINE_MS: u64 = 200;
pub const BM25_STAGE_DEADLINE_MS: u64 = 500;
pub const RERANK_STAGE_DEADLINE_MS: u64 = 400;

/// Available-memory floor below which reranking is disabled. Inherited from
/// the 4 GB deployment target; tune per host via `SearchConfig`.
pub const RERANK_MEMORY_FLOOR_BYTES: u64 = 500 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pq_subspaces_divide_dimension() {
        assert_eq!(EMBEDDING_DIM % PQ_M, 0);
    }

    #[test]
    fn chunk_overlap_smaller_than_window() {
        assert!(CHUNK_OVERLAP_CHARS < CHUNK_WINDOW_CHARS);
    }

    #[test]
    fn rrf_weights_cover_both_lists() {
        assert!(RRF_VECTOR_WEIGHT > 0.0);
        assert!(RRF_BM25_WEIGHT > 0.0);
    }
}
