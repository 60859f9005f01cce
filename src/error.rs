//! Error types for the retrieval engine.
//!
//! One enum per subsystem, converted at module seams. The driver recovers
//! [`ExtractionError`] per file and [`EmbedderError`] per batch; the
//! searcher degrades on sub-retriever errors instead of failing the query;
//! [`VectorIndexError::Corruption`] on load is fatal and must reach the
//! operator unmodified.

use thiserror::Error;

/// Errors raised while reading a PDF.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The document could not be parsed at all.
    #[error("unreadable pdf: {0}")]
    Unreadable(String),
    /// The document is encrypted and cannot be extracted.
    #[error("encrypted pdf: {0}")]
    Encrypted(String),
    /// Underlying file I/O failed.
    #[error("pdf io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the embedding runtime.
#[derive(Debug, Clone, Error)]
pub enum EmbedderError {
    /// Model inference failed.
    #[error("embedding failed: {0}")]
    Inference(String),
    /// The runtime returned a vector of the wrong dimension.
    #[error("embedder returned dimension {actual}, expected {expected}")]
    Dimension { expected: usize, actual: usize },
}

/// Errors raised by the cross-encoder runtime. The searcher always recovers
/// from these by falling back to fused order.
#[derive(Debug, Clone, Error)]
#[error("reranking failed: {0}")]
pub struct RerankerError(pub String);

/// Errors raised by the metadata catalogue.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A `(source, page, chunk)` triple was committed under two ids.
    #[error("duplicate passage key {source_doc}:{page}:{chunk}")]
    Conflict {
        source_doc: String,
        page: u32,
        chunk: u32,
    },
    /// A strict fetch referenced an id the catalogue does not hold.
    #[error("passage {0} not found")]
    MissingPassage(u64),
    /// Underlying SQLite failure.
    #[error("catalogue database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for CatalogError {
    fn from(e: rusqlite::Error) -> Self {
        CatalogError::Database(e.to_string())
    }
}

/// Errors raised by the vector index.
#[derive(Debug, Error)]
pub enum VectorIndexError {
    /// Vectors were added or searched before training.
    #[error("vector index is not trained")]
    Untrained,
    /// Training was requested on an already-trained index.
    #[error("vector index is already trained; reset requires a full rebuild")]
    AlreadyTrained,
    /// Too few vectors to train the requested codebooks.
    #[error("training needs at least {needed} vectors, got {got}")]
    InsufficientTrainingData { needed: usize, got: usize },
    /// A vector of the wrong dimension was supplied.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// The persisted artefact is inconsistent: bad magic, parameter
    /// mismatch, truncated payload, or cross-store count disagreement.
    #[error("index corruption: {0}")]
    Corruption(String),
    /// Artefact file I/O failed.
    #[error("index io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the BM25 index.
#[derive(Debug, Error)]
pub enum LexicalError {
    /// Underlying SQLite failure.
    #[error("lexical database error: {0}")]
    Database(String),
    /// A posting blob failed to decode.
    #[error("malformed posting blob for term {0}")]
    MalformedPostings(String),
}

impl From<rusqlite::Error> for LexicalError {
    fn from(e: rusqlite::Error) -> Self {
        LexicalError::Database(e.to_string())
    }
}

/// Errors surfaced by the indexing driver. Per-file recoverable failures
/// are captured in the run report instead; this enum is for faults that
/// abort the run.
#[derive(Debug, Error)]
pub enum IndexingError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Vector(#[from] VectorIndexError),
    #[error(transparent)]
    Lexical(#[from] LexicalError),
    #[error(transparent)]
    Embedder(#[from] EmbedderError),
    #[error("indexing io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned to search callers.
#[derive(Debug, Error)]
pub enum SearchError {
    /// `top_k` was outside `0..=50`.
    #[error("top_k {0} out of range (max 50)")]
    InvalidTopK(usize),
    /// Both sub-retrievers failed; there is nothing to return.
    #[error("search unavailable: {0}")]
    Unavailable(String),
    /// Result hydration against the catalogue failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
