//! Indexing pipeline: store wiring and the crash-safe driver.
//!
//! [`open_stores`] assembles the persisted state layout (catalogue, BM25
//! store, vector artefact) from one directory, runs pending-file recovery,
//! and cross-checks that all stores belong to the same logical generation.
//! [`IndexingDriver`] then feeds PDFs through extraction, filtering,
//! chunking, embedding and the three stores with file-granular commits.

mod driver;

pub use driver::{DriverConfig, FileOutcome, FileReport, IndexReport, IndexingDriver};

use crate::catalog::Catalog;
use crate::error::{IndexingError, VectorIndexError};
use crate::lexical::Bm25Index;
use crate::vector::{VectorIndex, VectorIndexParams, INDEX_FILE};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Catalogue file name inside the data directory.
pub const CATALOG_FILE: &str = "metadata.db";
/// BM25 store file name inside the data directory.
pub const BM25_FILE: &str = "bm25.db";

/// The three shared stores, ready for a driver and any number of searchers.
#[derive(Debug)]
pub struct EngineStores {
    pub catalog: Arc<Catalog>,
    pub vectors: Arc<RwLock<VectorIndex>>,
    pub lexical: Arc<Bm25Index>,
}

/// Open (or create) every store under `data_dir`, roll back any files left
/// pending by a crash, and validate that the stores share one generation.
///
/// A vector artefact that fails to parse, or whose vector count disagrees
/// with the catalogue, is fatal corruption: the operator must see it
/// unmodified rather than have the engine silently rebuild.
pub fn open_stores(
    data_dir: &Path,
    params: VectorIndexParams,
) -> Result<EngineStores, IndexingError> {
    let catalog = Arc::new(Catalog::open(data_dir.join(CATALOG_FILE))?);
    let lexical = Arc::new(Bm25Index::open(data_dir.join(BM25_FILE))?);

    let vectors = if data_dir.join(INDEX_FILE).exists() {
        VectorIndex::load_from_dir(data_dir, params)?
    } else {
        VectorIndex::new(params)
    };
    let vectors = Arc::new(RwLock::new(vectors));

    driver::recover_pending_files(&catalog, &vectors, &lexical, data_dir)?;

    let expected = catalog.total_passage_rows()?;
    {
        let index = vectors.read().unwrap_or_else(|p| p.into_inner());
        // An untrained index is legitimately empty while the catalogue
        // already holds keyword-only passages (their vectors wait in the
        // spool); once trained it must cover every row.
        let want = if index.is_trained() { expected } else { 0 };
        let (ok, detail) = index.verify(want);
        if !ok {
            return Err(VectorIndexError::Corruption(detail).into());
        }
    }
    let (ok, detail) = lexical.verify(expected)?;
    if !ok {
        return Err(VectorIndexError::Corruption(detail).into());
    }

    info!(passages = expected, "stores opened");
    Ok(EngineStores {
        catalog,
        vectors,
        lexical,
    })
}
