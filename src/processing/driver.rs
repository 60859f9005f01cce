//! The indexing driver.
//!
//! Drives a directory of PDFs through extract → filter → chunk → id
//! assignment → batched embedding → vector/lexical add → file commit,
//! making every step resumable. Commits are file-granular: catalogue rows,
//! BM25 deltas and the vector artefact checkpoint land together when a
//! file completes, so a crash never leaves a partially visible file.
//!
//! While the vector index is untrained, embeddings spool to a disk
//! overflow file; once enough vectors accumulate the index trains and the
//! spool drains. Files whose vectors cannot train yet still commit as
//! keyword-only indexed at the end of a run (and on every single-file
//! upload), so committed work is never rolled back: their spool entries
//! survive recovery and backfill the vector index at the first successful
//! training.

use crate::catalog::{Catalog, FileStatus, IdRange, PassageRecord};
use crate::config::{EMBED_BATCH_SIZE, TRAINING_THRESHOLD};
use crate::embedding::Embedder;
use crate::error::{EmbedderError, ExtractionError, IndexingError, VectorIndexError};
use crate::extract::chunking::{chunk_page, Chunk};
use crate::extract::filter::assess_page;
use crate::extract::PageSource;
use crate::lexical::Bm25Index;
use crate::vector::VectorIndex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// Disk overflow file for embeddings collected before training.
const SPOOL_FILE: &str = "pending_vectors.bin";

/// Driver tuning. Defaults are the production contract.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Directory holding the persisted state layout.
    pub data_dir: PathBuf,
    /// Chunks per embedding call.
    pub batch_size: usize,
    /// Embeddings accumulated before training triggers.
    pub training_threshold: usize,
    /// Expected final corpus size; caps the training threshold for small
    /// corpora so they do not wait forever.
    pub expected_corpus: Option<usize>,
    /// Pause before the single embedding retry.
    pub embed_retry_backoff: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("embeddings"),
            batch_size: EMBED_BATCH_SIZE,
            training_threshold: TRAINING_THRESHOLD,
            expected_corpus: None,
            embed_retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Outcome of one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Indexed { range: IdRange },
    /// Content hash matched an already-indexed record.
    Skipped,
    /// Indexed into the catalogue and BM25 store, vectors still spooled
    /// awaiting training. Transient within a run: by the time a report or
    /// an upload result is returned the file record has committed and the
    /// outcome reads `Indexed`.
    Deferred { range: IdRange },
    Failed { reason: String },
}

/// Per-file report line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub source: String,
    pub outcome: FileOutcome,
}

/// Result of one driver run.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub files: Vec<FileReport>,
    pub trained: bool,
}

impl IndexReport {
    /// Zero iff every input reached `indexed` or was deliberately skipped.
    pub fn exit_code(&self) -> i32 {
        let all_good = self.files.iter().all(|f| {
            matches!(
                f.outcome,
                FileOutcome::Indexed { .. } | FileOutcome::Skipped
            )
        });
        i32::from(!all_good)
    }

    /// One line per file, for the operator's stdout.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for file in &self.files {
            let line = match &file.outcome {
                FileOutcome::Indexed { range } => {
                    format!("{}: indexed ({} passages)\n", file.source, range.len())
                }
                FileOutcome::Skipped => format!("{}: skipped (unchanged)\n", file.source),
                FileOutcome::Deferred { range } => {
                    format!("{}: pending training ({} passages)\n", file.source, range.len())
                }
                FileOutcome::Failed { reason } => {
                    format!("{}: failed ({reason})\n", file.source)
                }
            };
            out.push_str(&line);
        }
        out
    }
}

/// A file fully processed except for its vector adds, which sit in the
/// spool until training.
struct DeferredCommit {
    source: String,
    range: IdRange,
}

/// The indexing driver. Holds the exclusive writer lease over the three
/// stores for the duration of a run; searchers keep reading committed
/// state concurrently.
pub struct IndexingDriver {
    catalog: Arc<Catalog>,
    vectors: Arc<RwLock<VectorIndex>>,
    lexical: Arc<Bm25Index>,
    embedder: Arc<dyn Embedder>,
    source: Arc<dyn PageSource>,
    config: DriverConfig,
    dim: usize,
}

impl IndexingDriver {
    pub fn new(
        catalog: Arc<Catalog>,
        vectors: Arc<RwLock<VectorIndex>>,
        lexical: Arc<Bm25Index>,
        embedder: Arc<dyn Embedder>,
        source: Arc<dyn PageSource>,
        config: DriverConfig,
    ) -> Self {
        let dim = {
            let index = vectors.read().unwrap_or_else(|p| p.into_inner());
            index.params().dim
        };
        Self {
            catalog,
            vectors,
            lexical,
            embedder,
            source,
            config,
            dim,
        }
    }

    /// Index every PDF under `input_dir`, resuming past work. Recoverable
    /// per-file problems land in the report; store or embedder faults abort
    /// the run after rolling back the file in progress.
    #[instrument(skip(self), fields(dir = %input_dir.display()))]
    pub fn index_directory(&self, input_dir: &Path) -> Result<IndexReport, IndexingError> {
        self.recover()?;

        let files = discover_pdfs(input_dir);
        info!(count = files.len(), "starting indexing run");

        let mut report = IndexReport::default();
        let mut deferred: Vec<DeferredCommit> = Vec::new();

        for path in files {
            let source = path.to_string_lossy().to_string();
            let outcome = self.index_one(&path, &mut deferred)?;
            report.files.push(FileReport { source, outcome });

            if !self.is_trained() && self.spool_count()? >= self.effective_threshold() {
                match self.train_and_drain(&mut deferred) {
                    Ok(()) => {}
                    // Threshold reached but still below the quantiser
                    // minimum; keep collecting.
                    Err(IndexingError::Vector(
                        VectorIndexError::InsufficientTrainingData { .. },
                    )) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        // End of input: force training with whatever accumulated. A corpus
        // below the quantiser minimum still commits; it serves keyword-only
        // until enough vectors exist to train.
        if !self.is_trained() && self.spool_count()? > 0 {
            match self.train_and_drain(&mut deferred) {
                Ok(()) => {}
                Err(IndexingError::Vector(VectorIndexError::InsufficientTrainingData {
                    needed,
                    got,
                })) => {
                    warn!(
                        needed,
                        got, "corpus too small to train vector index, committing keyword-only"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        self.finish_deferred_untrained(&mut deferred)?;

        // Every deferred file has been finished by now, with or without
        // vectors.
        for file in &mut report.files {
            if let FileOutcome::Deferred { range } = file.outcome {
                file.outcome = FileOutcome::Indexed { range };
            }
        }

        self.lexical.prune_default()?;
        report.trained = self.is_trained();
        info!(
            files = report.files.len(),
            exit_code = report.exit_code(),
            "indexing run complete"
        );
        Ok(report)
    }

    /// Index a single file (the upload path). Skips unchanged content;
    /// re-indexes on hash change. The returned range is always durably
    /// committed: before training the file serves keyword-only and its
    /// vectors wait in the spool, exactly as at the end of a directory run.
    pub fn index_file(&self, path: &Path) -> Result<FileOutcome, IndexingError> {
        let mut deferred = Vec::new();
        let outcome = self.index_one(path, &mut deferred)?;

        if !self.is_trained() && self.spool_count()? >= self.effective_threshold() {
            match self.train_and_drain(&mut deferred) {
                Ok(()) => {}
                Err(IndexingError::Vector(
                    VectorIndexError::InsufficientTrainingData { .. },
                )) => {}
                Err(e) => return Err(e),
            }
        }
        self.finish_deferred_untrained(&mut deferred)?;

        if let FileOutcome::Deferred { range } = outcome {
            return Ok(FileOutcome::Indexed { range });
        }
        Ok(outcome)
    }

    /// Compacting rebuild: clear all three stores (sweeping tombstones and
    /// closing id gaps) and re-index the directory from scratch.
    pub fn rebuild(&self, input_dir: &Path) -> Result<IndexReport, IndexingError> {
        info!("compacting rebuild: clearing all stores");
        self.catalog.clear_all()?;
        self.lexical.clear_all()?;
        {
            let mut index = self.vectors.write().unwrap_or_else(|p| p.into_inner());
            *index = VectorIndex::new(*index.params());
            index.save_to_dir(&self.config.data_dir)?;
        }
        let _ = fs::remove_file(self.spool_path());
        self.index_directory(input_dir)
    }

    /// Roll back files left `pending` by a crash: their committed rows and
    /// postings are deleted and they will be re-processed on the next run.
    pub fn recover(&self) -> Result<(), IndexingError> {
        recover_pending_files(
            &self.catalog,
            &self.vectors,
            &self.lexical,
            &self.config.data_dir,
        )
    }

    // =========================================================================
    // Per-file pipeline
    // =========================================================================

    fn index_one(
        &self,
        path: &Path,
        deferred: &mut Vec<DeferredCommit>,
    ) -> Result<FileOutcome, IndexingError> {
        let source = path.to_string_lossy().to_string();
        let hash = match digest_file(path) {
            Ok(hash) => hash,
            Err(e) => {
                return Ok(FileOutcome::Failed {
                    reason: format!("unreadable: {e}"),
                })
            }
        };

        // Skip-or-reindex.
        let mut superseded = None;
        if let Some(record) = self.catalog.file_state(&source)? {
            if record.status == FileStatus::Indexed {
                if record.content_hash == hash {
                    debug!(%source, "content hash unchanged, skipping");
                    return Ok(FileOutcome::Skipped);
                }
                superseded = record.range;
            }
        }

        self.catalog.begin_file(&source, &hash)?;
        match self.process_file(path, &source, &hash, superseded, deferred) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Store fault: undo this file's traces, then surface.
                self.rollback_file(&source)?;
                Err(e)
            }
        }
    }

    fn process_file(
        &self,
        path: &Path,
        source: &str,
        hash: &str,
        superseded: Option<IdRange>,
        deferred: &mut Vec<DeferredCommit>,
    ) -> Result<FileOutcome, IndexingError> {
        let pages = match self.source.pages(path) {
            Ok(pages) => pages,
            Err(e @ (ExtractionError::Unreadable(_) | ExtractionError::Encrypted(_))) => {
                warn!(%source, "extraction failed: {e}");
                self.catalog
                    .finish_file(source, IdRange::empty_at(0), false)?;
                return Ok(FileOutcome::Failed {
                    reason: e.to_string(),
                });
            }
            Err(ExtractionError::Io(e)) => return Err(e.into()),
        };

        // Filter and chunk; drop exact-duplicate chunk text within the
        // file (page headers repeat on every page).
        let mut seen_text: HashSet<String> = HashSet::new();
        let mut chunks: Vec<Chunk> = Vec::new();
        for page in &pages {
            let verdict = assess_page(&page.text);
            if !verdict.kept {
                debug!(%source, page = page.page_number, reason = ?verdict.reason, "page dropped");
                continue;
            }
            for chunk in chunk_page(page.page_number, &page.text) {
                if seen_text.insert(chunk.text.clone()) {
                    chunks.push(chunk);
                }
            }
        }

        if chunks.is_empty() {
            // Zero content pages still mark the file indexed, with an
            // empty range.
            let range = self.catalog.assign_ids(0)?;
            self.catalog.finish_file(source, range, true)?;
            if let Some(old) = superseded {
                self.catalog.add_tombstone(old)?;
            }
            return Ok(FileOutcome::Indexed { range });
        }

        // Batched embedding and per-flush index adds.
        let mut records: Vec<PassageRecord> = Vec::with_capacity(chunks.len());
        let mut first_id: Option<u64> = None;
        let mut last_id = 0u64;
        let mut spooled = false;
        let trained_at_start = self.is_trained();

        for batch in chunks.chunks(self.config.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = match self.embed_with_retry(&texts) {
                Ok(vectors) => vectors,
                Err(e) => {
                    warn!(%source, "embedding failed after retry: {e}");
                    self.rollback_file(source)?;
                    // Leave a failed marker so the run's exit code reflects
                    // the loss; the next run retries the file.
                    self.catalog.begin_file(source, hash)?;
                    self.catalog
                        .finish_file(source, IdRange::empty_at(0), false)?;
                    return Ok(FileOutcome::Failed {
                        reason: e.to_string(),
                    });
                }
            };

            let range = self.catalog.assign_ids(batch.len() as u64)?;
            first_id.get_or_insert(range.first);
            last_id = range.last;
            let ids: Vec<u64> = (range.first..=range.last).collect();

            if trained_at_start {
                let mut index = self.vectors.write().unwrap_or_else(|p| p.into_inner());
                index.add(&ids, &vectors)?;
            } else {
                self.spool_append(&ids, &vectors)?;
                spooled = true;
            }

            for (chunk, id) in batch.iter().zip(&ids) {
                self.lexical.add(*id, &chunk.text);
                records.push(PassageRecord {
                    id: *id,
                    source: source.to_string(),
                    page: chunk.page_number,
                    chunk_index: chunk.chunk_index,
                    text: chunk.text.clone(),
                });
            }
        }

        let range = IdRange {
            first: first_id.expect("chunks is non-empty"),
            last: last_id,
        };

        // File-granular commit: retire the superseded range first so the
        // replacement rows do not collide with their own previous keys,
        // then catalogue rows, BM25 deltas, vector checkpoint, and the
        // file record flip.
        if let Some(old) = superseded {
            self.catalog.add_tombstone(old)?;
        }
        self.catalog.commit_passages(&records)?;
        self.lexical.commit()?;

        if spooled {
            deferred.push(DeferredCommit {
                source: source.to_string(),
                range,
            });
            debug!(%source, passages = range.len(), "file deferred until training");
            return Ok(FileOutcome::Deferred { range });
        }

        {
            let index = self.vectors.read().unwrap_or_else(|p| p.into_inner());
            index.save_to_dir(&self.config.data_dir)?;
        }
        self.catalog.finish_file(source, range, true)?;
        info!(%source, passages = range.len(), "file indexed");
        Ok(FileOutcome::Indexed { range })
    }

    /// Undo every trace of an in-progress file: buffered lexical deltas,
    /// committed rows and postings, in-memory vector adds, and the file
    /// record. The vector index is restored from its last checkpoint,
    /// which by construction never contains an uncommitted file.
    fn rollback_file(&self, source: &str) -> Result<(), IndexingError> {
        self.lexical.rollback_pending();
        if let Some(range) = self.catalog.passage_bounds_of(source)? {
            self.lexical.remove_range(range.first, range.last)?;
        }
        {
            let mut index = self.vectors.write().unwrap_or_else(|p| p.into_inner());
            let params = *index.params();
            *index = if self.config.data_dir.join(crate::vector::INDEX_FILE).exists() {
                VectorIndex::load_from_dir(&self.config.data_dir, params)?
            } else {
                VectorIndex::new(params)
            };
        }
        self.catalog.delete_passages_of(source)?;
        self.catalog.remove_file(source)?;
        // Spooled embeddings are only valid while their rows exist; drop
        // the rolled-back file's records from the overflow spool.
        self.spool_retain_committed()?;
        Ok(())
    }

    fn spool_retain_committed(&self) -> Result<(), IndexingError> {
        retain_spool_committed(&self.catalog, self.dim, &self.config.data_dir)
    }

    fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        match self.embedder.embed(texts) {
            Ok(vectors) => Ok(vectors),
            Err(first) => {
                warn!("embedding batch failed, retrying once: {first}");
                std::thread::sleep(self.config.embed_retry_backoff);
                self.embedder.embed(texts)
            }
        }
    }

    // =========================================================================
    // Training schedule and the overflow spool
    // =========================================================================

    fn is_trained(&self) -> bool {
        self.vectors
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .is_trained()
    }

    fn effective_threshold(&self) -> usize {
        self.config
            .training_threshold
            .min(self.config.expected_corpus.unwrap_or(usize::MAX))
            .max(1)
    }

    /// Flip still-deferred files to `indexed` without vectors. Their rows
    /// and postings are already committed; the spool keeps their
    /// embeddings and the vector index backfills at the first successful
    /// training.
    fn finish_deferred_untrained(
        &self,
        deferred: &mut Vec<DeferredCommit>,
    ) -> Result<(), IndexingError> {
        for commit in deferred.drain(..) {
            info!(source = %commit.source, "committing keyword-only until training");
            self.catalog.finish_file(&commit.source, commit.range, true)?;
        }
        Ok(())
    }

    /// Train on every spooled embedding, drain the spool into the index,
    /// and commit the files that were waiting. The spool may also hold
    /// embeddings of files committed keyword-only by earlier runs or
    /// uploads; those backfill here.
    fn train_and_drain(&self, deferred: &mut Vec<DeferredCommit>) -> Result<(), IndexingError> {
        let (ids, vectors) = self.spool_read()?;
        info!(samples = vectors.len(), "training vector index from spool");

        {
            let mut index = self.vectors.write().unwrap_or_else(|p| p.into_inner());
            index.train(&vectors)?;
            index.add(&ids, &vectors)?;
            index.save_to_dir(&self.config.data_dir)?;
        }
        fs::remove_file(self.spool_path())?;

        for commit in deferred.drain(..) {
            self.catalog.finish_file(&commit.source, commit.range, true)?;
        }
        Ok(())
    }

    fn spool_path(&self) -> PathBuf {
        self.config.data_dir.join(SPOOL_FILE)
    }

    fn spool_count(&self) -> Result<usize, IndexingError> {
        match fs::metadata(self.spool_path()) {
            Ok(meta) => Ok(meta.len() as usize / spool_record_size(self.dim)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn spool_append(&self, ids: &[u64], vectors: &[Vec<f32>]) -> Result<(), IndexingError> {
        fs::create_dir_all(&self.config.data_dir)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.spool_path())?;
        let mut buf = Vec::with_capacity(ids.len() * spool_record_size(self.dim));
        for (&id, vector) in ids.iter().zip(vectors) {
            buf.extend_from_slice(&id.to_le_bytes());
            for &x in vector {
                buf.extend_from_slice(&x.to_le_bytes());
            }
        }
        file.write_all(&buf)?;
        Ok(())
    }

    fn spool_read(&self) -> Result<(Vec<u64>, Vec<Vec<f32>>), IndexingError> {
        read_spool(&self.config.data_dir, self.dim)
    }
}

fn spool_record_size(dim: usize) -> usize {
    8 + dim * 4
}

fn read_spool(data_dir: &Path, dim: usize) -> Result<(Vec<u64>, Vec<Vec<f32>>), IndexingError> {
    let bytes = fs::read(data_dir.join(SPOOL_FILE))?;
    let record = spool_record_size(dim);
    let mut ids = Vec::with_capacity(bytes.len() / record);
    let mut vectors = Vec::with_capacity(bytes.len() / record);
    for chunk in bytes.chunks_exact(record) {
        let id = u64::from_le_bytes(chunk[..8].try_into().expect("8-byte id"));
        let vector: Vec<f32> = chunk[8..]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        ids.push(id);
        vectors.push(vector);
    }
    Ok((ids, vectors))
}

/// Rewrite the spool keeping only records whose passage rows are still
/// committed. Deferred and keyword-only files commit rows before their
/// embeddings drain, so their spool entries survive; a rolled-back file's
/// entries do not.
fn retain_spool_committed(
    catalog: &Catalog,
    dim: usize,
    data_dir: &Path,
) -> Result<(), IndexingError> {
    let spool = data_dir.join(SPOOL_FILE);
    if !spool.exists() {
        return Ok(());
    }
    let (ids, vectors) = read_spool(data_dir, dim)?;
    let keep: HashSet<u64> = catalog.filter_existing(&ids)?.into_iter().collect();
    if keep.len() == ids.len() {
        return Ok(());
    }

    let tmp = data_dir.join(format!("{SPOOL_FILE}.tmp"));
    let mut buf = Vec::new();
    for (&id, vector) in ids.iter().zip(&vectors) {
        if keep.contains(&id) {
            buf.extend_from_slice(&id.to_le_bytes());
            for &x in vector {
                buf.extend_from_slice(&x.to_le_bytes());
            }
        }
    }
    fs::write(&tmp, &buf)?;
    fs::rename(&tmp, &spool)?;
    Ok(())
}

/// Roll back every file the catalogue still lists as `pending`: delete its
/// rows and postings and drop any of its vectors from the artefact. The
/// spool is filtered, not discarded: entries of committed keyword-only
/// files stay queued for training, only the rolled-back rows' entries go.
pub(crate) fn recover_pending_files(
    catalog: &Catalog,
    vectors: &RwLock<VectorIndex>,
    lexical: &Bm25Index,
    data_dir: &Path,
) -> Result<(), IndexingError> {
    let pending = catalog.pending_files()?;
    if pending.is_empty() {
        return Ok(());
    }

    for file in &pending {
        warn!(source = %file.source, "rolling back file left pending by previous run");
        if let Some(range) = catalog.passage_bounds_of(&file.source)? {
            lexical.remove_range(range.first, range.last)?;
            let mut index = vectors.write().unwrap_or_else(|p| p.into_inner());
            if index.count_in(range.first, range.last) > 0 {
                index.rollback_to(range.first);
                index.save_to_dir(data_dir)?;
            }
            catalog.delete_passages_of(&file.source)?;
        }
        catalog.remove_file(&file.source)?;
    }

    let dim = {
        let index = vectors.read().unwrap_or_else(|p| p.into_inner());
        index.params().dim
    };
    retain_spool_committed(catalog, dim, data_dir)
}

/// Recursively discover PDFs, sorted for a deterministic processing order.
pub fn discover_pdfs(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort_unstable();
    files
}

/// SHA-256 of a file's bytes, lowercase hex.
pub fn digest_file(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_is_recursive_sorted_and_pdf_only() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(dir.path().join("b.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("a.PDF"), b"%PDF").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(nested.join("c.pdf"), b"%PDF").unwrap();

        let found = discover_pdfs(dir.path());
        assert_eq!(found.len(), 3);
        assert!(found.windows(2).all(|w| w[0] < w[1]));
        assert!(found.iter().all(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        }));
    }

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        fs::write(&path, b"content-one").unwrap();
        let first = digest_file(&path).unwrap();
        assert_eq!(first, digest_file(&path).unwrap());

        fs::write(&path, b"content-two").unwrap();
        assert_ne!(first, digest_file(&path).unwrap());
    }

    #[test]
    fn exit_code_reflects_outcomes() {
        let mut report = IndexReport {
            files: vec![
                FileReport {
                    source: "a.pdf".to_string(),
                    outcome: FileOutcome::Indexed {
                        range: IdRange { first: 0, last: 4 },
                    },
                },
                FileReport {
                    source: "b.pdf".to_string(),
                    outcome: FileOutcome::Skipped,
                },
            ],
            trained: true,
        };
        assert_eq!(report.exit_code(), 0);

        report.files.push(FileReport {
            source: "c.pdf".to_string(),
            outcome: FileOutcome::Failed {
                reason: "broken".to_string(),
            },
        });
        assert_eq!(report.exit_code(), 1);
        assert!(report.summary().contains("c.pdf: failed"));
    }
}
