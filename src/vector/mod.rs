//! IVF-PQ approximate-nearest-neighbour index.
//!
//! Vectors are L2-normalised on every path in, so inner product equals
//! cosine similarity throughout. The index clusters vectors into `nlist`
//! coarse cells (inverted lists) and stores each vector as the product-
//! quantised code of its residual against the cell centroid. Queries probe
//! the `nprobe` nearest cells with asymmetric-distance lookup tables, then
//! re-score the shortlist by exact inner product against the reconstructed
//! vectors to stabilise ordering near the top.
//!
//! Training happens once per index; the codebooks are immutable afterwards
//! and a reset requires a full rebuild. Codes, inverted lists, centroids,
//! codebooks and the id map persist as a single `KGSV01`-prefixed binary
//! artefact beside a JSON parameter sidecar.

mod kmeans;
mod pq;

use crate::config::{DEFAULT_NPROBE, EMBEDDING_DIM, IVF_NLIST, PQ_M, PQ_NBITS};
use crate::error::VectorIndexError;
use kmeans::{kmeans as run_kmeans, nearest_centroid};
use pq::ProductQuantizer;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, instrument};

/// Artefact magic prefix; bump the trailing digits on layout changes.
const MAGIC: &[u8; 6] = b"KGSV01";
const FORMAT_VERSION: u32 = 1;

/// File names inside the index directory.
pub const INDEX_FILE: &str = "faiss.index";
pub const STATE_FILE: &str = "index_state.json";

/// Seed for quantiser training; fixed so training is reproducible.
const TRAIN_SEED: u64 = 0x4b47_5356;

/// Structural parameters. Defaults are the production contract; tests
/// shrink them to train on small corpora.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorIndexParams {
    pub dim: usize,
    pub nlist: usize,
    pub pq_m: usize,
    pub pq_nbits: usize,
    pub nprobe: usize,
}

impl Default for VectorIndexParams {
    fn default() -> Self {
        Self {
            dim: EMBEDDING_DIM,
            nlist: IVF_NLIST,
            pq_m: PQ_M,
            pq_nbits: PQ_NBITS,
            nprobe: DEFAULT_NPROBE,
        }
    }
}

/// Sidecar state, serialised to `index_state.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexState {
    pub dim: usize,
    pub nlist: usize,
    pub pq_m: usize,
    pub pq_nbits: usize,
    pub trained: bool,
    pub ntotal: u64,
    pub train_samples: u64,
    pub version: u32,
}

#[derive(Debug, Default, Clone)]
struct InvertedList {
    ids: Vec<u64>,
    /// `pq_m` bytes per entry, parallel to `ids`.
    codes: Vec<u8>,
}

/// The IVF-PQ index.
#[derive(Debug)]
pub struct VectorIndex {
    params: VectorIndexParams,
    centroids: Vec<f32>,
    pq: Option<ProductQuantizer>,
    lists: Vec<InvertedList>,
    ntotal: u64,
    train_samples: u64,
}

impl VectorIndex {
    pub fn new(params: VectorIndexParams) -> Self {
        let lists = vec![InvertedList::default(); params.nlist];
        Self {
            params,
            centroids: Vec::new(),
            pq: None,
            lists,
            ntotal: 0,
            train_samples: 0,
        }
    }

    pub fn params(&self) -> &VectorIndexParams {
        &self.params
    }

    pub fn is_trained(&self) -> bool {
        self.pq.is_some()
    }

    pub fn ntotal(&self) -> u64 {
        self.ntotal
    }

    pub fn state(&self) -> IndexState {
        IndexState {
            dim: self.params.dim,
            nlist: self.params.nlist,
            pq_m: self.params.pq_m,
            pq_nbits: self.params.pq_nbits,
            trained: self.is_trained(),
            ntotal: self.ntotal,
            train_samples: self.train_samples,
            version: FORMAT_VERSION,
        }
    }

    fn check_dim(&self, len: usize) -> Result<(), VectorIndexError> {
        if len != self.params.dim {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.params.dim,
                actual: len,
            });
        }
        Ok(())
    }

    /// Train the coarse quantiser and PQ codebooks. Allowed exactly once.
    #[instrument(skip_all, fields(samples = vectors.len()))]
    pub fn train(&mut self, vectors: &[Vec<f32>]) -> Result<(), VectorIndexError> {
        if self.is_trained() {
            return Err(VectorIndexError::AlreadyTrained);
        }
        let needed = self.params.nlist.max(1 << self.params.pq_nbits);
        if vectors.len() < needed {
            return Err(VectorIndexError::InsufficientTrainingData {
                needed,
                got: vectors.len(),
            });
        }

        let dim = self.params.dim;
        let mut flat = Vec::with_capacity(vectors.len() * dim);
        for v in vectors {
            self.check_dim(v.len())?;
            let mut v = v.clone();
            l2_normalize(&mut v);
            flat.extend_from_slice(&v);
        }

        self.centroids = run_kmeans(&flat, dim, self.params.nlist, TRAIN_SEED);

        // Residuals against the assigned coarse centroid.
        let mut residuals = vec![0.0f32; flat.len()];
        for (row, point) in flat.chunks_exact(dim).enumerate() {
            let (cell, _) = nearest_centroid(point, &self.centroids, dim);
            for d in 0..dim {
                residuals[row * dim + d] = point[d] - self.centroids[cell * dim + d];
            }
        }

        self.pq = Some(ProductQuantizer::train(
            &residuals,
            dim,
            self.params.pq_m,
            self.params.pq_nbits,
            TRAIN_SEED ^ 0x9e37,
        )?);
        self.train_samples = vectors.len() as u64;
        info!(
            samples = self.train_samples,
            nlist = self.params.nlist,
            "vector index trained"
        );
        Ok(())
    }

    /// Append vectors under the given ids. Requires a trained index; the
    /// catalogue guarantees id uniqueness, so none is re-checked here.
    #[instrument(skip_all, fields(count = ids.len()))]
    pub fn add(&mut self, ids: &[u64], vectors: &[Vec<f32>]) -> Result<(), VectorIndexError> {
        let pq = self.pq.as_ref().ok_or(VectorIndexError::Untrained)?;
        debug_assert_eq!(ids.len(), vectors.len());

        let dim = self.params.dim;
        for (&id, vector) in ids.iter().zip(vectors) {
            self.check_dim(vector.len())?;
            let mut v = vector.clone();
            l2_normalize(&mut v);
            let (cell, _) = nearest_centroid(&v, &self.centroids, dim);
            let mut residual = v;
            for d in 0..dim {
                residual[d] -= self.centroids[cell * dim + d];
            }
            let codes = pq.encode(&residual);
            let list = &mut self.lists[cell];
            list.ids.push(id);
            list.codes.extend_from_slice(&codes);
        }
        self.ntotal += ids.len() as u64;
        Ok(())
    }

    /// Top-`k` ids by cosine similarity, descending; ties break by
    /// ascending id.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        nprobe: usize,
    ) -> Result<Vec<(u64, f32)>, VectorIndexError> {
        let pq = self.pq.as_ref().ok_or(VectorIndexError::Untrained)?;
        self.check_dim(query.len())?;
        if k == 0 || self.ntotal == 0 {
            return Ok(Vec::new());
        }

        let dim = self.params.dim;
        let mut q = query.to_vec();
        l2_normalize(&mut q);

        // Rank cells by inner product with the query (vectors are unit, so
        // max-IP and min-L2 agree).
        let mut cells: Vec<(usize, f32)> = self
            .centroids
            .chunks_exact(dim)
            .enumerate()
            .map(|(cell, centroid)| (cell, dot(&q, centroid)))
            .collect();
        cells.sort_by(|a, b| b.1.total_cmp(&a.1));
        cells.truncate(nprobe.max(1));

        // First pass: asymmetric-distance scores over the probed lists.
        let table = pq.lookup_table(&q);
        let m = self.params.pq_m;
        let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
        for &(cell, centroid_ip) in &cells {
            let list = &self.lists[cell];
            for pos in 0..list.ids.len() {
                let codes = &list.codes[pos * m..(pos + 1) * m];
                let approx = centroid_ip + pq.score_with_table(&table, codes);
                candidates.push((approx, cell, pos));
            }
        }

        let shortlist = (k * 4).max(k + 16).min(candidates.len());
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
        candidates.truncate(shortlist);

        // Refinement: exact inner product against the reconstruction.
        let mut scored: Vec<(u64, f32)> = candidates
            .into_iter()
            .map(|(_, cell, pos)| {
                let list = &self.lists[cell];
                let codes = &list.codes[pos * m..(pos + 1) * m];
                let mut reconstruction = pq.decode(codes);
                for d in 0..dim {
                    reconstruction[d] += self.centroids[cell * dim + d];
                }
                (list.ids[pos], dot(&q, &reconstruction))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    /// Number of stored ids inside `range`.
    pub fn count_in(&self, first: u64, last: u64) -> u64 {
        if last.wrapping_add(1) == first {
            return 0;
        }
        self.lists
            .iter()
            .flat_map(|l| l.ids.iter())
            .filter(|&&id| id >= first && id <= last)
            .count() as u64
    }

    /// Drop every entry with `id >= first_id`. Used to roll back a file
    /// whose indexing failed partway; ids are monotone, so this removes
    /// exactly the in-progress file's vectors.
    pub fn rollback_to(&mut self, first_id: u64) {
        let m = self.params.pq_m;
        let mut removed = 0u64;
        for list in &mut self.lists {
            let mut pos = 0;
            while pos < list.ids.len() {
                if list.ids[pos] >= first_id {
                    list.ids.swap_remove(pos);
                    let start = pos * m;
                    let last_start = list.codes.len() - m;
                    if start != last_start {
                        let (head, tail) = list.codes.split_at_mut(last_start);
                        head[start..start + m].copy_from_slice(tail);
                    }
                    list.codes.truncate(last_start);
                    removed += 1;
                } else {
                    pos += 1;
                }
            }
        }
        self.ntotal -= removed;
    }

    /// Integrity check: trained state, code/id agreement per list, id-map
    /// injectivity, and agreement with the catalogue's row count.
    pub fn verify(&self, expected_total: u64) -> (bool, String) {
        if !self.is_trained() && self.ntotal > 0 {
            return (false, "codes present in an untrained index".to_string());
        }

        let m = self.params.pq_m;
        let mut seen: HashSet<u64> = HashSet::with_capacity(self.ntotal as usize);
        let mut entries = 0u64;
        for (cell, list) in self.lists.iter().enumerate() {
            if list.codes.len() != list.ids.len() * m {
                return (
                    false,
                    format!("list {cell}: {} ids but {} code bytes", list.ids.len(), list.codes.len()),
                );
            }
            for &id in &list.ids {
                if !seen.insert(id) {
                    return (false, format!("duplicate id {id} in id map"));
                }
            }
            entries += list.ids.len() as u64;
        }

        if entries != self.ntotal {
            return (
                false,
                format!("ntotal {} but inverted lists hold {entries}", self.ntotal),
            );
        }
        if entries != expected_total {
            return (
                false,
                format!("index holds {entries} vectors but catalogue holds {expected_total}"),
            );
        }
        (true, format!("ok: {entries} vectors"))
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write the artefact and its sidecar into `dir`, atomically replacing
    /// any previous generation.
    pub fn save_to_dir(&self, dir: &Path) -> Result<(), VectorIndexError> {
        fs::create_dir_all(dir)?;

        let mut buf: Vec<u8> = Vec::new();
        buf.extend_from_slice(MAGIC);
        put_u32(&mut buf, FORMAT_VERSION);
        put_u32(&mut buf, self.params.dim as u32);
        put_u32(&mut buf, self.params.nlist as u32);
        put_u32(&mut buf, self.params.pq_m as u32);
        put_u32(&mut buf, self.params.pq_nbits as u32);
        buf.push(self.is_trained() as u8);
        put_u64(&mut buf, self.ntotal);
        put_u64(&mut buf, self.train_samples);

        if let Some(pq) = &self.pq {
            for &c in &self.centroids {
                buf.extend_from_slice(&c.to_le_bytes());
            }
            for &c in &pq.codebooks {
                buf.extend_from_slice(&c.to_le_bytes());
            }
            for list in &self.lists {
                put_u64(&mut buf, list.ids.len() as u64);
                for &id in &list.ids {
                    put_u64(&mut buf, id);
                }
                buf.extend_from_slice(&list.codes);
            }
        }

        let target = dir.join(INDEX_FILE);
        let tmp = dir.join(format!("{INDEX_FILE}.tmp"));
        fs::write(&tmp, &buf)?;
        fs::rename(&tmp, &target)?;

        let state = serde_json::to_vec_pretty(&self.state())
            .map_err(|e| VectorIndexError::Corruption(e.to_string()))?;
        fs::write(dir.join(STATE_FILE), state)?;
        Ok(())
    }

    /// Load an index from `dir`, validating magic, version, parameter
    /// compatibility with `params`, sidecar agreement, and exact payload
    /// length. Every inconsistency is a fatal [`VectorIndexError::Corruption`].
    pub fn load_from_dir(dir: &Path, params: VectorIndexParams) -> Result<Self, VectorIndexError> {
        let bytes = fs::read(dir.join(INDEX_FILE))?;
        let mut cursor = Cursor::new(&bytes);

        let magic = cursor.take(MAGIC.len())?;
        if magic != MAGIC {
            return Err(VectorIndexError::Corruption(format!(
                "bad magic {:02x?}",
                magic
            )));
        }
        let version = cursor.u32()?;
        if version != FORMAT_VERSION {
            return Err(VectorIndexError::Corruption(format!(
                "unsupported format version {version}"
            )));
        }

        let dim = cursor.u32()? as usize;
        let nlist = cursor.u32()? as usize;
        let pq_m = cursor.u32()? as usize;
        let pq_nbits = cursor.u32()? as usize;
        if dim != params.dim
            || nlist != params.nlist
            || pq_m != params.pq_m
            || pq_nbits != params.pq_nbits
        {
            return Err(VectorIndexError::Corruption(format!(
                "artefact parameters (dim={dim}, nlist={nlist}, m={pq_m}, nbits={pq_nbits}) \
                 do not match configuration"
            )));
        }

        let trained = cursor.u8()? != 0;
        let ntotal = cursor.u64()?;
        let train_samples = cursor.u64()?;

        let mut index = Self::new(params);
        index.train_samples = train_samples;

        if trained {
            let dsub = dim / pq_m;
            let ksub = 1usize << pq_nbits;
            index.centroids = cursor.f32_vec(nlist * dim)?;
            let codebooks = cursor.f32_vec(pq_m * ksub * dsub)?;
            index.pq = Some(ProductQuantizer::from_codebooks(
                pq_m, pq_nbits, dsub, codebooks,
            )?);

            let mut entries = 0u64;
            for cell in 0..nlist {
                let len = cursor.u64()? as usize;
                // Each entry needs 8 id bytes plus its code; a length that
                // cannot fit in the remaining payload is a corrupt header.
                if len > cursor.remaining() / 8 {
                    return Err(VectorIndexError::Corruption(format!(
                        "list {cell} claims {len} entries beyond end of file"
                    )));
                }
                let mut ids = Vec::with_capacity(len);
                for _ in 0..len {
                    ids.push(cursor.u64()?);
                }
                let codes = cursor.take(len * pq_m)?.to_vec();
                entries += len as u64;
                index.lists[cell] = InvertedList { ids, codes };
            }
            if entries != ntotal {
                return Err(VectorIndexError::Corruption(format!(
                    "header claims {ntotal} vectors, lists hold {entries}"
                )));
            }
            index.ntotal = ntotal;
        } else if ntotal != 0 {
            return Err(VectorIndexError::Corruption(
                "untrained artefact claims stored vectors".to_string(),
            ));
        }

        if !cursor.at_end() {
            return Err(VectorIndexError::Corruption(format!(
                "{} trailing bytes after payload",
                cursor.remaining()
            )));
        }

        // Sidecar must describe the same generation.
        let sidecar = fs::read(dir.join(STATE_FILE))?;
        let sidecar: IndexState = serde_json::from_slice(&sidecar)
            .map_err(|e| VectorIndexError::Corruption(format!("bad sidecar: {e}")))?;
        if sidecar != index.state() {
            return Err(VectorIndexError::Corruption(
                "index_state.json disagrees with binary artefact".to_string(),
            ));
        }

        Ok(index)
    }
}

/// Scale `v` to unit L2 norm; the zero vector is left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Bounds-checked little-endian reader over the artefact payload. Running
/// off the end is corruption, not I/O failure.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], VectorIndexError> {
        if self.pos + n > self.bytes.len() {
            return Err(VectorIndexError::Corruption(format!(
                "truncated artefact: wanted {n} bytes at offset {}, file holds {}",
                self.pos,
                self.bytes.len()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, VectorIndexError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, VectorIndexError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, VectorIndexError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn f32_vec(&mut self, count: usize) -> Result<Vec<f32>, VectorIndexError> {
        let b = self.take(count * 4)?;
        Ok(b.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    fn at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small parameters so 40 vectors are enough to train.
    fn small_params() -> VectorIndexParams {
        VectorIndexParams {
            dim: 8,
            nlist: 4,
            pq_m: 2,
            pq_nbits: 3,
            nprobe: 4,
        }
    }

    fn unit(dim: usize, seed: u64) -> Vec<f32> {
        let mut v: Vec<f32> = (0..dim)
            .map(|d| ((seed.wrapping_mul(31).wrapping_add(d as u64 * 17) % 97) as f32 - 48.0))
            .collect();
        l2_normalize(&mut v);
        v
    }

    fn trained_index(n: usize) -> (VectorIndex, Vec<Vec<f32>>) {
        let params = small_params();
        let vectors: Vec<Vec<f32>> = (0..n).map(|i| unit(params.dim, i as u64)).collect();
        let mut index = VectorIndex::new(params);
        index.train(&vectors).unwrap();
        (index, vectors)
    }

    #[test]
    fn add_requires_training() {
        let mut index = VectorIndex::new(small_params());
        let err = index.add(&[0], &[unit(8, 0)]).unwrap_err();
        assert!(matches!(err, VectorIndexError::Untrained));
    }

    #[test]
    fn search_requires_training() {
        let index = VectorIndex::new(small_params());
        let err = index.search(&unit(8, 0), 5, 4).unwrap_err();
        assert!(matches!(err, VectorIndexError::Untrained));
    }

    #[test]
    fn training_twice_is_rejected() {
        let (mut index, vectors) = trained_index(40);
        let err = index.train(&vectors).unwrap_err();
        assert!(matches!(err, VectorIndexError::AlreadyTrained));
    }

    #[test]
    fn exact_match_ranks_first() {
        let (mut index, vectors) = trained_index(40);
        let ids: Vec<u64> = (0..40).collect();
        index.add(&ids, &vectors).unwrap();

        let results = index.search(&vectors[13], 5, 4).unwrap();
        assert!(!results.is_empty());
        // Quantisation can map near-identical vectors to the same code, so
        // the probe vector is only guaranteed a spot near the top.
        assert!(results.iter().take(3).any(|&(id, _)| id == 13));
        assert!(results[0].1 > 0.8);
        for pair in results.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn search_caps_at_k() {
        let (mut index, vectors) = trained_index(40);
        let ids: Vec<u64> = (0..40).collect();
        index.add(&ids, &vectors).unwrap();
        assert_eq!(index.search(&vectors[0], 3, 4).unwrap().len(), 3);
    }

    #[test]
    fn rollback_drops_suffix_ids() {
        let (mut index, vectors) = trained_index(40);
        let ids: Vec<u64> = (0..40).collect();
        index.add(&ids, &vectors).unwrap();
        assert_eq!(index.ntotal(), 40);

        index.rollback_to(25);
        assert_eq!(index.ntotal(), 25);
        assert_eq!(index.count_in(25, 39), 0);
        assert_eq!(index.count_in(0, 24), 25);

        let (ok, detail) = index.verify(25);
        assert!(ok, "{detail}");
    }

    #[test]
    fn verify_catches_count_mismatch() {
        let (mut index, vectors) = trained_index(40);
        let ids: Vec<u64> = (0..40).collect();
        index.add(&ids, &vectors).unwrap();

        let (ok, _) = index.verify(40);
        assert!(ok);
        let (ok, detail) = index.verify(39);
        assert!(!ok);
        assert!(detail.contains("catalogue"));
    }

    #[test]
    fn save_load_search_is_identical() {
        let (mut index, vectors) = trained_index(40);
        let ids: Vec<u64> = (0..40).collect();
        index.add(&ids, &vectors).unwrap();

        let before = index.search(&vectors[7], 10, 4).unwrap();

        let dir = tempfile::tempdir().unwrap();
        index.save_to_dir(dir.path()).unwrap();
        let loaded = VectorIndex::load_from_dir(dir.path(), small_params()).unwrap();

        let after = loaded.search(&vectors[7], 10, 4).unwrap();
        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(b.0, a.0);
            assert!((b.1 - a.1).abs() < 1e-6);
        }
    }

    #[test]
    fn truncated_artefact_is_corruption() {
        let (mut index, vectors) = trained_index(40);
        let ids: Vec<u64> = (0..40).collect();
        index.add(&ids, &vectors).unwrap();

        let dir = tempfile::tempdir().unwrap();
        index.save_to_dir(dir.path()).unwrap();

        let path = dir.path().join(INDEX_FILE);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

        let err = VectorIndex::load_from_dir(dir.path(), small_params()).unwrap_err();
        assert!(matches!(err, VectorIndexError::Corruption(_)));
    }

    #[test]
    fn parameter_mismatch_is_corruption() {
        let (index, _) = trained_index(40);
        let dir = tempfile::tempdir().unwrap();
        index.save_to_dir(dir.path()).unwrap();

        let mut other = small_params();
        other.nlist = 8;
        let err = VectorIndex::load_from_dir(dir.path(), other).unwrap_err();
        assert!(matches!(err, VectorIndexError::Corruption(_)));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let (index, _) = trained_index(40);
        let dir = tempfile::tempdir().unwrap();
        index.save_to_dir(dir.path()).unwrap();

        let path = dir.path().join(INDEX_FILE);
        let mut bytes = fs::read(&path).unwrap();
        bytes[0] = b'X';
        fs::write(&path, &bytes).unwrap();

        let err = VectorIndex::load_from_dir(dir.path(), small_params()).unwrap_err();
        assert!(matches!(err, VectorIndexError::Corruption(_)));
    }

    #[test]
    fn untrained_index_roundtrips() {
        let index = VectorIndex::new(small_params());
        let dir = tempfile::tempdir().unwrap();
        index.save_to_dir(dir.path()).unwrap();
        let loaded = VectorIndex::load_from_dir(dir.path(), small_params()).unwrap();
        assert!(!loaded.is_trained());
        assert_eq!(loaded.ntotal(), 0);
    }
}
