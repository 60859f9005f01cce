//! Product quantiser.
//!
//! Splits a vector into `m` contiguous subvectors and encodes each by the
//! index of its nearest codeword in a per-subspace codebook trained with
//! k-means. A code is always one byte per subspace; `nbits` bounds the
//! codebook size (`2^nbits` codewords, at most 256).

use super::kmeans::{kmeans, nearest_centroid};
use crate::error::VectorIndexError;

#[derive(Debug, Clone)]
pub struct ProductQuantizer {
    /// Subspace count.
    pub m: usize,
    /// Bits per code; codebooks hold `2^nbits` codewords.
    pub nbits: usize,
    /// Dimension of each subvector.
    pub dsub: usize,
    /// Codewords, laid out `[subspace][codeword][component]`.
    pub codebooks: Vec<f32>,
}

impl ProductQuantizer {
    pub fn ksub(&self) -> usize {
        1 << self.nbits
    }

    /// Train codebooks over residual vectors (row-major, `dim` floats per
    /// row). Needs at least `2^nbits` residuals.
    pub fn train(
        residuals: &[f32],
        dim: usize,
        m: usize,
        nbits: usize,
        seed: u64,
    ) -> Result<Self, VectorIndexError> {
        debug_assert_eq!(dim % m, 0);
        let dsub = dim / m;
        let ksub = 1usize << nbits;
        let n = residuals.len() / dim;
        if n < ksub {
            return Err(VectorIndexError::InsufficientTrainingData {
                needed: ksub,
                got: n,
            });
        }

        let mut codebooks = Vec::with_capacity(m * ksub * dsub);
        let mut subspace = vec![0.0f32; n * dsub];
        for sub in 0..m {
            for row in 0..n {
                let src = row * dim + sub * dsub;
                subspace[row * dsub..(row + 1) * dsub]
                    .copy_from_slice(&residuals[src..src + dsub]);
            }
            codebooks.extend(kmeans(&subspace, dsub, ksub, seed.wrapping_add(sub as u64)));
        }

        Ok(Self {
            m,
            nbits,
            dsub,
            codebooks,
        })
    }

    /// Rebuild a quantiser from persisted codebooks.
    pub fn from_codebooks(
        m: usize,
        nbits: usize,
        dsub: usize,
        codebooks: Vec<f32>,
    ) -> Result<Self, VectorIndexError> {
        let expected = m * (1usize << nbits) * dsub;
        if codebooks.len() != expected {
            return Err(VectorIndexError::Corruption(format!(
                "codebook payload holds {} floats, expected {expected}",
                codebooks.len()
            )));
        }
        Ok(Self {
            m,
            nbits,
            dsub,
            codebooks,
        })
    }

    fn codeword(&self, sub: usize, code: usize) -> &[f32] {
        let base = (sub * self.ksub() + code) * self.dsub;
        &self.codebooks[base..base + self.dsub]
    }

    /// Encode one vector (already a residual) as `m` bytes.
    pub fn encode(&self, residual: &[f32]) -> Vec<u8> {
        let ksub = self.ksub();
        let mut codes = Vec::with_capacity(self.m);
        for sub in 0..self.m {
            let slice = &residual[sub * self.dsub..(sub + 1) * self.dsub];
            let book = &self.codebooks[sub * ksub * self.dsub..(sub + 1) * ksub * self.dsub];
            let (best, _) = nearest_centroid(slice, book, self.dsub);
            codes.push(best as u8);
        }
        codes
    }

    /// Reconstruct the residual a code stands for.
    pub fn decode(&self, codes: &[u8]) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.m * self.dsub);
        for (sub, &code) in codes.iter().enumerate() {
            out.extend_from_slice(self.codeword(sub, code as usize));
        }
        out
    }

    /// Asymmetric-distance lookup table for one query: entry
    /// `[sub * ksub + code]` is the inner product of the query subvector
    /// with that codeword.
    pub fn lookup_table(&self, query: &[f32]) -> Vec<f32> {
        let ksub = self.ksub();
        let mut table = vec![0.0f32; self.m * ksub];
        for sub in 0..self.m {
            let q = &query[sub * self.dsub..(sub + 1) * self.dsub];
            for code in 0..ksub {
                let w = self.codeword(sub, code);
                table[sub * ksub + code] = q.iter().zip(w).map(|(a, b)| a * b).sum();
            }
        }
        table
    }

    /// Score a stored code against a precomputed lookup table.
    pub fn score_with_table(&self, table: &[f32], codes: &[u8]) -> f32 {
        let ksub = self.ksub();
        codes
            .iter()
            .enumerate()
            .map(|(sub, &code)| table[sub * ksub + code as usize])
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_quantizer() -> ProductQuantizer {
        // 16 4-dim residuals, m=2, nbits=2 (4 codewords per subspace).
        let residuals: Vec<f32> = (0..64).map(|i| ((i * 13 % 31) as f32 - 15.0) / 15.0).collect();
        ProductQuantizer::train(&residuals, 4, 2, 2, 11).unwrap()
    }

    #[test]
    fn train_rejects_tiny_samples() {
        let residuals = vec![0.0f32; 2 * 4];
        let err = ProductQuantizer::train(&residuals, 4, 2, 8, 0).unwrap_err();
        assert!(matches!(
            err,
            VectorIndexError::InsufficientTrainingData { needed: 256, got: 2 }
        ));
    }

    #[test]
    fn encode_decode_lands_on_a_codeword() {
        let pq = toy_quantizer();
        let residual = [0.4, -0.2, 0.9, 0.1];
        let codes = pq.encode(&residual);
        assert_eq!(codes.len(), 2);

        let decoded = pq.decode(&codes);
        assert_eq!(decoded.len(), 4);
        // Decoded vectors are fixed points of the quantiser by value.
        let recoded = pq.decode(&pq.encode(&decoded));
        assert_eq!(recoded, decoded);
    }

    #[test]
    fn table_scoring_matches_explicit_inner_product() {
        let pq = toy_quantizer();
        let query = [0.3, 0.7, -0.4, 0.2];
        let residual = [0.1, -0.6, 0.5, 0.8];
        let codes = pq.encode(&residual);

        let table = pq.lookup_table(&query);
        let via_table = pq.score_with_table(&table, &codes);
        let via_decode: f32 = pq
            .decode(&codes)
            .iter()
            .zip(query.iter())
            .map(|(a, b)| a * b)
            .sum();

        assert!((via_table - via_decode).abs() < 1e-5);
    }

    #[test]
    fn codebook_size_is_validated_on_load() {
        let err = ProductQuantizer::from_codebooks(2, 2, 2, vec![0.0; 5]).unwrap_err();
        assert!(matches!(err, VectorIndexError::Corruption(_)));
    }
}
