//! Seeded Lloyd's k-means for quantiser training.
//!
//! Training is deterministic: the caller supplies a seed, and iteration
//! stops after `max_iter` rounds or once centroid movement falls below
//! `tol`. Empty clusters are re-seeded from random points so every
//! codeword stays usable.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const KMEANS_MAX_ITER: usize = 50;
pub const KMEANS_TOL: f32 = 1e-4;

/// Cluster `data` (row-major, `dim` floats per point) into `k` centroids.
///
/// Requires `k <= n`; the caller validates training-set size.
pub fn kmeans(data: &[f32], dim: usize, k: usize, seed: u64) -> Vec<f32> {
    let n = data.len() / dim;
    debug_assert!(k >= 1 && k <= n);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = init_centroids(data, dim, n, k, &mut rng);

    let mut assignments = vec![0usize; n];
    let mut sums = vec![0.0f32; k * dim];
    let mut counts = vec![0usize; k];

    for _ in 0..KMEANS_MAX_ITER {
        sums.iter_mut().for_each(|v| *v = 0.0);
        counts.iter_mut().for_each(|c| *c = 0);

        for (i, point) in data.chunks_exact(dim).enumerate() {
            let (best, _) = nearest_centroid(point, &centroids, dim);
            assignments[i] = best;
            counts[best] += 1;
            for (s, &x) in sums[best * dim..(best + 1) * dim].iter_mut().zip(point) {
                *s += x;
            }
        }

        let mut movement = 0.0f32;
        for c in 0..k {
            if counts[c] == 0 {
                // Re-seed dead clusters from a random point.
                let pick = rng.gen_range(0..n);
                centroids[c * dim..(c + 1) * dim]
                    .copy_from_slice(&data[pick * dim..(pick + 1) * dim]);
                continue;
            }
            let inv = 1.0 / counts[c] as f32;
            for d in 0..dim {
                let updated = sums[c * dim + d] * inv;
                let delta = updated - centroids[c * dim + d];
                movement += delta * delta;
                centroids[c * dim + d] = updated;
            }
        }

        if movement.sqrt() < KMEANS_TOL {
            break;
        }
    }

    centroids
}

/// Index and squared L2 distance of the centroid closest to `point`.
pub fn nearest_centroid(point: &[f32], centroids: &[f32], dim: usize) -> (usize, f32) {
    let mut best = 0usize;
    let mut best_dist = f32::INFINITY;
    for (c, centroid) in centroids.chunks_exact(dim).enumerate() {
        let mut dist = 0.0f32;
        for (&p, &q) in point.iter().zip(centroid) {
            let d = p - q;
            dist += d * d;
        }
        if dist < best_dist {
            best_dist = dist;
            best = c;
        }
    }
    (best, best_dist)
}

/// Pick `k` distinct points as starting centroids.
fn init_centroids(data: &[f32], dim: usize, n: usize, k: usize, rng: &mut StdRng) -> Vec<f32> {
    let picks = rand::seq::index::sample(rng, n, k);
    let mut centroids = Vec::with_capacity(k * dim);
    for pick in picks {
        centroids.extend_from_slice(&data[pick * dim..(pick + 1) * dim]);
    }
    centroids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_separated_clusters() {
        // Two tight blobs on opposite axes.
        let mut data = Vec::new();
        for i in 0..20 {
            let jitter = (i % 5) as f32 * 0.01;
            data.extend_from_slice(&[1.0 + jitter, 0.0]);
        }
        for i in 0..20 {
            let jitter = (i % 5) as f32 * 0.01;
            data.extend_from_slice(&[0.0, 1.0 + jitter]);
        }

        let centroids = kmeans(&data, 2, 2, 7);

        let (a, _) = nearest_centroid(&[1.0, 0.0], &centroids, 2);
        let (b, _) = nearest_centroid(&[0.0, 1.0], &centroids, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn deterministic_under_fixed_seed() {
        let data: Vec<f32> = (0..64).map(|i| (i as f32 * 0.37).sin()).collect();
        let first = kmeans(&data, 4, 3, 42);
        let second = kmeans(&data, 4, 3, 42);
        assert_eq!(first, second);
    }

    #[test]
    fn k_equals_n_keeps_every_point() {
        let data = vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let centroids = kmeans(&data, 2, 3, 1);
        assert_eq!(centroids.len(), 6);
        for point in data.chunks_exact(2) {
            let (_, dist) = nearest_centroid(point, &centroids, 2);
            assert!(dist < 1e-6);
        }
    }
}
