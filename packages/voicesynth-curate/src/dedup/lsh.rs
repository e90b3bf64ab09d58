//! Banded LSH over MinHash signatures
//!
//! # Algorithm (Banded LSH)
//!
//! 1. Partition each signature into `b` bands of `r` rows
//! 2. Bucket records by the exact contents of each band
//! 3. Any two records sharing a bucket in any band are candidates
//!
//! For Jaccard similarity `s`, the probability of becoming a candidate is
//! ```text
//! P(candidate) = 1 - (1 - s^r)^b
//! ```
//! whose inflection point sits near `(1/b)^(1/r)`.
//!
//! # Band selection
//!
//! [`BandLayout::for_threshold`] picks the largest power-of-two `r` whose
//! inflection point is still at or below the threshold. Because `r` only grows
//! with the threshold and buckets are keyed by the band slice itself, a wider
//! band always splits into aligned narrower bands: every candidate pair at a
//! higher threshold is also a candidate at any lower one.

use super::minhash::MinHashSignature;
use rustc_hash::{FxHashMap, FxHashSet};

/// Band/row split of a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandLayout {
    pub num_bands: usize,
    pub rows_per_band: usize,
}

impl BandLayout {
    /// Layout for `num_perm` slots (a power of two) and a threshold in (0, 1].
    ///
    /// | threshold | bands × rows (128 slots) |
    /// |-----------|--------------------------|
    /// | 0.5       | 32 × 4                   |
    /// | 0.8       | 16 × 8                   |
    /// | 0.9       | 8 × 16                   |
    /// | 1.0       | 1 × 128                  |
    pub fn for_threshold(num_perm: usize, threshold: f64) -> Self {
        let mut rows = 1;
        let mut candidate = 2;
        while candidate <= num_perm {
            if inflection(num_perm / candidate, candidate) <= threshold {
                rows = candidate;
            }
            candidate *= 2;
        }

        Self {
            num_bands: num_perm / rows,
            rows_per_band: rows,
        }
    }

    pub fn num_perm(&self) -> usize {
        self.num_bands * self.rows_per_band
    }
}

fn inflection(bands: usize, rows: usize) -> f64 {
    (1.0 / bands as f64).powf(1.0 / rows as f64)
}

/// LSH index for MinHash signatures
pub struct LshIndex<'a> {
    layout: BandLayout,

    /// One bucket map per band: band slice → record positions
    buckets: Vec<FxHashMap<&'a [u64], Vec<usize>>>,
}

impl<'a> LshIndex<'a> {
    pub fn new(layout: BandLayout) -> Self {
        Self {
            layout,
            buckets: vec![FxHashMap::default(); layout.num_bands],
        }
    }

    /// Insert a signature under position `id`; signatures of the wrong size are ignored.
    pub fn insert(&mut self, signature: &'a MinHashSignature, id: usize) {
        if signature.num_perm() != self.layout.num_perm() {
            return;
        }

        for (band_idx, band) in signature
            .hashes
            .chunks_exact(self.layout.rows_per_band)
            .enumerate()
        {
            self.buckets[band_idx].entry(band).or_default().push(id);
        }
    }

    /// All pairs `(i, j)`, `i < j`, sharing at least one bucket, sorted.
    pub fn candidate_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = FxHashSet::default();

        for band in &self.buckets {
            for ids in band.values().filter(|ids| ids.len() > 1) {
                for (n, &a) in ids.iter().enumerate() {
                    for &b in &ids[n + 1..] {
                        pairs.insert((a.min(b), a.max(b)));
                    }
                }
            }
        }

        let mut pairs: Vec<_> = pairs.into_iter().collect();
        pairs.sort_unstable();
        pairs
    }

}
