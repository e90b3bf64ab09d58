//! MinHash signatures over word shingles
//!
//! # Algorithm
//!
//! 1. Shingling: every run of `k` consecutive words of the normalized body
//! 2. Hashing: each shingle is hashed once with FxHash (stable across runs,
//!    unlike `DefaultHasher`; the value depends on pointer width)
//! 3. Permutation: `num_perm` universal hash functions `(a·x + b) mod p` over the
//!    Mersenne prime 2^61 − 1; coefficients come from a fixed splitmix64 stream
//! 4. Similarity: fraction of equal signature slots estimates Jaccard
//!
//! Identical input always yields an identical signature.

use rustc_hash::FxHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

const MERSENNE_61: u64 = (1 << 61) - 1;
const PERMUTATION_SEED: u64 = 0x5eed_cafe_f00d_d00d;

/// MinHash signature for fast similarity estimation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinHashSignature {
    pub hashes: Vec<u64>,
}

impl MinHashSignature {
    /// Signature of a normalized body using `k`-word shingles
    pub fn from_text(normalized: &str, k: usize, num_perm: usize) -> Self {
        let shingles = Self::shingling(normalized, k);
        Self::from_shingles(&shingles, num_perm)
    }

    pub fn from_shingles(shingles: &HashSet<u64>, num_perm: usize) -> Self {
        let permutations = Permutations::new(num_perm);
        let mut signature = vec![MERSENNE_61; num_perm];

        for &shingle in shingles {
            let x = shingle % MERSENNE_61;
            for (slot, (a, b)) in signature.iter_mut().zip(permutations.iter()) {
                let hashed = permute(x, a, b);
                if hashed < *slot {
                    *slot = hashed;
                }
            }
        }

        Self { hashes: signature }
    }

    /// Hashes of all `k`-word windows; texts shorter than `k` words form one shingle.
    fn shingling(text: &str, k: usize) -> HashSet<u64> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut shingles = HashSet::new();

        if words.len() < k {
            shingles.insert(stable_hash(&words.join(" ")));
            return shingles;
        }

        for window in words.windows(k) {
            shingles.insert(stable_hash(&window.join(" ")));
        }

        shingles
    }

    /// Estimated Jaccard similarity: share of equal slots
    pub fn jaccard_estimate(&self, other: &Self) -> f64 {
        debug_assert_eq!(
            self.hashes.len(),
            other.hashes.len(),
            "MinHash signatures must have same number of hashes"
        );

        let len = self.hashes.len().min(other.hashes.len());
        if len == 0 {
            return 0.0;
        }

        let matches = self
            .hashes
            .iter()
            .zip(&other.hashes)
            .filter(|(a, b)| a == b)
            .count();

        matches as f64 / len as f64
    }

    pub fn num_perm(&self) -> usize {
        self.hashes.len()
    }
}

fn stable_hash(value: &str) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

/// `(a·x + b) mod 2^61−1` without overflow
fn permute(x: u64, a: u64, b: u64) -> u64 {
    let product = (a as u128) * (x as u128) + b as u128;
    let folded = (product & MERSENNE_61 as u128) + (product >> 61);
    let folded = folded as u64;
    if folded >= MERSENNE_61 {
        folded - MERSENNE_61
    } else {
        folded
    }
}

/// Fixed coefficient pairs, regenerated deterministically per signature size
struct Permutations {
    coefficients: Vec<(u64, u64)>,
}

impl Permutations {
    fn new(num_perm: usize) -> Self {
        let mut state = PERMUTATION_SEED;
        let coefficients = (0..num_perm)
            .map(|_| {
                let a = splitmix64(&mut state) % (MERSENNE_61 - 1) + 1;
                let b = splitmix64(&mut state) % MERSENNE_61;
                (a, b)
            })
            .collect();
        Self { coefficients }
    }

    fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.coefficients.iter().copied()
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
