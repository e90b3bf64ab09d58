//! Curation settings
//!
//! Defaults follow the curate stage's command-line defaults: 200 records per
//! topic, 200-character minimum body, near-duplicate threshold 0.8.

use crate::error::{CurateError, Result};
use serde::{Deserialize, Serialize};

/// Near-duplicate detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Estimated Jaccard similarity at or above which two bodies are merged
    pub threshold: f64,
    /// MinHash signature length; must be a power of two so LSH bands nest
    pub num_perm: usize,
    /// Words per shingle
    pub shingle_size: usize,
    /// Normalized bodies of at most this many characters skip near-dedup
    pub min_normalized_chars: usize,
    /// Worker threads for signature computation
    pub parallel_workers: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            num_perm: 128,
            shingle_size: 3,
            min_normalized_chars: 50,
            parallel_workers: (num_cpus::get() * 3 / 4).max(1),
        }
    }
}

impl DedupConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(CurateError::range(
                "dedupe_threshold",
                self.threshold,
                "must be in (0, 1]; lower merges more aggressively",
            ));
        }
        if self.num_perm == 0 || !self.num_perm.is_power_of_two() {
            return Err(CurateError::range(
                "num_perm",
                self.num_perm,
                "must be a non-zero power of two",
            ));
        }
        if self.shingle_size == 0 {
            return Err(CurateError::range("shingle_size", 0, "must be at least 1"));
        }
        if self.parallel_workers == 0 {
            return Err(CurateError::range("parallel_workers", 0, "must be at least 1"));
        }
        Ok(())
    }
}

/// Full curate stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurateConfig {
    pub per_topic: usize,
    pub min_chars: usize,
    pub dedupe: bool,
    pub dedup: DedupConfig,
}

impl Default for CurateConfig {
    fn default() -> Self {
        Self {
            per_topic: 200,
            min_chars: 200,
            dedupe: true,
            dedup: DedupConfig::default(),
        }
    }
}

impl CurateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.per_topic == 0 {
            return Err(CurateError::range("per_topic", 0, "must be at least 1"));
        }
        self.dedup.validate()
    }
}
