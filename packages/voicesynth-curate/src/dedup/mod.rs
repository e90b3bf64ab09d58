//! Two-phase duplicate removal
//!
//! 1. Exact: SHA-256 of the normalized body, one survivor per hash
//! 2. Near: MinHash + banded LSH over exact survivors only, confirmed by the
//!    signature's Jaccard estimate and merged transitively with union-find
//!
//! Each cluster keeps its richest member (longest body, then most paragraphs,
//! then earliest ingestion). Output order is always ingestion order.

pub mod exact;
pub mod lsh;
pub mod minhash;
pub mod union_find;

pub use exact::{content_hash, exact_pass, normalize_body, ExactPass};
pub use lsh::{BandLayout, LshIndex};
pub use minhash::MinHashSignature;
pub use union_find::UnionFind;

use crate::config::DedupConfig;
use crate::error::Result;
use crate::record::EmailRecord;
use rayon::prelude::*;
use tracing::{debug, info};

/// A group of records judged to be copies of each other
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateCluster {
    pub representative_id: usize,
    /// All members including the representative, ascending
    pub member_ids: Vec<usize>,
    /// 1.0 for exact groups; lowest confirmed pair estimate otherwise
    pub similarity: f64,
}

#[derive(Debug, Clone, Default)]
pub struct DedupReport {
    pub exact_dupes_removed: usize,
    pub near_dupes_removed: usize,
    pub exact_clusters: Vec<DuplicateCluster>,
    pub near_clusters: Vec<DuplicateCluster>,
}

/// Run both passes and return the survivors in ingestion order.
pub fn deduplicate(
    records: Vec<EmailRecord>,
    config: &DedupConfig,
) -> Result<(Vec<EmailRecord>, DedupReport)> {
    config.validate()?;

    let input = records.len();
    let exact = exact_pass(records);
    debug!(
        removed = exact.removed,
        groups = exact.clusters.len(),
        "Exact pass finished"
    );

    let (survivors, near_clusters, near_removed) = near_pass(exact.survivors, config)?;

    info!(
        input,
        exact_dupes_removed = exact.removed,
        near_dupes_removed = near_removed,
        survivors = survivors.len(),
        threshold = config.threshold,
        "Deduplication complete"
    );

    Ok((
        survivors,
        DedupReport {
            exact_dupes_removed: exact.removed,
            near_dupes_removed: near_removed,
            exact_clusters: exact.clusters,
            near_clusters,
        },
    ))
}

fn near_pass(
    mut records: Vec<EmailRecord>,
    config: &DedupConfig,
) -> Result<(Vec<EmailRecord>, Vec<DuplicateCluster>, usize)> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.parallel_workers)
        .build()?;

    let signatures: Vec<Option<MinHashSignature>> = pool.install(|| {
        records
            .par_iter()
            .map(|record| {
                let normalized = normalize_body(&record.body);
                (normalized.chars().count() > config.min_normalized_chars).then(|| {
                    MinHashSignature::from_text(&normalized, config.shingle_size, config.num_perm)
                })
            })
            .collect()
    });

    let layout = BandLayout::for_threshold(config.num_perm, config.threshold);
    let mut index = LshIndex::new(layout);
    for (pos, signature) in signatures.iter().enumerate() {
        if let Some(signature) = signature {
            index.insert(signature, pos);
        }
    }
    let candidates = index.candidate_pairs();
    debug!(
        bands = layout.num_bands,
        rows = layout.rows_per_band,
        candidates = candidates.len(),
        "LSH candidates collected"
    );

    let mut uf = UnionFind::new(records.len());
    let mut confirmed = Vec::new();
    for (a, b) in candidates {
        if let (Some(sa), Some(sb)) = (&signatures[a], &signatures[b]) {
            let similarity = sa.jaccard_estimate(sb);
            if similarity >= config.threshold {
                uf.union(a, b);
                confirmed.push((a, b, similarity));
            }
        }
    }
    drop(index);

    let mut keep = vec![true; records.len()];
    let mut clusters = Vec::new();
    let mut removed = 0;

    for members in uf.groups().into_iter().filter(|g| g.len() > 1) {
        let best = members
            .iter()
            .copied()
            .reduce(|best, pos| {
                if records[pos].is_richer_than(&records[best]) {
                    pos
                } else {
                    best
                }
            })
            .unwrap_or(members[0]);

        let similarity = confirmed
            .iter()
            .filter(|(a, _, _)| members.binary_search(a).is_ok())
            .map(|&(_, _, s)| s)
            .fold(1.0_f64, f64::min);

        for &pos in &members {
            if pos != best {
                keep[pos] = false;
            }
        }
        removed += members.len() - 1;
        clusters.push(DuplicateCluster {
            representative_id: records[best].id,
            member_ids: members.iter().map(|&pos| records[pos].id).collect(),
            similarity,
        });
    }

    for (record, signature) in records.iter_mut().zip(signatures) {
        record.minhash_signature = signature;
    }

    let survivors = records
        .into_iter()
        .zip(keep)
        .filter_map(|(record, kept)| kept.then_some(record))
        .collect();

    Ok((survivors, clusters, removed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(prefix: &str, n: usize) -> String {
        (0..n)
            .map(|i| format!("{}{}", prefix, i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_near_duplicates_merge_into_richest() {
        let base = body("w", 120);
        let records = vec![
            EmailRecord::new(0, "a", format!("{} x", base)),
            EmailRecord::new(1, "b", body("other", 120)),
            EmailRecord::new(2, "c", format!("{} longer tail", base)),
        ];

        let (survivors, report) = deduplicate(records, &DedupConfig::default()).unwrap();
        let ids: Vec<_> = survivors.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(report.near_dupes_removed, 1);
        assert_eq!(report.near_clusters[0].member_ids, vec![0, 2]);
        assert_eq!(report.near_clusters[0].representative_id, 2);
        assert!(report.near_clusters[0].similarity >= 0.8);
    }

    #[test]
    fn test_short_bodies_skip_near_pass() {
        let records = vec![
            EmailRecord::new(0, "a", "tiny note one"),
            EmailRecord::new(1, "b", "tiny note two"),
        ];
        let (survivors, report) = deduplicate(records, &DedupConfig::default()).unwrap();
        assert_eq!(survivors.len(), 2);
        assert_eq!(report.near_dupes_removed, 0);
        assert!(survivors.iter().all(|r| r.minhash_signature.is_none()));
    }

    #[test]
    fn test_exact_runs_before_near() {
        let base = body("w", 100);
        let records = vec![
            EmailRecord::new(0, "a", base.clone()),
            EmailRecord::new(1, "a", base.to_uppercase()),
            EmailRecord::new(2, "a", format!("{} extra", base)),
        ];
        let (survivors, report) = deduplicate(records, &DedupConfig::default()).unwrap();
        assert_eq!(report.exact_dupes_removed, 1);
        assert_eq!(report.near_dupes_removed, 1);
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].id, 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DedupConfig::default().with_threshold(0.0);
        assert!(deduplicate(Vec::new(), &config).is_err());
    }
}
