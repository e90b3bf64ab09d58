//! Exact-duplicate pass: SHA-256 over the normalized body

use super::DuplicateCluster;
use crate::record::EmailRecord;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Fold case and collapse every whitespace run to a single space.
pub fn normalize_body(body: &str) -> String {
    body.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Hex SHA-256 of an already-normalized body
pub fn content_hash(normalized: &str) -> String {
    let digest = Sha256::digest(normalized.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Outcome of the exact pass
pub struct ExactPass {
    /// Survivors in ingestion order
    pub survivors: Vec<EmailRecord>,
    /// Only groups with more than one member
    pub clusters: Vec<DuplicateCluster>,
    pub removed: usize,
}

/// Group records by content hash and keep the richest of each group.
///
/// Sets `content_hash` on every record. Survivors keep ingestion order.
pub fn exact_pass(mut records: Vec<EmailRecord>) -> ExactPass {
    let mut group_of_hash: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for (pos, record) in records.iter_mut().enumerate() {
        let hash = content_hash(&normalize_body(&record.body));
        let group = *group_of_hash.entry(hash.clone()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[group].push(pos);
        record.content_hash = Some(hash);
    }

    let mut keep = vec![false; records.len()];
    let mut clusters = Vec::new();
    let mut removed = 0;

    for members in &groups {
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
        keep[best] = true;

        if members.len() > 1 {
            removed += members.len() - 1;
            clusters.push(DuplicateCluster {
                representative_id: records[best].id,
                member_ids: members.iter().map(|&pos| records[pos].id).collect(),
                similarity: 1.0,
            });
        }
    }

    let survivors = records
        .into_iter()
        .zip(keep)
        .filter_map(|(record, kept)| kept.then_some(record))
        .collect();

    ExactPass {
        survivors,
        clusters,
        removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace_and_case() {
        assert_eq!(
            normalize_body("  Hello\n\n  World\tAgain  "),
            "hello world again"
        );
    }

    #[test]
    fn test_content_hash_is_hex_sha256() {
        let hash = content_hash("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_group_of_k_leaves_one_survivor() {
        let records: Vec<_> = (0..4)
            .map(|i| EmailRecord::new(i, "s", "Same   body TEXT"))
            .chain(std::iter::once(EmailRecord::new(4, "s", "different")))
            .collect();

        let pass = exact_pass(records);
        assert_eq!(pass.removed, 3);
        assert_eq!(pass.survivors.len(), 2);
        assert_eq!(pass.clusters.len(), 1);
        assert_eq!(pass.clusters[0].member_ids, vec![0, 1, 2, 3]);
        // all equally rich: earliest wins
        assert_eq!(pass.clusters[0].representative_id, 0);
    }

    #[test]
    fn test_keeps_richest_member() {
        let records = vec![
            EmailRecord::new(0, "s", "hello world"),
            EmailRecord::new(1, "s", "Hello\n\nWorld"),
            EmailRecord::new(2, "s", "other"),
        ];
        let pass = exact_pass(records);
        assert_eq!(pass.removed, 1);
        let ids: Vec<_> = pass.survivors.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
