//! Per-topic balanced selection
//!
//! Emission order: topics in [`Topic::ALL`] order; within a topic by richness
//! score descending, ties by ingestion order. The result is a pure function of
//! the input records and the cap.

use crate::record::EmailRecord;
use crate::scoring::Topic;
use std::cmp::Reverse;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicCount {
    pub total: usize,
    pub selected: usize,
}

#[derive(Debug, Default)]
pub struct Selection {
    pub shortlist: Vec<EmailRecord>,
    /// Every topic is present, including those with no records
    pub per_topic: BTreeMap<Topic, TopicCount>,
}

/// Keep the `per_topic_cap` highest-scoring records of every topic.
pub fn select(records: Vec<EmailRecord>, per_topic_cap: usize) -> Selection {
    let mut by_topic: BTreeMap<Topic, Vec<EmailRecord>> =
        Topic::ALL.iter().map(|&t| (t, Vec::new())).collect();
    for record in records {
        by_topic.entry(record.topic).or_default().push(record);
    }

    let mut selection = Selection::default();
    for topic in Topic::ALL {
        let mut group = by_topic.remove(&topic).unwrap_or_default();
        let total = group.len();

        group.sort_by_key(|r| (Reverse(r.richness_score), r.id));
        group.truncate(per_topic_cap);

        selection.per_topic.insert(
            topic,
            TopicCount {
                total,
                selected: group.len(),
            },
        );
        selection.shortlist.extend(group);
    }

    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::annotate;

    fn record(id: usize, subject: &str, body: &str) -> EmailRecord {
        let mut r = EmailRecord::new(id, subject, body);
        annotate(&mut r);
        r
    }

    #[test]
    fn test_cap_keeps_highest_scores() {
        let records = vec![
            record(0, "client call", "short"),
            record(1, "client call", "a much longer message"),
            record(2, "client call", "medium text"),
        ];
        let selection = select(records, 2);
        let ids: Vec<_> = selection.shortlist.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(
            selection.per_topic[&Topic::Client],
            TopicCount { total: 3, selected: 2 }
        );
    }

    #[test]
    fn test_grouped_in_topic_order() {
        let records = vec![
            record(0, "lunch", "tacos"),
            record(1, "weekly status", "done"),
            record(2, "client proposal", "attached"),
        ];
        let selection = select(records, 10);
        let topics: Vec<_> = selection.shortlist.iter().map(|r| r.topic).collect();
        assert_eq!(topics, vec![Topic::Client, Topic::Update, Topic::Other]);
        assert_eq!(selection.per_topic.len(), 6);
        assert_eq!(selection.per_topic[&Topic::Workshop].total, 0);
    }

    #[test]
    fn test_ties_keep_ingestion_order() {
        let records = vec![
            record(3, "lunch", "same"),
            record(1, "lunch", "same"),
            record(2, "lunch", "same"),
        ];
        let ids: Vec<_> = select(records, 10).shortlist.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
