//! Curate stage: filter → dedup → score/classify → select

use crate::config::CurateConfig;
use crate::dedup::{deduplicate, DedupReport};
use crate::error::Result;
use crate::filter::is_style_candidate;
use crate::record::EmailRecord;
use crate::scoring::{annotate, Topic};
use crate::selection::{select, Selection};
use std::collections::BTreeMap;
use tracing::info;

/// Counters reported on the stage's JSON stats line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurateStats {
    pub total_input: usize,
    pub candidates: usize,
    pub filtered_out: usize,
    pub exact_dupes_removed: usize,
    pub near_dupes_removed: usize,
    pub deduplicated: usize,
    pub shortlisted: usize,
    pub topic_totals: BTreeMap<Topic, usize>,
    pub topic_selected: BTreeMap<Topic, usize>,
}

impl CurateStats {
    /// Flat integer mapping, the shape of the stats line
    pub fn to_map(&self) -> BTreeMap<String, i64> {
        let mut map = BTreeMap::new();
        map.insert("total_input".to_string(), self.total_input as i64);
        map.insert("candidates".to_string(), self.candidates as i64);
        map.insert("filtered_out".to_string(), self.filtered_out as i64);
        map.insert("exact_dupes_removed".to_string(), self.exact_dupes_removed as i64);
        map.insert("near_dupes_removed".to_string(), self.near_dupes_removed as i64);
        map.insert("deduplicated".to_string(), self.deduplicated as i64);
        map.insert("shortlisted".to_string(), self.shortlisted as i64);
        for topic in Topic::ALL {
            map.insert(
                format!("topic_{}_total", topic),
                self.topic_totals.get(&topic).copied().unwrap_or(0) as i64,
            );
            map.insert(
                format!("topic_{}_selected", topic),
                self.topic_selected.get(&topic).copied().unwrap_or(0) as i64,
            );
        }
        map
    }
}

pub struct CurateOutcome {
    pub shortlist: Vec<EmailRecord>,
    pub stats: CurateStats,
    pub dedup: DedupReport,
}

/// Build the shortlist from cleaned records (already in ingestion order).
pub fn build_shortlist(records: Vec<EmailRecord>, config: &CurateConfig) -> Result<CurateOutcome> {
    config.validate()?;

    let mut stats = CurateStats {
        total_input: records.len(),
        ..CurateStats::default()
    };

    let candidates: Vec<EmailRecord> = records
        .into_iter()
        .filter(|r| is_style_candidate(r, config.min_chars))
        .collect();
    stats.candidates = candidates.len();
    stats.filtered_out = stats.total_input - stats.candidates;

    let (mut survivors, dedup) = if config.dedupe {
        deduplicate(candidates, &config.dedup)?
    } else {
        (candidates, DedupReport::default())
    };
    stats.exact_dupes_removed = dedup.exact_dupes_removed;
    stats.near_dupes_removed = dedup.near_dupes_removed;
    stats.deduplicated = survivors.len();

    survivors.iter_mut().for_each(annotate);

    let Selection {
        shortlist,
        per_topic,
    } = select(survivors, config.per_topic);
    stats.shortlisted = shortlist.len();
    for (topic, count) in per_topic {
        stats.topic_totals.insert(topic, count.total);
        stats.topic_selected.insert(topic, count.selected);
    }

    info!(
        total_input = stats.total_input,
        candidates = stats.candidates,
        deduplicated = stats.deduplicated,
        shortlisted = stats.shortlisted,
        "Shortlist built"
    );

    Ok(CurateOutcome {
        shortlist,
        stats,
        dedup,
    })
}
