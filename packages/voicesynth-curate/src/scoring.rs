//! Topic classification and richness scoring
//!
//! Both are deliberately simple heuristics: the score only has to rank records
//! within a topic, never to measure absolute quality.

use crate::record::EmailRecord;
use serde::{Deserialize, Serialize};

/// Extra weight per paragraph break, in characters
const PARAGRAPH_WEIGHT: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Client,
    Strategy,
    Update,
    Feedback,
    Workshop,
    Other,
}

impl Topic {
    /// Classification and emission order
    pub const ALL: [Topic; 6] = [
        Topic::Client,
        Topic::Strategy,
        Topic::Update,
        Topic::Feedback,
        Topic::Workshop,
        Topic::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Client => "client",
            Topic::Strategy => "strategy",
            Topic::Update => "update",
            Topic::Feedback => "feedback",
            Topic::Workshop => "workshop",
            Topic::Other => "other",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Topic::Client => &[
                "client",
                "proposal",
                "brief",
                "scope",
                "contract",
                "statement of work",
            ],
            Topic::Strategy => &["strategy", "vision", "northstar", "long-term", "direction"],
            Topic::Update => &["status", "update", "weekly", "friday update", "checkpoint"],
            Topic::Feedback => &[
                "feedback",
                "retro",
                "retrospective",
                "reflection",
                "debrief",
                "coaching",
            ],
            Topic::Workshop => &["workshop", "session", "agenda", "facilitation"],
            Topic::Other => &[],
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// First topic whose keyword appears in subject or body; `Other` otherwise.
pub fn classify(subject: &str, body: &str) -> Topic {
    let text = format!("{} {}", subject, body).to_lowercase();
    Topic::ALL
        .iter()
        .copied()
        .find(|topic| topic.keywords().iter().any(|kw| text.contains(kw)))
        .unwrap_or(Topic::Other)
}

/// Blank-line paragraph breaks, counting both LF and CRLF styles
pub fn paragraph_count(body: &str) -> usize {
    body.matches("\n\n").count() + body.matches("\r\n\r\n").count()
}

/// Character length plus a fixed bonus per paragraph break.
///
/// Non-decreasing in both length and paragraph count.
pub fn richness_score(body: &str) -> u64 {
    if body.is_empty() {
        return 0;
    }
    body.chars().count() as u64 + paragraph_count(body) as u64 * PARAGRAPH_WEIGHT
}

/// Classify and score a record in place
pub fn annotate(record: &mut EmailRecord) {
    record.topic = classify(&record.subject, &record.body);
    record.richness_score = richness_score(&record.body);
}
