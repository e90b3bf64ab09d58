/*
 * VoiceSynth Curate - shortlist builder for cleaned email archives
 *
 * Pipeline (inside the Curate stage):
 * - Candidate filter (transactional mail, short bodies, automated recipients)
 * - Exact dedup (SHA-256 of normalized body)
 * - Near dedup (MinHash + banded LSH + union-find) over exact survivors
 * - Topic classification and richness scoring
 * - Per-topic capped selection
 *
 * Also hosts the native Convert stage (JSON export → filtered JSONL).
 */

pub mod config;
pub mod convert;
pub mod curate;
pub mod dedup;
pub mod error;
pub mod filter;
pub mod record;
pub mod scoring;
pub mod selection;
pub mod shortlist;

// Re-exports
pub use config::{CurateConfig, DedupConfig};
pub use convert::{convert_file, filter_record, ConvertStats};
pub use curate::{build_shortlist, CurateOutcome, CurateStats};
pub use dedup::{deduplicate, DedupReport, DuplicateCluster, MinHashSignature};
pub use error::{CurateError, Result};
pub use filter::is_style_candidate;
pub use record::{load_cleaned, CleanedEmail, EmailRecord};
pub use scoring::{classify, richness_score, Topic};
pub use selection::{select, Selection, TopicCount};
pub use shortlist::{write_shortlist, write_shortlist_file, COLUMNS};
