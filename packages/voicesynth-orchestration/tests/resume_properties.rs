//! Property tests for artifact-based resume and the job store cap

use proptest::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use voicesynth_orchestration::registry::{
    CLEANED_ARTIFACT, JSONL_ARTIFACT, RAW_ARTIFACT, SHORTLIST_ARTIFACT,
};
use voicesynth_orchestration::tracker::CAPACITY;
use voicesynth_orchestration::{JobStatus, JobTracker, ResumeResolver};

const ARTIFACTS: [&str; 4] = [RAW_ARTIFACT, JSONL_ARTIFACT, CLEANED_ARTIFACT, SHORTLIST_ARTIFACT];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Resume point is one past the furthest artifact present, and asking
    /// twice gives the same answer.
    #[test]
    fn resume_from_is_furthest_artifact_plus_one(present in prop::collection::vec(any::<bool>(), 4)) {
        let dir = TempDir::new().unwrap();
        for (name, keep) in ARTIFACTS.iter().zip(&present) {
            if *keep {
                std::fs::write(dir.path().join(name), "[]").unwrap();
            }
        }

        let resolver = ResumeResolver::standard(dir.path());
        let expected = present.iter().rposition(|p| *p).map(|i| i + 1).unwrap_or(0);

        prop_assert_eq!(resolver.resume_from(), expected);
        prop_assert_eq!(resolver.resume_from(), expected);
        prop_assert_eq!(resolver.is_complete(), present[3]);
    }

    /// Never more than CAPACITY jobs; survivors are the most recently inserted.
    #[test]
    fn job_store_keeps_latest_insertions(count in 1usize..25) {
        let dir = TempDir::new().unwrap();
        let tracker = JobTracker::new(dir.path().join("jobs.json"));
        for i in 0..count {
            let input = PathBuf::from(format!("/in/{}.mbox", i));
            tracker.upsert(&input, Path::new("/w"), JobStatus::InProgress, None).unwrap();
        }

        let jobs = tracker.list();
        prop_assert_eq!(jobs.len(), count.min(CAPACITY));
        let first_kept = count.saturating_sub(CAPACITY);
        prop_assert_eq!(&jobs[0].input_path, &PathBuf::from(format!("/in/{}.mbox", first_kept)));
    }
}
