//! Artifact checkpoints
//!
//! A stage counts as done exactly when its output artifact exists in the work
//! directory. Nothing else is persisted per stage, so a run interrupted at any
//! point resumes from whatever is on disk.

use crate::error::{OrchestratorError, Result};
use crate::job::StageId;
use crate::registry::StageRegistry;
use serde::de::IgnoredAny;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Infers the resume point of a work directory from its artifacts
pub struct ResumeResolver {
    work_dir: PathBuf,
    /// (stage, output artifact) in execution order
    outputs: Vec<(StageId, &'static str)>,
}

impl ResumeResolver {
    pub fn new(registry: &StageRegistry, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            outputs: registry.stages().iter().map(|s| (s.id, s.output)).collect(),
        }
    }

    /// Resolver for the standard four-stage chain
    pub fn standard(work_dir: impl Into<PathBuf>) -> Self {
        Self::new(&StageRegistry::standard(), work_dir)
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn artifact_path(&self, index: usize) -> Option<PathBuf> {
        self.outputs.get(index).map(|(_, name)| self.work_dir.join(name))
    }

    pub fn has_output(&self, index: usize) -> bool {
        self.artifact_path(index).is_some_and(|p| p.is_file())
    }

    /// Index of the next stage to run; `len` when the final artifact exists.
    ///
    /// Artifacts are checked from the final stage backwards, so a later
    /// artifact wins even if an earlier one was deleted. Pure: same files,
    /// same answer.
    pub fn resume_from(&self) -> usize {
        (0..self.outputs.len())
            .rev()
            .find(|&i| self.has_output(i))
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// Next stage to run, `None` when complete
    pub fn next_stage(&self) -> Option<StageId> {
        self.outputs.get(self.resume_from()).map(|(id, _)| *id)
    }

    pub fn is_complete(&self) -> bool {
        !self.outputs.is_empty() && self.has_output(self.outputs.len() - 1)
    }

    /// Any artifact other than the final one
    pub fn has_intermediate(&self) -> bool {
        let last = self.outputs.len().saturating_sub(1);
        (0..last).any(|i| self.has_output(i))
    }

    /// Delete every known artifact; returns what was removed.
    pub fn discard_artifacts(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for index in 0..self.outputs.len() {
            if let Some(path) = self.artifact_path(index).filter(|p| p.is_file()) {
                std::fs::remove_file(&path)?;
                debug!(artifact = %path.display(), "Discarded artifact");
                removed.push(path);
            }
        }
        if !removed.is_empty() {
            info!(count = removed.len(), work_dir = %self.work_dir.display(), "Discarded artifacts for fresh run");
        }
        Ok(removed)
    }

    /// Record count of a stage's artifact; fails if it cannot be parsed.
    pub fn count_records(&self, index: usize) -> Result<i64> {
        let path = self
            .artifact_path(index)
            .ok_or_else(|| OrchestratorError::parse(format!("no stage at index {}", index)))?;
        count_artifact_records(&path)
    }
}

/// Count records by artifact format: JSON array, JSONL or CSV (minus header).
pub fn count_artifact_records(path: &Path) -> Result<i64> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let file = File::open(path).map_err(|e| OrchestratorError::resume(path, e))?;
    let reader = BufReader::new(file);

    let count = match extension.as_str() {
        "json" => count_json_array(reader),
        "jsonl" => count_jsonl(reader),
        "csv" => count_csv(reader),
        other => Err(format!("unknown artifact format '{}'", other)),
    };

    count.map_err(|reason| OrchestratorError::resume(path, reason))
}

fn count_json_array<R: Read>(reader: R) -> std::result::Result<i64, String> {
    let items: Vec<IgnoredAny> =
        serde_json::from_reader(reader).map_err(|e| format!("not a JSON array: {}", e))?;
    Ok(items.len() as i64)
}

fn count_jsonl<R: BufRead>(reader: R) -> std::result::Result<i64, String> {
    let mut count = 0;
    for (n, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| e.to_string())?;
        if line.trim().is_empty() {
            continue;
        }
        serde_json::from_str::<IgnoredAny>(&line)
            .map_err(|e| format!("line {} is not JSON: {}", n + 1, e))?;
        count += 1;
    }
    Ok(count)
}

/// Rows outside quoted fields, header excluded
fn count_csv<R: Read>(mut reader: R) -> std::result::Result<i64, String> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|e| e.to_string())?;

    let mut rows = 0i64;
    let mut in_quotes = false;
    let mut row_has_content = false;

    for c in text.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                row_has_content = true;
            }
            '\n' if !in_quotes => {
                if row_has_content {
                    rows += 1;
                }
                row_has_content = false;
            }
            '\r' if !in_quotes => {}
            _ => row_has_content = true,
        }
    }
    if row_has_content {
        rows += 1;
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    if rows == 0 {
        return Err("missing header row".to_string());
    }
    Ok(rows - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CLEANED_ARTIFACT, JSONL_ARTIFACT, RAW_ARTIFACT, SHORTLIST_ARTIFACT};
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_empty_dir_starts_at_zero() {
        let dir = TempDir::new().unwrap();
        let resolver = ResumeResolver::standard(dir.path());
        assert_eq!(resolver.resume_from(), 0);
        assert_eq!(resolver.next_stage(), Some(StageId::Import));
        assert!(!resolver.has_intermediate());
    }

    #[test]
    fn test_descending_priority() {
        let dir = TempDir::new().unwrap();
        let resolver = ResumeResolver::standard(dir.path());

        touch(dir.path(), RAW_ARTIFACT, "[]");
        assert_eq!(resolver.resume_from(), 1);

        touch(dir.path(), JSONL_ARTIFACT, "");
        assert_eq!(resolver.resume_from(), 2);

        // later artifact wins even without the earlier ones
        std::fs::remove_file(dir.path().join(RAW_ARTIFACT)).unwrap();
        std::fs::remove_file(dir.path().join(JSONL_ARTIFACT)).unwrap();
        touch(dir.path(), CLEANED_ARTIFACT, "[]");
        assert_eq!(resolver.resume_from(), 3);
        assert_eq!(resolver.next_stage(), Some(StageId::Curate));

        touch(dir.path(), SHORTLIST_ARTIFACT, "id\n");
        assert_eq!(resolver.resume_from(), 4);
        assert_eq!(resolver.next_stage(), None);
        assert!(resolver.is_complete());
    }

    #[test]
    fn test_resume_from_idempotent() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), JSONL_ARTIFACT, "{}\n");
        let resolver = ResumeResolver::standard(dir.path());
        let first = resolver.resume_from();
        for _ in 0..5 {
            assert_eq!(resolver.resume_from(), first);
        }
    }

    #[test]
    fn test_discard_artifacts() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), RAW_ARTIFACT, "[]");
        touch(dir.path(), CLEANED_ARTIFACT, "[]");
        touch(dir.path(), "unrelated.txt", "keep me");

        let resolver = ResumeResolver::standard(dir.path());
        let removed = resolver.discard_artifacts().unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(resolver.resume_from(), 0);
        assert!(dir.path().join("unrelated.txt").exists());
    }

    #[test]
    fn test_count_records_per_format() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), RAW_ARTIFACT, r#"[{"a": 1}, {"a": 2}, {"a": 3}]"#);
        touch(dir.path(), JSONL_ARTIFACT, "{\"a\":1}\n\n{\"a\":2}\n");
        touch(
            dir.path(),
            SHORTLIST_ARTIFACT,
            "id,body\r\n0,\"two\r\nlines\"\r\n1,plain\r\n",
        );

        let resolver = ResumeResolver::standard(dir.path());
        assert_eq!(resolver.count_records(0).unwrap(), 3);
        assert_eq!(resolver.count_records(1).unwrap(), 2);
        assert_eq!(resolver.count_records(3).unwrap(), 2);
    }

    #[test]
    fn test_unparseable_artifact_is_inconsistent() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), CLEANED_ARTIFACT, "{\"truncated\": ");
        touch(dir.path(), JSONL_ARTIFACT, "{}\nnot json\n");

        let resolver = ResumeResolver::standard(dir.path());
        assert!(matches!(
            resolver.count_records(2),
            Err(OrchestratorError::ResumeInconsistency { .. })
        ));
        assert!(matches!(
            resolver.count_records(1),
            Err(OrchestratorError::ResumeInconsistency { .. })
        ));
    }

    #[test]
    fn test_csv_without_header_is_inconsistent() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), SHORTLIST_ARTIFACT, "");
        let resolver = ResumeResolver::standard(dir.path());
        assert!(resolver.count_records(3).is_err());
    }
}
