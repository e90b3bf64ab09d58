//! Job tracker
//!
//! Persists a short list of jobs keyed by (input path, work dir) so an
//! interrupted run can be offered for resume. The store is a JSON array
//! written through a temp file and a rename.

use crate::checkpoint::ResumeResolver;
use crate::error::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Maximum number of jobs kept; oldest inserted is evicted first
pub const CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InProgress,
    Completed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(alias = "mbox")]
    pub input_path: PathBuf,
    pub work_dir: PathBuf,
    pub status: JobStatus,
    #[serde(default)]
    pub sender: String,
    pub started: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl JobRecord {
    fn matches(&self, input_path: &Path, work_dir: &Path) -> bool {
        self.input_path == input_path && self.work_dir == work_dir
    }
}

/// File-backed job store; a single process writes it
pub struct JobTracker {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JobTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All jobs in insertion order. Missing or corrupt store reads as empty.
    pub fn load(&self) -> Vec<JobRecord> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Job store unreadable, treating as empty");
                return Vec::new();
            }
        };

        match serde_json::from_str(&text) {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Job store corrupt, treating as empty");
                Vec::new()
            }
        }
    }

    fn save(&self, jobs: &[JobRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(jobs)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), jobs = jobs.len(), "Job store written");
        Ok(())
    }

    /// Insert or update the job for (input, work dir).
    ///
    /// An empty or absent sender leaves the stored one alone. A completed job
    /// stays completed; use [`JobTracker::reopen`] to start it over.
    pub fn upsert(
        &self,
        input_path: &Path,
        work_dir: &Path,
        status: JobStatus,
        sender: Option<&str>,
    ) -> Result<JobRecord> {
        let _guard = self.write_lock.lock();
        let mut jobs = self.load();
        let now = Utc::now();
        let sender = sender.filter(|s| !s.is_empty());

        let record = match jobs.iter_mut().find(|j| j.matches(input_path, work_dir)) {
            Some(job) => {
                if job.status != JobStatus::Completed {
                    job.status = status;
                }
                if let Some(sender) = sender {
                    job.sender = sender.to_string();
                }
                job.updated = now;
                job.clone()
            }
            None => {
                let job = JobRecord {
                    input_path: input_path.to_path_buf(),
                    work_dir: work_dir.to_path_buf(),
                    status,
                    sender: sender.unwrap_or_default().to_string(),
                    started: now,
                    updated: now,
                };
                jobs.push(job.clone());
                if jobs.len() > CAPACITY {
                    let evicted = jobs.len() - CAPACITY;
                    jobs.drain(..evicted);
                    debug!(evicted, "Evicted oldest jobs");
                }
                job
            }
        };

        self.save(&jobs)?;
        Ok(record)
    }

    /// Explicitly set a job back to in-progress (fresh run over a finished job).
    pub fn reopen(&self, input_path: &Path, work_dir: &Path) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut jobs = self.load();
        let mut changed = false;
        for job in jobs.iter_mut().filter(|j| j.matches(input_path, work_dir)) {
            job.status = JobStatus::InProgress;
            job.updated = Utc::now();
            changed = true;
        }
        if changed {
            self.save(&jobs)?;
        }
        Ok(())
    }

    /// Mark every job in `work_dir` completed
    pub fn mark_complete(&self, work_dir: &Path) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let mut jobs = self.load();
        let now = Utc::now();
        let mut count = 0;
        for job in jobs.iter_mut().filter(|j| j.work_dir == work_dir) {
            job.status = JobStatus::Completed;
            job.updated = now;
            count += 1;
        }
        if count > 0 {
            self.save(&jobs)?;
            info!(work_dir = %work_dir.display(), jobs = count, "Job marked complete");
        }
        Ok(count)
    }

    /// First in-progress job that can actually be resumed: its work dir exists,
    /// the final artifact is absent and some intermediate artifact is present.
    pub fn find_resumable(&self) -> Option<JobRecord> {
        self.load().into_iter().find(|job| {
            if job.status != JobStatus::InProgress || !job.work_dir.is_dir() {
                return false;
            }
            let resolver = ResumeResolver::standard(&job.work_dir);
            !resolver.is_complete() && resolver.has_intermediate()
        })
    }

    pub fn list(&self) -> Vec<JobRecord> {
        self.load()
    }

    pub fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.save(&[])?;
        info!(path = %self.path.display(), "Job store cleared");
        Ok(())
    }
}
