use crate::error::{ErrorCategory, OrchestratorError, Result};
use crate::job::StageId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Flat counters reported by a stage
pub type StageStats = BTreeMap<String, i64>;

/// Fully resolved command line for one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInvocation {
    pub stage: StageId,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Child's working directory; artifact names in `args` are relative to it
    pub work_dir: PathBuf,
}

impl StageInvocation {
    /// `program arg1 arg2 ...` for logs and diagnostics
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of one stage within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageId,
    pub stats: StageStats,
    pub success: bool,
    pub error: Option<String>,
    pub error_category: Option<ErrorCategory>,
    /// Skipped because its artifact already existed
    pub resumed: bool,
    pub duration_ms: u64,
}

impl StageResult {
    pub fn succeeded(stage: StageId, stats: StageStats, duration_ms: u64) -> Self {
        Self {
            stage,
            stats,
            success: true,
            error: None,
            error_category: None,
            resumed: false,
            duration_ms,
        }
    }

    pub fn resumed(stage: StageId, records: i64) -> Self {
        let mut stats = StageStats::new();
        stats.insert("resumed".to_string(), 1);
        stats.insert("records".to_string(), records);
        Self {
            resumed: true,
            ..Self::succeeded(stage, stats, 0)
        }
    }

    pub fn failed(stage: StageId, error: &OrchestratorError, duration_ms: u64) -> Self {
        Self {
            stage,
            stats: StageStats::new(),
            success: false,
            error: Some(error.to_string()),
            error_category: Some(error.category()),
            resumed: false,
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives child output lines as they are read
pub trait LineObserver: Send + Sync {
    fn on_line(&self, stage: StageId, stream: OutputStream, line: &str);
}

/// Observer that drops everything
pub struct NullObserver;

impl LineObserver for NullObserver {
    fn on_line(&self, _stage: StageId, _stream: OutputStream, _line: &str) {}
}

/// Runs one stage to completion (pluggable for tests)
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Returns the extracted stats on a zero exit.
    async fn execute(
        &self,
        invocation: &StageInvocation,
        observer: &dyn LineObserver,
        cancel: &CancellationToken,
    ) -> Result<StageStats>;
}

/// Progress delivered from the engine to whoever drives the UI
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StageStarted {
        stage: StageId,
    },
    StageLog {
        stage: StageId,
        stream: OutputStream,
        line: String,
    },
    StageSkipped {
        stage: StageId,
        result: StageResult,
    },
    StageCompleted {
        stage: StageId,
        stats: StageStats,
    },
    StageFailed {
        stage: StageId,
        /// The failing line itself, without a stage prefix
        error: String,
        diagnostic_log: Option<PathBuf>,
    },
    PipelineCompleted {
        results: Vec<StageResult>,
    },
}

/// Forwards log lines into the engine's event channel
pub struct ChannelObserver {
    events: UnboundedSender<PipelineEvent>,
}

impl ChannelObserver {
    pub fn new(events: UnboundedSender<PipelineEvent>) -> Self {
        Self { events }
    }
}

impl LineObserver for ChannelObserver {
    fn on_line(&self, stage: StageId, stream: OutputStream, line: &str) {
        // receiver gone means nobody is watching
        let _ = self.events.send(PipelineEvent::StageLog {
            stage,
            stream,
            line: line.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resumed_result_stats() {
        let result = StageResult::resumed(StageId::Clean, 42);
        assert!(result.success);
        assert!(result.resumed);
        assert_eq!(result.stats["resumed"], 1);
        assert_eq!(result.stats["records"], 42);
    }

    #[test]
    fn test_failed_result_carries_category() {
        let err = OrchestratorError::StageExecution {
            stage: "import".into(),
            message: "Fatal: model not found".into(),
            diagnostic_log: None,
        };
        let result = StageResult::failed(StageId::Import, &err, 5);
        assert!(!result.success);
        assert_eq!(result.error_category, Some(ErrorCategory::StageExecution));
        assert!(result.error.unwrap().contains("Fatal: model not found"));
    }

    #[test]
    fn test_command_line() {
        let invocation = StageInvocation {
            stage: StageId::Clean,
            program: PathBuf::from("python3"),
            args: vec!["pipeline.py".into(), "clean".into()],
            work_dir: PathBuf::from("/w"),
        };
        assert_eq!(invocation.command_line(), "python3 pipeline.py clean");
    }

    #[tokio::test]
    async fn test_channel_observer_forwards_lines() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let observer = ChannelObserver::new(tx);
        observer.on_line(StageId::Import, OutputStream::Stderr, "warming up");

        match rx.recv().await {
            Some(PipelineEvent::StageLog {
                stage,
                stream,
                line,
            }) => {
                assert_eq!(stage, StageId::Import);
                assert_eq!(stream, OutputStream::Stderr);
                assert_eq!(line, "warming up");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
