/*
 * VoiceSynth Orchestration - resumable stage engine
 *
 * Turns a mailbox export into a curated shortlist by chaining four stages
 * (Import → Convert → Clean → Curate), each a supervised child process that
 * reads the previous stage's artifact from the job's work directory.
 *
 * Architecture:
 * - Stage registry (input/output artifact + argument builder per stage)
 * - Engine state machine (no automatic retry)
 * - Artifact checkpoints (resume point inferred from files on disk)
 * - Job tracker (last 10 jobs, JSON store)
 * - Process supervisor (concurrent stream readers, stats line, diagnostics)
 * - Event channel to the front end
 */

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod input;
pub mod job;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod supervisor;
pub mod tracker;

// Re-exports
pub use checkpoint::{count_artifact_records, ResumeResolver};
pub use config::{ConfigError, PipelineConfig, Validatable};
pub use error::{ErrorCategory, OrchestratorError, Result};
pub use input::{clean_path, validate_input, InputKind};
pub use job::{EngineState, EngineStateMachine, StageId};
pub use logging::init_logging;
pub use orchestrator::{PipelineOrchestrator, PipelineResult, RunRequest};
pub use pipeline::{
    ChannelObserver, LineObserver, NullObserver, OutputStream, PipelineEvent, StageExecutor,
    StageInvocation, StageResult, StageStats,
};
pub use registry::{StageOptions, StageRegistry, StageSpec, Toolchain};
pub use supervisor::ProcessSupervisor;
pub use tracker::{JobRecord, JobStatus, JobTracker};
