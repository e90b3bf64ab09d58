use crate::checkpoint::ResumeResolver;
use crate::error::{OrchestratorError, Result};
use crate::input::{validate_input, InputKind};
use crate::job::{EngineState, EngineStateMachine, StageId};
use crate::pipeline::{
    ChannelObserver, LineObserver, OutputStream, PipelineEvent, StageExecutor, StageResult,
    StageStats,
};
use crate::registry::{
    detect_owner_invocation, StageInput, StageOptions, StageRegistry, StageSpec, Toolchain,
};
use crate::tracker::{JobStatus, JobTracker};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One pipeline run
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// External export (mailbox archive, `.mbox`, or JSON/JSONL)
    pub input: PathBuf,
    /// Where artifacts live; created if missing
    pub work_dir: PathBuf,
    pub options: StageOptions,
    /// Discard existing artifacts instead of resuming
    pub fresh: bool,
}

/// Outcome of a run that got as far as executing stages
#[derive(Debug)]
pub struct PipelineResult {
    pub run_id: Uuid,
    /// Skipped (resumed) stages first, then executed ones, in chain order
    pub results: Vec<StageResult>,
    pub state: EngineState,
    /// The error that halted the chain
    pub failure: Option<OrchestratorError>,
    /// Final artifact, when the chain completed
    pub shortlist: Option<PathBuf>,
    /// Copy of the final artifact in the export directory
    pub exported: Option<PathBuf>,
}

impl PipelineResult {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Stats of the last result for `stage`
    pub fn stats_for(&self, stage: StageId) -> Option<&StageStats> {
        self.results
            .iter()
            .rev()
            .find(|r| r.stage == stage)
            .map(|r| &r.stats)
    }
}

/// Sequences the registry's stages for one job.
///
/// Stages run strictly one after another. Progress goes out on the event
/// channel returned by [`PipelineOrchestrator::new`]; the caller drains it.
pub struct PipelineOrchestrator {
    registry: StageRegistry,
    executor: Arc<dyn StageExecutor>,
    tracker: Arc<JobTracker>,
    toolchain: Toolchain,
    export_dir: Option<PathBuf>,
    events: UnboundedSender<PipelineEvent>,
}

impl PipelineOrchestrator {
    pub fn new(
        executor: Arc<dyn StageExecutor>,
        tracker: Arc<JobTracker>,
        toolchain: Toolchain,
    ) -> (Self, UnboundedReceiver<PipelineEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let orchestrator = Self {
            registry: StageRegistry::standard(),
            executor,
            tracker,
            toolchain,
            export_dir: None,
            events,
        };
        (orchestrator, receiver)
    }

    pub fn with_export_dir(mut self, export_dir: Option<PathBuf>) -> Self {
        self.export_dir = export_dir;
        self
    }

    fn emit(&self, event: PipelineEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    /// Run the chain from its resume point.
    ///
    /// Problems found before any stage starts (bad input, missing tools,
    /// unreadable artifacts) are returned as `Err`. A stage failure halts the
    /// chain and is reported in [`PipelineResult::failure`]; the job stays
    /// in progress so a later run picks up from the last artifact.
    ///
    /// The input only has to exist while a remaining stage still reads it.
    pub async fn run(&self, mut request: RunRequest, cancel: &CancellationToken) -> Result<PipelineResult> {
        let run_id = Uuid::new_v4();
        if request.input.as_os_str().is_empty() {
            return Err(OrchestratorError::input("no input path given"));
        }
        let work_dir = prepare_work_dir(&request.work_dir)?;
        let resolver = ResumeResolver::new(&self.registry, &work_dir);

        let input = std::fs::canonicalize(&request.input).unwrap_or_else(|_| request.input.clone());
        self.reject_artifact_input(&resolver, &input)?;

        let kind = InputKind::detect(&input);
        let entry = self.registry.entry_point(!kind.needs_import());
        let start = if request.fresh {
            entry
        } else {
            resolver.resume_from().max(entry)
        };

        let input = if self.reads_external(&resolver, start, request.fresh) {
            validate_input(&input)?
        } else {
            if !input.exists() {
                warn!(
                    input = %input.display(),
                    "Input no longer available, remaining stages only read artifacts"
                );
            }
            input
        };

        self.check_toolchain(start)?;

        if request.fresh {
            resolver.discard_artifacts()?;
            if let Err(e) = self.tracker.reopen(&input, &work_dir) {
                warn!(error = %e, "Failed to reopen job");
            }
        }

        info!(
            run_id = %run_id,
            input = %input.display(),
            work_dir = %work_dir.display(),
            start_stage = self.registry.get(start).map(|s| s.id.as_str()).unwrap_or("done"),
            "Starting pipeline run"
        );

        if request.options.sender.is_none()
            && request.options.detect_sender
            && kind.needs_import()
            && input.exists()
            && self.registry.uses_sender_from(start)
        {
            request.options.sender = self.detect_owner(&work_dir, &input, cancel).await;
        }

        if let Err(e) = self.tracker.upsert(
            &input,
            &work_dir,
            JobStatus::InProgress,
            request.options.sender.as_deref(),
        ) {
            warn!(error = %e, "Failed to record job");
        }

        let mut results = self.resumed_results(&resolver, start)?;
        let mut machine = EngineStateMachine::new();
        let observer = ChannelObserver::new(self.events.clone());

        for index in start..self.registry.len() {
            let Some(spec) = self.registry.get(index) else {
                break;
            };

            if cancel.is_cancelled() {
                info!(stage = %spec.id, "Cancelled before stage start");
                return Ok(self.halted(run_id, results, machine, OrchestratorError::Cancelled));
            }

            machine.start(spec.id)?;
            self.emit(PipelineEvent::StageStarted { stage: spec.id });

            let invocation = self
                .registry
                .invocation(index, &work_dir, &input, &request.options, &self.toolchain)
                .ok_or_else(|| OrchestratorError::parse(format!("no stage at index {}", index)))?;

            let started = Instant::now();
            let outcome = match self.executor.execute(&invocation, &observer, cancel).await {
                Ok(stats) => check_output(spec, &work_dir, stats),
                Err(e) => Err(e),
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(stats) => {
                    machine.complete()?;
                    info!(stage = %spec.id, duration_ms, stats = ?stats, "Stage completed");
                    self.emit(PipelineEvent::StageCompleted {
                        stage: spec.id,
                        stats: stats.clone(),
                    });
                    results.push(StageResult::succeeded(spec.id, stats, duration_ms));
                }
                Err(e) => {
                    machine.fail(&e)?;
                    error!(stage = %spec.id, category = %e.category(), error = %e, "Stage failed, halting chain");
                    self.emit(PipelineEvent::StageFailed {
                        stage: spec.id,
                        error: e.user_message(),
                        diagnostic_log: e.diagnostic_log().cloned(),
                    });
                    results.push(StageResult::failed(spec.id, &e, duration_ms));
                    return Ok(self.halted(run_id, results, machine, e));
                }
            }
        }

        if let Err(e) = self.tracker.mark_complete(&work_dir) {
            warn!(error = %e, "Failed to mark job complete");
        }

        let shortlist = self
            .registry
            .final_artifact()
            .map(|name| work_dir.join(name))
            .filter(|p| p.is_file());
        let exported = shortlist.as_deref().and_then(|p| self.export(p));

        info!(run_id = %run_id, stages = results.len(), "Pipeline completed");
        self.emit(PipelineEvent::PipelineCompleted {
            results: results.clone(),
        });

        Ok(PipelineResult {
            run_id,
            results,
            state: machine.state().clone(),
            failure: None,
            shortlist,
            exported,
        })
    }

    /// An input living in the work dir under an artifact's name would be
    /// deleted by `--fresh` or mistaken for that stage's output.
    fn reject_artifact_input(&self, resolver: &ResumeResolver, input: &Path) -> Result<()> {
        for (index, spec) in self.registry.stages().iter().enumerate() {
            if resolver.artifact_path(index).as_deref() == Some(input) {
                return Err(OrchestratorError::input(format!(
                    "{} is the {} stage's output; move it out of {} or use another work directory",
                    input.display(),
                    spec.id,
                    resolver.work_dir().display()
                )));
            }
        }
        Ok(())
    }

    /// Whether the stage at `start` reads the external input rather than an
    /// artifact already on disk
    fn reads_external(&self, resolver: &ResumeResolver, start: usize, fresh: bool) -> bool {
        match self.registry.get(start).map(|s| s.input) {
            Some(StageInput::External) => true,
            Some(StageInput::ArtifactOrExternal(name)) => {
                fresh || !resolver.work_dir().join(name).is_file()
            }
            Some(StageInput::Artifact(_)) | None => false,
        }
    }

    /// Owner address of a mailbox, for the sender filter. Failures are
    /// logged and leave the filter off.
    async fn detect_owner(
        &self,
        work_dir: &Path,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let invocation = detect_owner_invocation(work_dir, input, &self.toolchain);
        let collector = StdoutCollector::default();

        match self.executor.execute(&invocation, &collector, cancel).await {
            Ok(_) => {
                let owner = collector.lines().iter().rev().find_map(|l| parse_owner_line(l));
                match &owner {
                    Some(sender) => info!(sender = %sender, "Detected mailbox owner"),
                    None => info!("No owner address detected, sender filter off"),
                }
                owner
            }
            Err(e) => {
                warn!(error = %e, "Owner detection failed, sender filter off");
                None
            }
        }
    }

    /// Every tool the remaining stages need must be present. Bare program
    /// names are left to `PATH` lookup at spawn time.
    fn check_toolchain(&self, start: usize) -> Result<()> {
        for spec in self.registry.stages().iter().skip(start) {
            for path in self.toolchain.required_paths(spec.program) {
                let explicit = path.is_absolute() || path.components().count() > 1;
                if explicit && !path.exists() {
                    return Err(OrchestratorError::setup(format!(
                        "{} not found (needed by the {} stage)",
                        path.display(),
                        spec.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Results for stages before `start` whose artifact is on disk
    fn resumed_results(&self, resolver: &ResumeResolver, start: usize) -> Result<Vec<StageResult>> {
        let mut results = Vec::new();
        for (index, spec) in self.registry.stages().iter().enumerate().take(start) {
            if !resolver.has_output(index) {
                continue;
            }
            let records = resolver.count_records(index)?;
            info!(stage = %spec.id, records, "Skipping stage, artifact already present");
            let result = StageResult::resumed(spec.id, records);
            self.emit(PipelineEvent::StageSkipped {
                stage: spec.id,
                result: result.clone(),
            });
            results.push(result);
        }
        Ok(results)
    }

    fn halted(
        &self,
        run_id: Uuid,
        results: Vec<StageResult>,
        machine: EngineStateMachine,
        failure: OrchestratorError,
    ) -> PipelineResult {
        PipelineResult {
            run_id,
            results,
            state: machine.state().clone(),
            failure: Some(failure),
            shortlist: None,
            exported: None,
        }
    }

    /// Copy the shortlist to the export dir; failures are only logged.
    fn export(&self, shortlist: &Path) -> Option<PathBuf> {
        let dir = self.export_dir.as_ref()?;
        let target = dir.join(shortlist.file_name()?);
        let copied = std::fs::create_dir_all(dir).and_then(|_| std::fs::copy(shortlist, &target));
        match copied {
            Ok(_) => {
                info!(path = %target.display(), "Shortlist exported");
                Some(target)
            }
            Err(e) => {
                warn!(path = %target.display(), error = %e, "Failed to export shortlist");
                None
            }
        }
    }
}

/// Keeps a child's stdout lines
#[derive(Default)]
struct StdoutCollector {
    lines: Mutex<Vec<String>>,
}

impl StdoutCollector {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl LineObserver for StdoutCollector {
    fn on_line(&self, _stage: StageId, stream: OutputStream, line: &str) {
        if stream == OutputStream::Stdout {
            self.lines.lock().push(line.to_string());
        }
    }
}

/// A bare address line. Display truncation leaves `...`, which no address
/// contains.
fn parse_owner_line(line: &str) -> Option<String> {
    let line = line.trim();
    let (local, domain) = line.split_once('@')?;
    let plausible = !local.is_empty()
        && domain.contains('.')
        && !line.contains("..")
        && !line.chars().any(char::is_whitespace);
    plausible.then(|| line.to_string())
}

fn prepare_work_dir(work_dir: &Path) -> Result<PathBuf> {
    if work_dir.as_os_str().is_empty() {
        return Err(OrchestratorError::input("no work directory given"));
    }
    if work_dir.exists() && !work_dir.is_dir() {
        return Err(OrchestratorError::input(format!(
            "work directory is a file: {}",
            work_dir.display()
        )));
    }
    std::fs::create_dir_all(work_dir).map_err(|e| {
        OrchestratorError::input(format!("cannot create {}: {}", work_dir.display(), e))
    })?;
    Ok(std::fs::canonicalize(work_dir)?)
}

/// A clean exit still fails the stage when it reported zero records where
/// some are required, or did not write its artifact.
fn check_output(spec: &StageSpec, work_dir: &Path, stats: StageStats) -> Result<StageStats> {
    if let Some((key, message)) = spec.required_count {
        if stats.get(key) == Some(&0) {
            return Err(OrchestratorError::StageExecution {
                stage: spec.id.to_string(),
                message: message.to_string(),
                diagnostic_log: None,
            });
        }
    }
    if !work_dir.join(spec.output).is_file() {
        return Err(OrchestratorError::StageExecution {
            stage: spec.id.to_string(),
            message: format!("exited cleanly but did not write {}", spec.output),
            diagnostic_log: None,
        });
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_owner_line() {
        assert_eq!(parse_owner_line("  me@example.com\n"), Some("me@example.com".to_string()));
        assert_eq!(parse_owner_line("Scanning 50 messages"), None);
        assert_eq!(parse_owner_line("a.very.long.name@exa..."), None);
        assert_eq!(parse_owner_line("owner: me@example.com"), None);
        assert_eq!(parse_owner_line("@example.com"), None);
    }
}
