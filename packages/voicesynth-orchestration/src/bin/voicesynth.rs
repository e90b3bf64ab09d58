//! VoiceSynth pipeline runner
//!
//! # Usage
//!
//! ```bash
//! voicesynth run ~/Downloads/takeout.mbox --sender me@example.com
//! voicesynth resume
//! voicesynth jobs
//! voicesynth status ./work
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use voicesynth_orchestration::config::default_cache_dir;
use voicesynth_orchestration::{
    clean_path, init_logging, JobTracker, OrchestratorError, PipelineConfig, PipelineEvent,
    PipelineOrchestrator, ProcessSupervisor, ResumeResolver, RunRequest, StageId, StageOptions,
    Toolchain, Validatable,
};

/// Log lines kept for the failure report
const LOG_WINDOW: usize = 8;

#[derive(Parser)]
#[command(name = "voicesynth")]
#[command(about = "Turn a mailbox export into a curated writing-style shortlist", long_about = None)]
struct Cli {
    /// Config file (default: <cache dir>/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline, resuming from any artifacts already in the work dir
    Run {
        /// Mailbox archive, .mbox file/directory, or JSON/JSONL export
        input: String,

        /// Directory for intermediate artifacts (default: current directory)
        #[arg(long)]
        work_dir: Option<String>,

        /// Only keep mail sent by this address (default: the mailbox owner, when detectable)
        #[arg(long)]
        sender: Option<String>,

        /// Discard existing artifacts and start over
        #[arg(long)]
        fresh: bool,

        /// Only keep mail from the last N years
        #[arg(long)]
        years: Option<u32>,

        /// Maximum shortlisted emails per topic
        #[arg(long)]
        per_topic: Option<usize>,

        /// Minimum body length for a style candidate
        #[arg(long)]
        min_chars: Option<usize>,

        /// Skip duplicate removal
        #[arg(long)]
        no_dedupe: bool,

        /// Near-duplicate similarity threshold in (0, 1]
        #[arg(long)]
        dedupe_threshold: Option<f64>,
    },

    /// Continue the most recent interrupted job
    Resume,

    /// List tracked jobs
    Jobs {
        /// Forget every tracked job
        #[arg(long)]
        clear: bool,
    },

    /// Show which stage a work directory would resume from
    Status {
        work_dir: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging("info");
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Run {
            input,
            work_dir,
            sender,
            fresh,
            years,
            per_topic,
            min_chars,
            no_dedupe,
            dedupe_threshold,
        } => {
            let mut config = config;
            if let Some(years) = years {
                config.clean.years = years;
            }
            if let Some(per_topic) = per_topic {
                config.curate.per_topic = per_topic;
            }
            if let Some(min_chars) = min_chars {
                config.curate.min_chars = min_chars;
            }
            if let Some(threshold) = dedupe_threshold {
                config.curate.dedupe_threshold = threshold;
            }
            if no_dedupe {
                config.curate.dedupe = false;
            }
            config.validate().map_err(OrchestratorError::from)?;

            let work_dir = match work_dir {
                Some(dir) => clean_path(&dir),
                None => std::env::current_dir().context("reading current directory")?,
            };
            let mut options = StageOptions::from_config(&config);
            options.sender = sender.filter(|s| !s.trim().is_empty());
            options.detect_sender = options.sender.is_none();

            let request = RunRequest {
                input: clean_path(&input),
                work_dir,
                options,
                fresh,
            };
            run_pipeline(&config, request).await
        }

        Commands::Resume => {
            let tracker = JobTracker::new(config.jobs_file());
            let Some(job) = tracker.find_resumable() else {
                println!("No interrupted job to resume.");
                return Ok(ExitCode::SUCCESS);
            };
            println!(
                "Resuming {} in {}",
                job.input_path.display(),
                job.work_dir.display()
            );
            let mut options = StageOptions::from_config(&config);
            options.sender = Some(job.sender.clone()).filter(|s| !s.is_empty());
            options.detect_sender = options.sender.is_none();

            let request = RunRequest {
                input: job.input_path,
                work_dir: job.work_dir,
                options,
                fresh: false,
            };
            run_pipeline(&config, request).await
        }

        Commands::Jobs { clear } => {
            let tracker = JobTracker::new(config.jobs_file());
            if clear {
                tracker.clear()?;
                println!("Cleared job history.");
                return Ok(ExitCode::SUCCESS);
            }
            let jobs = tracker.list();
            if jobs.is_empty() {
                println!("No jobs recorded.");
            }
            for job in jobs.iter().rev() {
                println!(
                    "{:<12} {}  {}  →  {}{}",
                    job.status.as_str(),
                    job.updated.format("%Y-%m-%d %H:%M"),
                    job.input_path.display(),
                    job.work_dir.display(),
                    if job.sender.is_empty() {
                        String::new()
                    } else {
                        format!("  [{}]", job.sender)
                    }
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Status { work_dir } => {
            let resolver = ResumeResolver::standard(clean_path(&work_dir));
            for (index, stage) in StageId::ALL.iter().enumerate() {
                let mark = if resolver.has_output(index) { "x" } else { " " };
                println!("[{}] {}", mark, stage.label());
            }
            match resolver.next_stage() {
                Some(stage) => println!("Next stage: {}", stage),
                None => println!("Complete."),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<PipelineConfig> {
    let path = path.unwrap_or_else(|| default_cache_dir().join("config.yaml"));
    let mut config = PipelineConfig::load(&path)
        .map_err(OrchestratorError::from)
        .with_context(|| format!("loading {}", path.display()))?;

    let exe = std::env::current_exe().context("locating voicesynth executable")?;
    if let Some(base) = exe.parent() {
        config.resolve_tools(base);
    }
    Ok(config)
}

async fn run_pipeline(config: &PipelineConfig, request: RunRequest) -> anyhow::Result<ExitCode> {
    let tracker = Arc::new(JobTracker::new(config.jobs_file()));
    let executor = Arc::new(ProcessSupervisor::from_config(config));
    let (orchestrator, mut events) =
        PipelineOrchestrator::new(executor, tracker, Toolchain::from_config(config));
    let orchestrator = orchestrator.with_export_dir(config.paths.export_dir.clone());

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping current stage");
            interrupt.cancel();
        }
    });

    let engine_cancel = cancel.clone();
    let engine = tokio::spawn(async move { orchestrator.run(request, &engine_cancel).await });

    let mut recent: VecDeque<String> = VecDeque::with_capacity(LOG_WINDOW);
    while let Some(event) = events.recv().await {
        render(event, &mut recent);
    }

    let result = engine.await.context("pipeline task panicked")??;
    match &result.failure {
        None => {
            if let Some(shortlist) = &result.shortlist {
                println!("\nShortlist: {}", shortlist.display());
            }
            if let Some(exported) = &result.exported {
                println!("Copied to: {}", exported.display());
            }
            info!(run_id = %result.run_id, "Run finished");
            Ok(ExitCode::SUCCESS)
        }
        Some(OrchestratorError::Cancelled) => {
            println!("\nStopped. Artifacts are kept; run `voicesynth resume` to continue.");
            Ok(ExitCode::FAILURE)
        }
        Some(_) => {
            println!("\nThe job is kept in progress; fix the problem and run `voicesynth resume`.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn stage_prefix(stage: StageId) -> String {
    format!("[{}/{}] {}", stage.ordinal() + 1, StageId::ALL.len(), stage.label())
}

fn render(event: PipelineEvent, recent: &mut VecDeque<String>) {
    match event {
        PipelineEvent::StageStarted { stage } => {
            recent.clear();
            println!("{}...", stage_prefix(stage));
        }
        PipelineEvent::StageLog { line, .. } => {
            if recent.len() == LOG_WINDOW {
                recent.pop_front();
            }
            println!("      {}", line);
            recent.push_back(line);
        }
        PipelineEvent::StageSkipped { stage, result } => {
            let records = result.stats.get("records").copied().unwrap_or(0);
            println!("{}: already done ({} records)", stage_prefix(stage), records);
        }
        PipelineEvent::StageCompleted { stage, stats } => {
            let summary = stats
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{}: done {}", stage_prefix(stage), summary);
        }
        PipelineEvent::StageFailed {
            stage,
            error,
            diagnostic_log,
        } => {
            println!("{}: FAILED", stage_prefix(stage));
            if !recent.is_empty() {
                println!("  Last output:");
                for line in recent.iter() {
                    println!("    {}", line);
                }
            }
            println!("  {}", error);
            if let Some(log) = diagnostic_log {
                println!("  Full log: {}", log.display());
            }
        }
        PipelineEvent::PipelineCompleted { results } => {
            let executed = results.iter().filter(|r| !r.resumed).count();
            println!(
                "\nPipeline complete: {} stage(s) run, {} resumed",
                executed,
                results.len() - executed
            );
        }
    }
}
