//! Stage registry
//!
//! One row per stage: where its input comes from, which artifact it writes,
//! which program runs it and how its options become arguments. The engine
//! never branches on a stage id; adding a stage means adding a row.

use crate::config::PipelineConfig;
use crate::job::StageId;
use crate::pipeline::StageInvocation;
use std::path::{Path, PathBuf};

pub const RAW_ARTIFACT: &str = "emails_raw.json";
pub const JSONL_ARTIFACT: &str = "emails.jsonl";
pub const CLEANED_ARTIFACT: &str = "cleaned_emails.json";
pub const SHORTLIST_ARTIFACT: &str = "style_shortlist.csv";

/// Which executable runs the stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageProgram {
    /// `python pipeline.py <subcommand> ...`
    PipelineScript,
    /// `voicesynth-stage <subcommand> ...`
    StageTool,
}

/// Where a stage reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageInput {
    /// The user's export
    External,
    /// A previous stage's artifact
    Artifact(&'static str),
    /// The artifact when present, else the user's export (JSON inputs skip Import)
    ArtifactOrExternal(&'static str),
}

/// Per-run stage options (config merged with command-line overrides)
#[derive(Debug, Clone, PartialEq)]
pub struct StageOptions {
    pub sender: Option<String>,
    /// Ask the mailbox for its owner's address when no sender is given
    pub detect_sender: bool,
    pub years: u32,
    pub per_topic: usize,
    pub min_chars: usize,
    pub dedupe: bool,
    pub dedupe_threshold: f64,
}

impl StageOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            sender: None,
            detect_sender: false,
            years: config.clean.years,
            per_topic: config.curate.per_topic,
            min_chars: config.curate.min_chars,
            dedupe: config.curate.dedupe,
            dedupe_threshold: config.curate.dedupe_threshold,
        }
    }
}

impl Default for StageOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Executables the registry's programs resolve to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub python: PathBuf,
    pub pipeline_script: PathBuf,
    pub stage_tool: PathBuf,
}

impl Toolchain {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            python: config.python(),
            pipeline_script: config.runtime.pipeline_script.clone(),
            stage_tool: config.runtime.stage_tool.clone(),
        }
    }

    /// Paths that must exist before `program` can run
    pub fn required_paths(&self, program: StageProgram) -> Vec<&Path> {
        match program {
            StageProgram::PipelineScript => {
                vec![self.python.as_path(), self.pipeline_script.as_path()]
            }
            StageProgram::StageTool => vec![self.stage_tool.as_path()],
        }
    }
}

/// What an argument builder sees
pub struct ArgContext<'a> {
    pub output: &'a str,
    pub options: &'a StageOptions,
}

/// Stage-specific arguments, after the subcommand and input
pub type ArgBuilder = fn(&ArgContext<'_>) -> Vec<String>;

/// Registry row
#[derive(Clone)]
pub struct StageSpec {
    pub id: StageId,
    pub program: StageProgram,
    pub subcommand: &'static str,
    pub input: StageInput,
    pub output: &'static str,
    /// Stats key that must be non-zero, with the failure message when it is zero
    pub required_count: Option<(&'static str, &'static str)>,
    /// Filters by the sender option
    pub uses_sender: bool,
    pub build_args: ArgBuilder,
}

fn import_args(ctx: &ArgContext<'_>) -> Vec<String> {
    vec!["--out".into(), ctx.output.into(), "--json-stats".into()]
}

fn convert_args(ctx: &ArgContext<'_>) -> Vec<String> {
    vec!["--out".into(), ctx.output.into(), "--json-stats".into()]
}

fn clean_args(ctx: &ArgContext<'_>) -> Vec<String> {
    let mut args = vec!["--out".into(), ctx.output.into(), "--json-stats".into()];
    if let Some(sender) = ctx.options.sender.as_deref().filter(|s| !s.is_empty()) {
        args.push("--sender".into());
        args.push(sender.into());
    }
    args.push("--years".into());
    args.push(ctx.options.years.to_string());
    args
}

fn curate_args(ctx: &ArgContext<'_>) -> Vec<String> {
    let mut args = vec![
        "--out".into(),
        ctx.output.into(),
        "--per-topic".into(),
        ctx.options.per_topic.to_string(),
        "--min-chars".into(),
        ctx.options.min_chars.to_string(),
        "--dedupe-threshold".into(),
        ctx.options.dedupe_threshold.to_string(),
    ];
    if !ctx.options.dedupe {
        args.push("--no-dedupe".into());
    }
    args.push("--json-stats".into());
    args
}

pub struct StageRegistry {
    stages: Vec<StageSpec>,
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl StageRegistry {
    /// Import → Convert → Clean → Curate
    pub fn standard() -> Self {
        Self {
            stages: vec![
                StageSpec {
                    id: StageId::Import,
                    program: StageProgram::PipelineScript,
                    subcommand: "import",
                    input: StageInput::External,
                    output: RAW_ARTIFACT,
                    required_count: Some(("imported", "no emails to process")),
                    uses_sender: false,
                    build_args: import_args,
                },
                StageSpec {
                    id: StageId::Convert,
                    program: StageProgram::StageTool,
                    subcommand: "convert",
                    input: StageInput::ArtifactOrExternal(RAW_ARTIFACT),
                    output: JSONL_ARTIFACT,
                    required_count: None,
                    uses_sender: false,
                    build_args: convert_args,
                },
                StageSpec {
                    id: StageId::Clean,
                    program: StageProgram::PipelineScript,
                    subcommand: "clean",
                    input: StageInput::Artifact(JSONL_ARTIFACT),
                    output: CLEANED_ARTIFACT,
                    required_count: Some(("kept", "no emails passed cleaning filters")),
                    uses_sender: true,
                    build_args: clean_args,
                },
                StageSpec {
                    id: StageId::Curate,
                    program: StageProgram::StageTool,
                    subcommand: "curate",
                    input: StageInput::Artifact(CLEANED_ARTIFACT),
                    output: SHORTLIST_ARTIFACT,
                    required_count: None,
                    uses_sender: false,
                    build_args: curate_args,
                },
            ],
        }
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StageSpec> {
        self.stages.get(index)
    }

    /// The final stage's artifact
    pub fn final_artifact(&self) -> Option<&'static str> {
        self.stages.last().map(|s| s.output)
    }

    /// Index of the first stage that can consume `external` directly.
    pub fn entry_point(&self, skip_import: bool) -> usize {
        if !skip_import {
            return 0;
        }
        self.stages
            .iter()
            .position(|s| matches!(s.input, StageInput::ArtifactOrExternal(_)))
            .unwrap_or(0)
    }

    /// Whether a stage from `start` on filters by sender
    pub fn uses_sender_from(&self, start: usize) -> bool {
        self.stages.iter().skip(start).any(|s| s.uses_sender)
    }

    /// Build the command line for the stage at `index`.
    pub fn invocation(
        &self,
        index: usize,
        work_dir: &Path,
        external_input: &Path,
        options: &StageOptions,
        toolchain: &Toolchain,
    ) -> Option<StageInvocation> {
        let spec = self.stages.get(index)?;

        let input = match spec.input {
            StageInput::External => external_input.display().to_string(),
            StageInput::Artifact(name) => name.to_string(),
            StageInput::ArtifactOrExternal(name) => {
                if work_dir.join(name).exists() {
                    name.to_string()
                } else {
                    external_input.display().to_string()
                }
            }
        };

        let ctx = ArgContext {
            output: spec.output,
            options,
        };

        let mut args = Vec::new();
        let program = match spec.program {
            StageProgram::PipelineScript => {
                args.push(toolchain.pipeline_script.display().to_string());
                toolchain.python.clone()
            }
            StageProgram::StageTool => toolchain.stage_tool.clone(),
        };
        args.push(spec.subcommand.to_string());
        args.push(input);
        args.extend((spec.build_args)(&ctx));

        Some(StageInvocation {
            stage: spec.id,
            program,
            args,
            work_dir: work_dir.to_path_buf(),
        })
    }
}

/// `pipeline.py detect-owner <mailbox>`, which prints the owner's address on
/// stdout. Runs ahead of Import, so it is attributed to that stage.
pub fn detect_owner_invocation(
    work_dir: &Path,
    external_input: &Path,
    toolchain: &Toolchain,
) -> StageInvocation {
    StageInvocation {
        stage: StageId::Import,
        program: toolchain.python.clone(),
        args: vec![
            toolchain.pipeline_script.display().to_string(),
            "detect-owner".to_string(),
            external_input.display().to_string(),
        ],
        work_dir: work_dir.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn toolchain() -> Toolchain {
        Toolchain {
            python: PathBuf::from("/venv/bin/python3"),
            pipeline_script: PathBuf::from("/app/pipeline.py"),
            stage_tool: PathBuf::from("/app/voicesynth-stage"),
        }
    }

    #[test]
    fn test_standard_order_and_artifacts() {
        let registry = StageRegistry::standard();
        let ids: Vec<_> = registry.stages().iter().map(|s| s.id).collect();
        assert_eq!(ids, StageId::ALL.to_vec());
        assert_eq!(registry.final_artifact(), Some(SHORTLIST_ARTIFACT));
        assert_eq!(registry.entry_point(false), 0);
        assert_eq!(registry.entry_point(true), 1);
    }

    #[test]
    fn test_import_invocation() {
        let dir = TempDir::new().unwrap();
        let registry = StageRegistry::standard();
        let inv = registry
            .invocation(0, dir.path(), Path::new("/in/mail.mbox"), &StageOptions::default(), &toolchain())
            .unwrap();

        assert_eq!(inv.program, PathBuf::from("/venv/bin/python3"));
        assert_eq!(
            inv.args,
            vec!["/app/pipeline.py", "import", "/in/mail.mbox", "--out", "emails_raw.json", "--json-stats"]
        );
        assert_eq!(inv.work_dir, dir.path());
    }

    #[test]
    fn test_convert_prefers_raw_artifact() {
        let dir = TempDir::new().unwrap();
        let registry = StageRegistry::standard();
        let opts = StageOptions::default();

        let inv = registry
            .invocation(1, dir.path(), Path::new("/in/export.json"), &opts, &toolchain())
            .unwrap();
        assert_eq!(inv.program, PathBuf::from("/app/voicesynth-stage"));
        assert_eq!(inv.args[1], "/in/export.json");

        std::fs::write(dir.path().join(RAW_ARTIFACT), "[]").unwrap();
        let inv = registry
            .invocation(1, dir.path(), Path::new("/in/export.json"), &opts, &toolchain())
            .unwrap();
        assert_eq!(inv.args[1], RAW_ARTIFACT);
    }

    #[test]
    fn test_clean_args_with_sender() {
        let dir = TempDir::new().unwrap();
        let opts = StageOptions {
            sender: Some("me@example.com".into()),
            years: 3,
            ..StageOptions::default()
        };
        let inv = StageRegistry::standard()
            .invocation(2, dir.path(), Path::new("/in"), &opts, &toolchain())
            .unwrap();
        assert_eq!(
            inv.args,
            vec![
                "/app/pipeline.py", "clean", "emails.jsonl", "--out", "cleaned_emails.json",
                "--json-stats", "--sender", "me@example.com", "--years", "3"
            ]
        );
    }

    #[test]
    fn test_curate_args() {
        let dir = TempDir::new().unwrap();
        let opts = StageOptions {
            per_topic: 50,
            dedupe: false,
            dedupe_threshold: 0.9,
            ..StageOptions::default()
        };
        let inv = StageRegistry::standard()
            .invocation(3, dir.path(), Path::new("/in"), &opts, &toolchain())
            .unwrap();
        assert_eq!(
            inv.args,
            vec![
                "curate", "cleaned_emails.json", "--out", "style_shortlist.csv", "--per-topic", "50",
                "--min-chars", "200", "--dedupe-threshold", "0.9", "--no-dedupe", "--json-stats"
            ]
        );
    }

    #[test]
    fn test_detect_owner_invocation() {
        let inv = detect_owner_invocation(Path::new("/w"), Path::new("/in/mail.mbox"), &toolchain());
        assert_eq!(inv.program, PathBuf::from("/venv/bin/python3"));
        assert_eq!(inv.args, vec!["/app/pipeline.py", "detect-owner", "/in/mail.mbox"]);
        assert_eq!(inv.stage, StageId::Import);

        let registry = StageRegistry::standard();
        assert!(registry.uses_sender_from(0));
        assert!(registry.uses_sender_from(2));
        assert!(!registry.uses_sender_from(3));
    }

    #[test]
    fn test_out_of_range_index() {
        let dir = TempDir::new().unwrap();
        assert!(StageRegistry::standard()
            .invocation(4, dir.path(), Path::new("/in"), &StageOptions::default(), &toolchain())
            .is_none());
    }
}
