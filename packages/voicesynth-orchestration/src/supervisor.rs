//! Process supervisor
//!
//! Runs one stage as a child process. stdout and stderr are drained by two
//! independent readers so neither pipe can fill up and stall the child; every
//! line is forwarded (display-truncated) to the observer as it arrives and
//! kept in full for stats extraction and the diagnostic log.

use crate::config::PipelineConfig;
use crate::error::{OrchestratorError, Result};
use crate::job::StageId;
use crate::pipeline::{LineObserver, OutputStream, StageExecutor, StageInvocation, StageStats};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type CapturedLines = Vec<(OutputStream, String)>;

pub struct ProcessSupervisor {
    display_width: usize,
    diagnostic_log: PathBuf,
}

impl ProcessSupervisor {
    pub fn new(display_width: usize, diagnostic_log: impl Into<PathBuf>) -> Self {
        Self {
            display_width,
            diagnostic_log: diagnostic_log.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.supervisor.display_width, config.diagnostic_log())
    }

    pub fn diagnostic_log(&self) -> &PathBuf {
        &self.diagnostic_log
    }

    /// Overwrites the diagnostic log; `None` if it could not be written.
    fn write_diagnostic(
        &self,
        invocation: &StageInvocation,
        exit: &str,
        lines: &CapturedLines,
    ) -> Option<PathBuf> {
        let mut content = format!(
            "Stage: {}\nCommand: {}\nWorkDir: {}\nExit: {}\nOutput:\n",
            invocation.stage,
            invocation.command_line(),
            invocation.work_dir.display(),
            exit
        );
        for (_, line) in lines {
            content.push_str(line);
            content.push('\n');
        }

        let written = self
            .diagnostic_log
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|_| std::fs::write(&self.diagnostic_log, content));

        match written {
            Ok(()) => Some(self.diagnostic_log.clone()),
            Err(e) => {
                warn!(path = %self.diagnostic_log.display(), error = %e, "Failed to write diagnostic log");
                None
            }
        }
    }

    fn stage_error(&self, stage: StageId, message: String, diagnostic_log: Option<PathBuf>) -> OrchestratorError {
        OrchestratorError::StageExecution {
            stage: stage.to_string(),
            message,
            diagnostic_log,
        }
    }
}

#[async_trait]
impl StageExecutor for ProcessSupervisor {
    async fn execute(
        &self,
        invocation: &StageInvocation,
        observer: &dyn LineObserver,
        cancel: &CancellationToken,
    ) -> Result<StageStats> {
        let stage = invocation.stage;
        let started = Instant::now();
        info!(stage = %stage, command = %invocation.command_line(), "Spawning stage");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own process group so cancellation reaches grandchildren
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to start {}: {}", invocation.program.display(), e);
                let diag = self.write_diagnostic(invocation, &message, &Vec::new());
                error!(stage = %stage, error = %message, "Stage spawn failed");
                return Err(self.stage_error(stage, message, diag));
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let captured: Mutex<CapturedLines> = Mutex::new(Vec::new());
        let width = self.display_width;

        let run = async {
            let (out, err) = tokio::join!(
                read_stream(stdout, OutputStream::Stdout, stage, observer, &captured, width),
                read_stream(stderr, OutputStream::Stderr, stage, observer, &captured, width),
            );
            out.and(err)?;
            child.wait().await
        };

        let outcome: Option<std::io::Result<ExitStatus>> = tokio::select! {
            status = run => Some(status),
            _ = cancel.cancelled() => None,
        };

        let status = match outcome {
            None => {
                kill_tree(&mut child).await;
                warn!(stage = %stage, "Stage cancelled; child process tree killed");
                return Err(OrchestratorError::Cancelled);
            }
            Some(Err(e)) => {
                kill_tree(&mut child).await;
                let message = format!("lost contact with stage process: {}", e);
                let diag = self.write_diagnostic(invocation, &message, &captured.into_inner());
                return Err(self.stage_error(stage, message, diag));
            }
            Some(Ok(status)) => status,
        };

        let lines = captured.into_inner();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !status.success() {
            let exit = status.to_string();
            let diag = self.write_diagnostic(invocation, &exit, &lines);
            let message = derive_error_message(&lines, &exit, diag.as_deref());
            error!(stage = %stage, exit = %exit, elapsed_ms, error = %message, "Stage failed");
            return Err(self.stage_error(stage, message, diag));
        }

        let stats = extract_stats(&lines);
        debug!(stage = %stage, lines = lines.len(), stats = ?stats, "Stage output parsed");
        info!(stage = %stage, elapsed_ms, "Stage exited cleanly");
        Ok(stats)
    }
}

async fn read_stream<R: AsyncRead + Unpin>(
    reader: Option<R>,
    stream: OutputStream,
    stage: StageId,
    observer: &dyn LineObserver,
    captured: &Mutex<CapturedLines>,
    width: usize,
) -> std::io::Result<()> {
    let Some(reader) = reader else {
        return Ok(());
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        observer.on_line(stage, stream, &truncate_for_display(&line, width));
        captured.lock().push((stream, line));
    }
    Ok(())
}

/// Kill the child and everything it spawned, then reap it.
async fn kill_tree(child: &mut Child) {
    if let Some(pid) = child.id() {
        if let Err(e) = kill_process_group(pid).await {
            debug!(pid, error = %e, "Tree kill failed, killing direct child only");
        }
    }
    // no-op if the tree kill already took it down
    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(unix)]
async fn kill_process_group(pid: u32) -> std::io::Result<ExitStatus> {
    Command::new("kill")
        .args(["-KILL", "--"])
        .arg(format!("-{}", pid))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
}

#[cfg(windows)]
async fn kill_process_group(pid: u32) -> std::io::Result<ExitStatus> {
    Command::new("taskkill")
        .args(["/T", "/F", "/PID"])
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
}

#[cfg(not(any(unix, windows)))]
async fn kill_process_group(_pid: u32) -> std::io::Result<ExitStatus> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "process tree kill not supported on this platform",
    ))
}

/// Cut a line to `width` characters, ending in `...` when shortened.
/// Widths too narrow for the ellipsis get a plain cut.
pub fn truncate_for_display(line: &str, width: usize) -> String {
    if line.chars().count() <= width {
        return line.to_string();
    }
    if width < 4 {
        return line.chars().take(width).collect();
    }
    let mut out: String = line.chars().take(width - 3).collect();
    out.push_str("...");
    out
}

/// First line starting with `{` that is a JSON object with at least one
/// integer value; stdout is searched before stderr. Non-integer entries are
/// dropped. No such line gives empty stats.
pub fn extract_stats(lines: &[(OutputStream, String)]) -> StageStats {
    let ordered = [OutputStream::Stdout, OutputStream::Stderr]
        .into_iter()
        .flat_map(|wanted| lines.iter().filter(move |(s, _)| *s == wanted));

    for (_, line) in ordered {
        if !line.starts_with('{') {
            continue;
        }
        let Ok(serde_json::Value::Object(map)) = serde_json::from_str(line) else {
            continue;
        };
        let stats: StageStats = map
            .into_iter()
            .filter_map(|(k, v)| v.as_i64().map(|n| (k, n)))
            .collect();
        if !stats.is_empty() {
            return stats;
        }
    }
    StageStats::new()
}

/// Last non-empty non-JSON stderr line, else the same from stdout, else the
/// exit status with a pointer to the diagnostic log.
pub fn derive_error_message(
    lines: &[(OutputStream, String)],
    exit: &str,
    diagnostic_log: Option<&Path>,
) -> String {
    let last_from = |wanted: OutputStream| {
        lines
            .iter()
            .rev()
            .filter(|(s, _)| *s == wanted)
            .map(|(_, l)| l.trim())
            .find(|l| !l.is_empty() && !l.starts_with('{'))
    };

    if let Some(line) = last_from(OutputStream::Stderr).or_else(|| last_from(OutputStream::Stdout)) {
        return line.to_string();
    }
    match diagnostic_log {
        Some(path) => format!("{} (see {})", exit, path.display()),
        None => exit.to_string(),
    }
}
