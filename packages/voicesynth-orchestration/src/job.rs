use crate::error::{ErrorCategory, OrchestratorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stage identifier, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageId {
    Import,
    Convert,
    Clean,
    Curate,
}

impl StageId {
    pub const ALL: [StageId; 4] = [
        StageId::Import,
        StageId::Convert,
        StageId::Clean,
        StageId::Curate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Import => "import",
            StageId::Convert => "convert",
            StageId::Clean => "clean",
            StageId::Curate => "curate",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "import" => Ok(StageId::Import),
            "convert" => Ok(StageId::Convert),
            "clean" => Ok(StageId::Clean),
            "curate" => Ok(StageId::Curate),
            _ => Err(OrchestratorError::parse(format!("Invalid stage ID: {}", s))),
        }
    }

    /// Position in the chain (0-based)
    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    /// Human label for progress output
    pub fn label(&self) -> &'static str {
        match self {
            StageId::Import => "Importing mailbox",
            StageId::Convert => "Converting format",
            StageId::Clean => "Cleaning & anonymizing",
            StageId::Curate => "Curating shortlist",
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Engine state for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineState {
    NotStarted,
    Running {
        stage: StageId,
        started_at: DateTime<Utc>,
    },
    Completed {
        stage: StageId,
        completed_at: DateTime<Utc>,
    },
    Failed {
        stage: StageId,
        failed_at: DateTime<Utc>,
        error: String,
        error_category: ErrorCategory,
    },
}

impl EngineState {
    pub fn state_name(&self) -> &'static str {
        match self {
            EngineState::NotStarted => "not_started",
            EngineState::Running { .. } => "running",
            EngineState::Completed { .. } => "completed",
            EngineState::Failed { .. } => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, EngineState::Failed { .. })
    }
}

/// State machine for the stage chain.
///
/// `NotStarted`/`Completed(n)` → `Running(m)` with `m` after `n`;
/// `Running(n)` → `Completed(n)` | `Failed(n)`. `Failed` is terminal: there is
/// no automatic retry.
pub struct EngineStateMachine {
    state: EngineState,
}

impl Default for EngineStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineStateMachine {
    pub fn new() -> Self {
        Self {
            state: EngineState::NotStarted,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Transition: NOT_STARTED | COMPLETED(prev) → RUNNING(stage)
    pub fn start(&mut self, stage: StageId) -> Result<()> {
        let allowed = match &self.state {
            EngineState::NotStarted => true,
            EngineState::Completed { stage: prev, .. } => stage > *prev,
            _ => false,
        };
        if !allowed {
            return Err(self.invalid(format!("running({})", stage)));
        }

        self.state = EngineState::Running {
            stage,
            started_at: Utc::now(),
        };
        Ok(())
    }

    /// Transition: RUNNING(stage) → COMPLETED(stage)
    pub fn complete(&mut self) -> Result<()> {
        match &self.state {
            EngineState::Running { stage, .. } => {
                self.state = EngineState::Completed {
                    stage: *stage,
                    completed_at: Utc::now(),
                };
                Ok(())
            }
            _ => Err(self.invalid("completed")),
        }
    }

    /// Transition: RUNNING(stage) → FAILED(stage)
    pub fn fail(&mut self, error: &OrchestratorError) -> Result<()> {
        match &self.state {
            EngineState::Running { stage, .. } => {
                self.state = EngineState::Failed {
                    stage: *stage,
                    failed_at: Utc::now(),
                    error: error.to_string(),
                    error_category: error.category(),
                };
                Ok(())
            }
            _ => Err(self.invalid("failed")),
        }
    }

    fn invalid(&self, to: impl Into<String>) -> OrchestratorError {
        OrchestratorError::InvalidStateTransition {
            from: self.state.state_name().to_string(),
            to: to.into(),
        }
    }
}
