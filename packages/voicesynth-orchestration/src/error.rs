use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Environment or runtime provisioning failed before any stage ran
    #[error("Setup failed: {0}")]
    Setup(String),

    /// Stage exited non-zero (or could not be spawned)
    #[error("Stage {stage} failed: {message}")]
    StageExecution {
        stage: String,
        message: String,
        diagnostic_log: Option<PathBuf>,
    },

    #[error("Invalid input: {0}")]
    InputValidation(String),

    /// Artifact present on disk but unreadable
    #[error("Cannot resume from {}: {reason}", artifact.display())]
    ResumeInconsistency { artifact: PathBuf, reason: String },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl OrchestratorError {
    pub fn setup<E: std::fmt::Display>(e: E) -> Self {
        Self::Setup(e.to_string())
    }

    pub fn input<E: std::fmt::Display>(e: E) -> Self {
        Self::InputValidation(e.to_string())
    }

    pub fn parse<E: std::fmt::Display>(e: E) -> Self {
        Self::Parse(e.to_string())
    }

    pub fn resume(artifact: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::ResumeInconsistency {
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Setup(_) => ErrorCategory::Setup,
            Self::StageExecution { .. } | Self::Cancelled => ErrorCategory::StageExecution,
            Self::InputValidation(_) | Self::Config(_) => ErrorCategory::InputValidation,
            Self::ResumeInconsistency { .. } => ErrorCategory::ResumeInconsistency,
            _ => ErrorCategory::Internal,
        }
    }

    /// Line shown to the user: a stage failure's own message without the
    /// stage prefix, the full display otherwise
    pub fn user_message(&self) -> String {
        match self {
            Self::StageExecution { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Full diagnostic location, when one was written
    pub fn diagnostic_log(&self) -> Option<&PathBuf> {
        match self {
            Self::StageExecution { diagnostic_log, .. } => diagnostic_log.as_ref(),
            _ => None,
        }
    }
}

/// Error category surfaced to the user; none of them is retried automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Setup,
    StageExecution,
    InputValidation,
    ResumeInconsistency,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Setup => "setup",
            ErrorCategory::StageExecution => "stage_execution",
            ErrorCategory::InputValidation => "input_validation",
            ErrorCategory::ResumeInconsistency => "resume_inconsistency",
            ErrorCategory::Internal => "internal",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "setup" => Ok(ErrorCategory::Setup),
            "stage_execution" => Ok(ErrorCategory::StageExecution),
            "input_validation" => Ok(ErrorCategory::InputValidation),
            "resume_inconsistency" => Ok(ErrorCategory::ResumeInconsistency),
            "internal" => Ok(ErrorCategory::Internal),
            _ => Err(OrchestratorError::parse(format!(
                "Invalid error category: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_roundtrip() {
        for category in &[
            ErrorCategory::Setup,
            ErrorCategory::StageExecution,
            ErrorCategory::InputValidation,
            ErrorCategory::ResumeInconsistency,
            ErrorCategory::Internal,
        ] {
            let s = category.as_str();
            let parsed = ErrorCategory::from_str(s).unwrap();
            assert_eq!(*category, parsed);
        }
    }

    #[test]
    fn test_error_category_invalid() {
        assert!(ErrorCategory::from_str("transient").is_err());
    }

    #[test]
    fn test_categories_follow_taxonomy() {
        let stage = OrchestratorError::StageExecution {
            stage: "clean".into(),
            message: "boom".into(),
            diagnostic_log: Some(PathBuf::from("/tmp/error.log")),
        };
        assert_eq!(stage.category(), ErrorCategory::StageExecution);
        assert_eq!(stage.diagnostic_log(), Some(&PathBuf::from("/tmp/error.log")));
        assert_eq!(stage.user_message(), "boom");
        assert_eq!(stage.to_string(), "Stage clean failed: boom");

        assert_eq!(
            OrchestratorError::resume("/w/emails.jsonl", "bad line").category(),
            ErrorCategory::ResumeInconsistency
        );
        assert_eq!(
            OrchestratorError::input("missing").category(),
            ErrorCategory::InputValidation
        );
        assert_eq!(
            OrchestratorError::setup("no python").category(),
            ErrorCategory::Setup
        );
        assert_eq!(
            OrchestratorError::setup("no python").user_message(),
            "Setup failed: no python"
        );
    }
}
