//! Input path handling
//!
//! Paths usually arrive pasted or drag-dropped from a file manager, so they may
//! be quoted, shell-escaped, `file://` URLs or start with `~`.

use crate::config::expand_home;
use crate::error::{OrchestratorError, Result};
use std::path::{Path, PathBuf};

/// Normalize a user-supplied path string.
pub fn clean_path(raw: &str) -> PathBuf {
    let mut path = raw.trim();

    for quote in ['\'', '"'] {
        if path.len() >= 2 && path.starts_with(quote) && path.ends_with(quote) {
            path = &path[1..path.len() - 1];
            break;
        }
    }

    let unescaped = path.replace("\\ ", " ");
    let path = unescaped.strip_prefix("file://").unwrap_or(&unescaped);

    expand_home(Path::new(path))
}

/// What kind of export the pipeline was pointed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Mailbox archive, `.mbox` file or directory; needs the Import stage
    Mailbox,
    /// Already-exported JSON array or JSONL; starts at Convert
    Json,
}

impl InputKind {
    pub fn detect(path: &Path) -> Self {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json") || e.eq_ignore_ascii_case("jsonl"))
            .unwrap_or(false);

        if is_json && !path.is_dir() {
            InputKind::Json
        } else {
            InputKind::Mailbox
        }
    }

    pub fn needs_import(&self) -> bool {
        matches!(self, InputKind::Mailbox)
    }
}

/// Absolute, existing input path
pub fn validate_input(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(OrchestratorError::input("no input path given"));
    }
    if !path.exists() {
        return Err(OrchestratorError::input(format!(
            "input not found: {}",
            path.display()
        )));
    }
    Ok(std::fs::canonicalize(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path_strips_quotes_and_escapes() {
        assert_eq!(clean_path("  '/tmp/my mail.mbox' "), PathBuf::from("/tmp/my mail.mbox"));
        assert_eq!(clean_path("\"/tmp/a.json\""), PathBuf::from("/tmp/a.json"));
        assert_eq!(clean_path("/tmp/my\\ mail.mbox"), PathBuf::from("/tmp/my mail.mbox"));
        assert_eq!(clean_path("file:///tmp/x.zip"), PathBuf::from("/tmp/x.zip"));
    }

    #[test]
    fn test_clean_path_expands_home() {
        let cleaned = clean_path("~/mail.mbox");
        assert!(cleaned.ends_with("mail.mbox"));
        assert!(!cleaned.starts_with("~"));
    }

    #[test]
    fn test_input_kind() {
        assert_eq!(InputKind::detect(Path::new("export.json")), InputKind::Json);
        assert_eq!(InputKind::detect(Path::new("export.JSONL")), InputKind::Json);
        assert_eq!(InputKind::detect(Path::new("takeout.zip")), InputKind::Mailbox);
        assert_eq!(InputKind::detect(Path::new("All mail.mbox")), InputKind::Mailbox);
        assert!(InputKind::Mailbox.needs_import());
        assert!(!InputKind::Json.needs_import());
    }

    #[test]
    fn test_validate_input_missing() {
        assert!(matches!(
            validate_input(Path::new("/no/such/export.mbox")),
            Err(OrchestratorError::InputValidation(_))
        ));
        assert!(validate_input(Path::new("")).is_err());
    }
}
