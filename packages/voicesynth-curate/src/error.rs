use thiserror::Error;

pub type Result<T> = std::result::Result<T, CurateError>;

#[derive(Error, Debug)]
pub enum CurateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid value for '{field}': {value} ({hint})")]
    Range {
        field: &'static str,
        value: String,
        hint: &'static str,
    },

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl CurateError {
    pub fn invalid_input<E: std::fmt::Display>(e: E) -> Self {
        Self::InvalidInput(e.to_string())
    }

    pub fn range(field: &'static str, value: impl ToString, hint: &'static str) -> Self {
        Self::Range {
            field,
            value: value.to_string(),
            hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_message_names_field() {
        let err = CurateError::range("dedupe_threshold", 1.5, "must be in (0, 1]");
        assert_eq!(
            err.to_string(),
            "Invalid value for 'dedupe_threshold': 1.5 (must be in (0, 1])"
        );
    }
}
