use std::path::PathBuf;

use thiserror::Error;

/// Run-level error type.
///
/// Only conditions that make a whole run meaningless end up here. Per-document
/// load failures and per-field generation failures are recovered further down
/// (see `loader::LoadError` and `llm_client::LlmError`).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid field configuration: {0}")]
    Config(String),

    #[error("Input folder {path} is not readable: {message}")]
    InputFolder { path: PathBuf, message: String },

    #[error("Job description could not be loaded: {0}")]
    JobDescription(#[from] crate::loader::LoadError),

    #[error("Sink error ({path}): {message}")]
    Sink { path: PathBuf, message: String },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn sink(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        AppError::Sink {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
