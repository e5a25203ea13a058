use std::path::PathBuf;
use thiserror::Error;

use super::outcome::BuildOutcome;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("tool not found on PATH: {program}")]
    ToolNotFound { program: String },

    #[error("`{command}` exited with {}: {}", display_code(.outcome.exit_code), .outcome.stderr.trim())]
    ToolFailed {
        command: String,
        outcome: Box<BuildOutcome>,
    },

    #[error("working directory does not exist: {0}")]
    WorkingDirectory(PathBuf),

    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Captured outcome, when the process actually ran
    pub fn outcome(&self) -> Option<&BuildOutcome> {
        match self {
            ProcessError::ToolFailed { outcome, .. } => Some(outcome.as_ref()),
            _ => None,
        }
    }
}

pub(crate) fn display_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ProcessError>;
