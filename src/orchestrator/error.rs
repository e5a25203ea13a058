use thiserror::Error;

use crate::acquire::AcquireError;
use crate::handlers::HandlerError;
use crate::process::BuildOutcome;

/// Why a descriptor ended in `Failed`
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("acquisition failed: {0}")]
    Acquire(#[from] AcquireError),

    #[error("package '{0}' has no build system")]
    NoBuildSystem(String),

    #[error("build failed: {0}")]
    Build(HandlerError),

    #[error("cancelled")]
    Cancelled,

    #[error("pipeline task aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    /// Captured outcome of the failing subprocess, when one ran
    pub fn outcome(&self) -> Option<&BuildOutcome> {
        match self {
            PipelineError::Acquire(e) => e.outcome(),
            PipelineError::Build(e) => e.outcome(),
            _ => None,
        }
    }

    /// Outcomes carried by the failure, in execution order: the failing
    /// clone, or the failing build step preceded by the steps that
    /// succeeded before it
    pub fn outcomes(&self) -> Vec<&BuildOutcome> {
        match self {
            PipelineError::Acquire(e) => e.outcome().into_iter().collect(),
            PipelineError::Build(e) => e.outcomes(),
            _ => Vec::new(),
        }
    }

    /// Short machine-readable name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Acquire(AcquireError::CloneFailed { .. }) => "clone_failed",
            PipelineError::Acquire(AcquireError::ToolNotFound { .. })
            | PipelineError::Build(HandlerError::ToolNotFound { .. }) => "tool_not_found",
            PipelineError::Acquire(_) => "acquire_failed",
            PipelineError::NoBuildSystem(_) | PipelineError::Build(HandlerError::NoBuildSystem(_)) => {
                "no_build_system"
            }
            PipelineError::Build(_) => "build_failed",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Aborted(_) => "aborted",
        }
    }
}

impl From<HandlerError> for PipelineError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::NoBuildSystem(package) => PipelineError::NoBuildSystem(package),
            other => PipelineError::Build(other),
        }
    }
}
