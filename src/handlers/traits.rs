use async_trait::async_trait;
use thiserror::Error;

use super::types::HandlerOutput;
use crate::package::PackageDescriptor;
use crate::process::{BuildOutcome, CommandRunner, Invocation, ProcessError, display_code};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("tool not found on PATH: {program}")]
    ToolNotFound { program: String },

    #[error("build of '{package}' failed at `{}` with {}: {}", .outcome.command, display_code(.outcome.exit_code), .outcome.stderr.trim())]
    BuildFailed {
        package: String,
        outcome: Box<BuildOutcome>,
        /// Outcomes of the steps that succeeded before the failing one
        completed: Vec<BuildOutcome>,
    },

    #[error("package '{0}' has no build system")]
    NoBuildSystem(String),

    #[error("package '{0}' has no source location to build in")]
    NoSourceDir(String),

    #[error("build of '{package}' failed: {message}")]
    Environment { package: String, message: String },
}

impl HandlerError {
    /// Outcome of the failing step
    pub fn outcome(&self) -> Option<&BuildOutcome> {
        match self {
            HandlerError::BuildFailed { outcome, .. } => Some(outcome.as_ref()),
            _ => None,
        }
    }

    /// Every outcome the handler produced, in execution order, ending with
    /// the failing one
    pub fn outcomes(&self) -> Vec<&BuildOutcome> {
        match self {
            HandlerError::BuildFailed {
                outcome, completed, ..
            } => completed.iter().chain(std::iter::once(outcome.as_ref())).collect(),
            _ => Vec::new(),
        }
    }

    /// Attach the outcomes of steps that ran before this failure
    pub(crate) fn after_steps(self, earlier: Vec<BuildOutcome>) -> Self {
        match self {
            HandlerError::BuildFailed {
                package,
                outcome,
                completed,
            } => {
                let mut all = earlier;
                all.extend(completed);
                HandlerError::BuildFailed {
                    package,
                    outcome,
                    completed: all,
                }
            }
            other => other,
        }
    }

    pub(crate) fn from_process(package: &str, err: ProcessError) -> Self {
        match err {
            ProcessError::ToolNotFound { program } => HandlerError::ToolNotFound { program },
            ProcessError::ToolFailed { outcome, .. } => HandlerError::BuildFailed {
                package: package.to_string(),
                outcome,
                completed: Vec::new(),
            },
            other => HandlerError::Environment {
                package: package.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// One build-system workflow.
///
/// Handlers run their steps through the supplied runner, stop at the first
/// failing step and never retry.
#[async_trait]
pub trait BuildHandler: Send + Sync {
    /// Short name used in logs and recorded under `built_with`
    fn name(&self) -> &str;

    async fn build(
        &self,
        descriptor: &PackageDescriptor,
        runner: &dyn CommandRunner,
    ) -> Result<HandlerOutput, HandlerError>;
}

/// Run one step, mapping process failures into handler failures
pub(crate) async fn run_step(
    runner: &dyn CommandRunner,
    descriptor: &PackageDescriptor,
    invocation: Invocation,
) -> Result<BuildOutcome, HandlerError> {
    runner
        .run(invocation)
        .await
        .map_err(|e| HandlerError::from_process(descriptor.name(), e))
}
