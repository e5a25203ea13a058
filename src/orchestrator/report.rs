use serde::{Serialize, Serializer};
use std::time::Duration;

use super::error::PipelineError;
use super::state::PipelineState;
use crate::package::PackageDescriptor;
use crate::process::BuildOutcome;

/// Terminal result of one descriptor's pipeline, handed to whatever
/// exports or reports it
#[derive(Debug, Serialize)]
pub struct BuildReport {
    pub descriptor: PackageDescriptor,
    /// `Done` or `Failed`
    pub state: PipelineState,
    /// Last state reached before failing
    pub failed_at: Option<PipelineState>,
    /// Handler that built the package, when the build stage ran
    pub handler: Option<String>,
    /// Every subprocess outcome in execution order, including the failing
    /// one
    pub outcomes: Vec<BuildOutcome>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<PipelineError>,
    pub elapsed: Duration,
}

impl BuildReport {
    pub fn is_done(&self) -> bool {
        self.state == PipelineState::Done
    }

    pub fn is_failed(&self) -> bool {
        self.state == PipelineState::Failed
    }

    /// Outcome of the last subprocess that ran
    pub fn last_outcome(&self) -> Option<&BuildOutcome> {
        self.outcomes.last()
    }
}

fn serialize_error<S>(error: &Option<PipelineError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    #[derive(Serialize)]
    struct Failure {
        kind: &'static str,
        message: String,
    }

    error
        .as_ref()
        .map(|e| Failure {
            kind: e.kind(),
            message: e.to_string(),
        })
        .serialize(serializer)
}
