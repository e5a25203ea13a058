//! Per-descriptor pipeline states
//!
//! `Created → Acquiring → Acquired → Building → Built → Hashed → Done`,
//! with `Failed` reachable from every non-terminal state before `Hashed`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Created,
    /// Source location being resolved (possibly cloning)
    Acquiring,
    Acquired,
    /// Build handler running
    Building,
    Built,
    /// Digest settled (recomputed, kept, or skipped)
    Hashed,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Created => "created",
            PipelineState::Acquiring => "acquiring",
            PipelineState::Acquired => "acquired",
            PipelineState::Building => "building",
            PipelineState::Built => "built",
            PipelineState::Hashed => "hashed",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }

    pub fn valid_next_states(&self) -> &'static [PipelineState] {
        use PipelineState::*;
        match self {
            Created => &[Acquiring, Failed],
            Acquiring => &[Acquired, Failed],
            Acquired => &[Building, Failed],
            Building => &[Built, Failed],
            Built => &[Hashed, Failed],
            Hashed => &[Done],
            Done | Failed => &[],
        }
    }

    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        self.valid_next_states().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
