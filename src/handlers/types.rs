use std::path::PathBuf;

use crate::package::{Metadata, PackageDescriptor, keys};
use crate::process::BuildOutcome;

/// What a handler hands back after a successful build
#[derive(Debug, Clone, Default)]
pub struct HandlerOutput {
    /// One outcome per subprocess, in execution order
    pub outcomes: Vec<BuildOutcome>,
    /// Entries to merge into the descriptor's metadata
    pub metadata: Metadata,
    /// Concrete file produced by the build, when known. Becomes the new
    /// hash target.
    pub artifact: Option<PathBuf>,
}

impl HandlerOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: BuildOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn record(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Resolve the `artifact` metadata entry against the source directory,
    /// if declared and present on disk
    pub fn declared_artifact(&mut self, descriptor: &PackageDescriptor, source_dir: &std::path::Path) {
        if let Some(relative) = descriptor.get_metadata(keys::ARTIFACT) {
            let path = source_dir.join(relative);
            if path.is_file() {
                self.artifact = Some(path);
            } else {
                tracing::warn!(artifact = %path.display(), "declared artifact missing after build");
            }
        }
    }

    /// Last outcome, i.e. the final step of the build
    pub fn last_outcome(&self) -> Option<&BuildOutcome> {
        self.outcomes.last()
    }
}
