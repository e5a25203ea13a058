use async_trait::async_trait;
use tracing::info;

use super::traits::{BuildHandler, HandlerError};
use super::types::HandlerOutput;
use crate::package::PackageDescriptor;
use crate::process::{BuildOutcome, CommandRunner};

/// Fallback handler for build systems without a workflow of their own.
///
/// Spawns nothing, logs, and reports success.
#[derive(Debug, Clone, Default)]
pub struct GenericHandler;

impl GenericHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BuildHandler for GenericHandler {
    fn name(&self) -> &str {
        "generic"
    }

    async fn build(
        &self,
        descriptor: &PackageDescriptor,
        _runner: &dyn CommandRunner,
    ) -> Result<HandlerOutput, HandlerError> {
        info!(
            build_system = ?descriptor.build_system(),
            "no dedicated handler, using generic no-op build"
        );

        let mut output = HandlerOutput::new();
        output.push(BuildOutcome::skipped("generic"));
        Ok(output)
    }
}
