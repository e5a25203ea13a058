use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::steps::source_dir;
use super::traits::{BuildHandler, HandlerError, run_step};
use super::types::HandlerOutput;
use crate::package::{PackageDescriptor, keys};
use crate::process::{CommandRunner, Invocation, ProcessError};

pub const DEFAULT_PROBE_SOURCE: &str = "int main(void) { return 0; }\n";

const PROBE_FILE: &str = "probe.c";
const PROBE_BINARY: &str = "probe";

/// Compiles a trivial probe program with the package's compiler, then
/// pipes the compiler's combined output into a verification tool.
///
/// The probe compile is fatal on failure. The verifier is diagnostic: a
/// non-zero exit is logged as a warning and the build still succeeds.
///
/// The compiler is `metadata.compiler`, else the package name. When the
/// source directory contains a file by that name (a freshly built
/// compiler), that file is used and becomes the artifact.
#[derive(Debug, Clone)]
pub struct CompilerBootstrapHandler {
    probe_source: String,
    verifier: Option<Vec<String>>,
}

impl CompilerBootstrapHandler {
    pub fn new(probe_source: impl Into<String>, verifier: Option<Vec<String>>) -> Self {
        Self {
            probe_source: probe_source.into(),
            verifier: verifier.filter(|argv| !argv.is_empty()),
        }
    }

    fn compiler(&self, descriptor: &PackageDescriptor, source: &Path) -> (String, Option<PathBuf>) {
        let name = descriptor
            .get_metadata(keys::COMPILER)
            .unwrap_or(descriptor.name());

        let in_tree = source.join(name);
        if in_tree.is_file() {
            let path = std::path::absolute(&in_tree).unwrap_or(in_tree);
            return (path.to_string_lossy().into_owned(), Some(path));
        }
        (name.to_string(), None)
    }

    fn verifier(&self, descriptor: &PackageDescriptor) -> Option<Vec<String>> {
        descriptor
            .get_metadata(keys::VERIFIER)
            .map(|argv| argv.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|argv| !argv.is_empty())
            .or_else(|| self.verifier.clone())
    }
}

impl Default for CompilerBootstrapHandler {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_SOURCE, None)
    }
}

#[async_trait]
impl BuildHandler for CompilerBootstrapHandler {
    fn name(&self) -> &str {
        "compiler-bootstrap"
    }

    async fn build(
        &self,
        descriptor: &PackageDescriptor,
        runner: &dyn CommandRunner,
    ) -> Result<HandlerOutput, HandlerError> {
        let source = source_dir(descriptor)?;
        let (compiler, in_tree) = self.compiler(descriptor, &source);

        let environment = |message: String| HandlerError::Environment {
            package: descriptor.name().to_string(),
            message,
        };

        // held until the handler returns; dropping it removes the directory
        let probe_dir = if runner.is_dry_run() {
            None
        } else {
            let dir = tempfile::Builder::new()
                .prefix("pkgforge-probe-")
                .tempdir()
                .map_err(|e| environment(format!("cannot create probe directory: {e}")))?;
            let probe_file = dir.path().join(PROBE_FILE);
            tokio::fs::write(&probe_file, &self.probe_source)
                .await
                .map_err(|e| environment(format!("cannot write {}: {e}", probe_file.display())))?;
            Some(dir)
        };
        let probe_cwd = probe_dir
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .unwrap_or_else(std::env::temp_dir);

        let compile = Invocation::new(&compiler)
            .args([PROBE_FILE, "-o", PROBE_BINARY])
            .current_dir(probe_cwd);

        info!(compiler = %compiler, "compiling probe program");
        let mut output = HandlerOutput::new();
        let compiled = run_step(runner, descriptor, compile).await?;
        let diagnostics = compiled.combined_output();
        output.push(compiled);

        let verifier = self.verifier(descriptor);
        if let Some((program, args)) = verifier.as_deref().and_then(<[String]>::split_first) {
            let verify = Invocation::new(program.as_str())
                .args(args.iter().cloned())
                .current_dir(&source)
                .stdin(diagnostics.into_bytes());

            match runner.run(verify).await {
                Ok(outcome) => output.push(outcome),
                Err(ProcessError::ToolFailed { outcome, .. }) => {
                    warn!(
                        verifier = %outcome.command,
                        exit_code = ?outcome.exit_code,
                        stderr = %outcome.stderr.trim(),
                        "probe verification reported problems"
                    );
                    output.push(*outcome);
                }
                Err(e) => {
                    return Err(HandlerError::from_process(descriptor.name(), e).after_steps(output.outcomes));
                }
            }
        }

        output.record(keys::COMPILER, compiler);
        if let Some(path) = in_tree {
            output.artifact = Some(path);
        } else {
            output.declared_artifact(descriptor, &source);
        }
        Ok(output)
    }
}
