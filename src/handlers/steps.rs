use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::traits::{BuildHandler, HandlerError, run_step};
use super::types::HandlerOutput;
use crate::package::PackageDescriptor;
use crate::process::{CommandRunner, Invocation};

/// Name of the out-of-tree build directory below the source directory
pub const BUILD_SUBDIR: &str = "build";

/// A handler made of command steps run in order inside the source
/// directory. The first failing step ends the build; later steps never run.
///
/// Arguments may contain `{source}`, `{build_dir}`, `{name}` and
/// `{version}`, expanded per descriptor.
#[derive(Debug, Clone)]
pub struct StepsHandler {
    name: String,
    steps: Vec<Vec<String>>,
    create_build_dir: bool,
}

impl StepsHandler {
    pub fn new(name: impl Into<String>, steps: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            steps,
            create_build_dir: false,
        }
    }

    /// Create `{build_dir}` before the first step runs
    pub fn with_build_dir(mut self) -> Self {
        self.create_build_dir = true;
        self
    }

    pub fn steps(&self) -> &[Vec<String>] {
        &self.steps
    }

    /// `make -C <source>`
    pub fn make(make: &str) -> Self {
        Self::new("make", vec![argv(&[make, "-C", "{source}"])])
    }

    /// Configure into `<source>/build`, then build that directory
    pub fn cmake(cmake: &str) -> Self {
        Self::new(
            "cmake",
            vec![
                argv(&[cmake, "-S", "{source}", "-B", "{build_dir}"]),
                argv(&[cmake, "--build", "{build_dir}"]),
            ],
        )
        .with_build_dir()
    }

    pub fn meson(meson: &str) -> Self {
        Self::new(
            "meson",
            vec![
                argv(&[meson, "setup", "{build_dir}", "{source}"]),
                argv(&[meson, "compile", "-C", "{build_dir}"]),
            ],
        )
    }

    pub fn ninja(ninja: &str) -> Self {
        Self::new("ninja", vec![argv(&[ninja, "-C", "{source}"])])
    }

    /// `./configure` followed by `make`
    pub fn autotools(make: &str) -> Self {
        Self::new("autotools", vec![argv(&["./configure"]), argv(&[make])])
    }

    pub fn cargo(cargo: &str) -> Self {
        Self::new("cargo", vec![argv(&[cargo, "build", "--release"])])
    }

    pub fn go(go: &str) -> Self {
        Self::new("go", vec![argv(&[go, "build", "./..."])])
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

pub(crate) fn expand(arg: &str, descriptor: &PackageDescriptor, source: &Path, build_dir: &Path) -> String {
    arg.replace("{source}", &source.to_string_lossy())
        .replace("{build_dir}", &build_dir.to_string_lossy())
        .replace("{name}", descriptor.name())
        .replace("{version}", descriptor.version())
}

pub(crate) fn source_dir(descriptor: &PackageDescriptor) -> Result<PathBuf, HandlerError> {
    descriptor
        .source_dir()
        .ok_or_else(|| HandlerError::NoSourceDir(descriptor.name().to_string()))
}

#[async_trait]
impl BuildHandler for StepsHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn build(
        &self,
        descriptor: &PackageDescriptor,
        runner: &dyn CommandRunner,
    ) -> Result<HandlerOutput, HandlerError> {
        let source = source_dir(descriptor)?;
        let build_dir = source.join(BUILD_SUBDIR);

        if self.create_build_dir && runner.is_dry_run() {
            debug!(build_dir = %build_dir.display(), "dry run, not creating build directory");
        } else if self.create_build_dir {
            tokio::fs::create_dir_all(&build_dir)
                .await
                .map_err(|e| HandlerError::Environment {
                    package: descriptor.name().to_string(),
                    message: format!("cannot create {}: {e}", build_dir.display()),
                })?;
        }

        let mut output = HandlerOutput::new();
        for (index, step) in self.steps.iter().enumerate() {
            let Some((program, args)) = step.split_first() else {
                continue;
            };

            let invocation = Invocation::new(expand(program, descriptor, &source, &build_dir))
                .args(args.iter().map(|arg| expand(arg, descriptor, &source, &build_dir)))
                .current_dir(&source);

            info!(handler = %self.name, step = index + 1, total = self.steps.len(), command = %invocation, "running build step");
            match run_step(runner, descriptor, invocation).await {
                Ok(outcome) => output.push(outcome),
                Err(err) => return Err(err.after_steps(output.outcomes)),
            }
        }

        output.declared_artifact(descriptor, &source);
        Ok(output)
    }
}
