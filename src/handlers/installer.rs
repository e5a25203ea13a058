use async_trait::async_trait;
use tracing::{info, warn};

use super::steps::source_dir;
use super::traits::{BuildHandler, HandlerError, run_step};
use super::types::HandlerOutput;
use crate::package::{PackageDescriptor, keys};
use crate::process::{CommandRunner, Invocation};

/// Installs an interpreted-language package from its source tree with
/// `<python> -m pip install <source>`.
///
/// This installs into the active interpreter's environment. After a
/// successful install the package's executable is looked up on `PATH`;
/// when found its path is recorded under `executable_path` and it becomes
/// the artifact. Not finding it only logs a warning.
#[derive(Debug, Clone)]
pub struct InstallerHandler {
    python: String,
}

impl InstallerHandler {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

impl Default for InstallerHandler {
    fn default() -> Self {
        Self::new("python3")
    }
}

#[async_trait]
impl BuildHandler for InstallerHandler {
    fn name(&self) -> &str {
        "pip"
    }

    async fn build(
        &self,
        descriptor: &PackageDescriptor,
        runner: &dyn CommandRunner,
    ) -> Result<HandlerOutput, HandlerError> {
        let source = source_dir(descriptor)?;
        let invocation = Invocation::new(&self.python)
            .args(["-m", "pip", "install"])
            .arg(source.to_string_lossy().into_owned())
            .current_dir(&source);

        info!(command = %invocation, "installing package");
        let mut output = HandlerOutput::new();
        output.push(run_step(runner, descriptor, invocation).await?);

        let executable = descriptor
            .get_metadata(keys::EXECUTABLE)
            .unwrap_or(descriptor.name())
            .to_string();

        // PATH walk is blocking filesystem work
        let lookup = executable.clone();
        match tokio::task::spawn_blocking(move || which::which(lookup)).await {
            Ok(Ok(path)) => {
                info!(executable = %executable, path = %path.display(), "resolved installed executable");
                output.record(keys::EXECUTABLE_PATH, path.to_string_lossy());
                output.artifact = Some(path);
            }
            Ok(Err(e)) => {
                warn!(executable = %executable, error = %e, "installed executable not found on PATH");
            }
            Err(e) => {
                warn!(executable = %executable, error = %e, "executable lookup did not complete");
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{BuildSystem, Origin};
    use crate::process::{RecordingRunner, Reply};
    use tempfile::TempDir;

    fn pip_pkg(dir: &std::path::Path, name: &str) -> PackageDescriptor {
        PackageDescriptor::new(name, "0.1.0", Origin::Local)
            .unwrap()
            .with_location(dir)
            .with_build_system(BuildSystem::Pip)
    }

    #[tokio::test]
    async fn test_install_resolves_executable() {
        let temp_dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        // `sh` exists on every system running these tests
        let pkg = pip_pkg(temp_dir.path(), "shell-tools").with_metadata(keys::EXECUTABLE, "sh");

        let output = InstallerHandler::new("python3").build(&pkg, &runner).await.unwrap();

        let calls = runner.invocations();
        assert_eq!(calls[0].program, "python3");
        assert_eq!(&calls[0].args[..3], &["-m", "pip", "install"]);
        assert!(output.metadata.contains_key(keys::EXECUTABLE_PATH));
        assert!(output.artifact.is_some());
    }

    #[tokio::test]
    async fn test_missing_executable_is_only_a_warning() {
        let temp_dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let pkg = pip_pkg(temp_dir.path(), "pkgforge-no-such-executable");

        let output = InstallerHandler::default().build(&pkg, &runner).await.unwrap();

        assert!(!output.metadata.contains_key(keys::EXECUTABLE_PATH));
        assert!(output.artifact.is_none());
        assert_eq!(output.outcomes.len(), 1);
    }

    #[tokio::test]
    async fn test_install_failure_is_build_failed() {
        let temp_dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new()
            .reply("python3", Reply::fail(1, "ERROR: Directory is not installable"));
        let pkg = pip_pkg(temp_dir.path(), "broken");

        let err = InstallerHandler::default().build(&pkg, &runner).await.unwrap_err();
        assert!(err.outcome().unwrap().stderr.contains("not installable"));
    }
}
