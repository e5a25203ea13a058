use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::error::{ProcessError, Result};
use super::outcome::{BuildOutcome, Invocation, OutcomeStatus};
use crate::observability::Metrics;

/// Runs external commands on behalf of acquirers and build handlers.
///
/// Implementations suspend the calling task until the process exits and
/// never retry. A non-zero exit is reported as [`ProcessError::ToolFailed`]
/// carrying the captured outcome; a program missing from `PATH` is
/// [`ProcessError::ToolNotFound`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: Invocation) -> Result<BuildOutcome>;

    /// Convenience wrapper for the common program/args/cwd case
    async fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<BuildOutcome> {
        let mut invocation = Invocation::new(program).args(args.iter().cloned());
        if let Some(cwd) = cwd {
            invocation = invocation.current_dir(cwd);
        }
        self.run(invocation).await
    }

    /// True when invocations are only recorded. Callers skip their own
    /// filesystem side effects (build directories, probe files) as well.
    fn is_dry_run(&self) -> bool {
        false
    }
}

#[async_trait]
impl<R: CommandRunner + ?Sized> CommandRunner for Arc<R> {
    async fn run(&self, invocation: Invocation) -> Result<BuildOutcome> {
        (**self).run(invocation).await
    }

    fn is_dry_run(&self) -> bool {
        (**self).is_dry_run()
    }
}

/// Wraps a shared runner for the duration of one run, counting every
/// process that actually started against that run's [`Metrics`]
pub(crate) struct MeteredRunner<'a> {
    inner: &'a dyn CommandRunner,
    metrics: &'a Metrics,
}

impl<'a> MeteredRunner<'a> {
    pub(crate) fn new(inner: &'a dyn CommandRunner, metrics: &'a Metrics) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl<'a> CommandRunner for MeteredRunner<'a> {
    async fn run(&self, invocation: Invocation) -> Result<BuildOutcome> {
        let result = self.inner.run(invocation).await;
        let spawned = matches!(&result, Ok(_) | Err(ProcessError::ToolFailed { .. }));
        if spawned && !self.inner.is_dry_run() {
            self.metrics.subprocess_spawned();
        }
        result
    }

    fn is_dry_run(&self) -> bool {
        self.inner.is_dry_run()
    }
}

/// [`CommandRunner`] backed by `tokio::process`.
///
/// Children are spawned with `kill_on_drop`, so dropping the future of a
/// cancelled pipeline terminates the process instead of orphaning it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: Invocation) -> Result<BuildOutcome> {
        let command_line = invocation.command_line();

        if let Some(cwd) = &invocation.cwd {
            if !cwd.is_dir() {
                return Err(ProcessError::WorkingDirectory(cwd.clone()));
            }
        }

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        debug!(command = %command_line, cwd = ?invocation.cwd, "spawning process");
        let started = Instant::now();

        let mut child = command.spawn().map_err(|source| match source.kind() {
            ErrorKind::NotFound => ProcessError::ToolNotFound {
                program: invocation.program.clone(),
            },
            _ => ProcessError::Io {
                command: command_line.clone(),
                source,
            },
        })?;

        let output = match (invocation.stdin, child.stdin.take()) {
            (Some(input), Some(mut stdin)) => {
                // Feed stdin while draining stdout/stderr so a chatty child
                // cannot block on a full pipe.
                let feed = async move {
                    let result = stdin.write_all(&input).await;
                    drop(stdin);
                    result
                };
                let (fed, output) = tokio::join!(feed, child.wait_with_output());
                if let Err(e) = fed {
                    if e.kind() != ErrorKind::BrokenPipe {
                        warn!(command = %command_line, error = %e, "failed to write stdin");
                    }
                }
                output
            }
            _ => child.wait_with_output().await,
        }
        .map_err(|source| ProcessError::Io {
            command: command_line.clone(),
            source,
        })?;

        let outcome = BuildOutcome {
            command: command_line.clone(),
            status: if output.status.success() {
                OutcomeStatus::Success
            } else {
                OutcomeStatus::Failure
            },
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            elapsed: started.elapsed(),
        };

        if !outcome.stdout.is_empty() {
            debug!(command = %command_line, stdout = %outcome.stdout.trim_end(), "command stdout");
        }
        if !outcome.stderr.is_empty() {
            debug!(command = %command_line, stderr = %outcome.stderr.trim_end(), "command stderr");
        }

        if outcome.is_success() {
            Ok(outcome)
        } else {
            Err(ProcessError::ToolFailed {
                command: command_line,
                outcome: Box::new(outcome),
            })
        }
    }
}
