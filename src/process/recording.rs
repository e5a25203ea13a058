use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::error::{ProcessError, Result};
use super::outcome::{BuildOutcome, Invocation, OutcomeStatus};
use super::runner::CommandRunner;

/// Scripted reply for a program run through [`RecordingRunner`]
#[derive(Debug, Clone)]
pub enum Reply {
    Exit { code: i32, stdout: String, stderr: String },
    NotFound,
}

impl Reply {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Reply::Exit {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn fail(code: i32, stderr: impl Into<String>) -> Self {
        Reply::Exit {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runner that spawns nothing: it records every invocation and answers
/// from a per-program script (success with empty output by default).
///
/// Backs `pkgforge build --dry-run` and the pipeline tests. Reports itself
/// as a dry run, so handlers and the acquirer leave the filesystem alone.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    replies: Mutex<HashMap<String, Reply>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, program: impl Into<String>, reply: Reply) -> Self {
        self.set_reply(program, reply);
        self
    }

    pub fn set_reply(&self, program: impl Into<String>, reply: Reply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.insert(program.into(), reply);
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn programs(&self) -> Vec<String> {
        self.invocations()
            .into_iter()
            .map(|call| call.program)
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: Invocation) -> Result<BuildOutcome> {
        let command = invocation.command_line();
        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|replies| replies.get(&invocation.program).cloned())
            .unwrap_or_else(|| Reply::ok(""));

        let program = invocation.program.clone();
        if let Ok(mut calls) = self.invocations.lock() {
            calls.push(invocation);
        }

        match reply {
            Reply::NotFound => Err(ProcessError::ToolNotFound { program }),
            Reply::Exit {
                code,
                stdout,
                stderr,
            } => {
                let outcome = BuildOutcome {
                    command: command.clone(),
                    status: if code == 0 {
                        OutcomeStatus::Success
                    } else {
                        OutcomeStatus::Failure
                    },
                    stdout,
                    stderr,
                    exit_code: Some(code),
                    elapsed: Duration::ZERO,
                };
                if code == 0 {
                    Ok(outcome)
                } else {
                    Err(ProcessError::ToolFailed {
                        command,
                        outcome: Box::new(outcome),
                    })
                }
            }
        }
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
