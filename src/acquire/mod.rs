//! Source acquisition
//!
//! Resolves where a descriptor's sources live on disk:
//!
//! - `local`: the location must already exist; nothing is spawned.
//! - `git` / `github`: the repository is cloned into the clone target
//!   (the descriptor's location if set, else `<clone_root>/<name>`), unless
//!   that directory already holds something, in which case it is reused.
//! - every other origin passes through untouched.
//!
//! Partially cloned directories are left on disk after a failure.

mod locks;
mod url;

pub use locks::TargetLocks;
pub use url::{DEFAULT_URL_TEMPLATE, RepoUrlResolver, UrlSource};

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::observability::Metrics;
use crate::process::{BuildOutcome, CommandRunner, Invocation, ProcessError, display_code};
use crate::package::{Origin, PackageDescriptor, keys};

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("tool not found on PATH: {program}")]
    ToolNotFound { program: String },

    #[error("clone of {url} into {} failed with {}: {}", .target.display(), display_code(.outcome.exit_code), .outcome.stderr.trim())]
    CloneFailed {
        url: String,
        target: PathBuf,
        outcome: Box<BuildOutcome>,
    },

    #[error("no repository URL for '{package}': set metadata.repo_url or add it to the organization table")]
    NoRepositoryUrl { package: String },

    #[error("source location for '{package}' does not exist: {}", .path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<unset>".to_string()))]
    SourceMissing {
        package: String,
        path: Option<PathBuf>,
    },

    #[error("filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Process(ProcessError),
}

impl AcquireError {
    pub fn outcome(&self) -> Option<&BuildOutcome> {
        match self {
            AcquireError::CloneFailed { outcome, .. } => Some(outcome.as_ref()),
            _ => None,
        }
    }
}

/// Result of a successful acquisition
#[derive(Debug, Clone)]
pub struct Acquired {
    pub descriptor: PackageDescriptor,
    /// Outcome of the clone, when one ran
    pub outcome: Option<BuildOutcome>,
}

/// How the source location was obtained, recorded under
/// [`keys::ACQUIRED_VIA`]
pub mod via {
    pub const CLONE: &str = "clone";
    pub const REUSED: &str = "reused";
}

pub struct SourceAcquirer {
    git_program: String,
    clone_root: PathBuf,
    clone_depth: u32,
    urls: RepoUrlResolver,
    locks: TargetLocks,
}

impl SourceAcquirer {
    pub fn new(clone_root: impl Into<PathBuf>) -> Self {
        Self {
            git_program: "git".to_string(),
            clone_root: clone_root.into(),
            clone_depth: 1,
            urls: RepoUrlResolver::default(),
            locks: TargetLocks::new(),
        }
    }

    pub fn git_program(mut self, program: impl Into<String>) -> Self {
        self.git_program = program.into();
        self
    }

    /// History depth for clones; 0 clones the full history
    pub fn clone_depth(mut self, depth: u32) -> Self {
        self.clone_depth = depth;
        self
    }

    pub fn url_resolver(mut self, urls: RepoUrlResolver) -> Self {
        self.urls = urls;
        self
    }

    pub fn clone_root(&self) -> &Path {
        &self.clone_root
    }

    /// Directory a git/github descriptor is cloned into
    pub fn clone_target(&self, descriptor: &PackageDescriptor) -> PathBuf {
        descriptor
            .location()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.clone_root.join(descriptor.name()))
    }

    pub async fn resolve(
        &self,
        descriptor: PackageDescriptor,
        runner: &dyn CommandRunner,
        metrics: &Metrics,
    ) -> Result<Acquired, AcquireError> {
        match descriptor.origin() {
            Origin::Local => resolve_local(descriptor),
            Origin::Git | Origin::Github => self.resolve_clone(descriptor, runner, metrics).await,
            other => {
                info!(origin = %other, "no acquisition step for origin");
                Ok(Acquired {
                    descriptor,
                    outcome: None,
                })
            }
        }
    }

    async fn resolve_clone(
        &self,
        descriptor: PackageDescriptor,
        runner: &dyn CommandRunner,
        metrics: &Metrics,
    ) -> Result<Acquired, AcquireError> {
        let target = self.clone_target(&descriptor);
        let _guard = self.locks.lock(&target).await;

        if is_populated(&target).await? {
            info!(target = %target.display(), "clone target already populated, reusing");
            metrics.clone_reused();
            return Ok(Acquired {
                descriptor: descriptor
                    .with_location(target)
                    .with_metadata(keys::ACQUIRED_VIA, via::REUSED),
                outcome: None,
            });
        }

        let (url, source) = self
            .urls
            .resolve(&descriptor)
            .ok_or_else(|| AcquireError::NoRepositoryUrl {
                package: descriptor.name().to_string(),
            })?;
        if source == UrlSource::OrganizationTable {
            warn!(url = %url, "repository URL derived from organization table");
        }

        let parent = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty() && !runner.is_dry_run());
        if let Some(parent) = parent {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| AcquireError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut invocation = Invocation::new(&self.git_program).arg("clone");
        if self.clone_depth > 0 {
            invocation = invocation.arg("--depth").arg(self.clone_depth.to_string());
        }
        if let Some(git_ref) = descriptor.get_metadata(keys::GIT_REF) {
            invocation = invocation.arg("--branch").arg(git_ref);
        }
        invocation = invocation
            .arg(url.clone())
            .arg(target.to_string_lossy().into_owned());

        info!(url = %url, target = %target.display(), "cloning repository");
        let outcome = runner.run(invocation).await.map_err(|e| match e {
            ProcessError::ToolNotFound { program } => AcquireError::ToolNotFound { program },
            ProcessError::ToolFailed { outcome, .. } => AcquireError::CloneFailed {
                url: url.clone(),
                target: target.clone(),
                outcome,
            },
            other => AcquireError::Process(other),
        })?;

        Ok(Acquired {
            descriptor: descriptor
                .with_location(target)
                .with_metadata(keys::ACQUIRED_VIA, via::CLONE)
                .with_metadata(keys::CLONED_FROM, url),
            outcome: Some(outcome),
        })
    }
}

fn resolve_local(descriptor: PackageDescriptor) -> Result<Acquired, AcquireError> {
    if descriptor.location().is_some_and(Path::exists) {
        return Ok(Acquired {
            descriptor,
            outcome: None,
        });
    }

    Err(AcquireError::SourceMissing {
        package: descriptor.name().to_string(),
        path: descriptor.location().map(Path::to_path_buf),
    })
}

async fn is_populated(path: &Path) -> Result<bool, AcquireError> {
    let mut entries = match tokio::fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(source) => {
            return Err(AcquireError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    entries
        .next_entry()
        .await
        .map(|entry| entry.is_some())
        .map_err(|source| AcquireError::Io {
            path: path.to_path_buf(),
            source,
        })
}
