//! Build orchestration
//!
//! Drives each descriptor through acquisition, build dispatch and hashing.
//! Every stage is a function from the current descriptor value to an
//! updated one or a [`PipelineError`]; nothing is shared between
//! descriptors except the runner, the registry and the clone-target locks.
//!
//! Descriptors in a batch run as independent tasks. A failure ends only
//! its own pipeline, and nothing is retried.

mod error;
mod report;
mod state;

pub use error::PipelineError;
pub use report::BuildReport;
pub use state::PipelineState;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::acquire::{RepoUrlResolver, SourceAcquirer};
use crate::config::Config;
use crate::digest::{DigestError, Digester};
use crate::handlers::HandlerRegistry;
use crate::humanize::format_elapsed;
use crate::observability::{Metrics, RunContext};
use crate::package::{PackageDescriptor, keys};
use crate::process::{BuildOutcome, CommandRunner, MeteredRunner};

pub struct Orchestrator {
    acquirer: SourceAcquirer,
    registry: HandlerRegistry,
    digester: Digester,
    runner: Arc<dyn CommandRunner>,
    max_concurrent: usize,
}

impl Orchestrator {
    /// Orchestrator with default acquisition, handlers and hashing
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            acquirer: SourceAcquirer::new("sources"),
            registry: HandlerRegistry::with_defaults(),
            digester: Digester::default(),
            runner,
            max_concurrent: 0,
        }
    }

    pub fn from_config(config: &Config, runner: Arc<dyn CommandRunner>) -> Self {
        let acquire = &config.acquire;
        let acquirer = SourceAcquirer::new(&acquire.clone_root)
            .git_program(&config.tools.git)
            .clone_depth(acquire.clone_depth)
            .url_resolver(RepoUrlResolver::new(
                &acquire.url_template,
                acquire.organizations.clone(),
            ));

        Self {
            acquirer,
            registry: HandlerRegistry::from_config(config),
            digester: Digester::new(config.hashing.algorithm, config.hashing.chunk_size),
            runner,
            max_concurrent: config.orchestrator.max_concurrent,
        }
    }

    pub fn with_acquirer(mut self, acquirer: SourceAcquirer) -> Self {
        self.acquirer = acquirer;
        self
    }

    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_digester(mut self, digester: Digester) -> Self {
        self.digester = digester;
        self
    }

    /// Bound on descriptors in flight per batch; 0 means unbounded
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Run one descriptor to a terminal state
    pub async fn run(&self, descriptor: PackageDescriptor, ctx: &RunContext) -> BuildReport {
        self.run_with_cancel(descriptor, ctx, &CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), ending in `Failed(Cancelled)` as soon as
    /// `cancel` fires. The running subprocess, if any, is killed.
    pub async fn run_with_cancel(
        &self,
        descriptor: PackageDescriptor,
        ctx: &RunContext,
        cancel: &CancellationToken,
    ) -> BuildReport {
        let span = ctx.pipeline_span(descriptor.name());
        Pipeline::new(self, ctx.metrics(), cancel)
            .drive(descriptor)
            .instrument(span)
            .await
    }

    /// Run a batch concurrently; reports come back in submission order
    pub async fn run_batch(
        self: &Arc<Self>,
        descriptors: Vec<PackageDescriptor>,
        ctx: &RunContext,
    ) -> Vec<BuildReport> {
        self.run_batch_with_cancel(descriptors, ctx, CancellationToken::new())
            .await
    }

    pub async fn run_batch_with_cancel(
        self: &Arc<Self>,
        descriptors: Vec<PackageDescriptor>,
        ctx: &RunContext,
        cancel: CancellationToken,
    ) -> Vec<BuildReport> {
        let total = descriptors.len();
        let limit = (self.max_concurrent > 0).then(|| Arc::new(Semaphore::new(self.max_concurrent)));
        info!(
            run_id = %ctx.run_id(),
            descriptors = total,
            max_concurrent = self.max_concurrent,
            "starting batch"
        );

        let mut tasks = JoinSet::new();
        let mut submitted = Vec::with_capacity(total);

        for (index, descriptor) in descriptors.into_iter().enumerate() {
            submitted.push(descriptor.clone());

            let orchestrator = Arc::clone(self);
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            let limit = limit.clone();

            tasks.spawn(async move {
                // a cancelled wait falls through; the pipeline then fails at Created
                let _permit = match limit {
                    Some(semaphore) => tokio::select! {
                        permit = semaphore.acquire_owned() => permit.ok(),
                        _ = cancel.cancelled() => None,
                    },
                    None => None,
                };
                let report = orchestrator.run_with_cancel(descriptor, &ctx, &cancel).await;
                (index, report)
            });
        }

        let mut reports: Vec<Option<BuildReport>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => reports[index] = Some(report),
                Err(e) => error!(error = %e, "pipeline task panicked"),
            }
        }

        let reports: Vec<BuildReport> = reports
            .into_iter()
            .zip(submitted)
            .map(|(report, descriptor)| {
                report.unwrap_or_else(|| {
                    ctx.metrics().descriptor_failed();
                    BuildReport {
                        descriptor,
                        state: PipelineState::Failed,
                        failed_at: None,
                        handler: None,
                        outcomes: Vec::new(),
                        error: Some(PipelineError::Aborted("task panicked".to_string())),
                        elapsed: Default::default(),
                    }
                })
            })
            .collect();

        let done = reports.iter().filter(|r| r.is_done()).count();
        info!(
            run_id = %ctx.run_id(),
            done,
            failed = total - done,
            "batch finished"
        );
        reports
    }
}

/// One descriptor's trip through the state machine
struct Pipeline<'a> {
    orchestrator: &'a Orchestrator,
    metrics: &'a Metrics,
    cancel: &'a CancellationToken,
    state: PipelineState,
    handler: Option<String>,
    outcomes: Vec<BuildOutcome>,
    started: Instant,
}

impl<'a> Pipeline<'a> {
    fn new(orchestrator: &'a Orchestrator, metrics: &'a Metrics, cancel: &'a CancellationToken) -> Self {
        Self {
            orchestrator,
            metrics,
            cancel,
            state: PipelineState::Created,
            handler: None,
            outcomes: Vec::new(),
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    /// Await a stage unless cancelled first. Dropping the stage future
    /// kills any subprocess it spawned.
    async fn guarded<F: Future>(&self, stage: F) -> Result<F::Output, PipelineError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PipelineError::Cancelled),
            output = stage => Ok(output),
        }
    }

    async fn drive(mut self, descriptor: PackageDescriptor) -> BuildReport {
        self.metrics.descriptor_started();
        info!(descriptor = %descriptor, "pipeline started");

        match self.stages(descriptor.clone()).await {
            Ok(descriptor) => {
                self.advance(PipelineState::Done);
                self.metrics.descriptor_done();
                info!(
                    elapsed = %format_elapsed(self.started.elapsed()),
                    digest = descriptor.digest().unwrap_or("-"),
                    "pipeline done"
                );
                BuildReport {
                    descriptor,
                    state: PipelineState::Done,
                    failed_at: None,
                    handler: self.handler,
                    outcomes: self.outcomes,
                    error: None,
                    elapsed: self.started.elapsed(),
                }
            }
            Err((descriptor, err)) => {
                let failed_at = self.state;
                self.outcomes.extend(err.outcomes().into_iter().cloned());
                self.advance(PipelineState::Failed);
                self.metrics.descriptor_failed();
                error!(failed_at = %failed_at, error = %err, "pipeline failed");
                BuildReport {
                    descriptor,
                    state: PipelineState::Failed,
                    failed_at: Some(failed_at),
                    handler: self.handler,
                    outcomes: self.outcomes,
                    error: Some(err),
                    elapsed: self.started.elapsed(),
                }
            }
        }
    }

    /// On failure, hands back the last descriptor value that was reached
    async fn stages(
        &mut self,
        descriptor: PackageDescriptor,
    ) -> Result<PackageDescriptor, (PackageDescriptor, PipelineError)> {
        if self.cancel.is_cancelled() {
            return Err((descriptor, PipelineError::Cancelled));
        }

        let descriptor = match self.acquire(descriptor.clone()).await {
            Ok(acquired) => acquired,
            Err(err) => return Err((descriptor, err)),
        };
        let hash_target = descriptor.location().map(PathBuf::from);

        let descriptor = match self.build(&descriptor).await {
            Ok(built) => built,
            Err(err) => return Err((descriptor, err)),
        };

        match self.hash(descriptor.clone(), hash_target).await {
            Ok(hashed) => Ok(hashed),
            Err(err) => Err((descriptor, err)),
        }
    }

    async fn acquire(&mut self, descriptor: PackageDescriptor) -> Result<PackageDescriptor, PipelineError> {
        self.advance(PipelineState::Acquiring);

        let orchestrator = self.orchestrator;
        let runner = MeteredRunner::new(orchestrator.runner.as_ref(), self.metrics);
        let acquired = self
            .guarded(orchestrator.acquirer.resolve(descriptor, &runner, self.metrics))
            .await??;

        self.outcomes.extend(acquired.outcome);
        self.advance(PipelineState::Acquired);
        Ok(acquired.descriptor)
    }

    async fn build(&mut self, descriptor: &PackageDescriptor) -> Result<PackageDescriptor, PipelineError> {
        let Some(build_system) = descriptor.build_system() else {
            return Err(PipelineError::NoBuildSystem(descriptor.name().to_string()));
        };
        self.advance(PipelineState::Building);
        info!(build_system = %build_system, "building");

        let orchestrator = self.orchestrator;
        let runner = MeteredRunner::new(orchestrator.runner.as_ref(), self.metrics);
        let (handler, output) = self
            .guarded(orchestrator.registry.dispatch(descriptor, &runner))
            .await??;

        self.outcomes.extend(output.outcomes);
        self.handler = Some(handler.clone());

        let mut built = descriptor
            .clone()
            .with_metadata_entries(output.metadata)
            .with_metadata(keys::BUILT_WITH, handler);
        if let Some(artifact) = output.artifact {
            built = built.with_location(artifact);
        }

        self.advance(PipelineState::Built);
        Ok(built)
    }

    /// Recompute the digest when the hash target changed during the build,
    /// or when there is none yet. A target that is not a regular file
    /// skips hashing.
    async fn hash(
        &mut self,
        descriptor: PackageDescriptor,
        before_build: Option<PathBuf>,
    ) -> Result<PackageDescriptor, PipelineError> {
        let target_changed = descriptor.location() != before_build.as_deref();
        let needs_digest = target_changed || descriptor.digest().is_none();
        let target = descriptor
            .location()
            .filter(|_| needs_digest)
            .map(Path::to_path_buf);

        let hashed = match target {
            Some(path) => {
                let digester = self.orchestrator.digester;
                match self.guarded(digester.digest(&path)).await? {
                    Ok(hex) => {
                        info!(path = %path.display(), algorithm = %digester.algorithm(), "digest recorded");
                        descriptor.with_digest(hex)
                    }
                    Err(DigestError::NotAFile(path)) => {
                        debug!(path = %path.display(), "hash target is not a regular file, skipping");
                        self.metrics.hash_skipped();
                        descriptor
                    }
                    Err(e) => {
                        warn!(error = %e, "hashing failed, skipping");
                        self.metrics.hash_skipped();
                        descriptor
                    }
                }
            }
            None if descriptor.location().is_none() => {
                self.metrics.hash_skipped();
                descriptor
            }
            None => descriptor,
        };

        self.advance(PipelineState::Hashed);
        Ok(hashed)
    }
}
