//! Per-run observability handle (counters + tracing span)

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::Span;
use uuid::Uuid;

/// Counters for one orchestration run
#[derive(Debug, Default)]
pub struct Metrics {
    descriptors_started: AtomicU64,
    descriptors_done: AtomicU64,
    descriptors_failed: AtomicU64,
    clones_reused: AtomicU64,
    hashes_skipped: AtomicU64,
    subprocesses_spawned: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn descriptor_started(&self) {
        self.descriptors_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "descriptors_started", "Metric incremented");
    }

    pub fn descriptor_done(&self) {
        self.descriptors_done.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "descriptors_done", "Metric incremented");
    }

    pub fn descriptor_failed(&self) {
        self.descriptors_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "descriptors_failed", "Metric incremented");
    }

    pub fn clone_reused(&self) {
        self.clones_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hash_skipped(&self) {
        self.hashes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subprocess_spawned(&self) {
        self.subprocesses_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            descriptors_started: self.descriptors_started.load(Ordering::Relaxed),
            descriptors_done: self.descriptors_done.load(Ordering::Relaxed),
            descriptors_failed: self.descriptors_failed.load(Ordering::Relaxed),
            clones_reused: self.clones_reused.load(Ordering::Relaxed),
            hashes_skipped: self.hashes_skipped.load(Ordering::Relaxed),
            subprocesses_spawned: self.subprocesses_spawned.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub descriptors_started: u64,
    pub descriptors_done: u64,
    pub descriptors_failed: u64,
    pub clones_reused: u64,
    pub hashes_skipped: u64,
    pub subprocesses_spawned: u64,
}

/// Handle owned by one orchestration run.
///
/// Concurrent runs each get their own context, so counters and span
/// fields never mix between runs.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    metrics: Arc<Metrics>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(Metrics::new()))
    }

    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            metrics,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Span wrapping one descriptor's pipeline
    pub fn pipeline_span(&self, package: &str) -> Span {
        tracing::info_span!("pipeline", run_id = %self.run_id, package = %package)
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
