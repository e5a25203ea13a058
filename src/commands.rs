use pkgforge::config::Config;
use pkgforge::digest::{DEFAULT_CHUNK_SIZE, Digester};
use pkgforge::handlers::{HandlerRegistry, Resolution};
use pkgforge::humanize::format_elapsed;
use pkgforge::observability::RunContext;
use pkgforge::orchestrator::{BuildReport, Orchestrator};
use pkgforge::package::{Manifest, PackageDescriptor};
use pkgforge::process::{CommandRunner, RecordingRunner, SystemRunner};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{BuildArgs, CheckArgs, HashArgs};

type CommandResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

fn load_config(path: Option<&Path>) -> CommandResult<Config> {
    let config = match path {
        Some(path) => Config::load_from_path(path.to_path_buf())?,
        None => Config::load()?,
    };
    Ok(config)
}

fn load_descriptors(manifest: &Path, only: &[String]) -> CommandResult<Vec<PackageDescriptor>> {
    let descriptors = Manifest::load(manifest)?.into_descriptors()?;
    if only.is_empty() {
        return Ok(descriptors);
    }

    for name in only {
        if !descriptors.iter().any(|d| d.name() == name) {
            warn!(package = %name, "--only names a package missing from the manifest");
        }
    }
    Ok(descriptors
        .into_iter()
        .filter(|d| only.iter().any(|name| name == d.name()))
        .collect())
}

/// Returns true when every package reached `Done`
pub async fn build(args: BuildArgs) -> CommandResult<bool> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(jobs) = args.jobs {
        config.orchestrator.max_concurrent = jobs;
    }
    let descriptors = load_descriptors(&args.manifest, &args.only)?;

    let runner: Arc<dyn CommandRunner> = if args.dry_run {
        info!("dry run: commands are recorded, not executed");
        Arc::new(RecordingRunner::new())
    } else {
        Arc::new(SystemRunner::new())
    };

    let orchestrator = Arc::new(Orchestrator::from_config(&config, runner));
    let ctx = RunContext::new();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signals = tokio::spawn(async move {
        shutdown_signal().await;
        on_signal.cancel();
    });

    let reports = orchestrator
        .run_batch_with_cancel(descriptors, &ctx, cancel)
        .await;
    signals.abort();

    print_summary(&reports);
    let snapshot = ctx.metrics().snapshot();
    info!(
        run_id = %ctx.run_id(),
        done = snapshot.descriptors_done,
        failed = snapshot.descriptors_failed,
        clones_reused = snapshot.clones_reused,
        hashes_skipped = snapshot.hashes_skipped,
        subprocesses = snapshot.subprocesses_spawned,
        "run complete"
    );

    if let Some(path) = args.report {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "run_id": ctx.run_id(),
            "metrics": snapshot,
            "reports": reports,
        }))?;
        tokio::fs::write(&path, json).await?;
        info!(path = %path.display(), "report written");
    }

    Ok(reports.iter().all(BuildReport::is_done))
}

fn print_summary(reports: &[BuildReport]) {
    for report in reports {
        let descriptor = &report.descriptor;
        match &report.error {
            None => println!(
                "done    {:<24} {:<10} {} [{}]",
                descriptor.name(),
                report.handler.as_deref().unwrap_or("-"),
                descriptor.digest().unwrap_or("-"),
                format_elapsed(report.elapsed),
            ),
            Some(err) => println!(
                "failed  {:<24} at {:<10} {}",
                descriptor.name(),
                report.failed_at.map(|s| s.as_str()).unwrap_or("-"),
                err,
            ),
        }
    }
}

pub async fn hash(args: HashArgs) -> CommandResult<()> {
    let hex = Digester::new(args.algorithm, DEFAULT_CHUNK_SIZE)
        .digest(&args.path)
        .await?;
    println!("{hex}  {}", args.path.display());
    Ok(())
}

/// Returns true when the manifest is valid
pub async fn check(args: CheckArgs) -> CommandResult<bool> {
    let config = load_config(args.config.as_deref())?;
    let descriptors = load_descriptors(&args.manifest, &[])?;
    let registry = HandlerRegistry::from_config(&config);

    let mut valid = true;
    for descriptor in &descriptors {
        match descriptor.build_system() {
            Some(build_system) => {
                let (handler, resolution) = registry.resolve(descriptor.name(), build_system);
                let via = match resolution {
                    Resolution::Override => "override",
                    Resolution::BuildSystem => "build system",
                    Resolution::Fallback => "fallback",
                };
                println!("{:<24} {:<18} -> {} ({via})", descriptor.name(), build_system.as_str(), handler.name());
            }
            None => {
                valid = false;
                println!("{:<24} {:<18} -> no build system", descriptor.name(), "-");
            }
        }
    }
    Ok(valid)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("shutdown signal received, cancelling in-flight builds");
}
