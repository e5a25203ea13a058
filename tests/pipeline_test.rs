//! End-to-end pipeline tests against real processes
//!
//! Build tools are stood in for by `/bin/sh` and small scripts written into
//! temp directories. Tests that need `make` skip themselves when it is not
//! installed.

#![cfg(unix)]

use pkgforge::acquire::{AcquireError, SourceAcquirer};
use pkgforge::digest::{self, DigestError, HashAlgorithm};
use pkgforge::handlers::{HandlerError, HandlerRegistry, StepsHandler};
use pkgforge::observability::RunContext;
use pkgforge::orchestrator::{Orchestrator, PipelineError, PipelineState};
use pkgforge::package::{BuildSystem, Manifest, Origin, PackageDescriptor, keys};
use pkgforge::process::{RecordingRunner, SystemRunner};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A `git` stand-in that logs each call and creates the clone target
fn fake_git(dir: &Path) -> (PathBuf, PathBuf) {
    let log = dir.join("git.log");
    let script = write_script(
        dir,
        "git",
        &format!(
            r#"echo "$@" >> "{log}"
for last; do :; done
mkdir -p "$last" && echo "cloned" > "$last/README""#,
            log = log.display()
        ),
    );
    (script, log)
}

fn call_count(log: &Path) -> usize {
    std::fs::read_to_string(log)
        .map(|content| content.lines().count())
        .unwrap_or(0)
}

fn system_orchestrator(clone_root: &Path) -> Orchestrator {
    Orchestrator::new(Arc::new(SystemRunner::new()))
        .with_acquirer(SourceAcquirer::new(clone_root))
}

#[tokio::test]
async fn test_local_make_package_reaches_done() {
    if which::which("make").is_err() {
        eprintln!("make not installed, skipping");
        return;
    }

    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("foo");
    std::fs::create_dir(&source).unwrap();
    std::fs::write(source.join("Makefile"), "all:\n\t@echo built > foo.bin\n").unwrap();

    let ctx = RunContext::new();
    let orchestrator = system_orchestrator(temp_dir.path());
    let foo = PackageDescriptor::new("foo", "1.0", Origin::Local)
        .unwrap()
        .with_location(&source)
        .with_build_system(BuildSystem::Make)
        .with_metadata(keys::ARTIFACT, "foo.bin");

    let report = orchestrator.run(foo, &ctx).await;

    assert!(report.is_done(), "{:?}", report.error);
    assert_eq!(report.last_outcome().unwrap().exit_code, Some(0));
    assert_eq!(report.descriptor.location(), Some(source.join("foo.bin").as_path()));

    let expected = digest::digest(&source.join("foo.bin"), HashAlgorithm::Sha256)
        .await
        .unwrap();
    assert_eq!(report.descriptor.digest(), Some(expected.as_str()));
}

#[tokio::test]
async fn test_unreachable_repository_fails_clone() {
    let temp_dir = TempDir::new().unwrap();
    let git = write_script(
        temp_dir.path(),
        "git",
        "echo \"fatal: unable to access 'https://example.invalid/x.git/'\" >&2\nexit 128",
    );

    let ctx = RunContext::new();
    let orchestrator = system_orchestrator(temp_dir.path())
        .with_acquirer(SourceAcquirer::new(temp_dir.path().join("sources")).git_program(git.to_string_lossy()));
    let bar = PackageDescriptor::new("bar", "2.0", Origin::Git)
        .unwrap()
        .with_build_system(BuildSystem::Make)
        .with_metadata(keys::REPO_URL, "https://example.invalid/x.git");

    let report = orchestrator.run(bar, &ctx).await;

    assert_eq!(report.state, PipelineState::Failed);
    assert_eq!(report.failed_at, Some(PipelineState::Acquiring));
    match &report.error {
        Some(PipelineError::Acquire(AcquireError::CloneFailed { url, outcome, .. })) => {
            assert_eq!(url, "https://example.invalid/x.git");
            assert_eq!(outcome.exit_code, Some(128));
            assert!(outcome.stderr.contains("unable to access"));
        }
        other => panic!("expected CloneFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_git_is_tool_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = RunContext::new();
    let orchestrator = system_orchestrator(temp_dir.path()).with_acquirer(
        SourceAcquirer::new(temp_dir.path()).git_program("pkgforge-no-such-git"),
    );
    let pkg = PackageDescriptor::new("bar", "2.0", Origin::Github)
        .unwrap()
        .with_build_system(BuildSystem::Make)
        .with_metadata(keys::REPO_URL, "https://example.invalid/x.git");

    let report = orchestrator.run(pkg, &ctx).await;

    assert!(matches!(
        report.error,
        Some(PipelineError::Acquire(AcquireError::ToolNotFound { .. }))
    ));
}

#[tokio::test]
async fn test_fresh_clone_then_reuse() {
    let temp_dir = TempDir::new().unwrap();
    let (git, log) = fake_git(temp_dir.path());
    let clone_root = temp_dir.path().join("sources");

    let ctx = RunContext::new();
    let orchestrator = system_orchestrator(temp_dir.path())
        .with_acquirer(SourceAcquirer::new(&clone_root).git_program(git.to_string_lossy()));
    let pkg = PackageDescriptor::new("widget", "0.3", Origin::Git)
        .unwrap()
        .with_build_system(BuildSystem::Scons)
        .with_metadata(keys::REPO_URL, "https://git.example.org/widget.git")
        .with_metadata(keys::GIT_REF, "v0.3");

    let first = orchestrator.run(pkg.clone(), &ctx).await;
    assert!(first.is_done(), "{:?}", first.error);
    assert_eq!(first.descriptor.location(), Some(clone_root.join("widget").as_path()));
    assert_eq!(first.descriptor.get_metadata(keys::ACQUIRED_VIA), Some("clone"));
    assert_eq!(
        first.descriptor.get_metadata(keys::CLONED_FROM),
        Some("https://git.example.org/widget.git")
    );
    assert!(clone_root.join("widget/README").is_file());
    assert_eq!(call_count(&log), 1);
    let logged = std::fs::read_to_string(&log).unwrap();
    assert!(logged.contains("clone --depth 1 --branch v0.3"));

    let second = orchestrator.run(pkg, &ctx).await;
    assert!(second.is_done());
    assert_eq!(second.descriptor.get_metadata(keys::ACQUIRED_VIA), Some("reused"));
    assert_eq!(call_count(&log), 1);
    assert_eq!(ctx.metrics().snapshot().clones_reused, 1);
}

#[tokio::test]
async fn test_concurrent_descriptors_sharing_a_clone_target() {
    let temp_dir = TempDir::new().unwrap();
    let (git, log) = fake_git(temp_dir.path());
    let shared = temp_dir.path().join("shared-checkout");

    let ctx = RunContext::new();
    let orchestrator = Arc::new(
        system_orchestrator(temp_dir.path())
            .with_acquirer(SourceAcquirer::new(temp_dir.path()).git_program(git.to_string_lossy())),
    );
    let batch = ["left", "right"]
        .into_iter()
        .map(|name| {
            PackageDescriptor::new(name, "1.0", Origin::Git)
                .unwrap()
                .with_location(&shared)
                .with_build_system(BuildSystem::Waf)
                .with_metadata(keys::REPO_URL, "https://git.example.org/mono.git")
        })
        .collect();

    let reports = orchestrator.run_batch(batch, &ctx).await;

    assert!(reports.iter().all(|r| r.is_done()));
    assert_eq!(call_count(&log), 1);
    assert_eq!(ctx.metrics().snapshot().clones_reused, 1);
}

#[tokio::test]
async fn test_batch_of_ten_with_one_broken_build() {
    let temp_dir = TempDir::new().unwrap();
    let mut registry = HandlerRegistry::with_defaults();
    registry.register_override(
        "pkg-7",
        BuildSystem::Make,
        Arc::new(StepsHandler::new(
            "broken",
            vec![vec!["sh".into(), "-c".into(), "echo 'error: boom' >&2; exit 3".into()]],
        )),
    );
    // every other package builds through an override that succeeds
    for i in (0..10).filter(|i| *i != 7) {
        registry.register_override(
            format!("pkg-{i}"),
            BuildSystem::Make,
            Arc::new(StepsHandler::new(
                "touch",
                vec![vec!["sh".into(), "-c".into(), "echo {name} > {name}.out".into()]],
            )),
        );
    }

    let ctx = RunContext::new();
    let orchestrator = Arc::new(
        system_orchestrator(temp_dir.path())
            .with_registry(registry)
            .with_max_concurrent(4),
    );
    let batch = (0..10)
        .map(|i| {
            let dir = temp_dir.path().join(format!("pkg-{i}"));
            std::fs::create_dir(&dir).unwrap();
            PackageDescriptor::new(format!("pkg-{i}"), "1.0", Origin::Local)
                .unwrap()
                .with_location(dir)
                .with_build_system(BuildSystem::Make)
        })
        .collect();

    let reports = orchestrator.run_batch(batch, &ctx).await;

    let failed: Vec<_> = reports.iter().filter(|r| r.is_failed()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].descriptor.name(), "pkg-7");
    assert_eq!(failed[0].failed_at, Some(PipelineState::Building));
    let outcome = failed[0].error.as_ref().and_then(PipelineError::outcome).unwrap();
    assert_eq!(outcome.exit_code, Some(3));
    assert!(outcome.stderr.contains("boom"));

    for report in reports.iter().filter(|r| r.is_done()) {
        let name = report.descriptor.name();
        assert_eq!(report.handler.as_deref(), Some("touch"));
        assert_eq!(report.outcomes.len(), 1);
        let written = temp_dir.path().join(name).join(format!("{name}.out"));
        assert_eq!(std::fs::read_to_string(written).unwrap().trim(), name);
    }
    assert_eq!(ctx.metrics().snapshot().descriptors_done, 9);
}

#[tokio::test]
async fn test_no_build_system_never_spawns() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = RunContext::new();
    let orchestrator = system_orchestrator(temp_dir.path());
    let pkg = PackageDescriptor::new("orphan", "1.0", Origin::Local)
        .unwrap()
        .with_location(temp_dir.path());

    let report = orchestrator.run(pkg, &ctx).await;

    assert_eq!(report.failed_at, Some(PipelineState::Acquired));
    assert!(matches!(report.error, Some(PipelineError::NoBuildSystem(_))));
    assert_eq!(ctx.metrics().snapshot().subprocesses_spawned, 0);
}

#[tokio::test]
async fn test_cancel_kills_running_build() {
    let temp_dir = TempDir::new().unwrap();
    let marker = temp_dir.path().join("finished");
    let mut registry = HandlerRegistry::with_defaults();
    registry.register_override(
        "slow",
        BuildSystem::Make,
        Arc::new(StepsHandler::new(
            "slow",
            vec![vec![
                "sh".into(),
                "-c".into(),
                format!("sleep 5 && touch {}", marker.display()),
            ]],
        )),
    );

    let ctx = RunContext::new();
    let orchestrator = Arc::new(
        system_orchestrator(temp_dir.path()).with_registry(registry),
    );
    let pkg = PackageDescriptor::new("slow", "1.0", Origin::Local)
        .unwrap()
        .with_location(temp_dir.path())
        .with_build_system(BuildSystem::Make);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let reports = tokio::time::timeout(
        Duration::from_secs(4),
        orchestrator.run_batch_with_cancel(vec![pkg], &ctx, cancel),
    )
    .await
    .expect("cancelled batch should return promptly");

    assert!(matches!(reports[0].error, Some(PipelineError::Cancelled)));
    assert_eq!(reports[0].failed_at, Some(PipelineState::Building));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(!marker.exists(), "build process outlived its cancelled pipeline");
}

#[tokio::test]
async fn test_digest_determinism_and_not_a_file() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("artifact.tar");
    std::fs::write(&file, vec![7u8; 200_000]).unwrap();

    let first = digest::digest(&file, HashAlgorithm::Sha256).await.unwrap();
    let second = digest::digest(&file, HashAlgorithm::Sha256).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 64);

    let missing = digest::digest(&temp_dir.path().join("missing"), HashAlgorithm::Sha256).await;
    assert!(matches!(missing, Err(DigestError::NotAFile(_))));
    let dir = digest::digest(temp_dir.path(), HashAlgorithm::Md5).await;
    assert!(matches!(dir, Err(DigestError::NotAFile(_))));
}

#[tokio::test]
async fn test_manifest_drives_a_batch() {
    let temp_dir = TempDir::new().unwrap();
    let manifest = format!(
        r#"
[[packages]]
name = "docs"
version = "1.2"
origin = "local"
location = "{dir}"
build_system = "waf"

[[packages]]
name = "bare"
version = "0.1"
origin = "local"
location = "{dir}"
"#,
        dir = temp_dir.path().display()
    );
    let descriptors = Manifest::from_toml(&manifest).unwrap().into_descriptors().unwrap();

    let ctx = RunContext::new();
    let orchestrator = Arc::new(system_orchestrator(temp_dir.path()));
    let reports = orchestrator.run_batch(descriptors, &ctx).await;

    assert_eq!(reports[0].descriptor.name(), "docs");
    assert!(reports[0].is_done());
    assert_eq!(reports[0].handler.as_deref(), Some("generic"));
    assert!(reports[1].is_failed());
}

/// A `cmake` stand-in: configure needs `CMakeLists.txt`, the build step
/// exits with `build_exit`
fn fake_cmake(dir: &Path, build_exit: i32) -> PathBuf {
    write_script(
        dir,
        "cmake",
        &format!(
            r#"case "$1" in
  -S) test -f "$2/CMakeLists.txt" || {{ echo "no CMakeLists.txt in $2" >&2; exit 1; }}; echo configured ;;
  --build) test "{build_exit}" = 0 || echo "compile error" >&2; exit {build_exit} ;;
esac"#
        ),
    )
}

fn cmake_registry(cmake: &Path) -> HandlerRegistry {
    let mut registry = HandlerRegistry::with_defaults();
    registry.register(
        BuildSystem::Cmake,
        Arc::new(StepsHandler::cmake(&cmake.to_string_lossy())),
    );
    registry
}

#[tokio::test]
async fn test_cmake_build_failure_reports_every_step() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("engine");
    std::fs::create_dir(&source).unwrap();
    std::fs::write(source.join("CMakeLists.txt"), "project(engine)\n").unwrap();
    let cmake = fake_cmake(temp_dir.path(), 2);

    let ctx = RunContext::new();
    let orchestrator = system_orchestrator(temp_dir.path()).with_registry(cmake_registry(&cmake));
    let pkg = PackageDescriptor::new("engine", "4.1", Origin::Local)
        .unwrap()
        .with_location(&source)
        .with_build_system(BuildSystem::Cmake);

    let report = orchestrator.run(pkg, &ctx).await;

    assert_eq!(report.failed_at, Some(PipelineState::Building));
    assert!(matches!(
        report.error,
        Some(PipelineError::Build(HandlerError::BuildFailed { .. }))
    ));
    assert_eq!(report.outcomes.len(), 2);
    assert!(report.outcomes[0].is_success());
    assert_eq!(report.outcomes[0].stdout, "configured\n");
    assert_eq!(report.outcomes[1].exit_code, Some(2));
    assert!(report.outcomes[1].stderr.contains("compile error"));
    assert_eq!(ctx.metrics().snapshot().subprocesses_spawned, 2);
}

#[tokio::test]
async fn test_dry_run_leaves_clone_target_for_the_real_run() {
    let temp_dir = TempDir::new().unwrap();
    let log = temp_dir.path().join("git.log");
    let git = write_script(
        temp_dir.path(),
        "git",
        &format!(
            r#"echo "$@" >> "{log}"
for last; do :; done
mkdir -p "$last" && echo "project(w)" > "$last/CMakeLists.txt""#,
            log = log.display()
        ),
    );
    let cmake = fake_cmake(temp_dir.path(), 0);
    let clone_root = temp_dir.path().join("sources");
    let acquirer = || SourceAcquirer::new(&clone_root).git_program(git.to_string_lossy());
    let pkg = PackageDescriptor::new("w", "1.0", Origin::Git)
        .unwrap()
        .with_build_system(BuildSystem::Cmake)
        .with_metadata(keys::REPO_URL, "https://git.example.org/w.git");

    let recorder = Arc::new(RecordingRunner::new());
    let dry = Orchestrator::new(recorder.clone())
        .with_acquirer(acquirer())
        .with_registry(cmake_registry(&cmake));
    let dry_ctx = RunContext::new();
    let planned = dry.run(pkg.clone(), &dry_ctx).await;

    assert!(planned.is_done(), "{:?}", planned.error);
    assert_eq!(recorder.invocations().len(), 3);
    assert!(!clone_root.exists());
    assert_eq!(call_count(&log), 0);
    assert_eq!(dry_ctx.metrics().snapshot().subprocesses_spawned, 0);

    let real = system_orchestrator(temp_dir.path())
        .with_acquirer(acquirer())
        .with_registry(cmake_registry(&cmake));
    let report = real.run(pkg, &RunContext::new()).await;

    assert!(report.is_done(), "{:?}", report.error);
    assert_eq!(report.descriptor.get_metadata(keys::ACQUIRED_VIA), Some("clone"));
    assert_eq!(call_count(&log), 1);
    assert!(clone_root.join("w/build").is_dir());
}

#[tokio::test]
async fn test_runs_sharing_an_orchestrator_count_their_own_spawns() {
    let temp_dir = TempDir::new().unwrap();
    let mut registry = HandlerRegistry::with_defaults();
    registry.register_override(
        "quick",
        BuildSystem::Make,
        Arc::new(StepsHandler::new("quick", vec![vec!["sh".into(), "-c".into(), "true".into()]])),
    );
    let orchestrator = system_orchestrator(temp_dir.path()).with_registry(registry);
    let pkg = PackageDescriptor::new("quick", "1.0", Origin::Local)
        .unwrap()
        .with_location(temp_dir.path())
        .with_build_system(BuildSystem::Make);

    let first = RunContext::new();
    let second = RunContext::new();
    assert!(orchestrator.run(pkg.clone(), &first).await.is_done());
    assert!(orchestrator.run(pkg.clone(), &second).await.is_done());
    assert!(orchestrator.run(pkg, &second).await.is_done());

    assert_eq!(first.metrics().snapshot().subprocesses_spawned, 1);
    assert_eq!(second.metrics().snapshot().subprocesses_spawned, 2);
}
