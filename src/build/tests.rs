//! Orchestrator tests driving real `sh` scripts as toolchain steps.

#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use super::*;
use crate::config::{RecipeConfig, ToolConfig};

struct Fixture {
    _temp: TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let dir = crate::utils::normalize_path(temp.path());
        let root = dir.join("main.tex");
        fs::write(&root, "\\documentclass{article}").unwrap();
        Self { _temp: temp, root }
    }

    fn output(&self) -> PathBuf {
        self.root.with_extension("pdf")
    }
}

/// Orchestrator whose recipe runs each script with `sh -c` in order.
fn orchestrator(scripts: &[&str], timeout_ms: u64) -> BuildOrchestrator {
    let tools: Vec<ToolConfig> = scripts
        .iter()
        .enumerate()
        .map(|(i, script)| ToolConfig {
            name: format!("step{i}"),
            command: "sh".into(),
            args: vec!["-c".into(), (*script).into()],
            env: Default::default(),
        })
        .collect();
    let config = BuildConfig {
        recipe: "test".into(),
        recipes: vec![RecipeConfig {
            name: "test".into(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
        }],
        tools,
        step_timeout_ms: timeout_ms,
        ..BuildConfig::default()
    };
    BuildOrchestrator::new(&config).unwrap()
}

const WRITE_PDF: &str = "echo pdf > %DOCFILE%.pdf";

#[tokio::test]
async fn test_success() {
    let fx = Fixture::new();
    let outcome = orchestrator(&[WRITE_PDF], 10_000)
        .build(&fx.root)
        .await
        .unwrap();

    assert_eq!(outcome.kind, OutcomeKind::Success);
    assert_eq!(outcome.steps.len(), 1);
    assert_eq!(outcome.steps[0].status, StepStatus::Ok);
    assert_eq!(outcome.artifacts.output, fx.output());
    assert!(fx.output().exists());
}

#[tokio::test]
async fn test_nonzero_exit_with_artifact_is_partial_success() {
    let fx = Fixture::new();
    let outcome = orchestrator(
        &["echo '! Undefined control sequence.'; echo pdf > %DOCFILE%.pdf; exit 1"],
        10_000,
    )
    .build(&fx.root)
    .await
    .unwrap();

    assert_eq!(outcome.kind, OutcomeKind::PartialSuccess);
    assert!(matches!(
        outcome.steps[0].status,
        StepStatus::Recoverable { code: Some(1) }
    ));
    assert!(!outcome.diagnostics.is_empty());
    assert!(!outcome.detail().is_empty());
}

#[tokio::test]
async fn test_nonzero_exit_without_artifact_is_failure() {
    let fx = Fixture::new();
    let outcome = orchestrator(&["echo '! Emergency stop.'; exit 1"], 10_000)
        .build(&fx.root)
        .await
        .unwrap();

    assert_eq!(outcome.kind, OutcomeKind::Failure);
    assert!(outcome.detail().contains("Emergency stop"));
}

#[tokio::test]
async fn test_stale_artifact_is_not_produced() {
    let fx = Fixture::new();
    fs::write(fx.output(), "old").unwrap();

    let outcome = orchestrator(&["exit 1"], 10_000)
        .build(&fx.root)
        .await
        .unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Failure);
}

#[tokio::test]
async fn test_clean_exit_without_artifact_is_failure() {
    let fx = Fixture::new();
    let outcome = orchestrator(&["true"], 10_000)
        .build(&fx.root)
        .await
        .unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Failure);
    assert!(outcome.summary().contains("no output"));
}

#[tokio::test]
async fn test_clean_exit_with_untouched_artifact_is_success() {
    let fx = Fixture::new();
    // Up-to-date toolchains exit 0 without rewriting the output.
    let orch = orchestrator(&["test -f %DOCFILE%.pdf || echo pdf > %DOCFILE%.pdf"], 10_000);

    let first = orch.build(&fx.root).await.unwrap();
    assert_eq!(first.kind, OutcomeKind::Success);
    let second = orch.build(&fx.root).await.unwrap();
    assert_eq!(second.kind, OutcomeKind::Success);
    assert_eq!(fs::read_to_string(fx.output()).unwrap(), "pdf\n");
}

#[tokio::test]
async fn test_tool_output_is_scanned_for_diagnostics() {
    let fx = Fixture::new();
    let script = format!("echo 'This is pdfTeX'; echo 'LaTeX Warning: Citation undefined.'; {WRITE_PDF}");
    let orch = orchestrator(&[script.as_str()], 10_000);

    let outcome = orch.build(&fx.root).await.unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Success);
    assert_eq!(outcome.diagnostics.warnings.len(), 1);
    assert!(!orch.is_running(&fx.root));
}

async fn explode() -> BuildOutcome {
    panic!("diagnostics blew up");
}

#[tokio::test]
async fn test_crashed_job_frees_slot_and_fails() {
    let fx = Fixture::new();
    let orch = orchestrator(&[WRITE_PDF], 10_000);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let (id, _cancel) = orch.claim(&fx.root).unwrap();
    assert!(orch.is_running(&fx.root));
    supervise(Arc::clone(&orch.inner), id, fx.root.clone(), explode(), tx).await;

    let outcome = rx.recv().await.unwrap();
    assert_eq!(outcome.job, id);
    assert_eq!(outcome.kind, OutcomeKind::Failure);
    assert!(outcome.summary().contains("crashed"));
    assert!(outcome.detail().contains("build task crashed"));
    assert!(!orch.is_running(&fx.root));

    // The root can be built again.
    let next = orch.build(&fx.root).await.unwrap();
    assert_eq!(next.kind, OutcomeKind::Success);
}

#[tokio::test]
async fn test_fatal_step_aborts_sequence() {
    let fx = Fixture::new();
    let outcome = orchestrator(&["exit 2", WRITE_PDF], 10_000)
        .build(&fx.root)
        .await
        .unwrap();

    assert_eq!(outcome.kind, OutcomeKind::Failure);
    assert_eq!(outcome.steps.len(), 1);
    assert!(!fx.output().exists());
}

#[tokio::test]
async fn test_recoverable_step_continues() {
    let fx = Fixture::new();
    let first = format!("{WRITE_PDF}; exit 1");
    let outcome = orchestrator(&[first.as_str(), "echo second"], 10_000)
        .build(&fx.root)
        .await
        .unwrap();

    assert_eq!(outcome.steps.len(), 2);
    assert_eq!(outcome.kind, OutcomeKind::PartialSuccess);
}

#[tokio::test]
async fn test_timeout_is_fatal() {
    let fx = Fixture::new();
    let outcome = orchestrator(&["sleep 30"], 200)
        .build(&fx.root)
        .await
        .unwrap();

    assert_eq!(outcome.kind, OutcomeKind::Failure);
    assert_eq!(outcome.steps[0].status, StepStatus::TimedOut);
    assert!(outcome.duration < Duration::from_secs(10));
}

#[tokio::test]
async fn test_spawn_failure_is_fatal() {
    let fx = Fixture::new();
    let config = BuildConfig {
        recipe: "ghost".into(),
        tools: vec![ToolConfig {
            name: "ghost".into(),
            command: "texwatch-no-such-binary".into(),
            args: vec![],
            env: Default::default(),
        }],
        recipes: vec![RecipeConfig {
            name: "ghost".into(),
            tools: vec!["ghost".into()],
        }],
        ..BuildConfig::default()
    };
    let outcome = BuildOrchestrator::new(&config)
        .unwrap()
        .build(&fx.root)
        .await
        .unwrap();

    assert_eq!(outcome.kind, OutcomeKind::Failure);
    assert!(matches!(outcome.steps[0].status, StepStatus::SpawnFailed(_)));
    assert!(outcome.detail().contains("could not start"));
}

#[tokio::test]
async fn test_one_job_per_root() {
    let fx = Fixture::new();
    let orch = orchestrator(&["sleep 30"], 60_000);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let first = orch.start(&fx.root, tx.clone()).unwrap();
    assert!(matches!(
        orch.start(&fx.root, tx.clone()),
        Err(BuildError::InFlight(_))
    ));
    assert!(orch.is_running(&fx.root));

    assert!(orch.cancel(&fx.root));
    let outcome = rx.recv().await.unwrap();
    assert_eq!(outcome.job, first);
    assert_eq!(outcome.kind, OutcomeKind::Cancelled);
    assert!(!orch.is_running(&fx.root));

    // The slot is free again once the outcome has been delivered.
    let second = orch.start(&fx.root, tx).unwrap();
    assert_ne!(first, second);
    orch.cancel(&fx.root);
}

#[tokio::test]
async fn test_cancelled_job_keeps_no_artifact_credit() {
    let fx = Fixture::new();
    let script = format!("{WRITE_PDF}; sleep 30");
    let orch = orchestrator(&[script.as_str()], 60_000);
    let (tx, mut rx) = mpsc::unbounded_channel();

    orch.start(&fx.root, tx).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    orch.cancel(&fx.root);

    let outcome = rx.recv().await.unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Cancelled);
    assert!(!outcome.kind.is_usable());
}

#[tokio::test]
async fn test_different_roots_build_in_parallel() {
    let a = Fixture::new();
    let b = Fixture::new();
    let script = format!("sleep 0.3; {WRITE_PDF}");
    let orch = orchestrator(&[script.as_str()], 10_000);
    let (tx, mut rx) = mpsc::unbounded_channel();

    orch.start(&a.root, tx.clone()).unwrap();
    orch.start(&b.root, tx).unwrap();
    assert!(orch.is_running(&a.root) && orch.is_running(&b.root));

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.kind, OutcomeKind::Success);
    assert_eq!(second.kind, OutcomeKind::Success);
    assert_ne!(first.root, second.root);
}
