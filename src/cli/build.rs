//! `texwatch build`: one build of the project containing a file.

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::build::{BuildOrchestrator, BuildOutcome, OutcomeKind, StepStatus};
use crate::config::ProjectConfig;
use crate::logger::{is_verbose, status_error, status_success, status_warning};
use crate::root::RootResolver;
use crate::utils::path::display_relative;

pub fn build_once(config: &ProjectConfig, file: &Path) -> Result<()> {
    let mut resolver = RootResolver::new(&config.watch, config.workspace());
    let root = resolver.resolve_root(file)?;
    let orchestrator = BuildOrchestrator::new(&config.build)?;
    crate::log!("build"; "{} with `{}`",
        display_relative(&root, config.workspace()), orchestrator.recipe().name());

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    let outcome = rt.block_on(orchestrator.build(&root))?;

    report(&outcome);
    match outcome.kind {
        OutcomeKind::Success | OutcomeKind::PartialSuccess => {
            println!("{}", outcome.artifacts.output.display());
            Ok(())
        }
        OutcomeKind::Failure => bail!("{}", outcome.summary()),
        OutcomeKind::Cancelled => bail!("build cancelled"),
    }
}

fn report(outcome: &BuildOutcome) {
    if is_verbose() {
        for step in &outcome.steps {
            let state = match &step.status {
                StepStatus::Ok => "ok".to_string(),
                other => format!("{other:?}"),
            };
            crate::debug!("step"; "{} ({}ms): {}", step.tool, step.duration.as_millis(), state);
        }
    }

    let summary = outcome.summary();
    match outcome.kind {
        OutcomeKind::Success => status_success(&summary),
        OutcomeKind::PartialSuccess => status_warning(
            &summary,
            outcome.diagnostics.headline().unwrap_or_default(),
        ),
        OutcomeKind::Failure | OutcomeKind::Cancelled => status_error(&summary, &outcome.detail()),
    }
}
