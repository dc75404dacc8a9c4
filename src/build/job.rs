//! Build job records and outcomes.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::diagnostics::Diagnostics;
use super::recipe::Artifacts;

/// Identifies one build attempt.
pub type JobId = u64;

/// How a single toolchain step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Exit code 0.
    Ok,
    /// Non-zero exit, but the output artifact exists from this job.
    Recoverable { code: Option<i32> },
    /// Non-zero exit and no output artifact; the sequence stops.
    Fatal { code: Option<i32> },
    /// Exceeded the step timeout; process tree killed.
    TimedOut,
    /// Superseded by a newer trigger; process tree killed.
    Cancelled,
    /// The process could not be started.
    SpawnFailed(String),
    /// The job's task panicked.
    Crashed(String),
}

impl StepStatus {
    /// The step prevents any further step from running.
    pub fn aborts(&self) -> bool {
        !matches!(self, Self::Ok | Self::Recoverable { .. })
    }
}

/// Per-step record kept on the job.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub tool: String,
    pub command: String,
    pub status: StepStatus,
    /// Combined stdout and stderr.
    pub output: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    /// Finished with recoverable step failures.
    PartialSuccess,
    Failure,
    Cancelled,
}

impl OutcomeKind {
    /// The build left a usable output artifact.
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Success | Self::PartialSuccess)
    }
}

/// A compilation attempt while it runs.
#[derive(Debug)]
pub struct BuildJob {
    pub id: JobId,
    pub root: PathBuf,
    pub steps: Vec<String>,
    pub started: Instant,
    pub reports: Vec<StepReport>,
    /// Set when a superseding trigger stopped the job.
    pub cancelled: bool,
}

impl BuildJob {
    pub fn new(id: JobId, root: PathBuf, steps: Vec<String>) -> Self {
        Self {
            id,
            root,
            steps,
            started: Instant::now(),
            reports: Vec::new(),
            cancelled: false,
        }
    }

    /// Classify the finished job.
    ///
    /// `exists` tells whether the output artifact is on disk now. A step
    /// that exits 0 may leave an up-to-date artifact untouched.
    pub fn finish(self, exists: bool, artifacts: Artifacts) -> BuildOutcome {
        let kind = if self.cancelled {
            OutcomeKind::Cancelled
        } else {
            classify(&self.reports, exists)
        };
        let mut diagnostics = Diagnostics::default();
        for report in &self.reports {
            diagnostics.merge(Diagnostics::extract(&report.output));
        }

        BuildOutcome {
            job: self.id,
            root: self.root,
            kind,
            duration: self.started.elapsed(),
            diagnostics,
            steps: self.reports,
            artifacts,
        }
    }
}

fn classify(reports: &[StepReport], exists: bool) -> OutcomeKind {
    if reports.iter().any(|r| r.status == StepStatus::Cancelled) {
        return OutcomeKind::Cancelled;
    }
    if reports.iter().any(|r| r.status.aborts()) || !exists {
        return OutcomeKind::Failure;
    }
    if reports
        .iter()
        .any(|r| matches!(r.status, StepStatus::Recoverable { .. }))
    {
        return OutcomeKind::PartialSuccess;
    }
    OutcomeKind::Success
}

/// Final, immutable result of a job.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub job: JobId,
    pub root: PathBuf,
    pub kind: OutcomeKind,
    pub duration: Duration,
    pub steps: Vec<StepReport>,
    pub diagnostics: Diagnostics,
    pub artifacts: Artifacts,
}

impl BuildOutcome {
    /// One-line summary for status displays.
    pub fn summary(&self) -> String {
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ms = self.duration.as_millis();
        match self.kind {
            OutcomeKind::Success => format!("built {name} in {ms}ms"),
            OutcomeKind::PartialSuccess => format!("built {name} with errors in {ms}ms"),
            OutcomeKind::Cancelled => format!("build of {name} cancelled"),
            OutcomeKind::Failure => match self.failed_step() {
                Some(StepReport {
                    status: StepStatus::Crashed(_),
                    ..
                }) => format!("build of {name} crashed"),
                Some(step) => format!("build of {name} failed at `{}`", step.tool),
                None => format!("build of {name} produced no output"),
            },
        }
    }

    /// Diagnostic text for the status detail line.
    pub fn detail(&self) -> String {
        if let Some(step) = self.failed_step() {
            match &step.status {
                StepStatus::TimedOut => return format!("`{}` timed out", step.command),
                StepStatus::SpawnFailed(err) => {
                    return format!("could not start `{}`: {err}", step.command);
                }
                StepStatus::Crashed(err) => return format!("build task crashed: {err}"),
                _ => {}
            }
        }
        if !self.diagnostics.errors.is_empty() {
            return self.diagnostics.errors.join("\n");
        }
        if let Some(headline) = self.diagnostics.headline() {
            return headline.to_string();
        }
        self.steps
            .last()
            .map(|s| tail(&s.output, 5))
            .unwrap_or_default()
    }

    fn failed_step(&self) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.status.aborts())
    }
}

/// Last `n` non-empty lines.
fn tail(text: &str, n: usize) -> String {
    let lines: Vec<_> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: StepStatus) -> StepReport {
        StepReport {
            tool: "pdflatex".into(),
            command: "pdflatex main".into(),
            status,
            output: String::new(),
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_classify() {
        use StepStatus::*;
        assert_eq!(classify(&[report(Ok)], true), OutcomeKind::Success);
        assert_eq!(classify(&[report(Ok)], false), OutcomeKind::Failure);
        assert_eq!(
            classify(&[report(Recoverable { code: Some(1) }), report(Ok)], true),
            OutcomeKind::PartialSuccess
        );
        assert_eq!(
            classify(&[report(Recoverable { code: Some(1) }), report(Fatal { code: Some(1) })], true),
            OutcomeKind::Failure
        );
        assert_eq!(classify(&[report(TimedOut)], true), OutcomeKind::Failure);
        assert_eq!(classify(&[report(Cancelled)], true), OutcomeKind::Cancelled);
        assert_eq!(
            classify(&[report(Crashed("boom".into()))], true),
            OutcomeKind::Failure
        );
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\n\nb\nc\n", 2), "b\nc");
        assert_eq!(tail("", 3), "");
    }
}
