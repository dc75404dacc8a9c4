//! Build orchestration.
//!
//! Runs the selected recipe against a root document as a background task:
//!
//! ```text
//! start(root) ──► [permit] ──► step 1 ──► step 2 ──► ... ──► BuildOutcome
//!                                 │           │
//!                           cancel/timeout: kill process group, stop
//! ```
//!
//! At most one job runs per root. The orchestrator never decides *when* to
//! build; that is the trigger coordinator's job. It only reports outcomes.

mod artifact;
pub mod diagnostics;
pub mod exec;
pub mod job;
pub mod recipe;

#[cfg(test)]
mod tests;

pub use job::{BuildOutcome, JobId, OutcomeKind, StepReport, StepStatus};
pub use recipe::{Artifacts, Recipe};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc, watch};

use crate::config::{BuildConfig, ConfigError};
use artifact::ArtifactSnapshot;
use exec::Exit;
use job::BuildJob;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("a build of `{0}` is already running")]
    InFlight(PathBuf),

    #[error("build task of `{0}` ended without an outcome")]
    Aborted(PathBuf),
}

struct InFlight {
    id: JobId,
    cancel: watch::Sender<bool>,
}

struct Inner {
    recipe: Recipe,
    step_timeout: Duration,
    permits: Semaphore,
    in_flight: Mutex<FxHashMap<PathBuf, InFlight>>,
    next_id: AtomicU64,
}

/// Runs build jobs. Cheap to clone.
#[derive(Clone)]
pub struct BuildOrchestrator {
    inner: Arc<Inner>,
}

impl BuildOrchestrator {
    pub fn new(config: &BuildConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            inner: Arc::new(Inner {
                recipe: Recipe::from_config(config)?,
                step_timeout: Duration::from_millis(config.step_timeout_ms),
                permits: Semaphore::new(config.max_parallel.max(1)),
                in_flight: Mutex::new(FxHashMap::default()),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn recipe(&self) -> &Recipe {
        &self.inner.recipe
    }

    /// Start building `root` in the background.
    ///
    /// The outcome is sent on `done` after the job has left the in-flight
    /// table, so the receiver may immediately start the next build.
    pub fn start(
        &self,
        root: &Path,
        done: mpsc::UnboundedSender<BuildOutcome>,
    ) -> Result<JobId, BuildError> {
        let root = root.to_path_buf();
        let (id, cancel_rx) = self.claim(&root)?;
        crate::debug!("build"; "job {} started for {}", id, root.display());

        let inner = Arc::clone(&self.inner);
        let job = {
            let inner = Arc::clone(&inner);
            let root = root.clone();
            async move { inner.run(id, &root, cancel_rx).await }
        };
        tokio::spawn(supervise(inner, id, root, job, done));
        Ok(id)
    }

    /// Reserve the in-flight slot of `root`.
    fn claim(&self, root: &Path) -> Result<(JobId, watch::Receiver<bool>), BuildError> {
        let mut in_flight = self.inner.in_flight.lock();
        if in_flight.contains_key(root) {
            return Err(BuildError::InFlight(root.to_path_buf()));
        }
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        in_flight.insert(
            root.to_path_buf(),
            InFlight {
                id,
                cancel: cancel_tx,
            },
        );
        Ok((id, cancel_rx))
    }

    /// Build `root` and wait for the outcome.
    pub async fn build(&self, root: &Path) -> Result<BuildOutcome, BuildError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.start(root, tx)?;
        rx.recv()
            .await
            .ok_or_else(|| BuildError::Aborted(root.to_path_buf()))
    }

    /// Cancel the running job of `root`. Returns whether one was running.
    pub fn cancel(&self, root: &Path) -> bool {
        let in_flight = self.inner.in_flight.lock();
        match in_flight.get(root) {
            Some(job) => {
                let _ = job.cancel.send(true);
                crate::debug!("build"; "cancelling job {} for {}", job.id, root.display());
                true
            }
            None => false,
        }
    }

    /// Cancel every running job.
    pub fn cancel_all(&self) {
        for job in self.inner.in_flight.lock().values() {
            let _ = job.cancel.send(true);
        }
    }

    pub fn running_count(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    pub fn is_running(&self, root: &Path) -> bool {
        self.inner.in_flight.lock().contains_key(root)
    }
}

/// Releases the in-flight slot of a job when dropped.
struct Slot {
    inner: Arc<Inner>,
    root: PathBuf,
    id: JobId,
}

impl Drop for Slot {
    fn drop(&mut self) {
        let mut in_flight = self.inner.in_flight.lock();
        if in_flight.get(&self.root).is_some_and(|job| job.id == self.id) {
            in_flight.remove(&self.root);
        }
    }
}

/// Run `job` on its own task and deliver exactly one outcome.
///
/// A panicking job becomes a `Failure`. The slot is free before the
/// outcome is sent.
async fn supervise<F>(
    inner: Arc<Inner>,
    id: JobId,
    root: PathBuf,
    job: F,
    done: mpsc::UnboundedSender<BuildOutcome>,
) where
    F: Future<Output = BuildOutcome> + Send + 'static,
{
    let slot = Slot {
        inner: Arc::clone(&inner),
        root,
        id,
    };
    let outcome = match tokio::spawn(job).await {
        Ok(outcome) => outcome,
        Err(err) => {
            crate::log!("build"; "job {} for {} crashed: {}", id, slot.root.display(), err);
            inner.crashed(id, &slot.root, err.to_string())
        }
    };
    drop(slot);
    let _ = done.send(outcome);
}

impl Inner {
    fn crashed(&self, id: JobId, root: &Path, reason: String) -> BuildOutcome {
        let plan = self.recipe.plan(root);
        let mut job = BuildJob::new(
            id,
            root.to_path_buf(),
            plan.steps.iter().map(|s| s.name.clone()).collect(),
        );
        job.reports.push(StepReport {
            tool: self.recipe.name().to_string(),
            command: String::new(),
            status: StepStatus::Crashed(reason),
            output: String::new(),
            duration: job.started.elapsed(),
        });
        let exists = plan.artifacts.output.is_file();
        job.finish(exists, plan.artifacts)
    }

    async fn run(&self, id: JobId, root: &Path, mut cancel: watch::Receiver<bool>) -> BuildOutcome {
        let plan = self.recipe.plan(root);
        let mut job = BuildJob::new(
            id,
            root.to_path_buf(),
            plan.steps.iter().map(|s| s.name.clone()).collect(),
        );

        let _permit = tokio::select! {
            permit = self.permits.acquire() => permit.ok(),
            _ = exec::wait_cancelled(&mut cancel) => {
                job.cancelled = true;
                return job.finish(false, plan.artifacts);
            }
        };

        if let Err(err) = tokio::fs::create_dir_all(&plan.artifacts.outdir).await {
            crate::debug!("build"; "cannot create {}: {}", plan.artifacts.outdir.display(), err);
        }

        let snapshot = ArtifactSnapshot::capture(&plan.artifacts.output);

        for step in &plan.steps {
            let started = Instant::now();
            crate::debug!("build"; "[{}] {}", step.name, step.display());

            let (status, output) =
                match exec::run_step(step, &plan.cwd, self.step_timeout, &mut cancel).await {
                    Ok(run) => {
                        let status = match run.exit {
                            Exit::Exited(code) if code.success() => StepStatus::Ok,
                            Exit::Exited(code) => {
                                if snapshot.produced_since(&plan.artifacts.output) {
                                    StepStatus::Recoverable { code: code.code() }
                                } else {
                                    StepStatus::Fatal { code: code.code() }
                                }
                            }
                            Exit::TimedOut => StepStatus::TimedOut,
                            Exit::Cancelled => StepStatus::Cancelled,
                        };
                        (status, run.output)
                    }
                    Err(err) => (StepStatus::SpawnFailed(err.to_string()), String::new()),
                };

            let aborts = status.aborts();
            job.cancelled |= status == StepStatus::Cancelled;
            job.reports.push(StepReport {
                tool: step.name.clone(),
                command: step.display(),
                status,
                output,
                duration: started.elapsed(),
            });

            if aborts {
                break;
            }
        }

        let exists = plan.artifacts.output.is_file();
        job.finish(exists, plan.artifacts)
    }
}
