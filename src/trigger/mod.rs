//! Build trigger policy.
//!
//! One small state machine per project root:
//!
//! ```text
//!            trigger                     trigger
//!   Idle ─────────────▶ Building ─────────────────▶ BuildingWithPendingRerun
//!    ▲                    │  ▲                                │
//!    └──── complete ──────┘  └────────── complete ────────────┘
//!                                       (rerun starts)
//! ```
//!
//! Change-driven triggers (save, external change) are debounced: each one
//! pushes the project's deadline out by the debounce interval, and the
//! trigger only takes effect once the deadline passes without another
//! event. Manual triggers take effect at once.
//!
//! The coordinator is pure bookkeeping. It never runs builds itself; it
//! tells the caller what to do.

pub mod clock;
pub mod freshness;

pub use clock::{Clock, SystemClock};
pub use freshness::Fingerprints;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::core::Revision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Building,
    BuildingWithPendingRerun,
}

/// Where a trigger came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Explicit build request.
    Manual,
    /// The editor saved a document.
    Saved,
    /// A project file changed on disk.
    Changed,
    /// The periodic check found a newer dependency.
    Periodic,
}

impl TriggerKind {
    fn is_debounced(self) -> bool {
        matches!(self, Self::Saved | Self::Changed)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Saved => "save",
            Self::Changed => "change",
            Self::Periodic => "periodic",
        }
    }
}

/// What the caller must do after a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Start a build now.
    Start,
    /// A build is running; one rerun is queued. Cancel the running job if
    /// `cancel_running`.
    Queued { cancel_running: bool },
    /// Nothing yet; call [`TriggerCoordinator::fire_due`] at `until`.
    Deferred { until: Instant },
}

/// Result of reporting a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// The new revision, if the job produced a usable output.
    pub revision: Option<Revision>,
    /// A queued rerun must be started now.
    pub rerun: bool,
}

#[derive(Debug)]
struct ProjectState {
    phase: Phase,
    revision: Revision,
    /// A debounced trigger fires at this instant.
    deadline: Option<Instant>,
}

impl ProjectState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            revision: 0,
            deadline: None,
        }
    }
}

pub struct TriggerCoordinator<C: Clock = SystemClock> {
    clock: C,
    debounce: Duration,
    cancel_superseded: bool,
    projects: FxHashMap<PathBuf, ProjectState>,
    /// Shared across projects, so a rediscovered project never reuses a
    /// revision its viewers have already seen.
    last_revision: Revision,
}

impl TriggerCoordinator<SystemClock> {
    pub fn new(debounce: Duration, cancel_superseded: bool) -> Self {
        Self::with_clock(SystemClock, debounce, cancel_superseded)
    }
}

impl<C: Clock> TriggerCoordinator<C> {
    pub fn with_clock(clock: C, debounce: Duration, cancel_superseded: bool) -> Self {
        Self {
            clock,
            debounce,
            cancel_superseded,
            projects: FxHashMap::default(),
            last_revision: 0,
        }
    }

    /// Register a trigger for the project of `root`.
    pub fn trigger(&mut self, root: &Path, kind: TriggerKind) -> Decision {
        let now = self.clock.now();
        let debounce = self.debounce;
        let state = self
            .projects
            .entry(root.to_path_buf())
            .or_insert_with(ProjectState::new);

        if kind.is_debounced() && !debounce.is_zero() {
            let until = now + debounce;
            state.deadline = Some(until);
            return Decision::Deferred { until };
        }

        state.deadline = None;
        Self::advance(state, self.cancel_superseded)
    }

    /// Fire every debounced trigger whose deadline has passed.
    pub fn fire_due(&mut self) -> Vec<(PathBuf, Decision)> {
        let now = self.clock.now();
        let cancel = self.cancel_superseded;
        let mut fired: Vec<_> = self
            .projects
            .iter_mut()
            .filter(|(_, state)| state.deadline.is_some_and(|d| d <= now))
            .map(|(root, state)| {
                state.deadline = None;
                (root.clone(), Self::advance(state, cancel))
            })
            .collect();
        fired.sort_by(|a, b| a.0.cmp(&b.0));
        fired
    }

    /// Earliest pending debounce deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.projects.values().filter_map(|s| s.deadline).min()
    }

    /// Report that the running job of `root` finished.
    ///
    /// `usable` is false for failed and cancelled jobs; those leave the
    /// revision untouched.
    pub fn complete(&mut self, root: &Path, usable: bool) -> Completion {
        let Some(state) = self.projects.get_mut(root) else {
            return Completion {
                revision: None,
                rerun: false,
            };
        };

        let revision = usable.then(|| {
            self.last_revision += 1;
            state.revision = self.last_revision;
            state.revision
        });
        let rerun = match state.phase {
            Phase::BuildingWithPendingRerun => {
                state.phase = Phase::Building;
                true
            }
            Phase::Building | Phase::Idle => {
                state.phase = Phase::Idle;
                false
            }
        };
        Completion { revision, rerun }
    }

    /// A build that was decided on could not be started.
    pub fn abandon(&mut self, root: &Path) {
        if let Some(state) = self.projects.get_mut(root) {
            state.phase = Phase::Idle;
        }
    }

    pub fn phase(&self, root: &Path) -> Phase {
        self.projects.get(root).map_or(Phase::Idle, |s| s.phase)
    }

    pub fn revision(&self, root: &Path) -> Revision {
        self.projects.get(root).map_or(0, |s| s.revision)
    }

    pub fn is_building(&self, root: &Path) -> bool {
        self.phase(root) != Phase::Idle
    }

    /// Forget a discarded project. A running build keeps its state until it
    /// completes.
    pub fn remove(&mut self, root: &Path) -> bool {
        if self.is_building(root) {
            return false;
        }
        self.projects.remove(root).is_some()
    }

    fn advance(state: &mut ProjectState, cancel_superseded: bool) -> Decision {
        match state.phase {
            Phase::Idle => {
                state.phase = Phase::Building;
                Decision::Start
            }
            Phase::Building | Phase::BuildingWithPendingRerun => {
                state.phase = Phase::BuildingWithPendingRerun;
                Decision::Queued {
                    cancel_running: cancel_superseded,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::clock::ManualClock;
    use super::*;

    const DEBOUNCE: Duration = Duration::from_millis(300);

    fn coordinator() -> (ManualClock, TriggerCoordinator<ManualClock>) {
        let clock = ManualClock::new();
        let trigger = TriggerCoordinator::with_clock(clock.clone(), DEBOUNCE, true);
        (clock, trigger)
    }

    fn root() -> PathBuf {
        PathBuf::from("/p/main.tex")
    }

    #[test]
    fn test_manual_starts_immediately() {
        let (_clock, mut t) = coordinator();
        assert_eq!(t.trigger(&root(), TriggerKind::Manual), Decision::Start);
        assert_eq!(t.phase(&root()), Phase::Building);
    }

    #[test]
    fn test_triggers_while_building_coalesce_into_one_rerun() {
        let (_clock, mut t) = coordinator();
        assert_eq!(t.trigger(&root(), TriggerKind::Manual), Decision::Start);

        for _ in 0..10 {
            assert_eq!(
                t.trigger(&root(), TriggerKind::Manual),
                Decision::Queued {
                    cancel_running: true
                }
            );
        }
        assert_eq!(t.phase(&root()), Phase::BuildingWithPendingRerun);

        let done = t.complete(&root(), true);
        assert!(done.rerun);
        assert_eq!(t.phase(&root()), Phase::Building);

        let done = t.complete(&root(), true);
        assert!(!done.rerun);
        assert_eq!(t.phase(&root()), Phase::Idle);
    }

    #[test]
    fn test_rapid_changes_collapse_after_debounce() {
        let (clock, mut t) = coordinator();

        for _ in 0..5 {
            assert!(matches!(
                t.trigger(&root(), TriggerKind::Changed),
                Decision::Deferred { .. }
            ));
            clock.advance(Duration::from_millis(100));
            assert!(t.fire_due().is_empty());
        }
        assert_eq!(t.phase(&root()), Phase::Idle);

        clock.advance(DEBOUNCE);
        assert_eq!(t.fire_due(), vec![(root(), Decision::Start)]);
        assert!(t.fire_due().is_empty());
        assert!(t.next_deadline().is_none());
    }

    #[test]
    fn test_manual_bypasses_pending_debounce() {
        let (_clock, mut t) = coordinator();
        t.trigger(&root(), TriggerKind::Saved);
        assert!(t.next_deadline().is_some());

        assert_eq!(t.trigger(&root(), TriggerKind::Manual), Decision::Start);
        assert!(t.next_deadline().is_none());
    }

    #[test]
    fn test_debounced_trigger_during_build_queues_rerun() {
        let (clock, mut t) = coordinator();
        t.trigger(&root(), TriggerKind::Manual);
        t.trigger(&root(), TriggerKind::Saved);
        assert_eq!(t.phase(&root()), Phase::Building);

        clock.advance(DEBOUNCE);
        assert_eq!(
            t.fire_due(),
            vec![(
                root(),
                Decision::Queued {
                    cancel_running: true
                }
            )]
        );
        assert_eq!(t.phase(&root()), Phase::BuildingWithPendingRerun);
    }

    #[test]
    fn test_revision_only_counts_usable_builds() {
        let (_clock, mut t) = coordinator();

        t.trigger(&root(), TriggerKind::Manual);
        assert_eq!(t.complete(&root(), true).revision, Some(1));

        t.trigger(&root(), TriggerKind::Manual);
        assert_eq!(t.complete(&root(), false).revision, None);
        assert_eq!(t.revision(&root()), 1);

        t.trigger(&root(), TriggerKind::Periodic);
        assert_eq!(t.complete(&root(), true).revision, Some(2));
    }

    #[test]
    fn test_cancelled_job_then_rerun_advances_revision_once() {
        let (_clock, mut t) = coordinator();
        t.trigger(&root(), TriggerKind::Manual);
        t.trigger(&root(), TriggerKind::Manual);

        // Superseded job reports cancelled, rerun starts.
        let done = t.complete(&root(), false);
        assert_eq!(done, Completion { revision: None, rerun: true });

        let done = t.complete(&root(), true);
        assert_eq!(done, Completion { revision: Some(1), rerun: false });
    }

    #[test]
    fn test_projects_are_independent() {
        let (_clock, mut t) = coordinator();
        let other = PathBuf::from("/q/main.tex");

        assert_eq!(t.trigger(&root(), TriggerKind::Manual), Decision::Start);
        assert_eq!(t.trigger(&other, TriggerKind::Manual), Decision::Start);
        t.complete(&other, true);

        assert_eq!(t.phase(&root()), Phase::Building);
        assert_eq!(t.revision(&other), 1);
        assert_eq!(t.revision(&root()), 0);
    }

    #[test]
    fn test_no_cancel_when_disabled() {
        let mut t = TriggerCoordinator::with_clock(ManualClock::new(), DEBOUNCE, false);
        t.trigger(&root(), TriggerKind::Manual);
        assert_eq!(
            t.trigger(&root(), TriggerKind::Manual),
            Decision::Queued {
                cancel_running: false
            }
        );
    }

    #[test]
    fn test_zero_debounce_is_immediate() {
        let mut t = TriggerCoordinator::with_clock(ManualClock::new(), Duration::ZERO, true);
        assert_eq!(t.trigger(&root(), TriggerKind::Changed), Decision::Start);
    }

    #[test]
    fn test_remove_keeps_running_project() {
        let (_clock, mut t) = coordinator();
        t.trigger(&root(), TriggerKind::Manual);
        assert!(!t.remove(&root()));

        t.complete(&root(), true);
        assert!(t.remove(&root()));
        assert_eq!(t.revision(&root()), 0);
    }
}
