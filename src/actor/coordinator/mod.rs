//! Coordinator Actor
//!
//! The single writer of all per-project state. Every trigger, build outcome
//! and navigation request passes through its inbox, so project state never
//! needs a lock:
//!
//! ```text
//!  EditorHandle ─┐                        ┌─▶ BuildOrchestrator ─┐
//!  FsActor ──────┼─▶ inbox ─▶ Coordinator ┤                      │ outcome
//!  PreviewHub ───┘              ▲         └─▶ PositionLocator    │
//!                               └────────────────────────────────┘
//! ```

mod runtime;


pub use runtime::run_actors;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::mpsc;

use super::messages::{CoordinatorMsg, FsMsg};
use crate::build::{BuildOrchestrator, BuildOutcome, OutcomeKind};
use crate::config::{ConfigError, ProjectConfig};
use crate::editor::{BuildState, EditorEvent, EditorRequest, MessageLevel};
use crate::locate::{MapStatus, PositionLocator};
use crate::preview::{PreviewEvent, PreviewHub, ViewerClick};
use crate::root::{ResolveError, RootResolver};
use crate::trigger::{Decision, Fingerprints, TriggerCoordinator, TriggerKind};
use crate::utils::normalize_path;

/// How long shutdown waits for cancelled builds to report back.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct Coordinator {
    resolver: RootResolver,
    orchestrator: BuildOrchestrator,
    locator: Arc<PositionLocator>,
    hub: Arc<PreviewHub>,
    trigger: TriggerCoordinator,
    fingerprints: Fingerprints,
    skip_unchanged: bool,
    poll_interval: Option<Duration>,
    /// open document → its root
    open_docs: FxHashMap<PathBuf, PathBuf>,
    /// Roots whose last document closed during a build.
    discard_pending: FxHashSet<PathBuf>,
    inbox: mpsc::UnboundedReceiver<CoordinatorMsg>,
    editor_tx: mpsc::UnboundedSender<EditorRequest>,
    fs_tx: Option<mpsc::UnboundedSender<FsMsg>>,
    done_tx: mpsc::UnboundedSender<BuildOutcome>,
    done_rx: mpsc::UnboundedReceiver<BuildOutcome>,
}

impl Coordinator {
    pub fn new(
        config: &ProjectConfig,
        hub: Arc<PreviewHub>,
        locator: Arc<PositionLocator>,
        inbox: mpsc::UnboundedReceiver<CoordinatorMsg>,
        editor_tx: mpsc::UnboundedSender<EditorRequest>,
    ) -> Result<Self, ConfigError> {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let watch = &config.watch;
        Ok(Self {
            resolver: RootResolver::new(watch, config.workspace()),
            orchestrator: BuildOrchestrator::new(&config.build)?,
            locator,
            hub,
            trigger: TriggerCoordinator::new(
                Duration::from_millis(watch.debounce_ms),
                config.build.cancel_superseded,
            ),
            fingerprints: Fingerprints::new(),
            skip_unchanged: watch.skip_unchanged,
            poll_interval: (watch.poll_interval_ms > 0)
                .then(|| Duration::from_millis(watch.poll_interval_ms)),
            open_docs: FxHashMap::default(),
            discard_pending: FxHashSet::default(),
            inbox,
            editor_tx,
            fs_tx: None,
            done_tx,
            done_rx,
        })
    }

    /// Ask `fs_tx` to watch the directories of every known project.
    pub fn with_watcher(mut self, fs_tx: mpsc::UnboundedSender<FsMsg>) -> Self {
        self.fs_tx = Some(fs_tx);
        self
    }

    /// Run the actor event loop until shutdown.
    pub async fn run(mut self) {
        let mut periodic = self.poll_interval.map(|every| {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval
        });

        loop {
            let deadline = self.trigger.next_deadline();
            tokio::select! {
                Some(outcome) = self.done_rx.recv() => self.on_outcome(outcome).await,
                msg = self.inbox.recv() => match msg {
                    Some(CoordinatorMsg::Shutdown) | None => break,
                    Some(msg) => self.handle(msg),
                },
                () = sleep_until(deadline) => self.fire_due(),
                () = tick(&mut periodic) => self.periodic_check(),
            }
        }

        self.stop().await;
    }

    fn handle(&mut self, msg: CoordinatorMsg) {
        match msg {
            CoordinatorMsg::Editor(event) => self.on_editor(event),
            CoordinatorMsg::FilesChanged(paths) => self.on_files_changed(paths),
            CoordinatorMsg::ViewerClicked(click) => self.on_click(click),
            CoordinatorMsg::Shutdown => {}
        }
    }

    // -------------------------------------------------------------------------
    // Editor events
    // -------------------------------------------------------------------------

    fn on_editor(&mut self, event: EditorEvent) {
        crate::debug!("editor"; "{:?}", event);
        match event {
            EditorEvent::Opened { path } => self.open_document(&path),
            EditorEvent::Closed { path } => self.close_document(&path),
            EditorEvent::Saved { path } => self.on_trigger(&path, TriggerKind::Saved),
            EditorEvent::Changed { path } => self.on_trigger(&path, TriggerKind::Changed),
            EditorEvent::Build { path } => self.on_trigger(&path, TriggerKind::Manual),
            EditorEvent::Navigate { path, line } => self.navigate_to_output(&path, line),
        }
    }

    fn open_document(&mut self, path: &Path) {
        let doc = normalize_path(path);
        let Some(root) = self.resolve(&doc, false) else {
            return;
        };
        self.discard_pending.remove(&root);
        self.watch_project(&root);
        self.open_docs.insert(doc, root);
    }

    /// Forget the project once its last open document is closed.
    fn close_document(&mut self, path: &Path) {
        let doc = normalize_path(path);
        let Some(root) = self.open_docs.remove(&doc) else {
            return;
        };
        if self.open_docs.values().any(|r| r == &root) {
            return;
        }
        if self.trigger.is_building(&root) {
            self.discard_pending.insert(root);
        } else {
            self.discard(&root);
        }
    }

    fn on_trigger(&mut self, path: &Path, kind: TriggerKind) {
        let doc = normalize_path(path);
        let Some(root) = self.resolve(&doc, kind == TriggerKind::Manual) else {
            return;
        };
        if self.is_unchanged(&doc, kind) {
            crate::debug!("trigger"; "{} unchanged since last build, skipping", doc.display());
            return;
        }
        self.watch_project(&root);
        let decision = self.trigger.trigger(&root, kind);
        crate::debug!("trigger"; "{} {} -> {:?}", kind.label(), root.display(), decision);
        self.apply(&root, decision);
    }

    fn navigate_to_output(&mut self, path: &Path, line: u32) {
        let doc = normalize_path(path);
        let Some(root) = self.resolve(&doc, true) else {
            return;
        };
        match self.locator.forward(&root, &doc, line) {
            Ok(found) => {
                let position = found.value;
                let delivered = self.hub.push(
                    &root,
                    PreviewEvent::ScrollTo {
                        page: position.page,
                        x: position.x,
                        y: position.y,
                    },
                );
                if delivered == 0 {
                    self.message(MessageLevel::Info, format!("no viewer shows {}", root.display()));
                }
            }
            Err(e) => self.message(MessageLevel::Warning, e.to_string()),
        }
    }

    // -------------------------------------------------------------------------
    // File watcher and viewer events
    // -------------------------------------------------------------------------

    fn on_files_changed(&mut self, paths: Vec<PathBuf>) {
        let mut roots = BTreeSet::new();
        for path in paths {
            if !self.resolver.is_project_file(&path) || self.is_unchanged(&path, TriggerKind::Changed) {
                continue;
            }
            roots.extend(self.resolver.roots_containing(&path));
        }
        for root in roots {
            let decision = self.trigger.trigger(&root, TriggerKind::Changed);
            self.apply(&root, decision);
        }
    }

    fn on_click(&mut self, click: ViewerClick) {
        let root = self
            .resolver
            .resolve_root(&click.project)
            .unwrap_or_else(|_| click.project.clone());
        match self.locator.inverse(&root, click.page, click.x, click.y) {
            Ok(found) => {
                if found.stale {
                    crate::debug!("locate"; "using stale map of revision {}", found.revision);
                }
                self.request(EditorRequest::Navigate {
                    path: found.value.file,
                    line: found.value.line,
                });
            }
            Err(e) => crate::debug!("locate"; "click on page {} of {}: {}", click.page, root.display(), e),
        }
    }

    fn fire_due(&mut self) {
        for (root, decision) in self.trigger.fire_due() {
            self.apply(&root, decision);
        }
    }

    /// Trigger a build of every open project with a dependency newer than
    /// its last build.
    fn periodic_check(&mut self) {
        let roots: BTreeSet<PathBuf> = self.open_docs.values().cloned().collect();
        for root in roots {
            if self.trigger.is_building(&root) || self.fingerprints.last_build_start(&root).is_none() {
                continue;
            }
            let files = self.project_files(&root);
            if self.fingerprints.modified_since_build(&root, files.iter()) {
                let decision = self.trigger.trigger(&root, TriggerKind::Periodic);
                self.apply(&root, decision);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Builds
    // -------------------------------------------------------------------------

    fn apply(&mut self, root: &Path, decision: Decision) {
        match decision {
            Decision::Start => self.start_build(root),
            Decision::Queued { cancel_running } => {
                if cancel_running && self.orchestrator.cancel(root) {
                    crate::debug!("build"; "superseded running build of {}", root.display());
                }
            }
            Decision::Deferred { .. } => {}
        }
    }

    fn start_build(&mut self, root: &Path) {
        self.resolver.refresh(root);
        let files = self.project_files(root);
        self.fingerprints.record(root, files.iter());

        match self.orchestrator.start(root, self.done_tx.clone()) {
            Ok(_) => self.request(EditorRequest::BuildStatus {
                root: root.to_path_buf(),
                state: BuildState::Started,
                revision: None,
                message: format!("building with `{}`", self.orchestrator.recipe().name()),
            }),
            Err(e) => {
                self.trigger.abandon(root);
                crate::log!("build"; "{}", e);
            }
        }
    }

    async fn on_outcome(&mut self, outcome: BuildOutcome) {
        let root = outcome.root.clone();
        let done = self.trigger.complete(&root, outcome.kind.is_usable());

        if let Some(revision) = done.revision {
            self.resolver.mark_built(&root);
            self.reload_map(&root, &outcome, revision).await;
            self.hub.set_artifact(&root, &outcome.artifacts.output);
            self.hub.push(&root, PreviewEvent::Refresh { revision });
        }
        self.report(&outcome, done.revision);

        if self.discard_pending.remove(&root) {
            if done.rerun {
                self.trigger.abandon(&root);
            }
            self.discard(&root);
            return;
        }
        if done.rerun {
            self.start_build(&root);
        }
    }

    async fn reload_map(&self, root: &Path, outcome: &BuildOutcome, revision: u64) {
        let locator = Arc::clone(&self.locator);
        let (root_owned, mapping) = (root.to_path_buf(), outcome.artifacts.mapping.clone());
        let status = tokio::task::spawn_blocking(move || locator.reload(&root_owned, &mapping, revision))
            .await
            .unwrap_or_else(|e| MapStatus::Unavailable(e.to_string()));

        match status {
            MapStatus::Loaded { records } => {
                crate::debug!("locate"; "{} records for {}", records, root.display());
            }
            MapStatus::Stale => {
                crate::debug!("locate"; "no {} after build, keeping previous map",
                    outcome.artifacts.mapping.display());
            }
            MapStatus::Unavailable(reason) => {
                crate::log!("locate"; "position map unavailable: {}", reason);
            }
        }
    }

    /// Show the outcome in the terminal and tell the editor.
    fn report(&self, outcome: &BuildOutcome, revision: Option<u64>) {
        let summary = outcome.summary();
        let message = match outcome.kind {
            OutcomeKind::Success => {
                crate::logger::status_success(&summary);
                summary
            }
            OutcomeKind::PartialSuccess => {
                let detail = outcome.diagnostics.headline().unwrap_or_default().to_string();
                crate::logger::status_warning(&summary, &detail);
                join_detail(summary, &detail)
            }
            OutcomeKind::Failure => {
                let detail = outcome.detail();
                crate::logger::status_error(&summary, &detail);
                join_detail(summary, &detail)
            }
            OutcomeKind::Cancelled => {
                crate::debug!("build"; "{}", summary);
                summary
            }
        };

        self.request(EditorRequest::BuildStatus {
            root: outcome.root.clone(),
            state: outcome.kind.into(),
            revision,
            message,
        });
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    /// Root of `doc`; resolution errors are reported, not returned.
    fn resolve(&mut self, doc: &Path, explicit: bool) -> Option<PathBuf> {
        match self.resolver.resolve_root(doc) {
            Ok(root) => Some(root),
            Err(ResolveError::UnsupportedType(path)) => {
                crate::debug!("root"; "not a project file: {}", path.display());
                if explicit {
                    self.message(MessageLevel::Warning, format!("{} is not a project file", path.display()));
                }
                None
            }
            Err(e) => {
                crate::log!("root"; "{}", e);
                self.message(MessageLevel::Error, e.to_string());
                None
            }
        }
    }

    fn is_unchanged(&self, path: &Path, kind: TriggerKind) -> bool {
        self.skip_unchanged
            && matches!(kind, TriggerKind::Saved | TriggerKind::Changed)
            && self.fingerprints.unchanged(path)
    }

    /// Root plus everything it includes.
    fn project_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files = self.resolver.dependencies(root);
        files.push(root.to_path_buf());
        files
    }

    fn watch_project(&self, root: &Path) {
        let Some(fs_tx) = &self.fs_tx else { return };
        let dirs: BTreeSet<PathBuf> = self
            .project_files(root)
            .iter()
            .filter_map(|f| f.parent().map(Path::to_path_buf))
            .collect();
        let _ = fs_tx.send(FsMsg::Watch(dirs.into_iter().collect()));
    }

    /// Drop everything known about a project no document is open from.
    fn discard(&mut self, root: &Path) {
        let files = self.project_files(root);
        self.fingerprints.forget(root, files.iter());
        self.resolver.forget(root);
        self.trigger.remove(root);
        self.locator.evict(root);
        self.hub.forget(root);
        crate::debug!("project"; "discarded {}", root.display());
    }

    fn request(&self, request: EditorRequest) {
        let _ = self.editor_tx.send(request);
    }

    fn message(&self, level: MessageLevel, text: String) {
        self.request(EditorRequest::Message { level, text });
    }

    /// Cancel running builds and wait briefly for them to wind down.
    async fn stop(&mut self) {
        if self.orchestrator.running_count() == 0 {
            return;
        }
        crate::debug!("build"; "cancelling {} running build(s)", self.orchestrator.running_count());
        self.orchestrator.cancel_all();

        let orchestrator = self.orchestrator.clone();
        let done_rx = &mut self.done_rx;
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, async move {
            while orchestrator.running_count() > 0 {
                if done_rx.recv().await.is_none() {
                    break;
                }
            }
        })
        .await;
    }
}

fn join_detail(summary: String, detail: &str) -> String {
    if detail.is_empty() {
        summary
    } else {
        format!("{summary}\n{detail}")
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
