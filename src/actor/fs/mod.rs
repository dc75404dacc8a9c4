//! FileSystem Actor
//!
//! Watches the directories holding project files and sends debounced,
//! deduplicated change sets to the coordinator.
//!
//! ```text
//! notify thread ──▶ Debouncer (timing + dedup) ──FilesChanged──▶ Coordinator
//! ```
//!
//! Directories are watched non-recursively: the coordinator asks for every
//! directory that contains a file of a known project. The watcher starts
//! before the first build, so no event is lost in between.

mod debouncer;


use std::path::PathBuf;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

use super::messages::{CoordinatorMsg, FsMsg};
use debouncer::{DEBOUNCE_MS, Debouncer};

/// FileSystem Actor - watches for file changes
pub struct FsActor {
    /// Raw notify events, bridged from the watcher thread
    events: mpsc::Receiver<notify::Event>,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    watched: FxHashSet<PathBuf>,
    rx: mpsc::UnboundedReceiver<FsMsg>,
    coordinator_tx: mpsc::UnboundedSender<CoordinatorMsg>,
    debouncer: Debouncer,
}

impl FsActor {
    pub fn new(
        rx: mpsc::UnboundedReceiver<FsMsg>,
        coordinator_tx: mpsc::UnboundedSender<CoordinatorMsg>,
    ) -> notify::Result<Self> {
        // notify doesn't support async
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        let (events_tx, events) = mpsc::channel::<notify::Event>(64);
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if events_tx.blocking_send(event).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        Ok(Self {
            events,
            watcher,
            watched: FxHashSet::default(),
            rx,
            coordinator_tx,
            debouncer: Debouncer::new(Duration::from_millis(DEBOUNCE_MS)),
        })
    }

    /// Watch `dirs` in addition to what is already watched.
    fn watch(&mut self, dirs: Vec<PathBuf>) {
        // Drop handles of directories that went away; they are re-added on
        // the next request.
        self.watched.retain(|dir| dir.is_dir());

        for dir in dirs {
            if self.watched.contains(&dir) || !dir.is_dir() {
                continue;
            }
            match self.watcher.watch(&dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    crate::debug!("watch"; "watching {}", dir.display());
                    self.watched.insert(dir);
                }
                Err(e) => crate::log!("watch"; "cannot watch {}: {}", dir.display(), e),
            }
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                msg = self.rx.recv() => match msg {
                    Some(FsMsg::Watch(dirs)) => self.watch(dirs),
                    Some(FsMsg::Shutdown) | None => break,
                },
                Some(event) = self.events.recv() => self.debouncer.add_event(&event),
                _ = tokio::time::sleep(self.debouncer.sleep_duration()) => {
                    let Some(changes) = self.debouncer.take_if_ready() else {
                        continue;
                    };
                    let mut paths: Vec<_> = changes.into_keys().collect();
                    paths.sort();
                    if self.coordinator_tx.send(CoordinatorMsg::FilesChanged(paths)).is_err() {
                        break;
                    }
                }
            }
        }
        crate::debug!("watch"; "stopped");
    }
}
