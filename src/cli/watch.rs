//! `texwatch watch`: the long-running mode.
//!
//! ```text
//! stdin ──▶ EditorHandle ──▶ Coordinator ──▶ stdout (EditorRequest)
//!                              ▲     │
//!                  FsActor ────┘     └──▶ PreviewHub ◀──▶ viewers (ws + http)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::actor::messages::CoordinatorMsg;
use crate::actor::{Coordinator, FsActor, run_actors};
use crate::config::ProjectConfig;
use crate::core::register_shutdown;
use crate::editor::{EditorHandle, stdio};
use crate::locate::PositionLocator;
use crate::preview::{PreviewHub, http, server};

pub fn run_watch(config: &ProjectConfig, files: &[PathBuf]) -> Result<()> {
    let hub = Arc::new(PreviewHub::new());
    let locator = Arc::new(PositionLocator::new());

    let (coordinator_tx, inbox) = mpsc::unbounded_channel();
    let (editor_tx, editor_rx) = mpsc::unbounded_channel();
    let (fs_tx, fs_rx) = mpsc::unbounded_channel();

    let clicks = coordinator_tx.clone();
    hub.on_inbound(Arc::new(move |click| {
        let _ = clicks.send(CoordinatorMsg::ViewerClicked(click));
    }));

    if config.preview.enable {
        start_preview(&hub, config)?;
    }

    let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded(1);
    register_shutdown(shutdown_tx);

    let coordinator = Coordinator::new(config, Arc::clone(&hub), locator, inbox, editor_tx)?
        .with_watcher(fs_tx.clone());
    let fs = match FsActor::new(fs_rx, coordinator_tx.clone()) {
        Ok(fs) => Some(fs),
        Err(e) => {
            crate::log!("watch"; "file watcher unavailable, relying on editor events: {}", e);
            None
        }
    };

    let handle = EditorHandle::new(coordinator_tx.clone());
    for file in files {
        handle.notify_document_opened(file);
        handle.request_manual_build(file);
    }
    stdio::spawn_reader(handle);
    stdio::spawn_writer(editor_rx);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    rt.block_on(run_actors(coordinator, fs, fs_tx, coordinator_tx, Some(shutdown_rx)))?;

    crate::debug!("preview"; "closing {} viewer session(s)", hub.session_count());
    hub.close_all();
    Ok(())
}

/// Start the WebSocket and HTTP servers of the preview.
fn start_preview(hub: &Arc<PreviewHub>, config: &ProjectConfig) -> Result<()> {
    let preview = &config.preview;
    let ws_port = server::start_ws_server(Arc::clone(hub), preview.interface, preview.ws_port)?;
    let (addr, _) = http::start_http_server(Arc::clone(hub), preview.interface, preview.port)?;
    crate::log!("preview"; "viewers: ws://{}:{}, output: http://{}/output/<root>",
        preview.interface, ws_port, addr);
    Ok(())
}
