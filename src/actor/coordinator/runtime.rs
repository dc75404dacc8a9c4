use std::time::Duration;

use anyhow::Result;
use crossbeam::channel::Receiver;
use tokio::sync::mpsc;

use super::Coordinator;
use crate::actor::fs::FsActor;
use crate::actor::messages::{CoordinatorMsg, FsMsg};

/// Run all actors concurrently until a shutdown signal arrives or the
/// coordinator stops on its own (editor gone).
pub async fn run_actors(
    coordinator: Coordinator,
    fs: Option<FsActor>,
    fs_tx: mpsc::UnboundedSender<FsMsg>,
    coordinator_tx: mpsc::UnboundedSender<CoordinatorMsg>,
    shutdown_rx: Option<Receiver<()>>,
) -> Result<()> {
    let mut coordinator_handle = tokio::spawn(coordinator.run());
    let fs_handle = fs.map(|fs| tokio::spawn(fs.run()));

    match shutdown_rx {
        Some(rx) => loop {
            if rx.try_recv().is_ok() {
                crate::debug!("actor"; "shutdown signal received");
                break;
            }
            if coordinator_handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        },
        None => {
            let _ = (&mut coordinator_handle).await;
        }
    }

    crate::debug!("actor"; "sending shutdown to coordinator");
    let _ = coordinator_tx.send(CoordinatorMsg::Shutdown);
    let _ = tokio::time::timeout(Duration::from_secs(3), coordinator_handle).await;

    let _ = fs_tx.send(FsMsg::Shutdown);
    if let Some(handle) = fs_handle {
        let _ = tokio::time::timeout(Duration::from_millis(500), handle).await;
    }

    Ok(())
}
