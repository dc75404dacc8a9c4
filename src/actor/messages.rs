//! Actor Message Definitions
//!
//! ```text
//! FsActor ──FilesChanged──▶ Coordinator ◀──Editor── EditorHandle
//!    ▲                          │   ▲
//!    └──────────Watch───────────┘   └──ViewerClicked── PreviewHub
//! ```

use std::path::PathBuf;

use crate::editor::EditorEvent;
use crate::preview::ViewerClick;

/// Messages to the coordinator
#[derive(Debug)]
pub enum CoordinatorMsg {
    /// Event from the editor
    Editor(EditorEvent),
    /// Debounced file changes (normalized paths)
    FilesChanged(Vec<PathBuf>),
    /// Click in a viewer
    ViewerClicked(ViewerClick),
    /// Shutdown
    Shutdown,
}

/// Messages to the FileSystem actor
#[derive(Debug)]
pub enum FsMsg {
    /// Make sure these directories are watched
    Watch(Vec<PathBuf>),
    /// Shutdown
    Shutdown,
}
