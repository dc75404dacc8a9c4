//! Editor-facing entry points.
//!
//! The editor talks to the core only through [`EditorHandle`] (events in)
//! and a stream of [`EditorRequest`]s (responses out). Both are plain
//! serde types, so any host can adapt them; [`stdio`] speaks them as JSON
//! lines.

pub mod stdio;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::actor::messages::CoordinatorMsg;
use crate::build::OutcomeKind;
use crate::core::Revision;

/// Something happened in the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EditorEvent {
    Opened { path: PathBuf },
    Closed { path: PathBuf },
    Saved { path: PathBuf },
    Changed { path: PathBuf },
    /// Explicit build request.
    Build { path: PathBuf },
    /// Show `line` of `path` in the viewers.
    Navigate { path: PathBuf, line: u32 },
}

impl EditorEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::Opened { path }
            | Self::Closed { path }
            | Self::Saved { path }
            | Self::Changed { path }
            | Self::Build { path }
            | Self::Navigate { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildState {
    Started,
    Success,
    Partial,
    Failure,
    Cancelled,
}

impl From<OutcomeKind> for BuildState {
    fn from(kind: OutcomeKind) -> Self {
        match kind {
            OutcomeKind::Success => Self::Success,
            OutcomeKind::PartialSuccess => Self::Partial,
            OutcomeKind::Failure => Self::Failure,
            OutcomeKind::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// Something the core asks of the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "camelCase")]
pub enum EditorRequest {
    BuildStatus {
        root: PathBuf,
        state: BuildState,
        #[serde(skip_serializing_if = "Option::is_none")]
        revision: Option<Revision>,
        message: String,
    },
    /// Jump to `line` of `path`.
    Navigate { path: PathBuf, line: u32 },
    Message { level: MessageLevel, text: String },
}

/// Sends editor events to the coordinator. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EditorHandle {
    tx: mpsc::UnboundedSender<CoordinatorMsg>,
}

impl EditorHandle {
    pub fn new(tx: mpsc::UnboundedSender<CoordinatorMsg>) -> Self {
        Self { tx }
    }

    /// Forward an event. Returns false once the coordinator has stopped.
    pub fn send(&self, event: EditorEvent) -> bool {
        self.tx.send(CoordinatorMsg::Editor(event)).is_ok()
    }

    pub fn notify_document_opened(&self, path: &Path) -> bool {
        self.send(EditorEvent::Opened { path: path.to_path_buf() })
    }

    pub fn notify_document_closed(&self, path: &Path) -> bool {
        self.send(EditorEvent::Closed { path: path.to_path_buf() })
    }

    pub fn notify_document_saved(&self, path: &Path) -> bool {
        self.send(EditorEvent::Saved { path: path.to_path_buf() })
    }

    pub fn notify_document_changed(&self, path: &Path) -> bool {
        self.send(EditorEvent::Changed { path: path.to_path_buf() })
    }

    pub fn request_manual_build(&self, path: &Path) -> bool {
        self.send(EditorEvent::Build { path: path.to_path_buf() })
    }

    pub fn request_navigate_to_output(&self, path: &Path, line: u32) -> bool {
        self.send(EditorEvent::Navigate {
            path: path.to_path_buf(),
            line,
        })
    }

    /// Ask the coordinator to stop.
    pub fn shutdown(&self) {
        let _ = self.tx.send(CoordinatorMsg::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event: EditorEvent =
            serde_json::from_str(r#"{"event":"navigate","path":"/p/a.tex","line":12}"#).unwrap();
        assert_eq!(
            event,
            EditorEvent::Navigate {
                path: PathBuf::from("/p/a.tex"),
                line: 12
            }
        );
        assert_eq!(event.path(), Path::new("/p/a.tex"));

        assert!(serde_json::from_str::<EditorEvent>(r#"{"event":"build","path":"x.tex"}"#).is_ok());
        assert!(serde_json::from_str::<EditorEvent>(r#"{"event":"format","path":"x.tex"}"#).is_err());
    }

    #[test]
    fn test_request_wire_format() {
        let status = EditorRequest::BuildStatus {
            root: PathBuf::from("/p/main.tex"),
            state: BuildState::Partial,
            revision: Some(3),
            message: "built main.tex with errors".into(),
        };
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            r#"{"request":"buildStatus","root":"/p/main.tex","state":"partial","revision":3,"message":"built main.tex with errors"}"#
        );

        let failed = EditorRequest::BuildStatus {
            root: PathBuf::from("/p/main.tex"),
            state: BuildState::Failure,
            revision: None,
            message: String::new(),
        };
        assert!(!serde_json::to_string(&failed).unwrap().contains("revision"));
    }

    #[test]
    fn test_handle_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = EditorHandle::new(tx);

        assert!(handle.request_manual_build(Path::new("/p/main.tex")));
        assert!(matches!(
            rx.try_recv(),
            Ok(CoordinatorMsg::Editor(EditorEvent::Build { .. }))
        ));

        drop(rx);
        assert!(!handle.notify_document_saved(Path::new("/p/main.tex")));
    }
}
