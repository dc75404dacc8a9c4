//! Viewer session registry and push channel.
//!
//! # Architecture
//!
//! ```text
//! Coordinator --[refresh/scrollTo]--> PreviewHub --[bound project]--> Viewers
//!      ^                                  |                              |
//!      +-----------[clicked]--------------+<---------[ready/clicked]-----+
//! ```
//!
//! Delivery is best effort: a session whose write fails is dropped on the
//! spot and never retried.

pub mod http;
pub mod message;
pub mod server;
pub mod transport;


pub use message::{InboundMessage, OutboundMessage};
pub use transport::{DeliveryError, ViewerTransport, WsTransport};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::core::Revision;

pub type SessionId = u64;

/// Events pushed to every viewer of a project.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PreviewEvent {
    Refresh { revision: Revision },
    ScrollTo { page: u32, x: f64, y: f64 },
}

impl From<PreviewEvent> for OutboundMessage {
    fn from(event: PreviewEvent) -> Self {
        match event {
            PreviewEvent::Refresh { revision } => Self::Refresh { revision },
            PreviewEvent::ScrollTo { page, x, y } => Self::ScrollTo { page, x, y },
        }
    }
}

/// A click in the output of a bound session.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerClick {
    pub session: SessionId,
    pub project: PathBuf,
    pub page: u32,
    pub x: f64,
    pub y: f64,
}

pub type InboundHandler = Arc<dyn Fn(ViewerClick) + Send + Sync>;

struct ViewerSession {
    id: SessionId,
    transport: Box<dyn ViewerTransport>,
    /// Project the viewer displays (None until `ready`).
    project: Option<PathBuf>,
    /// Highest revision this session has been told about.
    last_revision: Revision,
}

impl ViewerSession {
    fn send(&mut self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let text = message.to_json()?;
        self.transport.send(&text)
    }
}

#[derive(Default)]
pub struct PreviewHub {
    sessions: Mutex<Vec<ViewerSession>>,
    /// project → latest revision pushed
    latest: Mutex<FxHashMap<PathBuf, Revision>>,
    handler: RwLock<Option<InboundHandler>>,
    /// project → output artifact served over HTTP
    artifacts: DashMap<PathBuf, PathBuf>,
    next_id: AtomicU64,
}

impl PreviewHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unbound session and greet it.
    pub fn connect(&self, transport: Box<dyn ViewerTransport>) -> Result<SessionId, DeliveryError> {
        let mut session = ViewerSession {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            transport,
            project: None,
            last_revision: 0,
        };
        session.send(&OutboundMessage::connected())?;

        let id = session.id;
        let mut sessions = self.sessions.lock();
        sessions.push(session);
        crate::debug!("preview"; "viewer {} connected (total: {})", id, sessions.len());
        Ok(id)
    }

    /// Add a session already bound to `project`.
    pub fn register_session(
        &self,
        project: &Path,
        transport: Box<dyn ViewerTransport>,
    ) -> Result<SessionId, DeliveryError> {
        let id = self.connect(transport)?;
        self.bind(id, project, None);
        Ok(id)
    }

    /// (Re)bind a session to `project`.
    ///
    /// `revision` is what the viewer already shows. The session immediately
    /// gets one refresh for the project's latest revision if it is behind.
    /// Returns false if the session is gone.
    pub fn bind(&self, id: SessionId, project: &Path, revision: Option<Revision>) -> bool {
        let latest = self.latest_revision(project);
        let mut sessions = self.sessions.lock();
        let Some(pos) = sessions.iter().position(|s| s.id == id) else {
            return false;
        };

        let session = &mut sessions[pos];
        if session.project.as_deref() != Some(project) {
            session.project = Some(project.to_path_buf());
            session.last_revision = 0;
        }
        if let Some(revision) = revision {
            session.last_revision = revision;
        }
        crate::debug!("preview"; "viewer {} bound to {}", id, project.display());

        let Some(latest) = latest.filter(|&l| l > session.last_revision) else {
            return true;
        };
        match session.send(&OutboundMessage::Refresh { revision: latest }) {
            Ok(()) => {
                session.last_revision = latest;
                true
            }
            Err(err) => {
                crate::debug!("preview"; "viewer {} dropped: {}", id, err);
                let mut session = sessions.remove(pos);
                session.transport.close();
                false
            }
        }
    }

    /// Deliver `event` to every session bound to `project`.
    ///
    /// A refresh older than (or equal to) what a session has already seen is
    /// not sent to it. Returns the number of sessions that received the
    /// event.
    pub fn push(&self, project: &Path, event: PreviewEvent) -> usize {
        if let PreviewEvent::Refresh { revision } = event {
            let mut latest = self.latest.lock();
            let entry = latest.entry(project.to_path_buf()).or_default();
            *entry = (*entry).max(revision);
        }

        let message = OutboundMessage::from(event);
        let mut delivered = 0;
        let mut sessions = self.sessions.lock();

        sessions.retain_mut(|session| {
            if session.project.as_deref() != Some(project) {
                return true;
            }
            if let PreviewEvent::Refresh { revision } = event
                && revision <= session.last_revision
            {
                return true;
            }
            match session.send(&message) {
                Ok(()) => {
                    if let PreviewEvent::Refresh { revision } = event {
                        session.last_revision = revision;
                    }
                    delivered += 1;
                    true
                }
                Err(err) => {
                    crate::debug!("preview"; "viewer {} dropped: {}", session.id, err);
                    session.transport.close();
                    false
                }
            }
        });

        crate::debug!("preview"; "{:?} delivered to {} viewer(s) of {}", event, delivered, project.display());
        delivered
    }

    /// Register the handler for viewer clicks.
    pub fn on_inbound(&self, handler: InboundHandler) {
        *self.handler.write() = Some(handler);
    }

    /// Read pending messages from every session and act on them.
    ///
    /// The handler runs after the session lock is released.
    pub fn poll_inbound(&self) {
        let mut received = Vec::new();
        {
            let mut sessions = self.sessions.lock();
            sessions.retain_mut(|session| loop {
                match session.transport.try_recv() {
                    Ok(Some(text)) => received.push((session.id, text)),
                    Ok(None) => break true,
                    Err(err) => {
                        crate::debug!("preview"; "viewer {} disconnected: {}", session.id, err);
                        session.transport.close();
                        break false;
                    }
                }
            });
        }

        for (id, text) in received {
            self.handle_text(id, &text);
        }
    }

    /// Act on one inbound frame.
    pub fn handle_text(&self, id: SessionId, text: &str) {
        match InboundMessage::parse(text) {
            Ok(InboundMessage::Ready {
                project_path,
                revision,
            }) => {
                let project = crate::utils::normalize_path(&project_path);
                self.bind(id, &project, revision);
            }
            Ok(InboundMessage::Clicked { page, x, y }) => {
                let Some(project) = self.project_of(id) else {
                    crate::debug!("preview"; "click from unbound viewer {}", id);
                    return;
                };
                let handler = self.handler.read().clone();
                if let Some(handler) = handler {
                    handler(ViewerClick {
                        session: id,
                        project,
                        page,
                        x,
                        y,
                    });
                }
            }
            Err(err) => {
                crate::debug!("preview"; "ignoring message from viewer {}: {}", id, err);
            }
        }
    }

    /// Remove a session and close its connection.
    pub fn close_session(&self, id: SessionId) {
        let mut sessions = self.sessions.lock();
        if let Some(pos) = sessions.iter().position(|s| s.id == id) {
            let mut session = sessions.remove(pos);
            session.transport.close();
        }
    }

    pub fn close_all(&self) {
        for mut session in self.sessions.lock().drain(..) {
            session.transport.close();
        }
    }

    pub fn project_of(&self, id: SessionId) -> Option<PathBuf> {
        self.sessions
            .lock()
            .iter()
            .find(|s| s.id == id)
            .and_then(|s| s.project.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn viewers_of(&self, project: &Path) -> usize {
        self.sessions
            .lock()
            .iter()
            .filter(|s| s.project.as_deref() == Some(project))
            .count()
    }

    pub fn latest_revision(&self, project: &Path) -> Option<Revision> {
        self.latest.lock().get(project).copied()
    }

    /// Make `artifact` available at `/output/<project>`.
    pub fn set_artifact(&self, project: &Path, artifact: &Path) {
        self.artifacts
            .insert(project.to_path_buf(), artifact.to_path_buf());
    }

    pub fn artifact(&self, project: &Path) -> Option<PathBuf> {
        self.artifacts.get(project).map(|a| a.value().clone())
    }

    /// Drop everything known about a discarded project. Bound sessions stay
    /// connected.
    pub fn forget(&self, project: &Path) {
        self.latest.lock().remove(project);
        self.artifacts.remove(project);
    }
}
