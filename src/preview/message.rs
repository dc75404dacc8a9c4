//! Viewer wire protocol.
//!
//! JSON text frames, discriminated by `type`:
//!
//! | Direction | Message                                       |
//! |-----------|-----------------------------------------------|
//! | out       | `{"type":"connected","version":"0.1.0"}`     |
//! | out       | `{"type":"refresh","revision":3}`            |
//! | out       | `{"type":"scrollTo","page":2,"x":72,"y":90}` |
//! | in        | `{"type":"ready","projectPath":"/p/main.tex"}` |
//! | in        | `{"type":"clicked","page":2,"x":72,"y":90}`  |
//!
//! `ready` binds the session to a project; it may carry the `revision`
//! the viewer is already showing.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::Revision;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Sent once after the handshake.
    Connected { version: String },
    /// The output of the bound project changed; reload it.
    Refresh { revision: Revision },
    /// Scroll the viewer to a point (big points, top-left origin).
    ScrollTo { page: u32, x: f64, y: f64 },
}

impl OutboundMessage {
    pub fn connected() -> Self {
        Self::Connected {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    Ready {
        #[serde(rename = "projectPath")]
        project_path: PathBuf,
        #[serde(default)]
        revision: Option<Revision>,
    },
    Clicked { page: u32, x: f64, y: f64 },
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
