//! `[preview]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [preview]
//! interface = "127.0.0.1"     # Network interface (127.0.0.1 = localhost only)
//! port = 5287                 # HTTP port serving output artifacts
//! ws_port = 35730             # WebSocket port for viewer sessions
//! ```
//!
//! Both ports are retried upward when already in use.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

/// Preview server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Start the preview servers in watch mode.
    pub enable: bool,
    /// Network interface to bind.
    pub interface: IpAddr,
    /// HTTP port number.
    pub port: u16,
    /// WebSocket port number.
    pub ws_port: u16,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enable: true,
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 5287,
            ws_port: 35730,
        }
    }
}
