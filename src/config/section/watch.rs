//! `[watch]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [watch]
//! debounce_ms = 300          # Collapse rapid edits into one build
//! poll_interval_ms = 0       # Periodic freshness check (0 = off)
//! search_depth = 3           # Directory depth of the root scan
//! skip_unchanged = true      # Ignore saves that did not change content
//! ```

use serde::{Deserialize, Serialize};

/// Trigger and root-resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Minimum quiet time before a change-driven build starts.
    pub debounce_ms: u64,
    /// Interval of the periodic mtime check. `0` disables it.
    pub poll_interval_ms: u64,
    /// File types that belong to a project.
    pub extensions: Vec<String>,
    /// File types that can be handed to the compiler.
    pub root_extensions: Vec<String>,
    /// How far the reverse-dependency scan walks up and down.
    pub search_depth: usize,
    /// Suppress save/change triggers whose content hash is unchanged.
    pub skip_unchanged: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            poll_interval_ms: 0,
            extensions: ["tex", "ltx", "latex", "bib", "sty", "cls"]
                .into_iter()
                .map(String::from)
                .collect(),
            root_extensions: ["tex", "ltx", "latex"]
                .into_iter()
                .map(String::from)
                .collect(),
            search_depth: 3,
            skip_unchanged: true,
        }
    }
}
