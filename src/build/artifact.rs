//! Detecting whether a job produced its output artifact.
//!
//! A stale artifact left over from an earlier build must not count: the
//! file's metadata is captured before the job starts and compared after
//! each step.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactSnapshot {
    state: Option<(SystemTime, u64)>,
}

impl ArtifactSnapshot {
    pub fn capture(path: &Path) -> Self {
        Self { state: stat(path) }
    }

    /// `path` exists and differs from the captured state.
    pub fn produced_since(&self, path: &Path) -> bool {
        match stat(path) {
            None => false,
            Some(now) => self.state != Some(now),
        }
    }
}

fn stat(path: &Path) -> Option<(SystemTime, u64)> {
    let meta = fs::metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    Some((meta.modified().ok()?, meta.len()))
}
