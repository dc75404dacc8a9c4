//! Content hashes (blake3) for sources, mtimes for the periodic check.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rayon::prelude::*;
use rustc_hash::FxHashMap;

/// A 256-bit content hash (blake3 output).
pub type ContentHash = [u8; 32];

/// Hash file contents. `None` if the file can't be read.
pub fn compute_file_hash(path: &Path) -> Option<ContentHash> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                hasher.update(&buffer[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return None,
        }
    }

    Some(*hasher.finalize().as_bytes())
}

pub fn get_mtime(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

/// What each project looked like when its last build started.
#[derive(Debug, Default)]
pub struct Fingerprints {
    hashes: FxHashMap<PathBuf, ContentHash>,
    started: FxHashMap<PathBuf, SystemTime>,
}

impl Fingerprints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot `files` of the project of `root` at build start.
    pub fn record<'a>(&mut self, root: &Path, files: impl IntoIterator<Item = &'a PathBuf>) {
        let files: Vec<&PathBuf> = files.into_iter().collect();
        let hashed: Vec<_> = files
            .par_iter()
            .filter_map(|path| compute_file_hash(path).map(|hash| ((*path).clone(), hash)))
            .collect();

        self.hashes.extend(hashed);
        self.started.insert(root.to_path_buf(), SystemTime::now());
    }

    /// True if `path` has the same content it had at the last recorded build.
    pub fn unchanged(&self, path: &Path) -> bool {
        let Some(recorded) = self.hashes.get(path) else {
            return false;
        };
        compute_file_hash(path).is_some_and(|hash| &hash == recorded)
    }

    /// True if any of `files` was modified after the last build of `root`
    /// started. A project never built counts as modified.
    pub fn modified_since_build<'a>(
        &self,
        root: &Path,
        mut files: impl Iterator<Item = &'a PathBuf>,
    ) -> bool {
        let Some(&started) = self.started.get(root) else {
            return true;
        };
        files.any(|path| get_mtime(path).is_some_and(|mtime| mtime > started))
    }

    pub fn last_build_start(&self, root: &Path) -> Option<SystemTime> {
        self.started.get(root).copied()
    }

    /// Drop what is known about a discarded project.
    pub fn forget<'a>(&mut self, root: &Path, files: impl IntoIterator<Item = &'a PathBuf>) {
        self.started.remove(root);
        for path in files {
            self.hashes.remove(path);
        }
    }
}
