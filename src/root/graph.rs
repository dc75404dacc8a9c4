//! Project dependency graph.
//!
//! Maintains both forward (root → included files) and reverse
//! (included file → roots) mappings so that "which project does this file
//! belong to" is a single lookup.
//!
//! # Invariants
//! - Forward and reverse mappings are always consistent
//! - Paths are normalized for reliable matching
//! - A root never lists itself as a dependency

use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};

use crate::utils::normalize_path;

type PathSet = FxHashSet<PathBuf>;
type PathSetMap = FxHashMap<PathBuf, PathSet>;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Forward: root document → files it includes
    forward: PathSetMap,
    /// Reverse: included file → roots that include it
    reverse: PathSetMap,
}

impl DependencyGraph {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the dependency set of a root, replacing any previous one.
    pub fn record<'a>(&mut self, root: &Path, deps: impl IntoIterator<Item = &'a PathBuf>) {
        let root = normalize_path(root);

        self.remove(&root);

        let deps: PathSet = deps
            .into_iter()
            .map(|p| normalize_path(p))
            .filter(|p| *p != root)
            .collect();

        for dep in &deps {
            self.reverse
                .entry(dep.clone())
                .or_default()
                .insert(root.clone());
        }

        self.forward.insert(root, deps);
    }

    /// Roots that include `file`.
    #[inline]
    pub fn used_by(&self, file: &Path) -> Option<&PathSet> {
        self.reverse.get(file)
    }

    /// Files included by `root`.
    #[inline]
    pub fn uses(&self, root: &Path) -> Option<&PathSet> {
        self.forward.get(root)
    }

    /// `root` has a recorded dependency set.
    #[inline]
    pub fn contains_root(&self, root: &Path) -> bool {
        self.forward.contains_key(root)
    }

    /// Drop a root and clean up its reverse mappings.
    pub fn remove(&mut self, root: &Path) {
        let Some(old_deps) = self.forward.remove(root) else {
            return;
        };

        for dep in old_deps {
            if let Some(dependents) = self.reverse.get_mut(&dep) {
                dependents.remove(root);
                if dependents.is_empty() {
                    self.reverse.remove(&dep);
                }
            }
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }
}
