//! Source ↔ output position lookup.
//!
//! One [`PositionMap`] per project, held in an [`ArcSwap`]: a reload builds
//! the new map completely and swaps the table pointer, so lookups running
//! concurrently always see either the old or the new map.

pub mod map;
pub mod synctex;

pub use map::{OutputPosition, PositionMap, SourcePosition};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::core::Revision;
use synctex::ParseError;

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("no position map for `{0}` (not built yet?)")]
    NoMap(PathBuf),

    #[error("no position recorded for that location")]
    NoRecord,
}

/// The map of one project plus where it came from.
#[derive(Debug)]
pub struct ProjectMap {
    /// Revision of the build that produced the map.
    pub revision: Revision,
    /// The latest build reported success but left no mapping file.
    pub stale: bool,
    pub map: Arc<PositionMap>,
}

/// A lookup result tagged with the map it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Located<T> {
    pub value: T,
    pub revision: Revision,
    pub stale: bool,
}

/// What a reload did to the project's map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapStatus {
    Loaded { records: usize },
    /// Mapping file missing; the previous map (if any) is kept, flagged stale.
    Stale,
    /// Mapping file malformed or unreadable; the project has no map now.
    Unavailable(String),
}

type MapTable = FxHashMap<PathBuf, Arc<ProjectMap>>;

#[derive(Default)]
pub struct PositionLocator {
    maps: ArcSwap<MapTable>,
}

impl PositionLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the mapping file of a finished build and install it.
    ///
    /// Blocking; the coordinator runs this on the blocking pool.
    pub fn reload(&self, root: &Path, mapping: &Path, revision: Revision) -> MapStatus {
        let base = root.parent().unwrap_or(Path::new("."));
        let result = synctex::read(mapping, base);
        if matches!(result, Err(ParseError::Missing(_))) && mapping.with_extension("synctex.gz").exists() {
            crate::debug!("locate"; "only compressed mapping found for {}, rebuild with -synctex=-1", root.display());
        }
        self.install(root, revision, result)
    }

    /// Install the result of reading a mapping file.
    pub fn install(
        &self,
        root: &Path,
        revision: Revision,
        result: Result<PositionMap, ParseError>,
    ) -> MapStatus {
        let root = root.to_path_buf();
        match result {
            Ok(map) => {
                let records = map.len();
                let entry = Arc::new(ProjectMap {
                    revision,
                    stale: false,
                    map: Arc::new(map),
                });
                self.maps.rcu(|table| {
                    let mut table = MapTable::clone(table);
                    table.insert(root.clone(), Arc::clone(&entry));
                    table
                });
                MapStatus::Loaded { records }
            }
            Err(ParseError::Missing(_)) => {
                self.maps.rcu(|table| {
                    let mut table = MapTable::clone(table);
                    if let Some(old) = table.get(&root).cloned() {
                        table.insert(
                            root.clone(),
                            Arc::new(ProjectMap {
                                revision: old.revision,
                                stale: true,
                                map: Arc::clone(&old.map),
                            }),
                        );
                    }
                    table
                });
                MapStatus::Stale
            }
            Err(err) => {
                self.evict(&root);
                MapStatus::Unavailable(err.to_string())
            }
        }
    }

    /// Output position for `line` of `source` in the project of `root`.
    pub fn forward(
        &self,
        root: &Path,
        source: &Path,
        line: u32,
    ) -> Result<Located<OutputPosition>, LocateError> {
        let entry = self.entry(root)?;
        let value = entry
            .map
            .forward(source, line)
            .ok_or(LocateError::NoRecord)?;
        Ok(Located {
            value,
            revision: entry.revision,
            stale: entry.stale,
        })
    }

    /// Source position nearest to a point on `page` of the output of `root`.
    pub fn inverse(
        &self,
        root: &Path,
        page: u32,
        x: f64,
        y: f64,
    ) -> Result<Located<SourcePosition>, LocateError> {
        let entry = self.entry(root)?;
        let value = entry.map.inverse(page, x, y).ok_or(LocateError::NoRecord)?;
        Ok(Located {
            value,
            revision: entry.revision,
            stale: entry.stale,
        })
    }

    pub fn has_map(&self, root: &Path) -> bool {
        self.maps.load().contains_key(root)
    }

    /// Drop the map of a discarded project.
    pub fn evict(&self, root: &Path) {
        if !self.has_map(root) {
            return;
        }
        self.maps.rcu(|table| {
            let mut table = MapTable::clone(table);
            table.remove(root);
            table
        });
    }

    fn entry(&self, root: &Path) -> Result<Arc<ProjectMap>, LocateError> {
        self.maps
            .load()
            .get(root)
            .cloned()
            .ok_or_else(|| LocateError::NoMap(root.to_path_buf()))
    }
}
