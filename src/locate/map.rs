//! In-memory position map of one build.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

/// A point in the rendered output, in big points from the page's top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputPosition {
    pub page: u32,
    pub x: f64,
    pub y: f64,
}

/// A line in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePosition {
    pub file: PathBuf,
    pub line: u32,
}

/// One correlation between a source line and an output point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    /// Index into [`PositionMap::files`].
    pub file: usize,
    pub line: u32,
    pub page: u32,
    pub x: f64,
    pub y: f64,
}

/// Records indexed for lookup in both directions.
#[derive(Debug, Default)]
pub struct PositionMap {
    files: Vec<PathBuf>,
    records: Vec<Record>,
    /// file index → record indices, sorted by line (stable)
    by_source: FxHashMap<usize, Vec<usize>>,
    /// page → record indices in file order
    by_page: FxHashMap<u32, Vec<usize>>,
}

impl PositionMap {
    /// Build the indexes. Records with line 0 carry no source position
    /// and are dropped.
    pub fn new(files: Vec<PathBuf>, records: Vec<Record>) -> Self {
        let records: Vec<Record> = records
            .into_iter()
            .filter(|r| r.line > 0 && r.file < files.len())
            .collect();

        let mut by_source: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        let mut by_page: FxHashMap<u32, Vec<usize>> = FxHashMap::default();
        for (i, record) in records.iter().enumerate() {
            by_source.entry(record.file).or_default().push(i);
            by_page.entry(record.page).or_default().push(i);
        }
        for indices in by_source.values_mut() {
            indices.sort_by_key(|&i| records[i].line);
        }

        Self {
            files,
            records,
            by_source,
            by_page,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Output position of `line` in `source`.
    ///
    /// Picks the last line at or before `line` that has a record (its first
    /// record), else the nearest line after it.
    pub fn forward(&self, source: &Path, line: u32) -> Option<OutputPosition> {
        let file = self.files.iter().position(|f| f == source)?;
        let indices = self.by_source.get(&file)?;

        let after = indices.partition_point(|&i| self.records[i].line <= line);
        let target_line = if after > 0 {
            self.records[indices[after - 1]].line
        } else {
            self.records[*indices.first()?].line
        };
        let first = indices.partition_point(|&i| self.records[i].line < target_line);

        let record = &self.records[indices[first]];
        Some(OutputPosition {
            page: record.page,
            x: record.x,
            y: record.y,
        })
    }

    /// Source position nearest to a point on `page` (Euclidean distance).
    pub fn inverse(&self, page: u32, x: f64, y: f64) -> Option<SourcePosition> {
        let indices = self.by_page.get(&page)?;
        let nearest = indices.iter().map(|&i| &self.records[i]).min_by(|a, b| {
            let da = (a.x - x).powi(2) + (a.y - y).powi(2);
            let db = (b.x - x).powi(2) + (b.y - y).powi(2);
            da.total_cmp(&db)
        })?;

        Some(SourcePosition {
            file: self.files[nearest.file].clone(),
            line: nearest.line,
        })
    }
}
