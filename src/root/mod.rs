//! Root document resolution.
//!
//! Maps any open project file to the document that is handed to the
//! compiler. Resolution order:
//!
//! 1. the document is already a known root
//! 2. cached association from an earlier resolution
//! 3. `% !TEX root = ...` magic comment
//! 4. the document declares `\documentclass` itself
//! 5. reverse-dependency scan of nearby documents
//! 6. self-root fallback (root-capable documents only)

mod graph;
pub mod scan;

pub use graph::DependencyGraph;

use std::path::{Path, PathBuf};

use jwalk::WalkDir;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::config::WatchConfig;
use crate::utils::normalize_path;
use crate::utils::path::has_extension;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("`{0}` is not a project file")]
    UnsupportedType(PathBuf),

    #[error("no root document found for `{0}`")]
    NotFound(PathBuf),

    #[error("failed to read `{0}`")]
    Io(PathBuf, #[source] std::io::Error),
}

/// Resolves documents to their root and tracks project membership.
///
/// Owned by the coordinator; all mutation happens through `&mut self`.
#[derive(Debug)]
pub struct RootResolver {
    extensions: Vec<String>,
    root_extensions: Vec<String>,
    workspace: PathBuf,
    search_depth: usize,
    graph: DependencyGraph,
    /// document → root it resolved to
    cache: FxHashMap<PathBuf, PathBuf>,
    /// root → sequence number of its latest build (for tie-breaks)
    last_built: FxHashMap<PathBuf, u64>,
    build_seq: u64,
}

impl RootResolver {
    pub fn new(config: &WatchConfig, workspace: &Path) -> Self {
        Self {
            extensions: config.extensions.clone(),
            root_extensions: config.root_extensions.clone(),
            workspace: normalize_path(workspace),
            search_depth: config.search_depth,
            graph: DependencyGraph::new(),
            cache: FxHashMap::default(),
            last_built: FxHashMap::default(),
            build_seq: 0,
        }
    }

    /// Determine the root document for `doc`.
    ///
    /// Idempotent while the project files stay unchanged. Updates the
    /// dependency set of the returned root as a side effect.
    pub fn resolve_root(&mut self, doc: &Path) -> Result<PathBuf, ResolveError> {
        let doc = normalize_path(doc);

        if !has_extension(&doc, &self.extensions) {
            return Err(ResolveError::UnsupportedType(doc));
        }

        if self.graph.contains_root(&doc) {
            return Ok(doc);
        }

        if let Some(root) = self.cached_root(&doc) {
            return Ok(root);
        }

        let root_capable = has_extension(&doc, &self.root_extensions);
        if root_capable {
            let dir = doc.parent().unwrap_or(&self.workspace).to_path_buf();
            let directives = scan::scan_file(&doc, &dir)
                .map_err(|err| ResolveError::Io(doc.clone(), err))?;

            if let Some(magic) = directives.magic_root {
                let magic = normalize_path(&magic);
                if magic.is_file() {
                    crate::debug!("root"; "magic comment: {} -> {}", doc.display(), magic.display());
                    return Ok(self.adopt(&doc, magic));
                }
                crate::log!("warning"; "magic root `{}` does not exist, ignoring", magic.display());
            }

            if directives.has_documentclass {
                return Ok(self.adopt(&doc, doc.clone()));
            }
        }

        let candidates = self.including_roots(&doc);
        if let Some(root) = self.pick(&candidates) {
            if candidates.len() > 1 {
                crate::debug!("root"; "{} roots include {}, picked {}",
                    candidates.len(), doc.display(), root.display());
            }
            return Ok(self.adopt(&doc, root));
        }

        if root_capable {
            return Ok(self.adopt(&doc, doc.clone()));
        }

        Err(ResolveError::NotFound(doc))
    }

    /// Rescan the dependency set of `root`.
    pub fn refresh(&mut self, root: &Path) {
        let deps = scan::collect_dependencies(root);
        self.graph.record(root, &deps);
    }

    /// Files included by `root` (empty when unknown).
    pub fn dependencies(&self, root: &Path) -> Vec<PathBuf> {
        let mut deps: Vec<_> = self
            .graph
            .uses(root)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        deps.sort();
        deps
    }

    /// Known roots whose project contains `file` (the root itself counts).
    pub fn roots_containing(&self, file: &Path) -> Vec<PathBuf> {
        let mut roots: Vec<_> = self
            .graph
            .used_by(file)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        if self.graph.contains_root(file) {
            roots.push(file.to_path_buf());
        }
        roots.sort();
        roots
    }

    /// Record that `root` was just built, for ambiguous-root tie-breaks.
    pub fn mark_built(&mut self, root: &Path) {
        self.build_seq += 1;
        self.last_built.insert(root.to_path_buf(), self.build_seq);
    }

    /// Forget a discarded project.
    pub fn forget(&mut self, root: &Path) {
        self.graph.remove(root);
        self.last_built.remove(root);
        self.cache.retain(|_, r| r != root);
    }

    pub fn is_project_file(&self, path: &Path) -> bool {
        has_extension(path, &self.extensions)
    }

    // -------------------------------------------------------------------------
    // Private
    // -------------------------------------------------------------------------

    fn cached_root(&self, doc: &Path) -> Option<PathBuf> {
        let root = self.cache.get(doc)?;
        let still_included = root == doc
            || self
                .graph
                .used_by(doc)
                .is_some_and(|roots| roots.contains(root));
        (still_included && root.is_file()).then(|| root.clone())
    }

    fn adopt(&mut self, doc: &Path, root: PathBuf) -> PathBuf {
        self.refresh(&root);
        self.cache.insert(doc.to_path_buf(), root.clone());
        root
    }

    /// Among candidates, the most recently built one, else the first.
    fn pick(&self, candidates: &[PathBuf]) -> Option<PathBuf> {
        candidates
            .iter()
            .filter_map(|c| self.last_built.get(c).map(|seq| (seq, c)))
            .max_by_key(|(seq, _)| **seq)
            .map(|(_, c)| c)
            .or_else(|| candidates.first())
            .cloned()
    }

    /// Known and scanned roots that include `doc`, sorted by path.
    fn including_roots(&mut self, doc: &Path) -> Vec<PathBuf> {
        let mut found: FxHashSet<PathBuf> = self
            .graph
            .used_by(doc)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        for (root, deps) in self.scan_nearby_roots(doc) {
            if deps.contains(doc) {
                found.insert(root.clone());
            }
            self.graph.record(&root, &deps);
        }

        let mut found: Vec<_> = found.into_iter().collect();
        found.sort();
        found
    }

    /// Documents with `\documentclass` near `doc`, with their dependencies.
    ///
    /// Walks up to `search_depth` parent directories (never above the
    /// workspace) and from there down `search_depth` levels below `doc`'s
    /// directory.
    fn scan_nearby_roots(&self, doc: &Path) -> Vec<(PathBuf, FxHashSet<PathBuf>)> {
        let Some(dir) = doc.parent() else {
            return Vec::new();
        };

        let bounded = dir.starts_with(&self.workspace);
        let mut top = dir;
        let mut levels_up = 0;
        while levels_up < self.search_depth {
            if bounded && top == self.workspace {
                break;
            }
            let Some(parent) = top.parent() else {
                break;
            };
            top = parent;
            levels_up += 1;
        }

        let mut files: Vec<PathBuf> = WalkDir::new(top)
            .max_depth(levels_up + self.search_depth)
            .skip_hidden(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path())
            .filter(|p| p.as_path() != doc && has_extension(p, &self.root_extensions))
            .collect();
        files.sort();

        files
            .par_iter()
            .filter_map(|candidate| {
                let base = candidate.parent()?;
                let directives = scan::scan_file(candidate, base).ok()?;
                if !directives.has_documentclass {
                    return None;
                }
                let root = normalize_path(candidate);
                let deps = scan::collect_dependencies(&root);
                Some((root, deps))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        dir: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let dir = normalize_path(temp.path());
            Self { _temp: temp, dir }
        }

        fn write(&self, rel: &str, content: &str) -> PathBuf {
            let path = self.dir.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            path
        }

        fn resolver(&self) -> RootResolver {
            RootResolver::new(&WatchConfig::default(), &self.dir)
        }
    }

    #[test]
    fn test_document_with_class_is_own_root() {
        let fx = Fixture::new();
        let main = fx.write("main.tex", "\\documentclass{article}\n\\input{ch1}");
        let ch1 = fx.write("ch1.tex", "Hello");

        let mut resolver = fx.resolver();
        assert_eq!(resolver.resolve_root(&main).unwrap(), main);
        assert_eq!(resolver.dependencies(&main), vec![ch1.clone()]);
        assert_eq!(resolver.roots_containing(&ch1), vec![main]);
    }

    #[test]
    fn test_included_file_resolves_to_including_root() {
        let fx = Fixture::new();
        let main = fx.write("main.tex", "\\documentclass{book}\n\\include{chapters/one}");
        let one = fx.write("chapters/one.tex", "\\chapter{One}");

        let mut resolver = fx.resolver();
        assert_eq!(resolver.resolve_root(&one).unwrap(), main);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let fx = Fixture::new();
        fx.write("main.tex", "\\documentclass{book}\n\\input{a}");
        let a = fx.write("a.tex", "text");

        let mut resolver = fx.resolver();
        let first = resolver.resolve_root(&a).unwrap();
        let second = resolver.resolve_root(&a).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_magic_comment_wins() {
        let fx = Fixture::new();
        let real = fx.write("thesis.tex", "\\documentclass{report}");
        fx.write("other.tex", "\\documentclass{report}\n\\input{part}");
        let part = fx.write("part.tex", "% !TEX root = thesis.tex\nBody");

        let mut resolver = fx.resolver();
        assert_eq!(resolver.resolve_root(&part).unwrap(), real);
    }

    #[test]
    fn test_orphan_falls_back_to_self_root() {
        let fx = Fixture::new();
        let lonely = fx.write("notes.tex", "just text");

        let mut resolver = fx.resolver();
        assert_eq!(resolver.resolve_root(&lonely).unwrap(), lonely);
    }

    #[test]
    fn test_orphan_bib_is_not_found() {
        let fx = Fixture::new();
        let bib = fx.write("refs.bib", "@article{x,}");

        let mut resolver = fx.resolver();
        assert!(matches!(
            resolver.resolve_root(&bib),
            Err(ResolveError::NotFound(_))
        ));
    }

    #[test]
    fn test_bib_resolves_through_bibliography() {
        let fx = Fixture::new();
        let main = fx.write("main.tex", "\\documentclass{article}\n\\bibliography{refs}");
        let bib = fx.write("refs.bib", "@article{x,}");

        let mut resolver = fx.resolver();
        assert_eq!(resolver.resolve_root(&bib).unwrap(), main);
    }

    #[test]
    fn test_unsupported_type() {
        let fx = Fixture::new();
        let png = fx.write("figure.png", "");

        let mut resolver = fx.resolver();
        assert!(matches!(
            resolver.resolve_root(&png),
            Err(ResolveError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_ambiguous_root_prefers_first_then_most_recent_build() {
        let fx = Fixture::new();
        let a = fx.write("a.tex", "\\documentclass{article}\n\\input{shared}");
        let b = fx.write("b.tex", "\\documentclass{article}\n\\input{shared}");
        let shared = fx.write("shared.tex", "shared");

        let mut resolver = fx.resolver();
        assert_eq!(resolver.resolve_root(&shared).unwrap(), a);

        let mut resolver = fx.resolver();
        resolver.mark_built(&a);
        resolver.mark_built(&b);
        assert_eq!(resolver.resolve_root(&shared).unwrap(), b);
    }

    #[test]
    fn test_scan_finds_root_in_parent_directory() {
        let fx = Fixture::new();
        let main = fx.write("main.tex", "\\documentclass{article}\n\\input{parts/deep/x}");
        let x = fx.write("parts/deep/x.tex", "x");

        let mut resolver = fx.resolver();
        assert_eq!(resolver.resolve_root(&x).unwrap(), main);
    }

    #[test]
    fn test_forget_drops_project() {
        let fx = Fixture::new();
        let main = fx.write("main.tex", "\\documentclass{article}\n\\input{a}");
        let a = fx.write("a.tex", "a");

        let mut resolver = fx.resolver();
        resolver.resolve_root(&a).unwrap();
        resolver.forget(&main);
        assert!(resolver.roots_containing(&main).is_empty());
        assert!(resolver.roots_containing(&a).is_empty());
    }
}
