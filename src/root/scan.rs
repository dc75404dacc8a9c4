//! Static directive scan of LaTeX sources.
//!
//! Extracts just enough from a document to build the project graph: the
//! `% !TEX root` magic comment, whether the file declares a document class,
//! and which files it pulls in.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashSet;

/// Only this many leading lines are searched for the magic comment.
const MAGIC_COMMENT_LINES: usize = 20;

static MAGIC_ROOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*%\s*!\s*tex\s+root\s*=\s*(.+?)\s*$").expect("valid regex")
});

static DOCUMENTCLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\documentclass\s*(?:\[[^\]]*\])?\s*\{").expect("valid regex"));

static BRACED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\\(input|include|subfile|InputIfFileExists|includeonly|import|subimport|inputfrom|subinputfrom|includefrom|subincludefrom|bibliography|addbibresource|usepackage|RequirePackage)\*?\s*(?:\[[^\]]*\])?\s*\{([^}]*)\}(?:\s*\{([^}]*)\})?",
    )
    .expect("valid regex")
});

/// TeX primitive form: `\input chapter1`
static BARE_INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\input\s+([^\s{}\\%]+)").expect("valid regex"));

/// What a single source file declares.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Directives {
    /// Root named by `% !TEX root = ...`, resolved against the file's directory.
    pub magic_root: Option<PathBuf>,
    /// The file contains `\documentclass` outside comments.
    pub has_documentclass: bool,
    /// Files this document includes (may not exist).
    pub includes: Vec<Include>,
}

/// One inclusion directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    /// Candidate paths, tried in order. The first existing one wins.
    pub candidates: Vec<PathBuf>,
}

impl Include {
    /// First candidate that exists on disk.
    pub fn resolve(&self) -> Option<PathBuf> {
        self.candidates.iter().find(|p| p.is_file()).cloned()
    }
}

/// Scan a file on disk.
pub fn scan_file(path: &Path, root_dir: &Path) -> io::Result<Directives> {
    let bytes = fs::read(path)?;
    let source = String::from_utf8_lossy(&bytes);
    let dir = path.parent().unwrap_or(root_dir);
    Ok(scan_source(&source, dir, root_dir))
}

/// Scan source text.
///
/// `dir` is the directory of the scanned file, `root_dir` the directory the
/// compiler runs in. Plain `\input`/`\include` resolve against both (in that
/// order); `\subfile` and the `import` family resolve against `dir` only.
pub fn scan_source(source: &str, dir: &Path, root_dir: &Path) -> Directives {
    let mut directives = Directives {
        magic_root: find_magic_root(source, dir),
        ..Directives::default()
    };

    let stripped = strip_comments(source);
    directives.has_documentclass = DOCUMENTCLASS.is_match(&stripped);

    for caps in BRACED.captures_iter(&stripped) {
        let command = &caps[1];
        let first = caps[2].trim();
        let second = caps.get(3).map(|m| m.as_str().trim());
        directives
            .includes
            .extend(include_for(command, first, second, dir, root_dir));
    }

    for caps in BARE_INPUT.captures_iter(&stripped) {
        let name = caps[1].trim();
        directives
            .includes
            .push(tex_include(name, &[dir, root_dir]));
    }

    directives
}

fn include_for(
    command: &str,
    first: &str,
    second: Option<&str>,
    dir: &Path,
    root_dir: &Path,
) -> Vec<Include> {
    if first.is_empty() {
        return Vec::new();
    }

    match command {
        "input" | "include" | "InputIfFileExists" => vec![tex_include(first, &[dir, root_dir])],
        "subfile" => vec![tex_include(first, &[dir])],
        "import" | "subimport" | "inputfrom" | "subinputfrom" | "includefrom" | "subincludefrom" => {
            let Some(file) = second.filter(|s| !s.is_empty()) else {
                return Vec::new();
            };
            let base = dir.join(first);
            vec![tex_include(file, &[base.as_path()])]
        }
        "bibliography" => split_list(first)
            .map(|name| with_extension_include(name, "bib", &[dir, root_dir]))
            .collect(),
        "addbibresource" => vec![Include {
            candidates: vec![dir.join(first), root_dir.join(first)],
        }],
        "usepackage" | "RequirePackage" => split_list(first)
            .map(|name| with_extension_include(name, "sty", &[dir, root_dir]))
            .collect(),
        // `\includeonly` restricts, it never adds files.
        _ => Vec::new(),
    }
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// `name` with `.tex` appended when it has no extension.
fn tex_include(name: &str, bases: &[&Path]) -> Include {
    let name = name.trim_matches('"');
    let file = if Path::new(name).extension().is_some() {
        PathBuf::from(name)
    } else {
        PathBuf::from(format!("{name}.tex"))
    };
    Include {
        candidates: bases.iter().map(|b| b.join(&file)).collect(),
    }
}

fn with_extension_include(name: &str, ext: &str, bases: &[&Path]) -> Include {
    let file = if name.ends_with(&format!(".{ext}")) {
        PathBuf::from(name)
    } else {
        PathBuf::from(format!("{name}.{ext}"))
    };
    Include {
        candidates: bases.iter().map(|b| b.join(&file)).collect(),
    }
}

fn find_magic_root(source: &str, dir: &Path) -> Option<PathBuf> {
    source.lines().take(MAGIC_COMMENT_LINES).find_map(|line| {
        let caps = MAGIC_ROOT.captures(line)?;
        let target = caps[1].trim_matches('"');
        Some(dir.join(target))
    })
}

/// Remove `%` comments, keeping escaped `\%`.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        let mut escaped = false;
        let mut end = line.len();
        for (i, ch) in line.char_indices() {
            match ch {
                '\\' => escaped = !escaped,
                '%' if !escaped => {
                    end = i;
                    break;
                }
                _ => escaped = false,
            }
        }
        out.push_str(&line[..end]);
        out.push('\n');
    }
    out
}

/// All files reachable from `root` through inclusion directives.
///
/// Only existing files are returned; the root itself is not part of the set.
pub fn collect_dependencies(root: &Path) -> FxHashSet<PathBuf> {
    let root_dir = root.parent().unwrap_or(Path::new("."));
    let mut seen = FxHashSet::default();
    let mut stack = vec![root.to_path_buf()];
    let mut visited = FxHashSet::default();

    while let Some(file) = stack.pop() {
        if !visited.insert(file.clone()) {
            continue;
        }
        let Ok(directives) = scan_file(&file, root_dir) else {
            continue;
        };
        for include in directives.includes {
            let Some(found) = include.resolve() else {
                continue;
            };
            let found = crate::utils::normalize_path(&found);
            if found == root {
                continue;
            }
            if is_scannable(&found) {
                stack.push(found.clone());
            }
            seen.insert(found);
        }
    }

    seen
}

/// Only TeX sources are followed further; bib/sty/cls files are leaves.
fn is_scannable(path: &Path) -> bool {
    matches!(
        crate::utils::path::extension(path).as_deref(),
        Some("tex" | "ltx" | "latex")
    )
}
