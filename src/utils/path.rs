//! Path normalization utilities.

use std::path::{Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to:
/// - Return as-is if already absolute
/// - Join with current directory if relative
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

/// Lower-cased extension of `path`, if any.
pub fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Check whether `path` has one of `extensions` (case-insensitive, no dot).
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    extension(path).is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
}

/// Check if path is a temp/backup file (editor artifacts).
pub fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with(".#")
        || name.starts_with('.')
}

/// Display a path relative to `base` when possible.
pub fn display_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_absolute() {
        let normalized = normalize_path(Path::new("/absolute/path/file.tex"));
        assert!(normalized.is_absolute());
    }

    #[test]
    fn test_normalize_path_relative() {
        let normalized = normalize_path(Path::new("relative/path/file.tex"));
        assert!(normalized.is_absolute());
    }

    #[test]
    fn test_has_extension_case_insensitive() {
        let exts = vec!["tex".to_string(), "bib".to_string()];
        assert!(has_extension(Path::new("/a/main.TEX"), &exts));
        assert!(has_extension(Path::new("refs.bib"), &exts));
        assert!(!has_extension(Path::new("main.pdf"), &exts));
        assert!(!has_extension(Path::new("Makefile"), &exts));
    }

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(Path::new("/p/.main.tex.swp")));
        assert!(is_temp_file(Path::new("/p/main.tex~")));
        assert!(is_temp_file(Path::new("/p/.#main.tex")));
        assert!(!is_temp_file(Path::new("/p/main.tex")));
    }

    #[test]
    fn test_display_relative() {
        assert_eq!(
            display_relative(Path::new("/proj/ch/intro.tex"), Path::new("/proj")),
            "ch/intro.tex"
        );
        assert_eq!(
            display_relative(Path::new("/other/x.tex"), Path::new("/proj")),
            "/other/x.tex"
        );
    }
}
