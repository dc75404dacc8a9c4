//! Pulling the interesting lines out of toolchain output.

use std::sync::LazyLock;

use regex::Regex;

/// Lines kept per category, so one runaway log cannot flood the status.
const MAX_LINES: usize = 20;

/// `! Undefined control sequence.` or `./main.tex:12: Undefined ...`
static ERROR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:! .+|[^\s:]+\.\w+:\d+: .+)$").expect("valid regex"));

static WARNING_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:.*\bwarning\b:?.+)$").expect("valid regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Diagnostics {
    pub fn extract(output: &str) -> Self {
        let mut diagnostics = Self::default();
        for line in output.lines().map(str::trim_end) {
            if ERROR_LINE.is_match(line) {
                if diagnostics.errors.len() < MAX_LINES {
                    diagnostics.errors.push(line.to_string());
                }
            } else if WARNING_LINE.is_match(line) && diagnostics.warnings.len() < MAX_LINES {
                diagnostics.warnings.push(line.to_string());
            }
        }
        diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    /// First error, else first warning.
    pub fn headline(&self) -> Option<&str> {
        self.errors
            .first()
            .or_else(|| self.warnings.first())
            .map(String::as_str)
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
This is pdfTeX, Version 3.141592653
(./main.tex
LaTeX Warning: Reference `fig:a' on page 1 undefined on input line 7.
./main.tex:12: Undefined control sequence.
l.12 \\foo
! Emergency stop.
Output written on main.pdf (1 page, 1234 bytes).
";

    #[test]
    fn test_patterns_compile() {
        LazyLock::force(&ERROR_LINE);
        LazyLock::force(&WARNING_LINE);
        assert!(WARNING_LINE.is_match("Package hyperref WARNING: Token not allowed"));
    }

    #[test]
    fn test_extract_errors_and_warnings() {
        let d = Diagnostics::extract(LOG);
        assert_eq!(
            d.errors,
            [
                "./main.tex:12: Undefined control sequence.",
                "! Emergency stop."
            ]
        );
        assert_eq!(d.warnings.len(), 1);
        assert!(d.warnings[0].starts_with("LaTeX Warning"));
        assert_eq!(d.headline(), Some("./main.tex:12: Undefined control sequence."));
    }

    #[test]
    fn test_clean_output() {
        let d = Diagnostics::extract("Output written on main.pdf (1 page).\n");
        assert!(d.is_empty());
        assert_eq!(d.headline(), None);
    }

    #[test]
    fn test_line_cap() {
        let log = "! boom\n".repeat(MAX_LINES + 5);
        assert_eq!(Diagnostics::extract(&log).errors.len(), MAX_LINES);
    }
}
