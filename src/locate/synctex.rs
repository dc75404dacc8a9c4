//! Reader for uncompressed SyncTeX files.
//!
//! ```text
//! SyncTeX Version:1
//! Input:1:./main.tex
//! Magnification:1000
//! Unit:1
//! X Offset:0
//! Y Offset:0
//! Content:
//! {1
//! [1,10:4736286,45874556:30785863,39158276,0
//! (1,10:4736286,6212828:30785863,655360,0
//! x1,11:4736286,7525420
//! )
//! ]
//! }1
//! Postamble:
//! ```
//!
//! Only the fields needed for navigation are read: input tags, page
//! boundaries, and the `tag,line:x,y` prefix of box and node records.
//! Coordinates are converted to big points from the top-left of the page.

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::map::{PositionMap, Record};
use crate::utils::normalize_path;

/// Scaled points per big point.
const SP_PER_BP: f64 = 65781.76;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("mapping file `{0}` does not exist")]
    Missing(PathBuf),

    #[error("failed to read `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("malformed mapping file: {0}")]
    Malformed(String),
}

/// Read `path`, resolving relative input paths against `base`.
pub fn read(path: &Path, base: &Path) -> Result<PositionMap, ParseError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ParseError::Missing(path.to_path_buf()));
        }
        Err(err) => return Err(ParseError::Io(path.to_path_buf(), err)),
    };
    parse(&String::from_utf8_lossy(&bytes), base)
}

#[derive(Debug)]
struct Header {
    magnification: f64,
    unit: f64,
    x_offset: f64,
    y_offset: f64,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            magnification: 1000.0,
            unit: 1.0,
            x_offset: 0.0,
            y_offset: 0.0,
        }
    }
}

impl Header {
    fn to_bp(&self, value: f64, offset: f64) -> f64 {
        (value * self.unit * self.magnification / 1000.0 + offset) / SP_PER_BP
    }
}

pub fn parse(text: &str, base: &Path) -> Result<PositionMap, ParseError> {
    let mut lines = text.lines().enumerate();

    match lines.next() {
        Some((_, first)) if first.starts_with("SyncTeX Version:") => {}
        _ => return Err(ParseError::Malformed("missing SyncTeX header".into())),
    }

    let mut header = Header::default();
    let mut inputs = Inputs::new(base);
    let mut in_content = false;

    for (_, line) in lines.by_ref() {
        if line == "Content:" {
            in_content = true;
            break;
        }
        if let Some(rest) = line.strip_prefix("Input:") {
            inputs.declare(rest)?;
        } else if let Some(v) = line.strip_prefix("Magnification:") {
            header.magnification = number(v, "Magnification")?;
        } else if let Some(v) = line.strip_prefix("Unit:") {
            header.unit = number(v, "Unit")?;
        } else if let Some(v) = line.strip_prefix("X Offset:") {
            header.x_offset = number(v, "X Offset")?;
        } else if let Some(v) = line.strip_prefix("Y Offset:") {
            header.y_offset = number(v, "Y Offset")?;
        }
    }
    if !in_content {
        return Err(ParseError::Malformed("missing Content section".into()));
    }

    let mut records = Vec::new();
    let mut page: Option<u32> = None;

    for (index, line) in lines {
        let Some(kind) = line.chars().next() else {
            continue;
        };
        match kind {
            '{' => page = Some(integer(&line[1..], index)?),
            '}' => page = None,
            '[' | '(' | 'v' | 'h' | 'x' | 'k' | 'g' | '$' => {
                let Some(page) = page else {
                    continue;
                };
                let (tag, line_no, x, y) = node(&line[1..], index)?;
                let Some(file) = inputs.index_of(tag) else {
                    continue;
                };
                records.push(Record {
                    file,
                    line: line_no,
                    page,
                    x: header.to_bp(x, header.x_offset),
                    y: header.to_bp(y, header.y_offset),
                });
            }
            'I' if line.starts_with("Input:") => inputs.declare(&line["Input:".len()..])?,
            'P' if line.starts_with("Postamble:") => break,
            _ => {}
        }
    }

    Ok(PositionMap::new(inputs.files, records))
}

/// Input tag table: tag number → index into `files`.
struct Inputs<'a> {
    base: &'a Path,
    files: Vec<PathBuf>,
    tags: FxHashMap<u32, usize>,
}

impl<'a> Inputs<'a> {
    fn new(base: &'a Path) -> Self {
        Self {
            base,
            files: Vec::new(),
            tags: FxHashMap::default(),
        }
    }

    /// `rest` is `tag:path`.
    fn declare(&mut self, rest: &str) -> Result<(), ParseError> {
        let (tag, path) = rest
            .split_once(':')
            .ok_or_else(|| ParseError::Malformed(format!("bad Input line `{rest}`")))?;
        let tag: u32 = tag
            .trim()
            .parse()
            .map_err(|_| ParseError::Malformed(format!("bad input tag `{tag}`")))?;

        let path = Path::new(path.trim());
        let path = normalize_path(&self.base.join(path));
        let index = match self.files.iter().position(|f| *f == path) {
            Some(index) => index,
            None => {
                self.files.push(path);
                self.files.len() - 1
            }
        };
        self.tags.insert(tag, index);
        Ok(())
    }

    fn index_of(&self, tag: u32) -> Option<usize> {
        self.tags.get(&tag).copied()
    }
}

/// `tag,line(,column):x,y(:...)`
fn node(rest: &str, index: usize) -> Result<(u32, u32, f64, f64), ParseError> {
    let bad = || ParseError::Malformed(format!("bad record on line {}", index + 1));

    let mut parts = rest.split(':');
    let link = parts.next().ok_or_else(bad)?;
    let point = parts.next().ok_or_else(bad)?;

    let mut link = link.split(',');
    let tag = link.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
    let line = link.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;

    let (x, y) = point.split_once(',').ok_or_else(bad)?;
    let x: f64 = x.parse().map_err(|_| bad())?;
    let y: f64 = y.parse().map_err(|_| bad())?;

    Ok((tag, line, x, y))
}

fn integer(text: &str, index: usize) -> Result<u32, ParseError> {
    text.trim()
        .parse()
        .map_err(|_| ParseError::Malformed(format!("bad page number on line {}", index + 1)))
}

fn number(text: &str, field: &str) -> Result<f64, ParseError> {
    text.trim()
        .parse()
        .map_err(|_| ParseError::Malformed(format!("bad {field} `{}`", text.trim())))
}
