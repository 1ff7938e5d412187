//! Extraction and resolution of `#include` directives.
//!
//! The parser is line-oriented and deliberately naive: comments, string
//! literals and conditional compilation are not honored, so every textual
//! `#include` counts as a dependency. That keeps the scanner fast and
//! self-contained at the cost of occasionally tracking a directive that the
//! preprocessor would have discarded, which only ever causes a spurious
//! rebuild, never a missed one.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};
use crate::fsutil::{is_regular_file, normalize_path};

/// Whether a directive was spelled `"header.h"` or `<header.h>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncludeKind {
    Quoted,
    Angle,
}

/// One `#include` directive as it appears in the source text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncludeDirective {
    pub spelling: String,
    pub kind: IncludeKind,
}

/// Parses a single source line into an include directive, if it is one.
///
/// Grammar: optional whitespace, `#`, optional whitespace, `include`,
/// optional whitespace, then a `"…"` or `<…>` spelling. Text is taken up to
/// the closing delimiter, or to the end of the line when the delimiter is
/// missing.
pub fn parse_include_line(line: &str) -> Option<IncludeDirective> {
    let rest = line.trim_start();
    let rest = rest.strip_prefix('#')?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix("include")?;
    let rest = rest.trim_start();

    let mut chars = rest.chars();
    let (kind, close) = match chars.next()? {
        '"' => (IncludeKind::Quoted, '"'),
        '<' => (IncludeKind::Angle, '>'),
        _ => return None,
    };

    let spelling: String = chars.take_while(|&c| c != close).collect();
    Some(IncludeDirective { spelling, kind })
}

/// Extracts every include directive from a source file.
///
/// Non-UTF-8 byte sequences are replaced lossily; include spellings are
/// plain ASCII in any project this tool is pointed at.
pub fn scan_file(path: &Path) -> Result<Vec<IncludeDirective>> {
    let bytes = fs::read(path).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);

    Ok(text.lines().filter_map(parse_include_line).collect())
}

/// Resolves an include spelling to an on-disk file.
///
/// Resolution order:
/// 1. quoted includes only: next to the referring file;
/// 2. each graph search path, in order;
/// 3. the spelling itself, relative to the process working directory.
///
/// Returns `None` when nothing matches. That is not an error: system
/// headers are intentionally left unresolved and untracked, and a missing
/// user header is the compiler's diagnostic to make.
pub fn resolve_include(
    directive: &IncludeDirective,
    referrer: &Path,
    search_paths: &[PathBuf],
) -> Option<PathBuf> {
    let spelling = Path::new(&directive.spelling);

    if directive.kind == IncludeKind::Quoted
        && let Some(dir) = referrer.parent()
    {
        let candidate = dir.join(spelling);
        if is_regular_file(&candidate) {
            return Some(normalize_path(candidate));
        }
    }

    for search_path in search_paths {
        let candidate = search_path.join(spelling);
        if is_regular_file(&candidate) {
            return Some(normalize_path(candidate));
        }
    }

    if is_regular_file(spelling) {
        return Some(normalize_path(spelling));
    }

    None
}
