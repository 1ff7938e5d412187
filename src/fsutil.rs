//! Path and filesystem utilities shared by the scanner, resolver and cache.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::error::{BuildError, Result};

/// Directory basenames that are always excluded from source scanning.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "build",
    "builds",
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    "vendor",
    "__pycache__",
    ".eventchains",
    "CMakeFiles",
    ".vs",
    ".vscode",
    ".idea",
];

/// How a discovered file participates in the build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    /// A `.c`, `.cpp` or `.cc` file compiled into an object file.
    TranslationUnit,
    /// A `.h` or `.hpp` file included by other sources, never compiled alone.
    Header,
}

impl FileKind {
    pub fn is_header(self) -> bool {
        matches!(self, FileKind::Header)
    }
}

/// Classifies a path by extension.
///
/// Returns `None` for anything that is not a C/C++ source file. The match is
/// case-sensitive, like the compilers this tool drives.
pub fn classify(path: &Path) -> Option<FileKind> {
    match path.extension()?.to_str()? {
        "c" | "cpp" | "cc" => Some(FileKind::TranslationUnit),
        "h" | "hpp" => Some(FileKind::Header),
        _ => None,
    }
}

/// Checks whether a path names an existing regular file.
pub fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Returns the file's modification time in seconds since the UNIX epoch,
/// or `0` if it cannot be read.
pub fn file_mtime(path: &Path) -> i64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Normalize a path to be absolute and clean, without requiring it to exist.
///
/// This function:
/// - Converts relative paths to absolute using the current directory
/// - Removes `.` and `..` components where possible
/// - Does NOT resolve symlinks (preserves user intent)
///
/// Normalized paths are the identity under which the dependency graph and
/// the persistent cache store files, so two spellings of the same location
/// compare equal.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();

    let absolute = if path.is_relative() {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    } else {
        path.to_path_buf()
    };

    let mut components = Vec::new();
    for component in absolute.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                if let Some(last) = components.last()
                    && !matches!(last, Component::ParentDir)
                {
                    components.pop();
                    continue;
                }
                components.push(component);
            }
            Component::CurDir => continue,
            _ => components.push(component),
        }
    }

    let mut result = PathBuf::new();
    for component in components {
        result.push(component);
    }

    result
}

/// Checks a directory basename against the default and user exclusion lists.
pub fn is_excluded_dir(name: &str, extra_exclusions: &[String]) -> bool {
    DEFAULT_EXCLUSIONS.contains(&name) || extra_exclusions.iter().any(|e| e == name)
}

/// Recursively collects C/C++ source files under `dir`.
///
/// Directories are excluded by basename only (defaults plus
/// `extra_exclusions`). Entries within each directory are visited in name
/// order so that scans are deterministic across platforms. An unreadable
/// root directory is an error; unreadable subdirectories are skipped
/// silently, matching the permissive behavior of the scanner this replaces.
pub fn scan_source_files(
    dir: &Path,
    extra_exclusions: &[String],
    out: &mut Vec<PathBuf>,
) -> Result<()> {
    fs::read_dir(dir).map_err(|source| BuildError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    walk(dir, extra_exclusions, out);
    Ok(())
}

fn walk(dir: &Path, extra_exclusions: &[String], out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_excluded_dir(name, extra_exclusions) {
                continue;
            }
            walk(&path, extra_exclusions, out);
        } else if file_type.is_file() && classify(&path).is_some() {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(
            classify(Path::new("main.c")),
            Some(FileKind::TranslationUnit)
        );
        assert_eq!(
            classify(Path::new("a/b/app.cpp")),
            Some(FileKind::TranslationUnit)
        );
        assert_eq!(
            classify(Path::new("x.cc")),
            Some(FileKind::TranslationUnit)
        );
        assert_eq!(classify(Path::new("defs.h")), Some(FileKind::Header));
        assert_eq!(classify(Path::new("defs.hpp")), Some(FileKind::Header));
        assert_eq!(classify(Path::new("readme.md")), None);
        assert_eq!(classify(Path::new("Makefile")), None);
        // Case-sensitive, as for the compilers themselves.
        assert_eq!(classify(Path::new("main.C")), None);
    }

    #[test]
    fn test_normalize_path_cleans_components() {
        let normalized = normalize_path("./a/b/../c/./d");
        assert!(normalized.is_absolute());
        assert!(normalized.ends_with("a/c/d"));
        assert!(!normalized.to_string_lossy().contains(".."));
    }

    #[test]
    fn test_normalize_path_is_separator_stable() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let spelled_twice = (
            normalize_path(base.join("x").join("y.h")),
            normalize_path(base.join("x/./y.h")),
        );
        assert_eq!(spelled_twice.0, spelled_twice.1);
    }

    #[test]
    fn test_file_mtime_missing_file_is_zero() {
        assert_eq!(file_mtime(Path::new("/nonexistent/file.c")), 0);
    }

    #[test]
    fn test_default_exclusions_by_basename() {
        assert!(is_excluded_dir("build", &[]));
        assert!(is_excluded_dir(".git", &[]));
        assert!(is_excluded_dir(".eventchains", &[]));
        assert!(!is_excluded_dir("source", &[]));
        assert!(is_excluded_dir("docs", &["docs".to_string()]));
    }

    #[test]
    fn test_scan_skips_excluded_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir(root.join("src")).unwrap();
        fs::create_dir(root.join("build")).unwrap();
        fs::create_dir(root.join("docs")).unwrap();
        fs::write(root.join("main.c"), "int main(void) { return 0; }\n").unwrap();
        fs::write(root.join("src/util.c"), "int util(void) { return 1; }\n").unwrap();
        fs::write(root.join("src/util.h"), "int util(void);\n").unwrap();
        fs::write(root.join("build/stray.c"), "int stray;\n").unwrap();
        fs::write(root.join("docs/sample.c"), "int sample;\n").unwrap();
        fs::write(root.join("notes.txt"), "not a source\n").unwrap();

        let mut found = Vec::new();
        scan_source_files(root, &["docs".to_string()], &mut found).unwrap();

        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&"main.c".to_string()));
        assert!(names.contains(&"util.c".to_string()));
        assert!(names.contains(&"util.h".to_string()));
        assert!(!names.contains(&"stray.c".to_string()));
        assert!(!names.contains(&"sample.c".to_string()));
        assert!(!names.contains(&"notes.txt".to_string()));
    }

    #[test]
    fn test_scan_unreadable_root_errors() {
        let result = scan_source_files(Path::new("/nonexistent/project"), &[], &mut Vec::new());
        assert!(matches!(result, Err(BuildError::Io { .. })));
    }
}
