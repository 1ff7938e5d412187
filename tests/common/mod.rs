//! Shared fixtures for the end-to-end scenarios.

use std::fs;
use std::path::{Path, PathBuf};

use ecbuild::build::{self, BuildReport};
use ecbuild::config::{BuildConfig, detect_compiler};
use ecbuild::error::Result;
use ecbuild::fsutil::normalize_path;
use ecbuild::graph::DependencyGraph;
use ecbuild::logging::Logger;

/// The canonical linear-chain project:
/// `a.h` (no includes) <- `b.h` <- `m.c` (with `main`).
pub fn write_linear_chain(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    let a = dir.join("a.h");
    let b = dir.join("b.h");
    let m = dir.join("m.c");
    fs::write(&a, "int a_value(void);\n").unwrap();
    fs::write(&b, "#include \"a.h\"\nint b_value(void);\n").unwrap();
    fs::write(&m, "#include \"b.h\"\nint main(void) { return 0; }\n").unwrap();
    (normalize_path(a), normalize_path(b), normalize_path(m))
}

/// Scans a source directory into a fresh graph the way the CLI does:
/// search paths are the source directory, then the working directory.
pub fn scan(source_dir: &Path) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::new();
    graph.add_search_path(source_dir)?;
    graph.add_search_path(".")?;
    graph.scan_directory(source_dir, &[])?;
    Ok(graph)
}

/// Runs a full build of `source_dir` with `build/` as the output directory,
/// exactly as `ecbuild <source_dir>` would, returning the report.
pub fn run_build(source_dir: &Path) -> Result<BuildReport> {
    let graph = scan(source_dir)?;
    let config = BuildConfig::builder()
        .output_dir(source_dir.join("build"))
        .output_binary("program")
        .include_path(source_dir)
        .build();
    build::build_project(graph, config, Logger::new(0, true))
}

/// End-to-end scenarios that invoke the compiler are skipped on machines
/// without one; the graph- and cache-level scenarios still run everywhere.
pub fn compiler_available() -> bool {
    if detect_compiler().is_ok() {
        true
    } else {
        eprintln!("skipping: no C compiler found (tried gcc, clang, cl)");
        false
    }
}
