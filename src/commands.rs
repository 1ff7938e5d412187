//! Top-level build flow: the glue between the parsed CLI and the
//! orchestrator.

use std::fs;
use std::path::PathBuf;

use crate::build::{self, BuildReport};
use crate::cli::Cli;
use crate::config::BuildConfig;
use crate::error::{BuildError, Result};
use crate::fsutil::normalize_path;
use crate::graph::DependencyGraph;
use crate::logging::Logger;

/// Executes a build from parsed CLI arguments.
pub fn execute(cli: &Cli) -> Result<()> {
    run(cli).map(|_| ())
}

/// Executes a build and returns the report; used by `execute` and by
/// integration tests that assert on statistics.
pub fn run(cli: &Cli) -> Result<BuildReport> {
    let logger = Logger::new(u8::from(cli.verbose()), cli.quiet());

    let source_dir = normalize_path(cli.source_dir());
    let exclusions = cli.exclusions();

    logger.info(format!("Scanning: {}", source_dir.display()));
    if !exclusions.is_empty() {
        logger.info(format!("Excluding: {}", exclusions.join(", ")));
    }

    let mut graph = DependencyGraph::new();
    graph.add_search_path(&source_dir)?;
    graph.add_search_path(".")?;
    graph.scan_directory(&source_dir, &exclusions)?;

    if graph.is_empty() {
        return Err(BuildError::NoSources(source_dir));
    }
    logger.info(format!("Found {} source files", graph.len()));

    // Fail fast on cycles, before any configuration or cleaning happens.
    if let Some((from, to)) = graph.find_cycle() {
        return Err(BuildError::CircularDependency { from, to });
    }

    let output_dir = resolve_output_dir(&source_dir, cli.build_dir());

    let jobs = cli.jobs().max(1);
    if jobs > 1 {
        logger.warn("parallel jobs are not honored yet; building sequentially");
    }

    let config = BuildConfig::builder()
        .output_dir(&output_dir)
        .output_binary(cli.output_binary())
        .include_path(&source_dir)
        .verbose(cli.verbose())
        .debug(cli.debug())
        .optimize(!cli.no_optimize())
        .parallel_jobs(jobs)
        .build();

    // Clean runs before the orchestrator's cache init; the cache lives in
    // `<project>/.eventchains/` and survives this.
    if cli.clean() {
        logger.info(format!(
            "Cleaning build directory: {}",
            output_dir.display()
        ));
        if let Err(err) = fs::remove_dir_all(&output_dir)
            && err.kind() != std::io::ErrorKind::NotFound
        {
            logger.warn(format!("failed to clean build directory: {err}"));
        }
    }

    build::build_project(graph, config, logger)
}

/// A relative build directory is resolved against the source directory.
fn resolve_output_dir(source_dir: &std::path::Path, build_dir: &std::path::Path) -> PathBuf {
    if build_dir.is_absolute() {
        normalize_path(build_dir)
    } else {
        normalize_path(source_dir.join(build_dir))
    }
}
