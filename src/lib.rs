//! # ecbuild
//!
//! A zero-configuration build system for C/C++ projects. Point it at a
//! source directory and it discovers every translation unit, infers the
//! dependency graph from `#include` directives, compiles in topological
//! order, links the final executable, and keeps a persistent
//! content-addressed cache so incremental rebuilds skip unchanged work.
//!
//! ## Key Features
//!
//! - **Zero configuration**: no Makefile, no CMakeLists.txt — the include
//!   graph *is* the build description
//! - **Content-based caching**: FNV-1a hashing of sources and their direct
//!   dependencies decides what to recompile; timestamps are informational
//! - **Cache survives cleaning**: metadata lives in
//!   `<project>/.eventchains/`, outside the build directory, so deleting
//!   `build/` only costs the object files
//! - **Middleware pipeline**: every compile task runs through layered
//!   timing, caching, logging and statistics middlewares with fail-fast
//!   semantics
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`]: Command-line interface definitions using clap
//! - [`commands`]: The top-level build flow
//! - [`error`]: Error types and handling with thiserror + miette
//! - [`graph`]: Source discovery, include resolution and topological
//!   ordering
//! - [`cache`]: The persistent content-hash cache
//! - [`chain`] / [`middleware`]: The task chain and its middleware onion
//! - [`build`]: The orchestrator wiring graph, chain and cache together
//! - [`compiler`] / [`config`]: Compiler detection, command composition and
//!   subprocess execution
//!
//! Support modules: `fsutil` (path normalization, scanning), `includes`
//! (directive parsing and resolution), `hashing` (FNV-1a), `logging`.
//!
//! ## Library Usage
//!
//! ecbuild is primarily a CLI tool, but the build pipeline is exposed for
//! integration and testing:
//!
//! ```no_run
//! use ecbuild::build;
//! use ecbuild::config::BuildConfig;
//! use ecbuild::graph::DependencyGraph;
//! use ecbuild::logging::Logger;
//!
//! # fn main() -> Result<(), ecbuild::error::BuildError> {
//! let mut graph = DependencyGraph::new();
//! graph.add_search_path("./src")?;
//! graph.scan_directory(std::path::Path::new("./src"), &[])?;
//!
//! let config = BuildConfig::builder()
//!     .output_dir("./src/build")
//!     .output_binary("app")
//!     .build();
//!
//! let report = build::build_project(graph, config, Logger::new(0, false))?;
//! println!("binary at {}", report.binary_path.display());
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod cache;
pub mod chain;
pub mod cli;
pub mod commands;
pub mod compiler;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod graph;
pub mod hashing;
pub mod includes;
pub mod logging;
pub mod middleware;
