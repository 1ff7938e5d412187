//! Command-line interface definitions for ecbuild.
//!
//! The interface is a single zero-configuration build command:
//! `ecbuild [options] [source_directory]`. This module defines the flag set
//! with clap and the small argv preprocessing step that accepts the
//! traditional `-O0` spelling.
//!
//! # Example
//!
//! ```no_run
//! use ecbuild::cli::Cli;
//!
//! let cli = Cli::parse_args();
//! println!("building {}", cli.source_dir().display());
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::Parser;

/// Zero-configuration build system for C/C++ projects.
///
/// ecbuild scans the source directory, infers dependencies from `#include`
/// directives, compiles in dependency order and links the result; a
/// persistent content-addressed cache makes rebuilds incremental.
#[derive(Parser, Debug)]
#[command(
    name = "ecbuild",
    author,
    version,
    about = "Zero-configuration build system for C/C++ projects",
    long_about = "Zero-configuration build system for C/C++ projects.\n\n\
        ecbuild automatically finds all .c/.cpp/.cc/.h/.hpp files, determines \
        dependencies from #include directives, calculates a correct build \
        order, detects the main() entry point, and compiles and links \
        everything. Unchanged files are skipped via a persistent \
        content-hash cache that survives deletion of the build directory.\n\n\
        No Makefile, no CMakeLists.txt, no configuration needed."
)]
pub struct Cli {
    /// Source directory to build
    #[arg(value_name = "SOURCE_DIR", default_value = ".")]
    source_dir: PathBuf,

    /// Verbose output (show all compiler commands)
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Silence all output except for errors
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    quiet: bool,

    /// Debug build (adds -g)
    #[arg(short = 'd', long)]
    debug: bool,

    /// Disable optimization (drops the default -O2); also spelled -O0
    #[arg(long = "no-optimize", alias = "O0")]
    no_optimize: bool,

    /// Output binary name
    #[arg(short = 'o', long = "output", value_name = "NAME", default_value = "program")]
    output_binary: String,

    /// Build directory, resolved relative to the source directory
    #[arg(short = 'b', long = "build-dir", value_name = "DIR", default_value = "build")]
    build_dir: PathBuf,

    /// Number of parallel jobs (accepted and clamped; not honored yet)
    #[arg(short = 'j', long = "jobs", value_name = "N", default_value_t = 1)]
    jobs: usize,

    /// Remove the build directory before building
    #[arg(short = 'c', long)]
    clean: bool,

    /// Additional directory basenames to exclude (comma-separated),
    /// e.g. -e tests,examples,docs
    #[arg(short = 'e', long = "exclude", value_name = "DIRS", value_delimiter = ',')]
    exclude: Vec<String>,
}

impl Cli {
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn no_optimize(&self) -> bool {
        self.no_optimize
    }

    pub fn output_binary(&self) -> &str {
        &self.output_binary
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn clean(&self) -> bool {
        self.clean
    }

    /// Exclusion tokens with surrounding whitespace trimmed and empties
    /// dropped, so `-e " tests , docs "` behaves as expected.
    pub fn exclusions(&self) -> Vec<String> {
        self.exclude
            .iter()
            .map(|token| token.trim())
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Parses command-line arguments with the `-O0` compatibility rewrite.
    ///
    /// Exits 0 for `--help`/`--version` and 1 for usage errors, matching
    /// the build's own failure exit code.
    pub fn parse_args() -> Self {
        match Self::try_parse_from(preprocess_args(std::env::args_os())) {
            Ok(cli) => cli,
            Err(err) => {
                let code = if err.use_stderr() { 1 } else { 0 };
                let _ = err.print();
                std::process::exit(code);
            }
        }
    }
}

/// `-O0` is not expressible as a clap short flag, so it is rewritten to
/// `--no-optimize` before parsing.
fn preprocess_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| {
            if arg == "-O0" {
                OsString::from("--no-optimize")
            } else {
                arg
            }
        })
        .collect()
}
