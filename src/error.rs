//! Error types for ecbuild.
//!
//! This module defines all error types used throughout ecbuild, using a
//! combination of `thiserror` for ergonomic error definitions and `miette`
//! for rich diagnostic output.
//!
//! # Error Handling Strategy
//!
//! - All fatal errors derive from [`BuildError`]
//! - Each variant includes helpful error messages and diagnostic codes
//! - Cache corruption and cache I/O failures are deliberately *non-fatal*:
//!   they are reported as warnings and the build proceeds with a fresh or
//!   absent cache
//! - Errors are automatically converted to `miette::Result` for CLI output

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Error types that can occur in ecbuild operations.
#[derive(Error, Debug, Diagnostic)]
pub enum BuildError {
    /// File system I/O error during build operations.
    ///
    /// Common causes: permission denied, file removed mid-scan, disk full.
    #[error("I/O error accessing '{path}'")]
    #[diagnostic(code(ecbuild::io_error))]
    Io {
        /// The path that caused the I/O error
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A path handed to the dependency graph does not name a regular file.
    #[error("File not found: '{0}'")]
    #[diagnostic(
        code(ecbuild::file_not_found),
        help("Check that the path exists and is a regular file.")
    )]
    FileNotFound(PathBuf),

    /// A path handed to the dependency graph is not a C/C++ source file.
    ///
    /// Only `.c`, `.cpp`, `.cc` translation units and `.h`, `.hpp` headers
    /// participate in the build.
    #[error("Not a C/C++ source file: '{0}'")]
    #[diagnostic(code(ecbuild::invalid_path))]
    NotASourceFile(PathBuf),

    /// The dependency graph grew past its file bound.
    #[error("Too many source files (limit: {limit})")]
    #[diagnostic(
        code(ecbuild::graph::too_many_files),
        help("Split the project or exclude directories with --exclude.")
    )]
    TooManyFiles {
        /// The enforced bound
        limit: usize,
    },

    /// A single file resolved more include directives than the bound allows.
    #[error("Too many includes in '{path}' (limit: {limit})")]
    #[diagnostic(code(ecbuild::graph::too_many_includes))]
    TooManyIncludes {
        /// The file whose include list overflowed
        path: PathBuf,
        /// The enforced bound
        limit: usize,
    },

    /// The search path list grew past its bound.
    #[error("Too many include search paths (limit: {limit})")]
    #[diagnostic(code(ecbuild::graph::too_many_search_paths))]
    TooManySearchPaths {
        /// The enforced bound
        limit: usize,
    },

    /// The include graph contains a cycle, so no build order exists.
    ///
    /// The two paths form a witness: `from` includes `to`, and `to` is
    /// already on the traversal stack.
    #[error("Circular dependency detected: {from} -> {to}")]
    #[diagnostic(
        code(ecbuild::graph::circular_dependency),
        help("Break the include cycle, e.g. with a forward declaration.")
    )]
    CircularDependency {
        /// The file whose include closed the cycle
        from: PathBuf,
        /// The file already on the traversal stack
        to: PathBuf,
    },

    /// No translation units were found, so there is nothing to compile.
    #[error("No source files to compile in '{0}'")]
    #[diagnostic(
        code(ecbuild::no_sources),
        help("ecbuild looks for .c, .cpp and .cc files; headers alone cannot be built.")
    )]
    NoSources(PathBuf),

    /// No usable C/C++ compiler was found on PATH.
    #[error("No compiler found (tried gcc, clang, cl)")]
    #[diagnostic(
        code(ecbuild::compiler_not_found),
        help("Install gcc or clang, or ensure the compiler is on PATH.")
    )]
    CompilerNotFound,

    /// One or more compile tasks failed; the pipeline stopped at the first.
    ///
    /// The captured compiler output has already been reported by the logging
    /// middleware at the point of failure.
    #[error("Build failed: {failed} task(s) failed")]
    #[diagnostic(code(ecbuild::compilation_failed))]
    CompilationFailed {
        /// Number of failed tasks recorded by the chain
        failed: usize,
    },

    /// The final link step failed.
    #[error("Linking failed: {message}")]
    #[diagnostic(code(ecbuild::link_failed))]
    LinkFailed {
        /// The captured linker output (or a short description)
        message: String,
    },

    /// Failed to serialize the cache snapshot to rkyv format.
    ///
    /// Treated as non-fatal by callers: the build completes, only the cache
    /// on disk goes stale.
    #[error("Failed to serialize build cache")]
    #[diagnostic(code(ecbuild::cache::serialization_error))]
    CacheSerialization(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A path could not be stored in the cache because it is not UTF-8.
    #[error("Invalid UTF-8 in path: {0}")]
    #[diagnostic(
        code(ecbuild::path::invalid_utf8),
        help("Cache entries are keyed by UTF-8 paths.")
    )]
    InvalidUtf8Path(PathBuf),
}

/// Type alias for Results in this crate
pub type Result<T> = std::result::Result<T, BuildError>;
