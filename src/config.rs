//! Build configuration and compiler auto-detection.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{BuildError, Result};

/// Which compiler family drives the build.
///
/// The command lines this tool composes are gcc-compatible; `Msvc` is
/// detected so `cl` can be reported, but no flag translation is attempted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompilerKind {
    #[default]
    Auto,
    Gcc,
    Clang,
    Msvc,
}

/// Everything the compile/link driver needs to compose command lines.
#[derive(Clone, Debug)]
pub struct BuildConfig {
    pub compiler: CompilerKind,
    pub compiler_path: Option<PathBuf>,
    pub cflags: Vec<String>,
    pub ldflags: Vec<String>,
    pub include_paths: Vec<PathBuf>,
    pub library_paths: Vec<PathBuf>,
    pub libraries: Vec<String>,
    pub output_dir: PathBuf,
    pub output_binary: String,
    pub verbose: bool,
    pub debug: bool,
    pub optimize: bool,
    /// Accepted and clamped, but the pipeline is sequential; a value above 1
    /// earns a warning and nothing else.
    pub parallel_jobs: usize,
}

impl BuildConfig {
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder::default()
    }

    /// Resolves the compiler, probing PATH when it is still `Auto`.
    pub fn ensure_compiler(&mut self) -> Result<()> {
        if self.compiler != CompilerKind::Auto && self.compiler_path.is_some() {
            return Ok(());
        }
        let (kind, path) = detect_compiler()?;
        self.compiler = kind;
        self.compiler_path = Some(path);
        Ok(())
    }

    /// The compiler executable to invoke; `gcc` until detection has run.
    pub fn compiler_program(&self) -> PathBuf {
        self.compiler_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("gcc"))
    }
}

/// Builder for [`BuildConfig`].
///
/// `build()` assembles the default flag set: `-Wall` always, `-O2` when
/// optimization is enabled, `-g` for debug builds, then any extra cflags.
#[derive(Debug)]
pub struct BuildConfigBuilder {
    compiler: CompilerKind,
    compiler_path: Option<PathBuf>,
    extra_cflags: Vec<String>,
    ldflags: Vec<String>,
    include_paths: Vec<PathBuf>,
    library_paths: Vec<PathBuf>,
    libraries: Vec<String>,
    output_dir: PathBuf,
    output_binary: String,
    verbose: bool,
    debug: bool,
    optimize: bool,
    parallel_jobs: usize,
}

impl Default for BuildConfigBuilder {
    fn default() -> Self {
        Self {
            compiler: CompilerKind::Auto,
            compiler_path: None,
            extra_cflags: Vec::new(),
            ldflags: Vec::new(),
            include_paths: Vec::new(),
            library_paths: Vec::new(),
            libraries: Vec::new(),
            output_dir: PathBuf::from("build"),
            output_binary: "program".to_string(),
            verbose: false,
            debug: false,
            optimize: true,
            parallel_jobs: 1,
        }
    }
}

impl BuildConfigBuilder {
    pub fn compiler(mut self, kind: CompilerKind) -> Self {
        self.compiler = kind;
        self
    }

    pub fn compiler_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.compiler_path = Some(path.into());
        self
    }

    pub fn cflag(mut self, flag: impl Into<String>) -> Self {
        self.extra_cflags.push(flag.into());
        self
    }

    pub fn ldflag(mut self, flag: impl Into<String>) -> Self {
        self.ldflags.push(flag.into());
        self
    }

    pub fn include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    pub fn library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_paths.push(path.into());
        self
    }

    pub fn library(mut self, name: impl Into<String>) -> Self {
        self.libraries.push(name.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn output_binary(mut self, name: impl Into<String>) -> Self {
        self.output_binary = name.into();
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn parallel_jobs(mut self, jobs: usize) -> Self {
        self.parallel_jobs = jobs.max(1);
        self
    }

    pub fn build(self) -> BuildConfig {
        let mut cflags = vec!["-Wall".to_string()];
        if self.optimize {
            cflags.push("-O2".to_string());
        }
        if self.debug {
            cflags.push("-g".to_string());
        }
        cflags.extend(self.extra_cflags);

        BuildConfig {
            compiler: self.compiler,
            compiler_path: self.compiler_path,
            cflags,
            ldflags: self.ldflags,
            include_paths: self.include_paths,
            library_paths: self.library_paths,
            libraries: self.libraries,
            output_dir: self.output_dir,
            output_binary: self.output_binary,
            verbose: self.verbose,
            debug: self.debug,
            optimize: self.optimize,
            parallel_jobs: self.parallel_jobs,
        }
    }
}

/// Probes PATH for a usable compiler: `gcc`, then `clang`, then `cl`.
///
/// Uses `which` (or `where` on Windows) and takes the first line of its
/// output as the executable path.
pub fn detect_compiler() -> Result<(CompilerKind, PathBuf)> {
    let finder = if cfg!(windows) { "where" } else { "which" };
    let candidates = [
        ("gcc", CompilerKind::Gcc),
        ("clang", CompilerKind::Clang),
        ("cl", CompilerKind::Msvc),
    ];

    for (name, kind) in candidates {
        let output = Command::new(finder)
            .arg(name)
            .stdin(Stdio::null())
            .output();
        let Ok(output) = output else {
            continue;
        };
        if !output.status.success() {
            continue;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout.lines().next().map(str::trim).unwrap_or("");
        if !path.is_empty() {
            return Ok((kind, PathBuf::from(path)));
        }
    }

    Err(BuildError::CompilerNotFound)
}

/// Derives the object file path: `<output_dir>/<basename>.o`.
pub fn object_path_for(source: &Path, output_dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    output_dir.join(format!("{stem}.o"))
}

/// The linked binary's path, with `.exe` appended on Windows.
pub fn binary_path(config: &BuildConfig) -> PathBuf {
    let mut name = config.output_binary.clone();
    if cfg!(windows) {
        name.push_str(".exe");
    }
    config.output_dir.join(name)
}
