//! Compile and link command composition, plus the subprocess driver.
//!
//! Command lines are gcc-compatible throughout; the external compiler is an
//! opaque collaborator that inherits the parent environment and is trusted
//! to write the object files it was asked for.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use crate::config::{self, BuildConfig};
use crate::error::{BuildError, Result};
use crate::logging::Logger;

/// Result of one compiler or linker invocation.
#[derive(Debug)]
pub struct DriverOutcome {
    /// True when the subprocess exited with code 0.
    pub success: bool,
    /// The subprocess exit code, `-1` when it was killed by a signal.
    pub exit_code: i32,
    /// Wall time of the invocation.
    pub elapsed: Duration,
    /// Captured stdout followed by stderr.
    pub output: String,
    /// The artifact this invocation was asked to produce (object or binary).
    pub artifact: PathBuf,
}

/// Composes the compile command:
/// `<compiler> -c <source> -o <object> [-I<path>…] [<cflag>…]`.
pub fn compile_command(source: &Path, object: &Path, config: &BuildConfig) -> Vec<OsString> {
    let mut argv: Vec<OsString> = vec![
        config.compiler_program().into(),
        "-c".into(),
        source.into(),
        "-o".into(),
        object.into(),
    ];
    for include in &config.include_paths {
        let mut flag = OsString::from("-I");
        flag.push(include);
        argv.push(flag);
    }
    for cflag in &config.cflags {
        argv.push(cflag.into());
    }
    argv
}

/// Composes the link command:
/// `<compiler> <object>… -o <binary> [-L<path>…] [-l<lib>…] [<ldflag>…]`.
pub fn link_command(objects: &[PathBuf], config: &BuildConfig) -> Vec<OsString> {
    let mut argv: Vec<OsString> = vec![config.compiler_program().into()];
    for object in objects {
        argv.push(object.into());
    }
    argv.push("-o".into());
    argv.push(config::binary_path(config).into());
    for library_path in &config.library_paths {
        let mut flag = OsString::from("-L");
        flag.push(library_path);
        argv.push(flag);
    }
    for library in &config.libraries {
        argv.push(format!("-l{library}").into());
    }
    for ldflag in &config.ldflags {
        argv.push(ldflag.into());
    }
    argv
}

/// Renders a command for verbose output.
fn render_command(argv: &[OsString]) -> String {
    argv.iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs a composed command, capturing stdout and stderr.
fn run_command(argv: &[OsString], artifact: PathBuf) -> Result<DriverOutcome> {
    let (program, args) = argv.split_first().ok_or_else(|| BuildError::Io {
        path: artifact.clone(),
        source: std::io::Error::other("empty command line"),
    })?;

    let start = Instant::now();
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| BuildError::Io {
            path: PathBuf::from(program),
            source,
        })?;
    let elapsed = start.elapsed();

    let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
    captured.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(DriverOutcome {
        success: output.status.success(),
        exit_code: output.status.code().unwrap_or(-1),
        elapsed,
        output: captured,
        artifact,
    })
}

/// Compiles one translation unit into `<output_dir>/<basename>.o`.
pub fn compile(source: &Path, config: &BuildConfig, logger: &Logger) -> Result<DriverOutcome> {
    let object = config::object_path_for(source, &config.output_dir);
    let argv = compile_command(source, &object, config);
    if config.verbose {
        logger.info(format!("  {}", render_command(&argv)));
    }
    run_command(&argv, object)
}

/// Links object files into the final executable.
pub fn link(objects: &[PathBuf], config: &BuildConfig, logger: &Logger) -> Result<DriverOutcome> {
    let binary = config::binary_path(config);
    let argv = link_command(objects, config);
    if config.verbose {
        logger.info(format!("  {}", render_command(&argv)));
    }
    run_command(&argv, binary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BuildConfig {
        BuildConfig::builder()
            .compiler_path("/usr/bin/cc")
            .include_path("/proj/src")
            .output_dir("/proj/build")
            .output_binary("app")
            .build()
    }

    #[test]
    fn test_compile_command_shape() {
        let argv = compile_command(
            Path::new("/proj/src/main.c"),
            Path::new("/proj/build/main.o"),
            &config(),
        );
        let rendered: Vec<String> = argv
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            rendered,
            vec![
                "/usr/bin/cc",
                "-c",
                "/proj/src/main.c",
                "-o",
                "/proj/build/main.o",
                "-I/proj/src",
                "-Wall",
                "-O2",
            ]
        );
    }

    #[test]
    fn test_link_command_shape() {
        let config = BuildConfig::builder()
            .compiler_path("/usr/bin/cc")
            .output_dir("/proj/build")
            .output_binary("app")
            .library_path("/opt/lib")
            .library("m")
            .ldflag("-static")
            .build();
        let argv = link_command(
            &[
                PathBuf::from("/proj/build/main.o"),
                PathBuf::from("/proj/build/util.o"),
            ],
            &config,
        );
        let rendered: Vec<String> = argv
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let binary = if cfg!(windows) {
            "/proj/build/app.exe"
        } else {
            "/proj/build/app"
        };
        assert_eq!(
            rendered,
            vec![
                "/usr/bin/cc",
                "/proj/build/main.o",
                "/proj/build/util.o",
                "-o",
                binary,
                "-L/opt/lib",
                "-lm",
                "-static",
            ]
        );
    }

    #[test]
    fn test_run_command_missing_program_errors() {
        let argv: Vec<OsString> = vec!["/nonexistent/compiler-xyz".into(), "-c".into()];
        let result = run_command(&argv, PathBuf::from("out.o"));
        assert!(matches!(result, Err(BuildError::Io { .. })));
    }
}
