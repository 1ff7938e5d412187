//! # ecbuild CLI
//!
//! Zero-configuration build system for C/C++ projects.
//!
//! ```bash
//! ecbuild              # build the current directory
//! ecbuild ./src        # build the src directory
//! ecbuild -v -o myapp  # verbose build, output binary 'myapp'
//! ecbuild -c           # clean the build directory first
//! ```
//!
//! The persistent cache lives in `<project>/.eventchains/` and survives
//! `-c/--clean`, so cleaned rebuilds still skip unchanged files once their
//! object files are regenerated.

use std::io::IsTerminal;

use ecbuild::cli::Cli;

fn main() -> miette::Result<()> {
    miette::set_panic_hook();

    // Graphical diagnostics on a TTY, plain ones in CI and logs.
    if std::io::stderr().is_terminal() {
        miette::set_hook(Box::new(|_| {
            Box::new(
                miette::GraphicalReportHandler::new()
                    .with_theme(miette::GraphicalTheme::unicode_nocolor())
                    .with_context_lines(3),
            )
        }))?;
    } else {
        miette::set_hook(Box::new(|_| {
            Box::new(
                miette::GraphicalReportHandler::new()
                    .with_theme(miette::GraphicalTheme::none())
                    .with_context_lines(0),
            )
        }))?;
    }

    let cli = Cli::parse_args();
    let result = ecbuild::commands::execute(&cli);
    result.map_err(Into::into)
}
