//! props - Command-line tool for regenerating CSS custom property files

use std::process::ExitCode;

use tokenprops::cli;

fn main() -> ExitCode {
    cli::run()
}
