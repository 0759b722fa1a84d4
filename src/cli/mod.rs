//! Command-line interface implementation
//!
//! Parses arguments, sets up logging and hands off to [`properties`] for the
//! one-off or watch run.

mod properties;

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::config::{CliOverrides, DEFAULT_CONFIG_PATH};
use crate::pipeline::BuildContext;

pub use properties::run_properties;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;

/// props - Regenerate CSS custom property files from design tokens
#[derive(Parser, Debug)]
#[command(name = "props")]
#[command(about = "Regenerate CSS custom property files from design token configuration")]
#[command(version)]
pub struct Cli {
    /// Watch the configuration and token files and regenerate on change
    #[arg(short, long)]
    pub watch: bool,

    /// Configuration document, relative to the root
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Root directory for relative paths (defaults to the current directory)
    #[arg(short = 'C', long)]
    pub root: Option<PathBuf>,

    /// Write-stability threshold in milliseconds (overrides [watch].stability_ms)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub stability: Option<u32>,

    /// Exit with an error status when any module fails
    #[arg(long)]
    pub strict: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Build context for this invocation, rooted at `root`
    pub fn context(&self, root: &Path) -> BuildContext {
        BuildContext::new(root)
            .with_config_path(&self.config)
            .with_overrides(CliOverrides { stability_ms: self.stability })
    }
}

/// Initialise structured logging. Level is overridden by `RUST_LOG`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A second initialisation (e.g. when embedded) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Resolve the root directory, defaulting to the current working directory.
fn resolve_root(root: Option<&Path>) -> std::io::Result<PathBuf> {
    let root = match root {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir()?,
    };
    root.canonicalize()
}

/// Main entry point for the CLI
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let root = match resolve_root(cli.root.as_deref()) {
        Ok(root) => root,
        Err(e) => {
            tracing::error!("Failed (run): cannot resolve root directory: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    run_properties(cli.context(&root), cli.watch, cli.strict)
}
