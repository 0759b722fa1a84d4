//! Resolve → format → write pipeline shared by one-off and watch mode
//!
//! Every failure is caught here, logged with its cause chain under one of the
//! three labels (`Failed (run)`, `Failed (main)`, `Failed (write)`), and
//! recorded in the [`BuildResult`]. Nothing in this module panics or aborts
//! the caller.

use std::collections::HashSet;
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use glob::Pattern;
use tracing::{debug, error, info, warn};

use crate::config::{
    load_config, merge_cli_overrides, module_sources, resolve_module, resolve_path, CliOverrides,
    ConfigError, PropertiesConfig, WatchConfig, DEFAULT_CONFIG_PATH,
};
use crate::css::format_ruleset;
use crate::output::write_css;

/// Where in the pipeline a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// Configuration load or watcher setup
    Run,
    /// Module resolution or formatting
    Main,
    /// Filesystem write
    Write,
}

impl FailureStage {
    /// Log label for this stage
    pub fn label(self) -> &'static str {
        match self {
            FailureStage::Run => "Failed (run)",
            FailureStage::Main => "Failed (main)",
            FailureStage::Write => "Failed (write)",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Render an error followed by each of its sources: `outer: inner: root`.
pub fn display_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Log an error under its stage label.
pub fn report_failure(stage: FailureStage, subject: &str, err: &dyn StdError) -> String {
    let message = display_chain(err);
    error!(subject, "{}: {}", stage, message);
    message
}

/// A failure recorded during one build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildError {
    /// Module name, or the config path for `Run` failures
    pub subject: String,
    /// Stage that failed
    pub stage: FailureStage,
    /// Error with its cause chain
    pub message: String,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.stage, self.subject, self.message)
    }
}

/// A module that was written successfully
#[derive(Debug, Clone)]
pub struct ModuleOutput {
    pub name: String,
    pub dist: PathBuf,
    pub css: String,
}

/// Result of a single build attempt
#[derive(Debug, Default)]
pub struct BuildResult {
    /// Modules written, in configuration order
    pub outputs: Vec<ModuleOutput>,
    /// Failures, in the order they happened
    pub errors: Vec<BuildError>,
    /// Non-fatal notes (e.g. exclude entries that matched nothing)
    pub warnings: Vec<String>,
    /// Build duration
    pub duration: Duration,
}

impl BuildResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if build succeeded (no errors)
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    /// One-line summary for the log
    pub fn summary(&self) -> String {
        let written = self.outputs.len();
        let failed = self.errors.len();
        format!(
            "{} module{} written, {} failed ({})",
            written,
            if written == 1 { "" } else { "s" },
            failed,
            format_duration(self.duration)
        )
    }

    fn fail(&mut self, stage: FailureStage, subject: &str, err: &dyn StdError) {
        let message = report_failure(stage, subject, err);
        self.errors.push(BuildError { subject: subject.to_string(), stage, message });
    }
}

/// Format duration for display
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

/// Everything a build needs that does not change between runs
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Root for every relative path (the working directory by default)
    pub root: PathBuf,
    /// Configuration document, relative to `root` unless absolute
    pub config_path: PathBuf,
    /// CLI overrides applied after each load
    pub overrides: CliOverrides,
}

impl BuildContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            overrides: CliOverrides::default(),
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    pub fn with_overrides(mut self, overrides: CliOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Absolute path of the configuration document
    pub fn config_file(&self) -> PathBuf {
        resolve_path(&self.root, &self.config_path)
    }

    /// Load the configuration fresh from disk and apply CLI overrides.
    pub fn load(&self) -> Result<PropertiesConfig, ConfigError> {
        let mut config = load_config(&self.config_file())?;
        merge_cli_overrides(&mut config, &self.overrides);
        Ok(config)
    }

    /// Absolute glob patterns to watch.
    ///
    /// Always includes the configuration document and every module import,
    /// followed by `[watch].paths`. Falls back to the default watch list when
    /// `config` is `None` (e.g. it failed to load at startup). Concrete paths
    /// and the root are escaped; only the `[watch].paths` entries keep their
    /// glob syntax.
    pub fn watch_patterns(&self, config: Option<&PropertiesConfig>) -> Vec<String> {
        let default_watch = WatchConfig::default();
        let watch = config.map(|c| &c.watch).unwrap_or(&default_watch);

        let mut seen = HashSet::new();
        let mut patterns = Vec::new();
        let mut push = |pattern: String| {
            if seen.insert(pattern.clone()) {
                patterns.push(pattern);
            }
        };

        push(literal_pattern(&self.config_file()));
        if let Some(config) = config {
            for module in &config.modules {
                for source in module_sources(&self.root, module) {
                    push(literal_pattern(&source));
                }
            }
        }
        let escaped_root = PathBuf::from(Pattern::escape(&self.root.to_string_lossy()));
        for path in &watch.paths {
            let path = Path::new(path);
            if path.is_absolute() {
                push(path.to_string_lossy().into_owned());
            } else {
                push(escaped_root.join(path).to_string_lossy().into_owned());
            }
        }
        patterns
    }
}

/// Glob pattern matching exactly `path`
fn literal_pattern(path: &Path) -> String {
    Pattern::escape(&path.to_string_lossy())
}

/// Run one full build: load config, then resolve, format and write each module.
///
/// A configuration failure stops the build before any module runs; a module
/// failure only skips that module.
pub fn run_build(context: &BuildContext) -> BuildResult {
    let start = Instant::now();
    let mut result = BuildResult::new();

    let config_file = context.config_file();
    match context.load() {
        Ok(config) => build_modules(context, &config, &mut result),
        Err(e) => result.fail(FailureStage::Run, &config_file.to_string_lossy(), &e),
    }

    result.duration = start.elapsed();
    result
}

/// Build every module of an already loaded configuration.
pub fn build_modules(context: &BuildContext, config: &PropertiesConfig, result: &mut BuildResult) {
    for module in &config.modules {
        let name = module.display_name();

        let resolved = match resolve_module(&context.root, module) {
            Ok(resolved) => resolved,
            Err(e) => {
                result.fail(FailureStage::Main, &name, &e);
                continue;
            }
        };

        for entry in &resolved.unmatched_excludes {
            let note = format!("{}: exclude '{}' matched no property", name, entry);
            warn!("{}", note);
            result.warnings.push(note);
        }

        let css = format_ruleset(&resolved.ruleset, &resolved.properties);
        debug!(module = %name, properties = resolved.properties.len(), "formatted ruleset");

        if let Err(e) = write_css(&resolved.dist, &css) {
            result.fail(FailureStage::Write, &name, &e);
            continue;
        }

        info!(module = %name, "Properties written to {}", resolved.dist.display());
        result.outputs.push(ModuleOutput { name, dist: resolved.dist, css });
    }
}

/// Tracks modules with errors across builds for recovery detection
#[derive(Debug, Default)]
pub struct ErrorTracker {
    /// Subjects that failed in the previous build
    failing: HashSet<String>,
}

impl ErrorTracker {
    /// Create a new error tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Update tracker with new build result, returns the subjects that recovered
    pub fn update(&mut self, result: &BuildResult) -> Vec<String> {
        let current: HashSet<String> = result.errors.iter().map(|e| e.subject.clone()).collect();

        let mut fixed: Vec<String> = self.failing.difference(&current).cloned().collect();
        fixed.sort();

        self.failing = current;
        fixed
    }

    /// Check if there are any tracked errors
    pub fn has_errors(&self) -> bool {
        !self.failing.is_empty()
    }

    /// Get the number of failing subjects
    pub fn error_count(&self) -> usize {
        self.failing.len()
    }
}

/// Change handler used by watch mode.
///
/// Each call re-runs the whole build exactly once and reports recoveries.
#[derive(Debug)]
pub struct Rebuilder {
    context: BuildContext,
    tracker: ErrorTracker,
    cycles: usize,
}

impl Rebuilder {
    pub fn new(context: BuildContext) -> Self {
        Self { context, tracker: ErrorTracker::new(), cycles: 0 }
    }

    /// Handle one change event on `changed`.
    pub fn on_change(&mut self, changed: &Path) -> BuildResult {
        info!("Detected change on {}", changed.display());
        self.cycles += 1;

        let result = run_build(&self.context);
        for subject in self.tracker.update(&result) {
            info!("Fixed: {}", subject);
        }
        info!("{}", result.summary());
        result
    }

    /// Number of cycles run so far
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub fn tracker(&self) -> &ErrorTracker {
        &self.tracker
    }
}
