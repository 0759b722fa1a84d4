//! One-off and watch runs of the properties pipeline

use std::process::ExitCode;
use std::time::Duration;

use tracing::info;

use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::config::{PropertiesConfig, DEFAULT_STABILITY_MS};
use crate::pipeline::{report_failure, run_build, BuildContext, FailureStage, Rebuilder};
use crate::watch::{PropertyWatcher, WatchError};

/// Run the properties command.
///
/// The mode is fixed here: one-off runs every module once and returns, watch
/// mode blocks until the process is terminated.
pub fn run_properties(context: BuildContext, watch: bool, strict: bool) -> ExitCode {
    if watch {
        run_watch(context)
    } else {
        run_once(&context, strict)
    }
}

fn run_once(context: &BuildContext, strict: bool) -> ExitCode {
    let result = run_build(context);
    info!("{}", result.summary());

    if strict && !result.success() {
        ExitCode::from(EXIT_ERROR)
    } else {
        ExitCode::from(EXIT_SUCCESS)
    }
}

/// Stability threshold: CLI override, then config, then the default
fn stability(context: &BuildContext, config: Option<&PropertiesConfig>) -> Duration {
    let ms = context
        .overrides
        .stability_ms
        .or_else(|| config.map(|c| c.watch.stability_ms))
        .unwrap_or(DEFAULT_STABILITY_MS);
    Duration::from_millis(u64::from(ms))
}

/// Build the watcher for `context`.
///
/// The pattern list is taken from the configuration as it is now and not
/// re-evaluated later. A configuration that fails to load is reported and the
/// default patterns are used, so fixing the file triggers a rebuild.
pub fn create_watcher(context: &BuildContext) -> Result<PropertyWatcher, WatchError> {
    let config = match context.load() {
        Ok(config) => Some(config),
        Err(e) => {
            report_failure(FailureStage::Run, &context.config_file().to_string_lossy(), &e);
            None
        }
    };

    let patterns = context.watch_patterns(config.as_ref());
    PropertyWatcher::new(&patterns, stability(context, config.as_ref()))
}

fn run_watch(context: BuildContext) -> ExitCode {
    let mut watcher = match create_watcher(&context) {
        Ok(watcher) => watcher,
        Err(e) => {
            report_failure(FailureStage::Run, "watch", &e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if let Err(e) = watcher.start() {
        report_failure(FailureStage::Run, "watch", &e);
        return ExitCode::from(EXIT_ERROR);
    }

    let mut rebuilder = Rebuilder::new(context);
    match watcher.run(|changed| {
        rebuilder.on_change(changed);
    }) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            report_failure(FailureStage::Run, "watch", &e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliOverrides;
    use std::fs;
    use tempfile::TempDir;

    fn project(config: &str) -> (TempDir, BuildContext) {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("config")).unwrap();
        fs::write(temp.path().join("config/properties.toml"), config).unwrap();
        let ctx = BuildContext::new(temp.path());
        (temp, ctx)
    }

    #[test]
    fn test_stability_precedence() {
        let (_temp, ctx) = project("[watch]\nstability_ms = 300\n[[module]]\ndist = \"a.css\"\n");
        let config = ctx.load().unwrap();
        assert_eq!(stability(&ctx, Some(&config)), Duration::from_millis(300));
        assert_eq!(stability(&ctx, None), Duration::from_millis(750));

        let ctx = ctx.with_overrides(CliOverrides { stability_ms: Some(20) });
        assert_eq!(stability(&ctx, Some(&config)), Duration::from_millis(20));
    }

    #[test]
    fn test_create_watcher_uses_config_patterns() {
        let (temp, ctx) = project(
            "[watch]\npaths = [\"tokens/*.json\"]\nstability_ms = 100\n[[module]]\ndist = \"a.css\"\n",
        );
        let watcher = create_watcher(&ctx).unwrap();

        assert_eq!(watcher.stability(), Duration::from_millis(100));
        assert!(watcher.matches(&temp.path().join("config/properties.toml")));
        assert!(watcher.matches(&temp.path().join("tokens/brand.json")));
        assert!(!watcher.matches(&temp.path().join("config/tokens.toml")));
        assert!(!watcher.is_running());
    }

    #[test]
    fn test_create_watcher_with_broken_config_falls_back() {
        let (temp, ctx) = project("not valid toml {{{");
        let watcher = create_watcher(&ctx).unwrap();

        assert_eq!(watcher.stability(), Duration::from_millis(750));
        assert!(watcher.matches(&temp.path().join("config/properties.toml")));
        assert!(watcher.matches(&temp.path().join("config/tokens.toml")));
    }

    #[test]
    fn test_watcher_starts_before_watched_dirs_exist() {
        let (temp, ctx) = project(
            "[watch]\npaths = [\"config/properties.toml\", \"tokens/**/*.json\"]\n[[module]]\ndist = \"a.css\"\nimport = [\"vendor/brand.toml\"]\n",
        );
        let mut watcher = create_watcher(&ctx).unwrap();

        watcher.start().unwrap();
        assert!(watcher.is_running());
        assert!(watcher.matches(&temp.path().join("tokens/brand/colors.json")));
        assert!(watcher.matches(&temp.path().join("vendor/brand.toml")));
        watcher.stop();
    }

    #[test]
    fn test_one_off_exit_codes() {
        let (temp, ctx) = project("[[module]]\ndist = \"out.css\"\nimport = [\"missing.toml\"]\n");
        assert_eq!(run_properties(ctx.clone(), false, false), ExitCode::from(EXIT_SUCCESS));
        assert_eq!(run_properties(ctx, false, true), ExitCode::from(EXIT_ERROR));
        assert!(!temp.path().join("out.css").exists());
    }
}
