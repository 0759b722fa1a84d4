//! Configuration loading for `properties.toml`
//!
//! Provides functions to load, validate, and override configuration.

use super::schema::PropertiesConfig;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("failed to read config {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML parsing error
    #[error("failed to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// Validation error
    #[error("config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override the write-stability threshold
    pub stability_ms: Option<u32>,
}

/// Load and validate configuration from a `properties.toml` file.
///
/// # Returns
/// - `Ok(PropertiesConfig)` on success
/// - `Err(ConfigError)` if the file cannot be read, parsed or validated
///
/// # Example
/// ```ignore
/// let config = load_config(Path::new("config/properties.toml"))?;
/// ```
pub fn load_config(path: &Path) -> Result<PropertiesConfig, ConfigError> {
    let contents = fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    parse_config(path, &contents)
}

/// Parse and validate configuration text; `path` is used for error messages.
pub fn parse_config(path: &Path, contents: &str) -> Result<PropertiesConfig, ConfigError> {
    let config: PropertiesConfig = toml::from_str(contents)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    Ok(config)
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut PropertiesConfig, overrides: &CliOverrides) {
    if let Some(stability_ms) = overrides.stability_ms {
        config.watch.stability_ms = stability_ms;
    }
}

/// Resolve a path relative to the project root.
///
/// If the path is absolute, returns it unchanged.
/// If relative, joins it with the project root.
pub fn resolve_path(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}
