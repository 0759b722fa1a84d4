//! Configuration schema types for `config/properties.toml`
//!
//! Defines the structure and validation rules for property modules and the
//! watch settings.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::css::{is_valid_property_name, validate_selector, DEFAULT_RULESET};

/// Default configuration document, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/properties.toml";

/// Default token document watched alongside the configuration
pub const DEFAULT_TOKENS_PATH: &str = "config/tokens.toml";

/// How long a source file must stay unchanged before a change fires
pub const DEFAULT_STABILITY_MS: u32 = 750;

/// Watch mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    /// Glob patterns to watch, relative to the working directory
    #[serde(default = "default_watch_paths")]
    pub paths: Vec<String>,
    /// Write-stability threshold in milliseconds
    #[serde(default = "default_stability_ms")]
    pub stability_ms: u32,
}

fn default_watch_paths() -> Vec<String> {
    vec![DEFAULT_CONFIG_PATH.to_string(), DEFAULT_TOKENS_PATH.to_string()]
}

fn default_stability_ms() -> u32 {
    DEFAULT_STABILITY_MS
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { paths: default_watch_paths(), stability_ms: DEFAULT_STABILITY_MS }
    }
}

/// One property module: a set of properties and where to write them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
    /// Display name, defaults to the stem of `dist`
    #[serde(default)]
    pub name: Option<String>,
    /// Output CSS file
    pub dist: PathBuf,
    /// Selector wrapping the declarations
    #[serde(default = "default_ruleset")]
    pub ruleset: String,
    /// Property names (or table prefixes) dropped before formatting
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Token documents merged before the inline properties
    #[serde(default)]
    pub import: Vec<PathBuf>,
    /// Inline properties; nested tables flatten with `-`
    #[serde(default)]
    pub properties: toml::Table,
}

fn default_ruleset() -> String {
    DEFAULT_RULESET.to_string()
}

impl ModuleConfig {
    /// Name used in logs and build summaries
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self
                .dist
                .file_stem()
                .map(|s| s.to_string_lossy().trim_start_matches('_').to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "properties".to_string()),
        }
    }
}

/// Complete `properties.toml` configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertiesConfig {
    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,
    /// Property modules, in output order
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleConfig>,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "module[0].dist")
    pub field: String,
    /// Error message
    pub message: String,
}

impl ConfigValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' {}", self.field, self.message)
    }
}

impl PropertiesConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.watch.stability_ms == 0 {
            errors.push(ConfigValidationError::new(
                "watch.stability_ms",
                "must be a positive integer",
            ));
        }
        for (i, pattern) in self.watch.paths.iter().enumerate() {
            if let Err(e) = glob::Pattern::new(pattern) {
                errors.push(ConfigValidationError::new(
                    format!("watch.paths[{}]", i),
                    format!("is not a valid glob: {}", e),
                ));
            }
        }

        if self.modules.is_empty() {
            errors.push(ConfigValidationError::new("module", "must declare at least one module"));
        }

        for (i, module) in self.modules.iter().enumerate() {
            module.validate_into(&format!("module[{}]", i), &mut errors);
        }

        errors
    }
}

impl ModuleConfig {
    fn validate_into(&self, prefix: &str, errors: &mut Vec<ConfigValidationError>) {
        if self.dist.as_os_str().is_empty() {
            errors.push(ConfigValidationError::new(
                format!("{}.dist", prefix),
                "must be a non-empty path",
            ));
        }

        if let Err(msg) = validate_selector(&self.ruleset) {
            errors.push(ConfigValidationError::new(format!("{}.ruleset", prefix), msg));
        }

        let mut seen = HashSet::new();
        for (i, key) in self.exclude.iter().enumerate() {
            let field = format!("{}.exclude[{}]", prefix, i);
            if key.is_empty() {
                errors.push(ConfigValidationError::new(field, "must be a non-empty string"));
            } else if !seen.insert(key.as_str()) {
                errors.push(ConfigValidationError::new(field, format!("duplicates '{}'", key)));
            }
        }

        for (i, path) in self.import.iter().enumerate() {
            if path.as_os_str().is_empty() {
                errors.push(ConfigValidationError::new(
                    format!("{}.import[{}]", prefix, i),
                    "must be a non-empty path",
                ));
            }
        }

        validate_names(&self.properties, &format!("{}.properties", prefix), errors);
    }
}

/// Check every key of a (possibly nested) property table.
fn validate_names(table: &toml::Table, prefix: &str, errors: &mut Vec<ConfigValidationError>) {
    for (key, value) in table {
        let field = format!("{}.{}", prefix, key);
        if !is_valid_property_name(key) {
            errors.push(ConfigValidationError::new(
                field.clone(),
                "is not a valid custom property name",
            ));
        }
        if let toml::Value::Table(nested) = value {
            validate_names(nested, &field, errors);
        }
    }
}
