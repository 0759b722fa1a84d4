//! Configuration for property modules
//!
//! Provides the `properties.toml` schema, loading, and per-module resolution.

pub mod loader;
pub mod resolve;
pub mod schema;

pub use loader::{load_config, merge_cli_overrides, resolve_path, CliOverrides, ConfigError};
pub use resolve::{module_sources, resolve_module, ModuleError, ResolvedModule};
pub use schema::*;
