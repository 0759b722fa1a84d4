//! Module resolution: turns a [`ModuleConfig`] into a flat, filtered property map.
//!
//! Token imports are merged first, in declaration order, then the inline
//! properties. Nested tables flatten with `-`, and an `exclude` entry drops
//! either a single flattened name or a whole table.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::loader::resolve_path;
use super::schema::ModuleConfig;
use crate::css::{is_valid_property_name, is_valid_property_value, Properties};

/// Error while resolving a single module
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Token import could not be read
    #[error("failed to read import {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML token import could not be parsed
    #[error("failed to parse import {}", path.display())]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// JSON token import could not be parsed
    #[error("failed to parse import {}", path.display())]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// JSON token import is not an object
    #[error("import {} must contain an object at the top level", path.display())]
    NotATable { path: PathBuf },
    /// Value cannot be written as a custom property
    #[error("property '{name}' has unsupported {kind} value")]
    UnsupportedValue { name: String, kind: &'static str },
    /// Imported name cannot be written as a custom property
    #[error("'{0}' is not a valid custom property name")]
    InvalidName(String),
    /// Value would break out of its declaration
    #[error("property '{name}' has a value that cannot be emitted: {value:?}")]
    InvalidValue { name: String, value: String },
}

/// A module ready for formatting and writing
#[derive(Debug, Clone)]
pub struct ResolvedModule {
    /// Display name
    pub name: String,
    /// Selector wrapping the declarations
    pub ruleset: String,
    /// Absolute output path
    pub dist: PathBuf,
    /// Flattened, filtered properties in output order
    pub properties: Properties,
    /// Exclude entries that matched nothing
    pub unmatched_excludes: Vec<String>,
}

/// Tree of token values shared by TOML and JSON sources
enum Node {
    Leaf(String),
    Table(Vec<(String, Node)>),
}

impl Node {
    fn from_toml(name: &str, value: &toml::Value) -> Result<Self, ModuleError> {
        let leaf = match value {
            toml::Value::String(s) => s.clone(),
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            toml::Value::Datetime(d) => d.to_string(),
            toml::Value::Array(_) => {
                return Err(ModuleError::UnsupportedValue { name: name.to_string(), kind: "array" })
            }
            toml::Value::Table(table) => return Self::from_toml_table(name, table),
        };
        Ok(Node::Leaf(leaf))
    }

    fn from_toml_table(prefix: &str, table: &toml::Table) -> Result<Self, ModuleError> {
        let mut children = Vec::with_capacity(table.len());
        for (key, value) in table {
            children.push((key.clone(), Self::from_toml(&join(prefix, key), value)?));
        }
        Ok(Node::Table(children))
    }

    fn from_json(name: &str, value: &serde_json::Value) -> Result<Self, ModuleError> {
        use serde_json::Value;

        let leaf = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => {
                return Err(ModuleError::UnsupportedValue { name: name.to_string(), kind: "null" })
            }
            Value::Array(_) => {
                return Err(ModuleError::UnsupportedValue { name: name.to_string(), kind: "array" })
            }
            Value::Object(map) => {
                let mut children = Vec::with_capacity(map.len());
                for (key, value) in map {
                    children.push((key.clone(), Self::from_json(&join(name, key), value)?));
                }
                return Ok(Node::Table(children));
            }
        };
        Ok(Node::Leaf(leaf))
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.strip_prefix("--").unwrap_or(key).to_string()
    } else {
        format!("{}-{}", prefix, key)
    }
}

/// Flattens token trees into a property map, applying exclusions
struct Flattener<'a> {
    exclude: &'a [String],
    matched: HashSet<&'a str>,
    properties: Properties,
}

impl<'a> Flattener<'a> {
    fn new(exclude: &'a [String]) -> Self {
        Self { exclude, matched: HashSet::new(), properties: Properties::new() }
    }

    fn is_excluded(&mut self, name: &str) -> bool {
        let exclude = self.exclude;
        match exclude.iter().find(|e| e.strip_prefix("--").unwrap_or(e.as_str()) == name) {
            Some(entry) => {
                self.matched.insert(entry.as_str());
                true
            }
            None => false,
        }
    }

    fn add(&mut self, prefix: &str, node: Node) -> Result<(), ModuleError> {
        match node {
            Node::Leaf(value) => {
                if !is_valid_property_name(prefix) {
                    return Err(ModuleError::InvalidName(prefix.to_string()));
                }
                if !is_valid_property_value(&value) {
                    return Err(ModuleError::InvalidValue { name: prefix.to_string(), value });
                }
                self.properties.insert(prefix, value);
            }
            Node::Table(children) => {
                for (key, child) in children {
                    let name = join(prefix, &key);
                    if self.is_excluded(&name) {
                        continue;
                    }
                    self.add(&name, child)?;
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> (Properties, Vec<String>) {
        let unmatched = self
            .exclude
            .iter()
            .filter(|e| !self.matched.contains(e.as_str()))
            .cloned()
            .collect();
        (self.properties, unmatched)
    }
}

/// Load a token document, choosing the format by extension.
fn load_import(path: &Path) -> Result<Node, ModuleError> {
    let contents = fs::read_to_string(path)
        .map_err(|source| ModuleError::Read { path: path.to_path_buf(), source })?;

    let is_json = path.extension().map(|e| e.eq_ignore_ascii_case("json")).unwrap_or(false);
    if is_json {
        let value: serde_json::Value = serde_json::from_str(&contents)
            .map_err(|source| ModuleError::ParseJson { path: path.to_path_buf(), source })?;
        if !value.is_object() {
            return Err(ModuleError::NotATable { path: path.to_path_buf() });
        }
        Node::from_json("", &value)
    } else {
        let table: toml::Table = toml::from_str(&contents)
            .map_err(|source| ModuleError::ParseToml { path: path.to_path_buf(), source })?;
        Node::from_toml_table("", &table)
    }
}

/// Resolve one module relative to `root`.
pub fn resolve_module(root: &Path, module: &ModuleConfig) -> Result<ResolvedModule, ModuleError> {
    let mut flattener = Flattener::new(&module.exclude);

    for import in &module.import {
        let node = load_import(&resolve_path(root, import))?;
        flattener.add("", node)?;
    }
    flattener.add("", Node::from_toml_table("", &module.properties)?)?;

    let (properties, unmatched_excludes) = flattener.finish();

    Ok(ResolvedModule {
        name: module.display_name(),
        ruleset: module.ruleset.clone(),
        dist: resolve_path(root, &module.dist),
        properties,
        unmatched_excludes,
    })
}

/// Files a module reads besides the configuration document itself.
pub fn module_sources(root: &Path, module: &ModuleConfig) -> Vec<PathBuf> {
    module.import.iter().map(|p| resolve_path(root, p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PropertiesConfig;
    use tempfile::TempDir;

    fn module(source: &str) -> ModuleConfig {
        let config: PropertiesConfig = toml::from_str(source).expect("should parse config");
        config.modules.into_iter().next().expect("should declare a module")
    }

    fn names(resolved: &ResolvedModule) -> Vec<&str> {
        resolved.properties.iter().map(|(n, _)| n).collect()
    }

    #[test]
    fn test_resolve_inline_properties() {
        let m = module(
            r#"
[[module]]
dist = "dist/props.css"

[module.properties]
a = "1"
b = "2"
"#,
        );
        let resolved = resolve_module(Path::new("/project"), &m).expect("should resolve");
        assert_eq!(names(&resolved), vec!["a", "b"]);
        assert_eq!(resolved.ruleset, ":root");
        assert_eq!(resolved.dist, PathBuf::from("/project/dist/props.css"));
        assert_eq!(resolved.name, "props");
    }

    #[test]
    fn test_resolve_excludes_key() {
        let m = module(
            r#"
[[module]]
dist = "out.css"
exclude = ["b"]

[module.properties]
a = "1"
b = "2"
"#,
        );
        let resolved = resolve_module(Path::new("/p"), &m).expect("should resolve");
        assert_eq!(names(&resolved), vec!["a"]);
        assert!(!resolved.properties.contains_key("exclude"));
        assert!(resolved.unmatched_excludes.is_empty());
    }

    #[test]
    fn test_resolve_flattens_nested_tables() {
        let m = module(
            r##"
[[module]]
dist = "out.css"

[module.properties]
font = "Inter"

[module.properties.color]
primary = "#0055ff"
secondary = "#ff5500"

[module.properties.space.grid]
unit = 8
"##,
        );
        let resolved = resolve_module(Path::new("/p"), &m).expect("should resolve");
        assert_eq!(
            names(&resolved),
            vec!["font", "color-primary", "color-secondary", "space-grid-unit"]
        );
        assert_eq!(resolved.properties.get("space-grid-unit"), Some("8"));
    }

    #[test]
    fn test_exclude_table_prefix() {
        let m = module(
            r##"
[[module]]
dist = "out.css"
exclude = ["color", "missing"]

[module.properties]
font = "Inter"

[module.properties.color]
primary = "#0055ff"
"##,
        );
        let resolved = resolve_module(Path::new("/p"), &m).expect("should resolve");
        assert_eq!(names(&resolved), vec!["font"]);
        assert_eq!(resolved.unmatched_excludes, vec!["missing"]);
    }

    #[test]
    fn test_scalar_values_stringified() {
        let m = module(
            r#"
[[module]]
dist = "out.css"

[module.properties]
int = 4
float = 1.5
flag = true
"#,
        );
        let resolved = resolve_module(Path::new("/p"), &m).expect("should resolve");
        assert_eq!(resolved.properties.get("int"), Some("4"));
        assert_eq!(resolved.properties.get("float"), Some("1.5"));
        assert_eq!(resolved.properties.get("flag"), Some("true"));
    }

    #[test]
    fn test_array_value_rejected() {
        let m = module(
            r#"
[[module]]
dist = "out.css"

[module.properties]
list = ["a", "b"]
"#,
        );
        let err = resolve_module(Path::new("/p"), &m).expect_err("arrays are unsupported");
        assert!(matches!(err, ModuleError::UnsupportedValue { kind: "array", .. }));
    }

    #[test]
    fn test_prefixed_key_is_stripped() {
        let m = module(
            r#"
[[module]]
dist = "out.css"

[module.properties]
"--brand" = "red"
"#,
        );
        let resolved = resolve_module(Path::new("/p"), &m).expect("should resolve");
        assert_eq!(names(&resolved), vec!["brand"]);
    }

    #[test]
    fn test_imports_merge_before_inline() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_dir = temp.path().join("config");
        fs::create_dir_all(&config_dir).expect("should create config dir");
        fs::write(
            config_dir.join("tokens.toml"),
            "[color]\nprimary = \"blue\"\naccent = \"gold\"\n",
        )
        .expect("should write tokens");
        fs::write(config_dir.join("extra.json"), r#"{"radius": {"sm": "2px"}, "depth": 3}"#)
            .expect("should write json tokens");

        let m = module(
            r#"
[[module]]
dist = "out.css"
import = ["config/tokens.toml", "config/extra.json"]

[module.properties.color]
primary = "navy"
"#,
        );
        let resolved = resolve_module(temp.path(), &m).expect("should resolve");
        assert_eq!(names(&resolved), vec!["color-primary", "color-accent", "radius-sm", "depth"]);
        assert_eq!(resolved.properties.get("color-primary"), Some("navy"));
        assert_eq!(resolved.properties.get("depth"), Some("3"));
    }

    #[test]
    fn test_missing_import() {
        let temp = TempDir::new().expect("should create temp dir");
        let m = module(
            r#"
[[module]]
dist = "out.css"
import = ["config/tokens.toml"]
"#,
        );
        let err = resolve_module(temp.path(), &m).expect_err("import is missing");
        assert!(matches!(err, ModuleError::Read { .. }));
    }

    #[test]
    fn test_json_import_must_be_object() {
        let temp = TempDir::new().expect("should create temp dir");
        fs::write(temp.path().join("tokens.json"), "[1, 2]").expect("should write tokens");
        let m = module(
            r#"
[[module]]
dist = "out.css"
import = ["tokens.json"]
"#,
        );
        let err = resolve_module(temp.path(), &m).expect_err("array document");
        assert!(matches!(err, ModuleError::NotATable { .. }));
    }

    #[test]
    fn test_invalid_imported_name() {
        let temp = TempDir::new().expect("should create temp dir");
        fs::write(temp.path().join("tokens.json"), r#"{"bad name": "1"}"#)
            .expect("should write tokens");
        let m = module(
            r#"
[[module]]
dist = "out.css"
import = ["tokens.json"]
"#,
        );
        let err = resolve_module(temp.path(), &m).expect_err("name has a space");
        assert!(matches!(err, ModuleError::InvalidName(name) if name == "bad name"));
    }

    #[test]
    fn test_value_breaking_declaration_rejected() {
        let m = module(
            r#"
[[module]]
dist = "out.css"

[module.properties]
font = 'url("a;b")'
evil = "red; } body { color: blue"
"#,
        );
        let err = resolve_module(Path::new("/p"), &m).expect_err("value closes the rule");
        assert!(matches!(err, ModuleError::InvalidValue { ref name, .. } if name == "evil"));
    }

    #[test]
    fn test_module_sources() {
        let m = module(
            r#"
[[module]]
dist = "out.css"
import = ["config/tokens.toml", "/abs/tokens.json"]
"#,
        );
        assert_eq!(
            module_sources(Path::new("/p"), &m),
            vec![PathBuf::from("/p/config/tokens.toml"), PathBuf::from("/abs/tokens.json")]
        );
    }
}
