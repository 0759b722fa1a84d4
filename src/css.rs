//! CSS custom property formatting
//!
//! Turns an ordered property map into a single rule:
//!
//! ```
//! use tokenprops::css::{format_ruleset, Properties, DEFAULT_RULESET};
//!
//! let mut props = Properties::new();
//! props.insert("a", "1");
//! props.insert("b", "2");
//!
//! assert_eq!(format_ruleset(DEFAULT_RULESET, &props), ":root { --a: 1; --b: 2; }");
//! ```

use lightningcss::rules::CssRule;
use lightningcss::stylesheet::{ParserOptions, StyleSheet};

/// Selector used when a module does not declare its own ruleset
pub const DEFAULT_RULESET: &str = ":root";

/// Ordered mapping of property names (without the `--` prefix) to values.
///
/// Re-inserting an existing name replaces its value but keeps its position,
/// so later sources override earlier ones without reordering the output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: Vec<(String, String)>,
}

impl Properties {
    /// Create an empty property map
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Insert or replace a property, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    /// Remove a property by name
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Properties::new();
        for (k, v) in iter {
            props.insert(k, v);
        }
        props
    }
}

/// Prefix a property name with `--` unless it already carries it.
pub fn custom_property_name(name: &str) -> String {
    if name.starts_with("--") {
        name.to_string()
    } else {
        format!("--{}", name)
    }
}

/// Check that a name can be emitted as a custom property.
///
/// Accepts ASCII letters, digits, `-`, `_` and any non-ASCII character, with
/// an optional leading `--`.
pub fn is_valid_property_name(name: &str) -> bool {
    let bare = name.strip_prefix("--").unwrap_or(name);
    !bare.is_empty()
        && bare.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii())
}

/// Check that a value stays inside its declaration.
///
/// `;`, `{` and `}` are only allowed inside quoted strings, and line breaks
/// are rejected outright.
pub fn is_valid_property_value(value: &str) -> bool {
    let mut quote = None;
    let mut escaped = false;
    for c in value.chars() {
        if c == '\n' || c == '\r' {
            return false;
        }
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, ';' | '{' | '}') => return false,
            (None, _) => {}
        }
    }
    quote.is_none() && !escaped
}

/// Format the declaration list: `--a: 1; --b: 2;`
pub fn declarations(properties: &Properties) -> String {
    properties
        .iter()
        .map(|(name, value)| format!("{}: {};", custom_property_name(name), value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Wrap the declarations of `properties` in a `ruleset { ... }` block.
///
/// An empty map still produces a (blank) rule so the output file always
/// reflects the latest configuration.
pub fn format_ruleset(ruleset: &str, properties: &Properties) -> String {
    if properties.is_empty() {
        return format!("{} {{ }}", ruleset);
    }
    format!("{} {{ {} }}", ruleset, declarations(properties))
}

/// Check that `selector` parses as a CSS selector list.
///
/// At-rules are refused: declarations cannot sit directly inside them.
pub fn validate_selector(selector: &str) -> Result<(), String> {
    if selector.trim().is_empty() {
        return Err("selector is empty".to_string());
    }
    if selector.contains(['{', '}', ';']) {
        return Err(format!("selector '{}' contains a block delimiter", selector));
    }
    if selector.trim_start().starts_with('@') {
        return Err(format!("'{}' is an at-rule, not a selector", selector));
    }
    let source = format!("{} {{}}", selector);
    let sheet = StyleSheet::parse(&source, ParserOptions::default())
        .map_err(|e| format!("invalid selector '{}': {}", selector, e))?;
    match sheet.rules.0.as_slice() {
        [CssRule::Style(_)] => Ok(()),
        _ => Err(format!("invalid selector '{}': not a style rule", selector)),
    }
}
