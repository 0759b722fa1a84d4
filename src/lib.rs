//! tokenprops - Generate CSS custom property files from design token configuration
//!
//! This library provides functionality to:
//! - Load a TOML document describing one or more property modules
//! - Flatten and filter each module's properties
//! - Format them as a single CSS rule of custom properties
//! - Write the result to the module's output path, once or on every change

pub mod cli;
pub mod config;
pub mod css;
pub mod output;
pub mod pipeline;
pub mod watch;
