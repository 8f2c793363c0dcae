//! Parsing and validation of `atlas.toml` site configuration files.
//!
//! This crate reads the site configuration file and produces a strongly-typed
//! [`AtlasConfig`] naming where charts and templates live and how the caches
//! recognize them.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use types::*;
