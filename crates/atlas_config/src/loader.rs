//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{resolve_against, AtlasConfig};
use std::path::Path;

/// Name of the configuration file inside a project directory.
pub const CONFIG_FILE: &str = "atlas.toml";

/// Loads and validates an `atlas.toml` configuration from a project directory.
///
/// Reads `<project_dir>/atlas.toml`, parses and validates it, then resolves
/// relative `charts_root` and `html_path` against `project_dir`.
pub fn load_config(project_dir: &Path) -> Result<AtlasConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::IoError {
        path: config_path.clone(),
        source,
    })?;
    let mut config = load_config_from_str(&content)?;
    config.site.charts_root = resolve_against(project_dir, &config.site.charts_root);
    config.templates.html_path = resolve_against(project_dir, &config.templates.html_path);
    Ok(config)
}

/// Parses and validates an `atlas.toml` configuration from a string.
///
/// Paths are returned as written. Useful for testing without filesystem
/// dependencies.
pub fn load_config_from_str(content: &str) -> Result<AtlasConfig, ConfigError> {
    let mut config: AtlasConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    normalize(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Strips a leading dot from suffixes so `".svg"` and `"svg"` mean the same.
fn normalize(config: &mut AtlasConfig) {
    if let Some(rest) = config.site.auxiliary_suffix.strip_prefix('.') {
        config.site.auxiliary_suffix = rest.to_string();
    }
    if let Some(rest) = config.templates.extension.strip_prefix('.') {
        config.templates.extension = rest.to_string();
    }
}

/// Validates that required fields are present and values are usable.
fn validate_config(config: &AtlasConfig) -> Result<(), ConfigError> {
    if config.site.charts_root.as_os_str().is_empty() {
        return Err(ConfigError::MissingField("site.charts_root".to_string()));
    }
    if config.site.index_names.is_empty() {
        return Err(ConfigError::ValidationError(
            "site.index_names is empty".to_string(),
        ));
    }
    for name in &config.site.index_names {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(ConfigError::ValidationError(format!(
                "site.index_names entry '{name}' must be a plain file name"
            )));
        }
    }
    if config.site.auxiliary_suffix.is_empty() {
        return Err(ConfigError::ValidationError(
            "site.auxiliary_suffix is empty".to_string(),
        ));
    }
    if config.templates.extension.is_empty() {
        return Err(ConfigError::ValidationError(
            "templates.extension is empty".to_string(),
        ));
    }
    Ok(())
}
