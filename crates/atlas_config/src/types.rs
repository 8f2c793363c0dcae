//! Configuration types deserialized from `atlas.toml`.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// The top-level site configuration parsed from `atlas.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AtlasConfig {
    /// Where charts live and how they are discovered.
    #[serde(default)]
    pub site: SiteConfig,
    /// Where HTML templates live.
    #[serde(default)]
    pub templates: TemplateConfig,
}

/// Content discovery settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Root directory of the chart tree. Required.
    #[serde(default)]
    pub charts_root: PathBuf,
    /// File names that mark a directory's chart, tried in order.
    #[serde(default = "default_index_names")]
    pub index_names: Vec<String>,
    /// Suffix of linked figures whose text is folded into the site json.
    #[serde(default = "default_auxiliary_suffix")]
    pub auxiliary_suffix: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            charts_root: PathBuf::new(),
            index_names: default_index_names(),
            auxiliary_suffix: default_auxiliary_suffix(),
        }
    }
}

/// Template lookup settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    /// Directory holding the template files.
    #[serde(default = "default_html_path")]
    pub html_path: PathBuf,
    /// Template file extension, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl TemplateConfig {
    /// Path of the template file for `name`: `<html_path>/<name>.<extension>`.
    pub fn template_path(&self, name: &str) -> PathBuf {
        self.html_path.join(format!("{name}.{}", self.extension))
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            html_path: default_html_path(),
            extension: default_extension(),
        }
    }
}

/// Resolves `path` against `base` unless it is already absolute.
pub(crate) fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn default_index_names() -> Vec<String> {
    vec!["index.txt".to_string(), "index.text".to_string()]
}

fn default_auxiliary_suffix() -> String {
    "svg".to_string()
}

fn default_html_path() -> PathBuf {
    PathBuf::from("html")
}

fn default_extension() -> String {
    "html".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_path_joins_name_and_extension() {
        let templates = TemplateConfig::default();
        assert_eq!(
            templates.template_path("chart"),
            PathBuf::from("html").join("chart.html")
        );
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let abs = std::env::temp_dir();
        assert_eq!(resolve_against(Path::new("proj"), &abs), abs);
        assert_eq!(
            resolve_against(Path::new("proj"), Path::new("charts")),
            Path::new("proj").join("charts")
        );
    }
}
