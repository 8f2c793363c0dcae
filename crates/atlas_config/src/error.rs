//! Errors from reading `atlas.toml`.

use std::path::PathBuf;

/// Why an `atlas.toml` could not be turned into an [`AtlasConfig`](crate::AtlasConfig).
///
/// Field names in messages use the dotted TOML path, e.g. `site.charts_root`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    IoError {
        /// The `atlas.toml` that was opened.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the expected tables.
    #[error("malformed atlas.toml: {0}")]
    ParseError(String),

    /// A field with no usable default was left out.
    #[error("atlas.toml is missing {0}")]
    MissingField(String),

    /// A field is present but unusable.
    #[error("invalid atlas.toml: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn missing_charts_root_names_the_field() {
        let err = ConfigError::MissingField("site.charts_root".to_string());
        assert_eq!(err.to_string(), "atlas.toml is missing site.charts_root");
    }

    #[test]
    fn bad_index_name_is_reported_as_invalid() {
        let err = crate::load_config_from_str(
            "[site]\ncharts_root = \"charts\"\nindex_names = [\"a/index.txt\"]\n",
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid atlas.toml: site.index_names entry 'a/index.txt' must be a plain file name"
        );
    }

    #[test]
    fn read_failure_names_the_file_and_keeps_the_cause() {
        let err = ConfigError::IoError {
            path: PathBuf::from("/srv/site/atlas.toml"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "cannot read /srv/site/atlas.toml: denied");
        let cause = err.source().unwrap().downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(cause.kind(), std::io::ErrorKind::PermissionDenied);
    }
}
