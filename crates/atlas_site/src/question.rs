//! Questions and values of the site engine.

use std::path::{Path, PathBuf};

use atlas_shake::{Key, Question, ShakeError};

use crate::chart::Chart;
use crate::sitejson::SiteJson;
use crate::sitelist::SiteEntry;

/// Key prefix for directory listings.
pub const DIR_PREFIX: &str = "atlas-dir://";
/// Key prefix for chart resolution.
pub const CHART_PREFIX: &str = "atlas-chart://";
/// Key prefix for the site json aggregate.
pub const SITE_JSON_PREFIX: &str = "atlas-sitejson://";

/// What the site engine can be asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteQuestion {
    /// The listing of a directory and, recursively, its subdirectories.
    Dir(PathBuf),
    /// The chart of a single directory.
    Chart(PathBuf),
    /// The site json aggregate of the tree rooted at the path.
    Aggregate(PathBuf),
}

impl SiteQuestion {
    /// The directory the question is about.
    pub fn path(&self) -> &Path {
        match self {
            SiteQuestion::Dir(path) | SiteQuestion::Chart(path) | SiteQuestion::Aggregate(path) => {
                path
            }
        }
    }
}

impl Question for SiteQuestion {
    fn key(&self) -> Result<Key, ShakeError> {
        let prefix = match self {
            SiteQuestion::Dir(_) => DIR_PREFIX,
            SiteQuestion::Chart(_) => CHART_PREFIX,
            SiteQuestion::Aggregate(_) => SITE_JSON_PREFIX,
        };
        Ok(Key::new(format!("{prefix}{}", self.path().to_string_lossy())))
    }
}

/// Recovers the path from a key built by [`SiteQuestion::key`].
pub(crate) fn path_for(key: &Key, prefix: &str) -> Result<PathBuf, ShakeError> {
    key.strip_prefix(prefix)
        .map(PathBuf::from)
        .ok_or_else(|| ShakeError::BadKey { key: key.clone() })
}

/// An answer of the site engine.
#[derive(Debug, Clone)]
pub enum SiteValue {
    /// A resolved chart, or `None` for a directory without one.
    Chart(Option<Chart>),
    /// A directory's entry in the site list.
    Dir(SiteEntry),
    /// The site json aggregate.
    Aggregate(SiteJson),
}

impl SiteValue {
    /// The chart resolution, if this is a chart answer.
    pub fn as_chart(&self) -> Option<&Option<Chart>> {
        match self {
            SiteValue::Chart(chart) => Some(chart),
            _ => None,
        }
    }

    /// The site list entry, if this is a directory answer.
    pub fn as_dir(&self) -> Option<&SiteEntry> {
        match self {
            SiteValue::Dir(entry) => Some(entry),
            _ => None,
        }
    }

    /// The aggregate, if this is a site json answer.
    pub fn as_aggregate(&self) -> Option<&SiteJson> {
        match self {
            SiteValue::Aggregate(json) => Some(json),
            _ => None,
        }
    }
}

/// Error for a sub-answer of the wrong kind; only a miswired rule set
/// produces one.
pub(crate) fn unexpected(key: &Key, wanted: &str) -> ShakeError {
    ShakeError::Parse {
        key: key.clone(),
        reason: format!("expected a {wanted} answer"),
    }
}
