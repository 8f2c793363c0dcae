//! Error types for rule evaluation and validation.

use std::path::PathBuf;

use crate::key::Key;

/// Errors produced while making or validating answers.
///
/// Validation failures come in two flavors. Staleness
/// ([`OutOfDate`](Self::OutOfDate), the `Bad*` wiring errors, and a missing
/// file) makes the engine rebuild the answer and is never returned from
/// [`RuleSet::make`](crate::RuleSet::make). Everything else is a hard failure
/// that propagates to the caller and leaves the cache untouched.
#[derive(Debug, thiserror::Error)]
pub enum ShakeError {
    /// No registered rule matches the question.
    #[error("shake: no matching rule: key {key}")]
    NoMatchingRule {
        /// Key of the unroutable question.
        key: Key,
    },

    /// A cookie no longer matches the external state it describes.
    #[error("shake: old dep: key {key}")]
    OutOfDate {
        /// Key of the stale answer.
        key: Key,
    },

    /// A rule received a cookie variant it does not produce.
    #[error("shake: bad cookie: key {key}")]
    BadCookie {
        /// Key of the answer carrying the cookie.
        key: Key,
    },

    /// A rule received a question it cannot interpret, or a question could
    /// not derive a key.
    #[error("shake: bad question: key {key}")]
    BadQuestion {
        /// Key (or best-effort identity) of the question.
        key: Key,
    },

    /// A rule received a key it could not have produced.
    #[error("shake: bad key: {key}")]
    BadKey {
        /// The unrecognized key.
        key: Key,
    },

    /// The question is already being made further up the call stack.
    #[error("shake: dependency cycle through key {key}")]
    Cycle {
        /// Key that was requested while still in progress.
        key: Key,
    },

    /// An I/O error occurred while reading or stating an external resource.
    #[error("shake: I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A rule failed to parse or transform the resource behind a key.
    #[error("shake: cannot build {key}: {reason}")]
    Parse {
        /// Key being made.
        key: Key,
        /// Description of the failure.
        reason: String,
    },
}

impl ShakeError {
    /// Wraps an I/O error with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if this validation error means "rebuild" rather than
    /// "fail".
    ///
    /// A missing file counts as stale: the rule that rebuilds it decides
    /// whether absence is an error.
    pub fn is_stale(&self) -> bool {
        match self {
            Self::OutOfDate { .. } => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => self.is_wiring(),
        }
    }

    /// Returns `true` for errors that indicate rules and cookies were wired
    /// together incorrectly.
    pub fn is_wiring(&self) -> bool {
        matches!(
            self,
            Self::BadCookie { .. } | Self::BadQuestion { .. } | Self::BadKey { .. }
        )
    }
}
