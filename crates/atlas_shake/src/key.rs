//! Cache keys and the questions that derive them.

use std::fmt;
use std::path::PathBuf;

use crate::error::ShakeError;

/// Key prefix for questions answered by reading a file.
pub const READ_FILE_PREFIX: &str = "atlas-readfile://";

/// Key prefix for request-derived questions.
const WEB_PREFIX: &str = "atlas-web://";

/// Stable string identity of a cacheable computation.
///
/// The engine's cache is keyed on this string alone; two questions that
/// derive equal keys share one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    /// Creates a key from any string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the remainder of the key after `prefix`, if it starts with it.
    pub fn strip_prefix(&self, prefix: &str) -> Option<&str> {
        self.0.strip_prefix(prefix)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// A request for a cacheable computation.
pub trait Question {
    /// Derives the cache key. Semantically identical questions must derive
    /// equal keys.
    fn key(&self) -> Result<Key, ShakeError>;
}

/// A plain string is its own key.
impl Question for String {
    fn key(&self) -> Result<Key, ShakeError> {
        Ok(Key::new(self.as_str()))
    }
}

/// A path asks for the contents of the file at that path.
impl Question for PathBuf {
    fn key(&self) -> Result<Key, ShakeError> {
        Ok(Key::new(format!(
            "{READ_FILE_PREFIX}{}",
            self.to_string_lossy()
        )))
    }
}

/// A question derived from an HTTP request line.
///
/// Only the method and the lexically cleaned path take part in the key, so
/// `GET /charts/./net/` and `get /charts/net` are the same question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebQuestion {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Request path as received.
    pub path: String,
}

impl WebQuestion {
    /// Creates a question for `method` and `path`.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Returns the rooted, cleaned request path.
    pub fn clean_path(&self) -> String {
        clean_url_path(&self.path)
    }
}

impl Question for WebQuestion {
    fn key(&self) -> Result<Key, ShakeError> {
        let method = self.method.trim();
        if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(ShakeError::BadQuestion {
                key: Key::new(format!("{WEB_PREFIX}{} {}", self.method, self.path)),
            });
        }
        Ok(Key::new(format!(
            "{WEB_PREFIX}{} {}",
            method.to_ascii_uppercase(),
            self.clean_path()
        )))
    }
}

/// Cleans a URL path the way `/`-separated paths are cleaned: rooted, with
/// `.`, `..`, and empty segments resolved.
fn clean_url_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_question_is_its_own_key() {
        let q = "i.do.exist".to_string();
        assert_eq!(q.key().unwrap().as_str(), "i.do.exist");
    }

    #[test]
    fn path_question_is_prefixed() {
        let q = PathBuf::from("/srv/atlas/demo.txt");
        let key = q.key().unwrap();
        assert_eq!(key.as_str(), "atlas-readfile:///srv/atlas/demo.txt");
        assert_eq!(key.strip_prefix(READ_FILE_PREFIX), Some("/srv/atlas/demo.txt"));
    }

    #[test]
    fn equal_questions_equal_keys() {
        let a = PathBuf::from("charts/index.txt").key().unwrap();
        let b = PathBuf::from("charts/index.txt").key().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn web_question_cleans_path_and_method() {
        let a = WebQuestion::new("GET", "/charts/./net/../dns/").key().unwrap();
        let b = WebQuestion::new("get", "/charts/dns").key().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "atlas-web://GET /charts/dns");
    }

    #[test]
    fn web_question_distinguishes_methods() {
        let get = WebQuestion::new("GET", "/site.json").key().unwrap();
        let post = WebQuestion::new("POST", "/site.json").key().unwrap();
        assert_ne!(get, post);
    }

    #[test]
    fn web_question_rejects_malformed_method() {
        let err = WebQuestion::new("", "/").key().unwrap_err();
        assert!(matches!(err, ShakeError::BadQuestion { .. }));
        let err = WebQuestion::new("GE T", "/").key().unwrap_err();
        assert!(matches!(err, ShakeError::BadQuestion { .. }));
    }

    #[test]
    fn clean_url_path_cannot_escape_root() {
        assert_eq!(clean_url_path("/../../etc/passwd"), "/etc/passwd");
        assert_eq!(clean_url_path(""), "/");
        assert_eq!(clean_url_path("a//b"), "/a/b");
    }
}
