//! Built-in rule that answers with the contents of a file.

use std::io::Read;
use std::path::PathBuf;

use atlas_common::FileStamp;

use crate::engine::RuleSet;
use crate::error::ShakeError;
use crate::key::{Key, READ_FILE_PREFIX};
use crate::rule::{Cookie, Made, Rule};

/// Which keys a [`ReadFileRule`] answers.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    /// A plain string question equal to the pattern; the key is the path.
    Exact(String),
    /// Any `atlas-readfile://` key, i.e. any `PathBuf` question.
    AnyPath,
}

/// Reads a file fully as UTF-8 text.
///
/// The cookie is the file's [`FileStamp`] taken from the open handle, and the
/// answer has no dependencies. Validation re-stats the file: a differing
/// size, mode, or modification time is out of date, and a stat failure is
/// returned as-is (the engine treats a missing file as stale).
#[derive(Debug, Clone)]
pub struct ReadFileRule {
    pattern: Pattern,
}

impl ReadFileRule {
    /// Matches only the plain string question equal to `pattern`, which is
    /// also the path read.
    pub fn exact(pattern: impl Into<String>) -> Self {
        Self {
            pattern: Pattern::Exact(pattern.into()),
        }
    }

    /// Matches every path question.
    pub fn any_path() -> Self {
        Self {
            pattern: Pattern::AnyPath,
        }
    }

    fn path_for(&self, key: &Key) -> Result<PathBuf, ShakeError> {
        match &self.pattern {
            Pattern::Exact(_) => Ok(PathBuf::from(key.as_str())),
            Pattern::AnyPath => key
                .strip_prefix(READ_FILE_PREFIX)
                .map(PathBuf::from)
                .ok_or_else(|| ShakeError::BadKey { key: key.clone() }),
        }
    }
}

impl<Q, V> Rule<Q, V> for ReadFileRule
where
    V: From<String>,
{
    fn name(&self) -> &str {
        "read-file"
    }

    fn matches(&self, _question: &Q, key: &Key) -> bool {
        match &self.pattern {
            Pattern::Exact(pattern) => key.as_str() == pattern,
            Pattern::AnyPath => key.as_str().starts_with(READ_FILE_PREFIX),
        }
    }

    fn make(
        &self,
        _question: &Q,
        key: &Key,
        _rules: &mut RuleSet<Q, V>,
    ) -> Result<Made<Q, V>, ShakeError> {
        let path = self.path_for(key)?;
        let mut file = std::fs::File::open(&path).map_err(|e| ShakeError::io(&path, e))?;
        let meta = file.metadata().map_err(|e| ShakeError::io(&path, e))?;
        let stamp = FileStamp::from_metadata(&meta).map_err(|e| ShakeError::io(&path, e))?;

        let mut text = String::with_capacity(meta.len() as usize);
        file.read_to_string(&mut text)
            .map_err(|e| ShakeError::io(&path, e))?;

        Ok(Made::new(V::from(text), Cookie::Stamp(stamp)))
    }

    fn validate(&self, key: &Key, cookie: &Cookie) -> Result<(), ShakeError> {
        let path = self.path_for(key)?;
        let now = FileStamp::of(&path).map_err(|e| ShakeError::io(&path, e))?;
        let Cookie::Stamp(old) = cookie else {
            return Err(ShakeError::BadCookie { key: key.clone() });
        };
        if now.is_fresh(old) {
            Ok(())
        } else {
            Err(ShakeError::OutOfDate { key: key.clone() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Question;
    use std::path::Path;

    fn validate(rule: &ReadFileRule, key: &Key, cookie: &Cookie) -> Result<(), ShakeError> {
        <ReadFileRule as Rule<PathBuf, String>>::validate(rule, key, cookie)
    }

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn any_path_reads_path_questions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "demo.txt", "Hi\n");
        let mut rules: RuleSet<PathBuf, String> =
            RuleSet::new(Vec::new()).rule(ReadFileRule::any_path());

        let answer = rules.make(&path).unwrap();
        assert_eq!(*answer.value, "Hi\n");
        assert!(answer.deps.is_empty());
        assert!(matches!(answer.cookie, Cookie::Stamp(s) if s.size == 3));
    }

    #[test]
    fn exact_matches_only_its_pattern() {
        let rule = ReadFileRule::exact("/srv/a.txt");
        let q = "/srv/a.txt".to_string();
        assert!(<ReadFileRule as Rule<String, String>>::matches(&rule, &q, &q.key().unwrap()));
        let other = "/srv/b.txt".to_string();
        assert!(!<ReadFileRule as Rule<String, String>>::matches(
            &rule,
            &other,
            &other.key().unwrap()
        ));
    }

    #[test]
    fn any_path_ignores_plain_strings() {
        let rule = ReadFileRule::any_path();
        let q = "/srv/a.txt".to_string();
        assert!(!<ReadFileRule as Rule<String, String>>::matches(&rule, &q, &q.key().unwrap()));
    }

    #[test]
    fn validate_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.txt", "abc");
        let key = path.key().unwrap();
        let cookie = Cookie::Stamp(FileStamp::of(&path).unwrap());
        assert!(validate(&ReadFileRule::any_path(), &key, &cookie).is_ok());
    }

    #[test]
    fn validate_resized_file_is_out_of_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.txt", "abc");
        let key = path.key().unwrap();
        let cookie = Cookie::Stamp(FileStamp::of(&path).unwrap());
        std::fs::write(&path, "abcdef").unwrap();

        let err = validate(&ReadFileRule::any_path(), &key, &cookie).unwrap_err();
        assert!(matches!(err, ShakeError::OutOfDate { .. }));
    }

    #[test]
    fn validate_wrong_cookie_is_bad_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.txt", "abc");
        let err =
            validate(&ReadFileRule::any_path(), &path.key().unwrap(), &Cookie::None).unwrap_err();
        assert!(matches!(err, ShakeError::BadCookie { .. }));
    }

    #[test]
    fn validate_unprefixed_key_is_bad_key() {
        let key = Key::new("/srv/a.txt");
        let err = validate(&ReadFileRule::any_path(), &key, &Cookie::None).unwrap_err();
        assert!(matches!(err, ShakeError::BadKey { .. }));
    }

    #[test]
    fn validate_missing_file_returns_stat_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.txt", "abc");
        let cookie = Cookie::Stamp(FileStamp::of(&path).unwrap());
        std::fs::remove_file(&path).unwrap();

        let err = validate(&ReadFileRule::any_path(), &path.key().unwrap(), &cookie).unwrap_err();
        assert!(matches!(err, ShakeError::Io { .. }));
    }

    #[test]
    fn non_utf8_content_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin.dat");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        let mut rules: RuleSet<PathBuf, String> =
            RuleSet::new(Vec::new()).rule(ReadFileRule::any_path());
        assert!(matches!(rules.make(&path), Err(ShakeError::Io { .. })));
    }
}
