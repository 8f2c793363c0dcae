//! The site list: every directory of the chart tree and its chart.
//!
//! Discovery runs as two engine rules. [`DirRule`] lists one directory and
//! asks for its chart and for each subdirectory, so the answer for the root
//! is a tree mirroring the directory tree. Each directory's answer is
//! validated by its own stamp, and a changed directory is rebuilt without
//! re-resolving the untouched subtrees below it.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use atlas_common::FileStamp;
use atlas_config::SiteConfig;
use atlas_shake::{Answer, Cookie, Key, Made, Rule, RuleSet, ShakeError};
use tracing::{debug, info};

use crate::chart::{Chart, ContentResolver, IndexResolver};
use crate::question::{path_for, unexpected, SiteQuestion, SiteValue, CHART_PREFIX, DIR_PREFIX};

/// A directory of the chart tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteEntry {
    /// The directory.
    pub dir: PathBuf,
    /// Its chart, if it has one.
    pub chart: Option<Chart>,
    /// Stamp of the directory when it was listed.
    pub stamp: FileStamp,
}

/// Answers [`SiteQuestion::Chart`] by asking a [`ContentResolver`].
///
/// A directory without a chart is answered with `None`. The cookie is the
/// directory's stamp, so adding or removing an index file re-resolves it.
pub struct ChartRule {
    resolver: Arc<dyn ContentResolver>,
    root: PathBuf,
}

impl ChartRule {
    /// Resolves charts of the tree rooted at `root` with `resolver`.
    pub fn new(resolver: Arc<dyn ContentResolver>, root: impl Into<PathBuf>) -> Self {
        Self {
            resolver,
            root: root.into(),
        }
    }
}

impl Rule<SiteQuestion, SiteValue> for ChartRule {
    fn name(&self) -> &str {
        "chart"
    }

    fn matches(&self, question: &SiteQuestion, _key: &Key) -> bool {
        matches!(question, SiteQuestion::Chart(_))
    }

    fn make(
        &self,
        question: &SiteQuestion,
        key: &Key,
        _rules: &mut RuleSet<SiteQuestion, SiteValue>,
    ) -> Result<Made<SiteQuestion, SiteValue>, ShakeError> {
        let SiteQuestion::Chart(dir) = question else {
            return Err(ShakeError::BadQuestion { key: key.clone() });
        };
        let stamp = FileStamp::of(dir).map_err(|e| ShakeError::io(dir, e))?;
        let chart = match self.resolver.resolve(dir, &self.root) {
            Ok(chart) => Some(chart),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(ShakeError::io(dir, err)),
        };
        debug!(
            target: "atlas::sitelist",
            dir = %dir.display(),
            found = chart.is_some(),
            "resolved chart"
        );
        Ok(Made::new(SiteValue::Chart(chart), Cookie::Stamp(stamp)))
    }

    fn validate(&self, key: &Key, cookie: &Cookie) -> Result<(), ShakeError> {
        validate_dir_stamp(key, cookie, CHART_PREFIX)
    }
}

/// Answers [`SiteQuestion::Dir`] with the directory's [`SiteEntry`].
///
/// The answer depends on the directory's chart and on the answer for every
/// subdirectory, in name order. Symlinked directories are not followed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirRule;

impl Rule<SiteQuestion, SiteValue> for DirRule {
    fn name(&self) -> &str {
        "dir"
    }

    fn matches(&self, question: &SiteQuestion, _key: &Key) -> bool {
        matches!(question, SiteQuestion::Dir(_))
    }

    fn make(
        &self,
        question: &SiteQuestion,
        key: &Key,
        rules: &mut RuleSet<SiteQuestion, SiteValue>,
    ) -> Result<Made<SiteQuestion, SiteValue>, ShakeError> {
        let SiteQuestion::Dir(dir) = question else {
            return Err(ShakeError::BadQuestion { key: key.clone() });
        };
        let stamp = FileStamp::of(dir).map_err(|e| ShakeError::io(dir, e))?;

        let chart_answer = rules.make(&SiteQuestion::Chart(dir.clone()))?;
        let chart = chart_answer
            .value
            .as_chart()
            .ok_or_else(|| unexpected(&chart_answer.key, "chart"))?
            .clone();

        let mut children = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| ShakeError::io(dir, e))? {
            let entry = entry.map_err(|e| ShakeError::io(dir, e))?;
            let file_type = entry.file_type().map_err(|e| ShakeError::io(entry.path(), e))?;
            if file_type.is_dir() {
                children.push(entry.path());
            }
        }
        children.sort();

        let mut deps = Vec::with_capacity(children.len() + 1);
        deps.push(chart_answer);
        for child in children {
            deps.push(rules.make(&SiteQuestion::Dir(child))?);
        }

        debug!(target: "atlas::sitelist", dir = %dir.display(), subdirs = deps.len() - 1, "listed");
        let entry = SiteEntry {
            dir: dir.clone(),
            chart,
            stamp,
        };
        Ok(Made::new(SiteValue::Dir(entry), Cookie::Stamp(stamp)).with_deps(deps))
    }

    fn validate(&self, key: &Key, cookie: &Cookie) -> Result<(), ShakeError> {
        validate_dir_stamp(key, cookie, DIR_PREFIX)
    }
}

/// Compares a directory stamp cookie with a fresh stat. A directory that
/// can no longer be stated is out of date.
fn validate_dir_stamp(key: &Key, cookie: &Cookie, prefix: &str) -> Result<(), ShakeError> {
    let Cookie::Stamp(old) = cookie else {
        return Err(ShakeError::BadCookie { key: key.clone() });
    };
    let dir = path_for(key, prefix)?;
    match FileStamp::of(&dir) {
        Ok(now) if now.is_fresh(old) => Ok(()),
        _ => Err(ShakeError::OutOfDate { key: key.clone() }),
    }
}

/// Cache of every directory under a chart root and its chart.
pub struct SiteListCache {
    root: PathBuf,
    rules: RuleSet<SiteQuestion, SiteValue>,
    entries: BTreeMap<PathBuf, SiteEntry>,
}

impl SiteListCache {
    /// A site list for `root` using the default index file names.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_resolver(root, IndexResolver::default())
    }

    /// A site list for `root` whose charts are found by `resolver`.
    pub fn with_resolver(
        root: impl Into<PathBuf>,
        resolver: impl ContentResolver + 'static,
    ) -> Self {
        let root = root.into();
        let rules = RuleSet::new(Vec::new())
            .rule(ChartRule::new(Arc::new(resolver), root.clone()))
            .rule(DirRule);
        Self {
            root,
            rules,
            entries: BTreeMap::new(),
        }
    }

    /// A site list for the configured chart root and index names.
    pub fn from_config(site: &SiteConfig) -> Self {
        Self::with_resolver(
            site.charts_root.clone(),
            IndexResolver::new(site.index_names.clone()),
        )
    }

    /// Registers an additional rule on the underlying engine.
    pub(crate) fn with_rule(mut self, rule: impl Rule<SiteQuestion, SiteValue> + 'static) -> Self {
        self.rules = self.rules.rule(rule);
        self
    }

    /// Brings the site list up to date. Returns `true` if anything was
    /// rebuilt.
    pub fn make(&mut self) -> Result<bool, ShakeError> {
        let answer = self.rules.make(&SiteQuestion::Dir(self.root.clone()))?;
        if answer.changed || self.entries.is_empty() {
            self.refresh(&answer);
        }
        Ok(answer.changed)
    }

    /// Replaces the entries with those of the `Dir(root)` answer tree.
    pub(crate) fn refresh(&mut self, root: &Answer<SiteQuestion, SiteValue>) {
        let mut entries = BTreeMap::new();
        root.walk(&mut |answer| {
            if let Some(entry) = answer.value.as_dir() {
                entries.insert(entry.dir.clone(), entry.clone());
            }
        });
        info!(
            target: "atlas::sitelist",
            root = %self.root.display(),
            dirs = entries.len(),
            "site list rebuilt"
        );
        self.entries = entries;
    }

    /// Root of the chart tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every known directory, keyed and ordered by path.
    pub fn entries(&self) -> &BTreeMap<PathBuf, SiteEntry> {
        &self.entries
    }

    /// Charts of all directories that have one, in path order.
    pub fn charts(&self) -> impl Iterator<Item = &Chart> {
        self.entries.values().filter_map(|entry| entry.chart.as_ref())
    }

    /// The underlying engine.
    pub fn rules(&self) -> &RuleSet<SiteQuestion, SiteValue> {
        &self.rules
    }

    pub(crate) fn rules_mut(&mut self) -> &mut RuleSet<SiteQuestion, SiteValue> {
        &mut self.rules
    }
}

impl std::fmt::Debug for SiteListCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteListCache")
            .field("root", &self.root)
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_shake::Question;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("index.txt"), "root").unwrap();
        fs::create_dir_all(root.join("net/dns")).unwrap();
        fs::write(root.join("net/index.text"), "net").unwrap();
        fs::create_dir(root.join("empty")).unwrap();
        fs::write(root.join("notes.md"), "not a dir").unwrap();
        dir
    }

    #[test]
    fn make_discovers_every_directory() {
        let dir = tree();
        let root = dir.path();
        let mut cache = SiteListCache::new(root);

        assert!(cache.make().unwrap());
        let dirs: Vec<&PathBuf> = cache.entries().keys().collect();
        assert_eq!(
            dirs,
            vec![
                &root.to_path_buf(),
                &root.join("empty"),
                &root.join("net"),
                &root.join("net/dns"),
            ]
        );
        assert!(cache.entries()[&root.join("empty")].chart.is_none());
        assert_eq!(
            cache.entries()[&root.join("net")].chart.as_ref().unwrap().slug(),
            "net/"
        );
        assert_eq!(cache.charts().count(), 2);
    }

    #[test]
    fn second_make_is_a_hit() {
        let dir = tree();
        let mut cache = SiteListCache::new(dir.path());
        assert!(cache.make().unwrap());
        assert!(!cache.make().unwrap());
        assert_eq!(cache.entries().len(), 4);
    }

    #[test]
    fn dir_answer_depends_on_chart_then_children() {
        let dir = tree();
        let root = dir.path().to_path_buf();
        let mut cache = SiteListCache::new(&root);
        cache.make().unwrap();

        let key = SiteQuestion::Dir(root.clone()).key().unwrap();
        let answer = cache.rules().get(&key).unwrap();
        let dep_keys: Vec<String> = answer.deps.iter().map(|d| d.key.to_string()).collect();
        assert_eq!(
            dep_keys,
            vec![
                SiteQuestion::Chart(root.clone()).key().unwrap().to_string(),
                SiteQuestion::Dir(root.join("empty")).key().unwrap().to_string(),
                SiteQuestion::Dir(root.join("net")).key().unwrap().to_string(),
            ]
        );
    }

    #[test]
    fn missing_root_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SiteListCache::new(dir.path().join("absent"));
        assert!(matches!(cache.make(), Err(ShakeError::Io { .. })));
        assert!(cache.entries().is_empty());
    }

    #[test]
    fn stale_cookie_kind_is_rejected() {
        let key = SiteQuestion::Dir(PathBuf::from("/x")).key().unwrap();
        let err = validate_dir_stamp(&key, &Cookie::None, DIR_PREFIX).unwrap_err();
        assert!(matches!(err, ShakeError::BadCookie { .. }));
    }

    #[test]
    fn vanished_directory_is_out_of_date() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("gone");
        fs::create_dir(&sub).unwrap();
        let cookie = Cookie::Stamp(FileStamp::of(&sub).unwrap());
        fs::remove_dir(&sub).unwrap();

        let key = SiteQuestion::Dir(sub).key().unwrap();
        let err = validate_dir_stamp(&key, &cookie, DIR_PREFIX).unwrap_err();
        assert!(matches!(err, ShakeError::OutOfDate { .. }));
    }
}
