//! The site json: every chart's text, enriched with the text of the SVG
//! figures it links, published as one JSON object keyed by slug.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use atlas_common::{clean_path, is_within, ContentHash, FileStamp};
use atlas_config::SiteConfig;
use atlas_shake::{Cookie, Key, Made, Rule, RuleSet, ShakeError};
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::chart::Chart;
use crate::question::{unexpected, SiteQuestion, SiteValue};
use crate::sitelist::SiteListCache;
use crate::svgtext;
use crate::transform::{LinkTransform, Transform};

/// One chart's contribution to the site json.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateEntry {
    /// Chart text followed by `svg:` lines for every linked figure.
    pub text: String,
    /// Stamps of the chart file and each figure read, in read order.
    pub stamps: Vec<(PathBuf, FileStamp)>,
}

/// An entry is published as its text alone.
impl Serialize for AggregateEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

/// The built site json.
#[derive(Debug, Clone)]
pub struct SiteJson {
    /// Entries by chart slug.
    pub entries: BTreeMap<String, AggregateEntry>,
    /// `{ slug: text }` serialized as JSON.
    pub json: Vec<u8>,
    /// Digest of `json`.
    pub digest: ContentHash,
    /// Latest modification time of any file read, across all builds.
    pub mod_time: SystemTime,
}

/// Answers [`SiteQuestion::Aggregate`] by rebuilding every entry.
///
/// The answer depends on the `Dir(root)` answer, so any change to the site
/// list forces a rebuild, and its cookie lists the stamp of every chart and
/// figure read.
pub struct AggregateRule {
    root: PathBuf,
    transform: Arc<dyn Transform>,
    suffix: String,
}

impl AggregateRule {
    /// Aggregates the tree at `root`, following links whose extension is
    /// `suffix`.
    pub fn new(
        root: impl Into<PathBuf>,
        transform: Arc<dyn Transform>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            transform,
            suffix: suffix.into(),
        }
    }

    /// Builds one chart's entry. `None` if the chart cannot be read.
    fn entry(&self, chart: &Chart, mod_time: &mut SystemTime) -> Option<AggregateEntry> {
        let doc = match chart.read() {
            Ok(doc) => doc,
            Err(err) => {
                warn!(
                    target: "atlas::sitejson",
                    chart = %chart.src().display(),
                    error = %err,
                    "skipping unreadable chart"
                );
                return None;
            }
        };
        *mod_time = (*mod_time).max(doc.stamp.modified);

        let derived = self.transform.transform(&doc);
        let mut text = derived.text;
        let mut stamps = vec![(chart.src().to_path_buf(), doc.stamp)];

        for reference in &derived.references {
            let Some(path) = self.figure_path(chart.dir(), reference) else {
                continue;
            };
            let (stamp, data) = match read_figure(&path) {
                Ok(figure) => figure,
                Err(err) => {
                    warn!(
                        target: "atlas::sitejson",
                        figure = %path.display(),
                        error = %err,
                        "skipping figure"
                    );
                    continue;
                }
            };
            let cdata = match svgtext::character_data(&data) {
                Ok(cdata) => cdata,
                Err(err) => {
                    warn!(
                        target: "atlas::sitejson",
                        figure = %path.display(),
                        error = %err,
                        "skipping unparsable figure"
                    );
                    continue;
                }
            };
            debug!(
                target: "atlas::sitejson",
                figure = %path.display(),
                items = cdata.len(),
                "folded figure text"
            );

            text.push('\n');
            for datum in &cdata {
                text.push_str("svg: ");
                text.push_str(datum);
                text.push('\n');
            }
            *mod_time = (*mod_time).max(stamp.modified);
            stamps.push((path, stamp));
        }

        Some(AggregateEntry { text, stamps })
    }

    /// Resolves a figure reference against the chart directory. `None` for
    /// references that are not figures, are URLs, or leave the root.
    fn figure_path(&self, chart_dir: &Path, reference: &str) -> Option<PathBuf> {
        let target = reference.split(['?', '#']).next().unwrap_or(reference);
        let is_figure = Path::new(target)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(self.suffix.as_str()));
        if !is_figure || target.contains("://") {
            return None;
        }
        let path = clean_path(&chart_dir.join(target.trim_start_matches('/')));
        if !is_within(&path, &self.root) {
            warn!(target: "atlas::sitejson", reference, "skipping figure outside the chart root");
            return None;
        }
        Some(path)
    }
}

/// Opens a figure, stamps it from the handle, and reads it.
fn read_figure(path: &Path) -> std::io::Result<(FileStamp, Vec<u8>)> {
    let mut file = File::open(path)?;
    let meta = file.metadata()?;
    let stamp = FileStamp::from_metadata(&meta)?;
    let mut data = Vec::with_capacity(meta.len() as usize);
    file.read_to_end(&mut data)?;
    Ok((stamp, data))
}

impl Rule<SiteQuestion, SiteValue> for AggregateRule {
    fn name(&self) -> &str {
        "site-json"
    }

    fn matches(&self, question: &SiteQuestion, _key: &Key) -> bool {
        matches!(question, SiteQuestion::Aggregate(_))
    }

    fn make(
        &self,
        question: &SiteQuestion,
        key: &Key,
        rules: &mut RuleSet<SiteQuestion, SiteValue>,
    ) -> Result<Made<SiteQuestion, SiteValue>, ShakeError> {
        let SiteQuestion::Aggregate(root) = question else {
            return Err(ShakeError::BadQuestion { key: key.clone() });
        };
        let site = rules.make(&SiteQuestion::Dir(root.clone()))?;

        let mut charts = Vec::new();
        site.walk(&mut |answer| {
            if let Some(chart) = answer.value.as_dir().and_then(|entry| entry.chart.as_ref()) {
                charts.push(chart.clone());
            }
        });
        charts.sort_by(|a, b| a.src().cmp(b.src()));

        let mut mod_time = rules
            .get(key)
            .and_then(|previous| previous.value.as_aggregate())
            .map_or(SystemTime::UNIX_EPOCH, |previous| previous.mod_time);

        let mut entries = BTreeMap::new();
        for chart in &charts {
            if let Some(entry) = self.entry(chart, &mut mod_time) {
                entries.insert(chart.slug(), entry);
            }
        }

        let json = serde_json::to_vec(&entries).map_err(|e| ShakeError::Parse {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        let digest = ContentHash::from_bytes(&json);
        debug!(
            target: "atlas::sitejson",
            charts = entries.len(),
            bytes = json.len(),
            %digest,
            "aggregated"
        );

        let stamps = entries
            .values()
            .flat_map(|entry| entry.stamps.iter().cloned())
            .collect();
        let value = SiteValue::Aggregate(SiteJson {
            entries,
            json,
            digest,
            mod_time,
        });
        Ok(Made::new(value, Cookie::Stamps(stamps)).with_deps(vec![site]))
    }

    /// Every recorded stamp must still match. A missing file is stale; other
    /// stat failures propagate.
    fn validate(&self, key: &Key, cookie: &Cookie) -> Result<(), ShakeError> {
        match cookie {
            Cookie::Stamps(_) => cookie.check_stamps(key),
            _ => Err(ShakeError::BadCookie { key: key.clone() }),
        }
    }
}

/// Cache of the site json, layered on a [`SiteListCache`].
///
/// The aggregate rule is registered on the site list's own engine, so both
/// caches share one set of directory answers.
pub struct SiteJsonCache {
    site_list: SiteListCache,
    current: Option<Arc<SiteValue>>,
}

impl SiteJsonCache {
    /// Aggregates `site_list` with [`LinkTransform`], folding in `svg`
    /// figures.
    pub fn new(site_list: SiteListCache) -> Self {
        Self::with_transform(site_list, LinkTransform, "svg")
    }

    /// Aggregates `site_list` with `transform`, folding in linked files whose
    /// extension is `suffix`.
    pub fn with_transform(
        site_list: SiteListCache,
        transform: impl Transform + 'static,
        suffix: impl Into<String>,
    ) -> Self {
        let rule = AggregateRule::new(site_list.root(), Arc::new(transform), suffix);
        Self {
            site_list: site_list.with_rule(rule),
            current: None,
        }
    }

    /// A site json cache for the `[site]` section of a configuration.
    pub fn from_config(site: &SiteConfig) -> Self {
        Self::with_transform(
            SiteListCache::from_config(site),
            LinkTransform,
            site.auxiliary_suffix.clone(),
        )
    }

    /// Brings the site json up to date. Returns `true` if it was rebuilt.
    pub fn make(&mut self) -> Result<bool, ShakeError> {
        let question = SiteQuestion::Aggregate(self.site_list.root().to_path_buf());
        let answer = self.site_list.rules_mut().make(&question)?;
        if answer.changed || self.current.is_none() {
            if let Some(site) = answer.deps.first() {
                self.site_list.refresh(site);
            }
            let json = answer
                .value
                .as_aggregate()
                .ok_or_else(|| unexpected(&answer.key, "site json"))?;
            info!(
                target: "atlas::sitejson",
                charts = json.entries.len(),
                digest = %json.digest,
                "site json rebuilt"
            );
            self.current = Some(Arc::clone(&answer.value));
        }
        Ok(answer.changed)
    }

    /// The last built site json, if any.
    pub fn site_json(&self) -> Option<&SiteJson> {
        self.current.as_deref().and_then(SiteValue::as_aggregate)
    }

    /// Entries by slug; `None` before the first build.
    pub fn entries(&self) -> Option<&BTreeMap<String, AggregateEntry>> {
        self.site_json().map(|json| &json.entries)
    }

    /// The serialized JSON; empty before the first build.
    pub fn json(&self) -> &[u8] {
        self.site_json()
            .map(|json| json.json.as_slice())
            .unwrap_or_default()
    }

    /// Latest modification time seen; the epoch before the first build.
    pub fn mod_time(&self) -> SystemTime {
        self.site_json()
            .map_or(SystemTime::UNIX_EPOCH, |json| json.mod_time)
    }

    /// Digest of [`json`](Self::json); `None` before the first build.
    pub fn digest(&self) -> Option<ContentHash> {
        self.site_json().map(|json| json.digest)
    }

    /// Strong entity tag for [`json`](Self::json); `None` before the first
    /// build.
    pub fn etag(&self) -> Option<String> {
        self.digest().map(|digest| digest.etag())
    }

    /// The site list the aggregate is built from.
    pub fn site_list(&self) -> &SiteListCache {
        &self.site_list
    }
}

impl std::fmt::Debug for SiteJsonCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteJsonCache")
            .field("site_list", &self.site_list)
            .field("digest", &self.digest())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn rule(root: &Path) -> AggregateRule {
        AggregateRule::new(root, Arc::new(LinkTransform), "svg")
    }

    #[test]
    fn figure_paths_resolve_against_the_chart() {
        let root = Path::new("/srv/charts");
        let rule = rule(root);
        let dir = root.join("net");
        assert_eq!(
            rule.figure_path(&dir, "figs/../map.svg"),
            Some(root.join("net/map.svg"))
        );
        assert_eq!(
            rule.figure_path(&dir, "/top.SVG#layer"),
            Some(root.join("net/top.SVG"))
        );
        assert_eq!(rule.figure_path(&dir, "map.png"), None);
        assert_eq!(rule.figure_path(&dir, "https://example.com/a.svg"), None);
        assert_eq!(rule.figure_path(&dir, "../../etc/x.svg"), None);
    }

    #[test]
    fn figure_paths_under_a_dot_root() {
        for root in [".", "./"] {
            let rule = rule(Path::new(root));
            let net = Chart::new(Path::new(root).join("net/index.txt"), root);
            assert_eq!(
                rule.figure_path(net.dir(), "fig.svg"),
                Some(PathBuf::from("net/fig.svg"))
            );
            assert_eq!(
                rule.figure_path(Path::new(root), "figs/flow.svg"),
                Some(PathBuf::from("figs/flow.svg"))
            );
            assert_eq!(rule.figure_path(net.dir(), "../../x.svg"), None);
        }
    }

    #[test]
    fn entry_appends_figure_text() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("index.txt"), "![fig](fig.svg)\n").unwrap();
        fs::write(root.join("fig.svg"), "<svg><text>edge</text><text>origin</text></svg>").unwrap();

        let chart = Chart::new(root.join("index.txt"), root);
        let mut mod_time = SystemTime::UNIX_EPOCH;
        let entry = rule(root).entry(&chart, &mut mod_time).unwrap();
        assert_eq!(entry.text, "![fig](fig.svg)\n\nsvg: edge\nsvg: origin\n");
        assert_eq!(entry.stamps.len(), 2);
        assert!(mod_time > SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn broken_figures_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("index.txt"), "![a](missing.svg) ![b](broken.svg)\n").unwrap();
        fs::write(root.join("broken.svg"), "<svg><text>oops</svg>").unwrap();

        let chart = Chart::new(root.join("index.txt"), root);
        let mut mod_time = SystemTime::UNIX_EPOCH;
        let entry = rule(root).entry(&chart, &mut mod_time).unwrap();
        assert_eq!(entry.text, "![a](missing.svg) ![b](broken.svg)\n");
        assert_eq!(entry.stamps.len(), 1);
    }

    #[test]
    fn unreadable_chart_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let chart = Chart::new(dir.path().join("index.txt"), dir.path());
        let mut mod_time = SystemTime::UNIX_EPOCH;
        assert!(rule(dir.path()).entry(&chart, &mut mod_time).is_none());
    }

    #[test]
    fn single_stamp_cookie_is_bad() {
        let dir = tempfile::tempdir().unwrap();
        let cookie = Cookie::Stamp(FileStamp::of(dir.path()).unwrap());
        let err = rule(dir.path())
            .validate(&Key::new("atlas-sitejson:///x"), &cookie)
            .unwrap_err();
        assert!(matches!(err, ShakeError::BadCookie { .. }));
    }
}
