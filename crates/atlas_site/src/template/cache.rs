//! Template cache: one engine entry per template, depending on every
//! template it includes.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path};
use std::sync::Arc;

use atlas_common::FileStamp;
use atlas_config::TemplateConfig;
use atlas_shake::{Cookie, Key, Made, Question, Rule, RuleSet, ShakeError};
use tracing::{debug, info};

use super::parse::{ActionParser, TemplateParser, Tree};
use super::CompiledTemplate;

/// Key prefix for template questions.
pub const TEMPLATE_PREFIX: &str = "atlas-template://";

/// Asks for the compiled template called `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateQuestion(String);

impl TemplateQuestion {
    /// A question for the template `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The template name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Question for TemplateQuestion {
    /// Fails for names that would not stay inside the template directory:
    /// empty, rooted, drive-prefixed, or with a `..` segment.
    fn key(&self) -> Result<Key, ShakeError> {
        let key = Key::new(format!("{TEMPLATE_PREFIX}{}", self.0));
        if !is_contained(&self.0) {
            return Err(ShakeError::BadQuestion { key });
        }
        Ok(key)
    }
}

fn is_contained(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(['/', '\\'])
        && !name.split(['/', '\\']).any(|part| part == "..")
        && !Path::new(name).is_absolute()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// A cached template.
#[derive(Debug, Clone)]
pub struct TemplateEntry {
    /// The template merged with everything it includes.
    pub template: CompiledTemplate,
    /// The template's own parse tree.
    pub tree: Arc<Tree>,
    /// Stamp of the template file when it was read.
    pub stamp: FileStamp,
    /// Names of the directly included templates.
    pub deps: Vec<String>,
}

/// Reads, parses, and compiles `<html_path>/<name>.<extension>`.
///
/// Included templates are made first and their answers become this
/// answer's dependencies, so touching any template in the include closure
/// rebuilds every template above it.
pub struct TemplateRule {
    templates: TemplateConfig,
    parser: Arc<dyn TemplateParser>,
}

impl TemplateRule {
    /// A rule reading templates from `templates` with `parser`.
    pub fn new(templates: TemplateConfig, parser: Arc<dyn TemplateParser>) -> Self {
        Self { templates, parser }
    }
}

impl Rule<TemplateQuestion, TemplateEntry> for TemplateRule {
    fn name(&self) -> &str {
        "template"
    }

    fn matches(&self, _question: &TemplateQuestion, key: &Key) -> bool {
        key.as_str().starts_with(TEMPLATE_PREFIX)
    }

    fn make(
        &self,
        question: &TemplateQuestion,
        key: &Key,
        rules: &mut RuleSet<TemplateQuestion, TemplateEntry>,
    ) -> Result<Made<TemplateQuestion, TemplateEntry>, ShakeError> {
        let path = self.templates.template_path(question.name());
        let mut file = File::open(&path).map_err(|e| ShakeError::io(&path, e))?;
        let meta = file.metadata().map_err(|e| ShakeError::io(&path, e))?;
        let stamp = FileStamp::from_metadata(&meta).map_err(|e| ShakeError::io(&path, e))?;
        let mut text = String::with_capacity(meta.len() as usize);
        file.read_to_string(&mut text)
            .map_err(|e| ShakeError::io(&path, e))?;

        let tree = self
            .parser
            .parse(question.name(), &text)
            .map_err(|e| ShakeError::Parse {
                key: key.clone(),
                reason: e.to_string(),
            })?;
        let tree = Arc::new(tree);
        let names = tree.references();
        debug!(target: "atlas::template", template = question.name(), includes = ?names, "parsed");

        let mut template = CompiledTemplate::new(Arc::clone(&tree));
        let mut deps = Vec::with_capacity(names.len());
        for name in &names {
            let answer = rules.make(&TemplateQuestion::new(name.as_str()))?;
            template.merge(&answer.value.template);
            deps.push(answer);
        }

        let entry = TemplateEntry {
            template,
            tree,
            stamp,
            deps: names,
        };
        Ok(Made::new(entry, Cookie::Stamp(stamp)).with_deps(deps))
    }

    fn validate(&self, key: &Key, cookie: &Cookie) -> Result<(), ShakeError> {
        let name = key
            .strip_prefix(TEMPLATE_PREFIX)
            .ok_or_else(|| ShakeError::BadKey { key: key.clone() })?;
        let Cookie::Stamp(old) = cookie else {
            return Err(ShakeError::BadCookie { key: key.clone() });
        };
        let path = self.templates.template_path(name);
        let now = FileStamp::of(&path).map_err(|e| ShakeError::io(&path, e))?;
        if now.is_fresh(old) {
            Ok(())
        } else {
            Err(ShakeError::OutOfDate { key: key.clone() })
        }
    }
}

/// Cache of compiled templates by name.
pub struct TemplateCache {
    rules: RuleSet<TemplateQuestion, TemplateEntry>,
}

impl TemplateCache {
    /// A cache reading templates as configured, with the built-in parser.
    pub fn new(templates: TemplateConfig) -> Self {
        Self::with_parser(templates, ActionParser)
    }

    /// A cache reading templates as configured, parsed by `parser`.
    pub fn with_parser(templates: TemplateConfig, parser: impl TemplateParser + 'static) -> Self {
        let rule = TemplateRule::new(templates, Arc::new(parser));
        Self {
            rules: RuleSet::new(Vec::new()).rule(rule),
        }
    }

    /// A cache for the `[templates]` section of a configuration.
    pub fn from_config(templates: &TemplateConfig) -> Self {
        Self::new(templates.clone())
    }

    /// Brings the template `name` and its includes up to date. Returns
    /// `true` if it was rebuilt.
    ///
    /// An include cycle fails with [`ShakeError::Cycle`].
    pub fn make(&mut self, name: &str) -> Result<bool, ShakeError> {
        let answer = self.rules.make(&TemplateQuestion::new(name))?;
        if answer.changed {
            info!(
                target: "atlas::template",
                template = name,
                trees = answer.value.template.names().count(),
                "template rebuilt"
            );
        }
        Ok(answer.changed)
    }

    /// The last built entry for `name`, without checking freshness.
    pub fn get(&self, name: &str) -> Option<&TemplateEntry> {
        let key = TemplateQuestion::new(name).key().ok()?;
        self.rules.get(&key).map(|answer| answer.value.as_ref())
    }

    /// The underlying engine.
    pub fn rules(&self) -> &RuleSet<TemplateQuestion, TemplateEntry> {
        &self.rules
    }
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("entries", &self.rules.len())
            .finish()
    }
}
