//! HTML templates and the cache that resolves their includes.

pub mod cache;
pub mod parse;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use cache::{TemplateCache, TemplateEntry, TemplateQuestion, TemplateRule, TEMPLATE_PREFIX};
pub use parse::{ActionParser, BlockKind, Node, ParseError, TemplateParser, Tree};

/// A template together with every template it includes, transitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    name: String,
    trees: BTreeMap<String, Arc<Tree>>,
}

impl CompiledTemplate {
    /// A compiled template holding only `tree`.
    pub fn new(tree: Arc<Tree>) -> Self {
        let name = tree.name.clone();
        let mut trees = BTreeMap::new();
        trees.insert(name.clone(), tree);
        Self { name, trees }
    }

    /// Name of the template this was compiled for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The template's own tree.
    pub fn main(&self) -> Option<&Arc<Tree>> {
        self.trees.get(&self.name)
    }

    /// Looks up an included (or the main) tree by name.
    pub fn lookup(&self, name: &str) -> Option<&Arc<Tree>> {
        self.trees.get(name)
    }

    /// Names of all trees, in name order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.trees.keys().map(String::as_str)
    }

    /// Adds every tree of `other`. Trees already present are kept.
    pub fn merge(&mut self, other: &CompiledTemplate) {
        for (name, tree) in &other.trees {
            self.trees
                .entry(name.clone())
                .or_insert_with(|| Arc::clone(tree));
        }
    }
}
