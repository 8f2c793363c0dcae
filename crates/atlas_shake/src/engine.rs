//! The rule engine: demand-driven memoized evaluation.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::answer::Answer;
use crate::error::ShakeError;
use crate::key::{Key, Question};
use crate::rule::Rule;

/// Owns the registered rules and the key → answer cache.
///
/// The cache never evicts; an entry lives until a later [`make`](Self::make)
/// for the same key replaces it. A `RuleSet` is meant to be owned by a single
/// execution context (see [`Worker`](crate::Worker)); every operation that
/// touches the cache takes `&mut self`.
pub struct RuleSet<Q, V> {
    rules: Vec<Arc<dyn Rule<Q, V>>>,
    state: HashMap<Key, Answer<Q, V>>,
    /// Keys whose `make` is currently on the call stack.
    in_progress: HashSet<Key>,
}

impl<Q: Question, V> RuleSet<Q, V> {
    /// Creates an engine with a fixed rule list, consulted in order.
    pub fn new(rules: Vec<Arc<dyn Rule<Q, V>>>) -> Self {
        Self {
            rules,
            state: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Appends `rule` after the rules registered so far.
    ///
    /// Meant for construction; rules never change once `make` has run.
    pub fn rule(mut self, rule: impl Rule<Q, V> + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Answers `question`, reusing the cached answer if its whole dependency
    /// closure still validates.
    ///
    /// A clean cache hit is returned with `changed = false`. A stale or
    /// missing entry is rebuilt by the first matching rule and stored,
    /// replacing any previous entry. Errors from key derivation, from hard
    /// validation failures, and from the rule itself propagate unchanged and
    /// leave the cache as it was.
    pub fn make(&mut self, question: &Q) -> Result<Answer<Q, V>, ShakeError> {
        let key = question.key()?;
        trace!(target: "atlas::shake", %key, "make");

        if self.in_progress.contains(&key) {
            return Err(ShakeError::Cycle { key });
        }

        if let Some(cached) = self.state.get(&key) {
            match cached.validate() {
                Ok(()) => return Ok(cached.unchanged()),
                Err(err) if err.is_wiring() => {
                    warn!(
                        target: "atlas::shake",
                        %key,
                        error = %err,
                        "rule wiring error, rebuilding"
                    );
                }
                Err(err) if err.is_stale() => {
                    debug!(target: "atlas::shake", %key, reason = %err, "stale, rebuilding");
                }
                Err(err) => return Err(err),
            }
        }

        let rule = self
            .rules
            .iter()
            .find(|rule| rule.matches(question, &key))
            .cloned()
            .ok_or_else(|| ShakeError::NoMatchingRule { key: key.clone() })?;

        self.in_progress.insert(key.clone());
        let made = rule.make(question, &key, self);
        self.in_progress.remove(&key);
        let made = made?;

        debug!(target: "atlas::shake", %key, rule = rule.name(), deps = made.deps.len(), "made");
        let answer = Answer {
            key: key.clone(),
            changed: made.changed,
            value: Arc::new(made.value),
            cookie: made.cookie,
            rule,
            deps: made.deps.into(),
        };
        self.state.insert(key, answer.clone());
        Ok(answer)
    }
}

impl<Q, V> RuleSet<Q, V> {
    /// Returns the stored answer for `key` without validating it.
    pub fn get(&self, key: &Key) -> Option<&Answer<Q, V>> {
        self.state.get(key)
    }

    /// Returns `true` if an answer is stored under `key`.
    pub fn contains(&self, key: &Key) -> bool {
        self.state.contains_key(key)
    }

    /// Number of stored answers.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// Returns `true` if nothing has been made yet.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Iterates over the stored keys in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.state.keys()
    }
}

impl<Q, V> fmt::Debug for RuleSet<Q, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.rules.iter().map(|r| r.name()).collect();
        f.debug_struct("RuleSet")
            .field("rules", &names)
            .field("entries", &self.state.len())
            .finish()
    }
}
