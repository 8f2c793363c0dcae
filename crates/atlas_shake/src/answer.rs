//! Cached answers and recursive validation.

use std::fmt;
use std::sync::Arc;

use crate::error::ShakeError;
use crate::key::Key;
use crate::rule::{Cookie, Rule};

/// A cache entry: the value, its validator, the rule that made it, and the
/// answers it was computed from.
///
/// Answers are immutable once stored. Cloning is cheap: the value and the
/// dependency list are shared.
pub struct Answer<Q, V> {
    /// Key the answer is stored under.
    pub key: Key,
    /// `true` only on the call that (re)computed the value.
    pub changed: bool,
    /// The computed value.
    pub value: Arc<V>,
    /// Validator interpreted by `rule`.
    pub cookie: Cookie,
    /// The rule that produced this answer.
    pub rule: Arc<dyn Rule<Q, V>>,
    /// Sub-answers consumed by the computation, in the order asked.
    pub deps: Arc<[Answer<Q, V>]>,
}

impl<Q, V> Answer<Q, V> {
    /// Validates the dependency closure depth-first, then this answer's own
    /// cookie.
    ///
    /// The first failing dependency short-circuits; later ones are not
    /// checked.
    pub fn validate(&self) -> Result<(), ShakeError> {
        for dep in self.deps.iter() {
            dep.validate()?;
        }
        self.rule.validate(&self.key, &self.cookie)
    }

    /// Returns a copy marked as unchanged.
    pub(crate) fn unchanged(&self) -> Self {
        let mut answer = self.clone();
        answer.changed = false;
        answer
    }

    /// Visits this answer and every transitive dependency, parents first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Answer<Q, V>)) {
        visit(self);
        for dep in self.deps.iter() {
            dep.walk(visit);
        }
    }
}

impl<Q, V> Clone for Answer<Q, V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            changed: self.changed,
            value: Arc::clone(&self.value),
            cookie: self.cookie.clone(),
            rule: Arc::clone(&self.rule),
            deps: Arc::clone(&self.deps),
        }
    }
}

impl<Q, V: fmt::Debug> fmt::Debug for Answer<Q, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Answer")
            .field("key", &self.key)
            .field("changed", &self.changed)
            .field("value", &self.value)
            .field("cookie", &self.cookie)
            .field("rule", &self.rule.name())
            .field("deps", &self.deps.len())
            .finish()
    }
}
