//! Rules: strategies that match, make, and validate answers.

use std::path::PathBuf;

use atlas_common::FileStamp;

use crate::answer::Answer;
use crate::engine::RuleSet;
use crate::error::ShakeError;
use crate::key::Key;

/// Validator payload stored with an answer.
///
/// Only the rule that produced a cookie interprets it. A rule handed a
/// variant it never produces reports [`ShakeError::BadCookie`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cookie {
    /// No external state; freshness is decided by the dependencies alone.
    None,
    /// Metadata of the single file or directory the key names.
    Stamp(FileStamp),
    /// Metadata of every file the answer was derived from, in read order.
    Stamps(Vec<(PathBuf, FileStamp)>),
}

impl Cookie {
    /// Compares every recorded stamp against a fresh stat of its path.
    ///
    /// Returns the first stat error unchanged, or
    /// [`ShakeError::OutOfDate`] on the first mismatch. `Cookie::None` is
    /// always fresh.
    pub fn check_stamps(&self, key: &Key) -> Result<(), ShakeError> {
        let recorded: &[(PathBuf, FileStamp)] = match self {
            Cookie::None => return Ok(()),
            Cookie::Stamps(stamps) => stamps,
            Cookie::Stamp(_) => return Err(ShakeError::BadCookie { key: key.clone() }),
        };
        for (path, old) in recorded {
            let now = FileStamp::of(path).map_err(|e| ShakeError::io(path, e))?;
            if !now.is_fresh(old) {
                return Err(ShakeError::OutOfDate { key: key.clone() });
            }
        }
        Ok(())
    }
}

/// What a rule's [`Rule::make`] produces; the engine adds key and rule.
pub struct Made<Q, V> {
    /// The computed value.
    pub value: V,
    /// Validator for [`Rule::validate`].
    pub cookie: Cookie,
    /// Answers consumed while computing `value`, in the order they were asked.
    pub deps: Vec<Answer<Q, V>>,
    /// Reported back to the caller as [`Answer::changed`].
    pub changed: bool,
}

impl<Q, V> Made<Q, V> {
    /// A freshly computed value with no dependencies.
    pub fn new(value: V, cookie: Cookie) -> Self {
        Self {
            value,
            cookie,
            deps: Vec::new(),
            changed: true,
        }
    }

    /// Attaches the dependency answers.
    pub fn with_deps(mut self, deps: Vec<Answer<Q, V>>) -> Self {
        self.deps = deps;
        self
    }
}

/// A strategy that knows how to answer some family of questions.
///
/// Rules are registered once on a [`RuleSet`]; the first one whose
/// [`matches`](Rule::matches) returns `true` makes the answer.
pub trait Rule<Q, V>: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Returns `true` if this rule answers `question`.
    fn matches(&self, question: &Q, key: &Key) -> bool;

    /// Computes the answer, asking `rules` for any sub-answers it needs.
    ///
    /// Every answer obtained from `rules` that the value depends on belongs
    /// in [`Made::deps`].
    fn make(&self, question: &Q, key: &Key, rules: &mut RuleSet<Q, V>)
        -> Result<Made<Q, V>, ShakeError>;

    /// Checks a previously produced cookie against current external state.
    ///
    /// Called only after every dependency has validated.
    fn validate(&self, key: &Key, cookie: &Cookie) -> Result<(), ShakeError>;
}
