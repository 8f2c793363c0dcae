//! Incremental, dependency-validated computation cache.
//!
//! A [`RuleSet`] answers [`Question`]s by consulting the first [`Rule`] that
//! matches, remembers each [`Answer`] together with a [`Cookie`] describing
//! the external state it was computed from, and on later requests revalidates
//! the answer's whole dependency closure before trusting it.
//!
//! The design follows Neil Mitchell's shake build system.

#![warn(missing_docs)]

pub mod answer;
pub mod engine;
pub mod error;
pub mod key;
pub mod read_file;
pub mod rule;
pub mod worker;

pub use answer::Answer;
pub use engine::RuleSet;
pub use error::ShakeError;
pub use key::{Key, Question, WebQuestion, READ_FILE_PREFIX};
pub use read_file::ReadFileRule;
pub use rule::{Cookie, Made, Rule};
pub use worker::{Worker, WorkerError};
