//! Shared foundational types used across the Atlas build caches.
//!
//! This crate provides content hashing for serialized artifacts, filesystem
//! freshness stamps (size, mode, modification time) used as cache validators,
//! and lexical path cleaning.

#![warn(missing_docs)]

pub mod hash;
pub mod path;
pub mod stamp;

pub use hash::ContentHash;
pub use path::{clean_path, is_within};
pub use stamp::FileStamp;
