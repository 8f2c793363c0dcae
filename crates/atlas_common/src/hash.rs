//! Digests of published cache documents.

use std::fmt;

/// XXH3-128 digest of a published document.
///
/// The site json cache stamps every build with the digest of its serialized
/// bytes. Servers hand it out as an entity tag, so a client holding the same
/// tag can skip the payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(u128);

impl ContentHash {
    /// Digests `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_128(data))
    }

    /// `"<32 hex digits>"`, suitable for an `ETag` header.
    pub fn etag(&self) -> String {
        format!("\"{self}\"")
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:08x}..)", self.0 >> 96)
    }
}
