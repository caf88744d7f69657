//! Settings hashing.
//!
//! Hashes decide whether cached state is still valid: an Origin's settings
//! hash covers its include paths and options, and the compiler's settings
//! hash guards the persisted knowledge base. A collision only costs a
//! missed invalidation, so a fast non-cryptographic hash is enough.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

/// A 64-bit content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ContentHash(u64);

impl ContentHash {
    /// Create a hash from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the underlying hash value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Format as a hex string.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Hash a string.
#[must_use]
pub fn hash_string(s: &str) -> ContentHash {
    let mut hasher = FxHasher::default();
    s.hash(&mut hasher);
    ContentHash(hasher.finish())
}

/// Hash an ordered sequence of strings.
///
/// Element boundaries are part of the hash, so `["ab", "c"]` and
/// `["a", "bc"]` differ.
#[must_use]
pub fn hash_strings<I, S>(items: I) -> ContentHash
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = FxHasher::default();
    let mut count = 0usize;
    for item in items {
        item.as_ref().hash(&mut hasher);
        count += 1;
    }
    count.hash(&mut hasher);
    ContentHash(hasher.finish())
}

/// Combine multiple hashes into one. Order matters.
#[must_use]
pub fn combine_hashes(hash_list: &[ContentHash]) -> ContentHash {
    let mut state = FxHasher::default();
    for hash in hash_list {
        hash.0.hash(&mut state);
    }
    ContentHash(state.finish())
}

#[cfg(test)]
mod tests;
