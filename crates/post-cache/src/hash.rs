//! Content hashing.
//!
//! Hashes are cache keys, not a security boundary: SHA-1 is stable, fast and
//! wide enough (160 bits) that collisions between module outputs are not a
//! practical concern.

use sha1::{Digest, Sha1};

/// Number of hash characters embedded in content-addressed file names.
pub const HASH_PREFIX_LEN: usize = 9;

/// Compute the lowercase hex SHA-1 digest of `content`.
#[must_use]
pub fn content_hash(content: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha1::new();
    hasher.update(content.as_ref());
    hex::encode(hasher.finalize())
}

/// The first [`HASH_PREFIX_LEN`] characters of a hash.
///
/// Returns the whole string when it is shorter than the prefix.
#[must_use]
pub fn hash_prefix(hash: &str) -> &str {
    hash.get(..HASH_PREFIX_LEN).unwrap_or(hash)
}
