//! Seeded hash computation and hash fragmenting.
//!
//! Every map carries a 32-bit seed drawn once from the process entropy
//! source. The seed salts every hash computed through the map, so two
//! independently constructed maps never agree on hash placement and
//! adversarially chosen keys cannot target a known trie layout.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Branching factor of the trie (2^5 = 32).
pub(crate) const BRANCHING_FACTOR: usize = 32;

/// Bits of the hash consumed per trie level.
pub(crate) const BITS_PER_LEVEL: u32 = 5;

/// Bit mask for extracting an index within a node.
pub(crate) const FRAGMENT_MASK: u32 = (BRANCHING_FACTOR - 1) as u32;

/// Draws a fresh hash seed from the process-wide entropy source.
pub(crate) fn random_seed() -> u32 {
    rand::random()
}

/// Computes the seeded 32-bit hash of a key.
///
/// The 64-bit `DefaultHasher` digest is folded onto itself so both
/// halves contribute to the 32 bits the trie consumes.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn hash_key<Q: Hash + ?Sized>(seed: u32, key: &Q) -> u32 {
    let mut hasher = DefaultHasher::new();
    hasher.write_u32(seed);
    key.hash(&mut hasher);
    let digest = hasher.finish();
    (digest ^ (digest >> 32)) as u32
}

/// Extracts the 5-bit fragment of `hash` consumed at `shift` bits of depth.
#[inline]
pub(crate) const fn fragment(hash: u32, shift: u32) -> u32 {
    (hash >> shift) & FRAGMENT_MASK
}
