//! # permap
//!
//! A persistent hash map for Rust with structural sharing and a
//! transient batch-update mode.
//!
//! ## Overview
//!
//! [`PersistentHashMap`] is an immutable map based on a Hash Array
//! Mapped Trie (HAMT): a 32-way trie keyed by 5-bit slices of a seeded
//! 32-bit hash. Every update returns a new map sharing almost all of its
//! structure with the previous version:
//!
//! - O(log32 N) get (effectively O(1) for practical sizes)
//! - O(log32 N) insert
//! - O(log32 N) remove
//! - O(1) len and `is_empty`
//!
//! [`TransientHashMap`] is the same trie under a unique *edit token*:
//! writes mutate owned nodes in place and copy shared ones, which makes
//! bulk construction cheap instead of allocating per update. Freezing a
//! transient back into a persistent map is O(1).
//!
//! ## Feature Flags
//!
//! - `arc`: share nodes with `Arc` instead of `Rc`, making the
//!   persistent map `Send + Sync`
//! - `serde`: `Serialize`/`Deserialize` for [`PersistentHashMap`]
//!
//! ## Example
//!
//! ```rust
//! use permap::PersistentHashMap;
//!
//! let map = PersistentHashMap::new()
//!     .insert("one".to_string(), 1)
//!     .insert("two".to_string(), 2);
//!
//! // Structural sharing: the original map is preserved
//! let updated = map.insert("one".to_string(), 100);
//! assert_eq!(map.get("one"), Some(&1));
//! assert_eq!(updated.get("one"), Some(&100));
//!
//! // Batch updates through a transient
//! let filled = map.transform(|transient| {
//!     for index in 0..100 {
//!         transient.insert(index.to_string(), index);
//!     }
//! });
//! assert_eq!(filled.len(), 102);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod entry;
mod hash;
mod iter;
mod map;
mod node;
mod shared;
mod transient;

pub use entry::MapEntry;
pub use iter::MapIntoIterator;
pub use iter::MapIterator;
pub use map::PersistentHashMap;
pub use transient::TransientHashMap;
