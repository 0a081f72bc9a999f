//! Transient (ephemerally mutable) hash map.

use std::borrow::Borrow;
use std::cell::Cell;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::entry::MapEntry;
use crate::hash::{hash_key, random_seed};
use crate::iter::MapIterator;
use crate::map::PersistentHashMap;
use crate::node::{self, EditToken, NodeRef};

/// Panic message for writes on a frozen transient.
const TRANSIENT_AFTER_PERSISTENT: &str = "transient used after persistent call";

/// A transient view of a [`PersistentHashMap`] for efficient batch
/// updates.
///
/// A transient owns an *edit token*: a heap-allocated atomic cell that is
/// non-zero while the transient is alive. Every node the transient
/// creates or adopts is tagged with the token; a write mutates a node in
/// place exactly when the node's tag is this token (compared by pointer
/// identity), and copies the node otherwise. Nodes shared with persistent
/// maps are therefore never touched, while repeated writes along an
/// already-adopted path cost no allocation.
///
/// [`persistent`](Self::persistent) zeroes the cell and returns the
/// frozen result. Afterwards the transient can still be read, but any
/// write panics: the token is dead, and the nodes now belong to the
/// frozen map.
///
/// A transient is a single-writer value. It is deliberately neither
/// `Clone` nor `Sync`; concurrent mutation of one transient is not
/// supported.
///
/// # Examples
///
/// ```rust
/// use permap::TransientHashMap;
///
/// let mut transient: TransientHashMap<i32, i32> = TransientHashMap::new();
/// for index in 0..1000 {
///     transient.insert(index, index * 10);
/// }
/// let map = transient.persistent();
/// assert_eq!(map.len(), 1000);
/// assert_eq!(map.get(&999), Some(&9990));
/// ```
pub struct TransientHashMap<K, V> {
    pub(crate) seed: u32,
    pub(crate) length: usize,
    pub(crate) root: NodeRef<K, V>,
    pub(crate) edit: EditToken,
    /// Suppresses auto-`Sync` whatever the pointer feature; a transient
    /// has exactly one writer. `Cell` is still `Send`, so a transient
    /// can move to another thread, just never be shared between two.
    not_sync: PhantomData<Cell<()>>,
}

impl<K, V> TransientHashMap<K, V> {
    /// Creates a new empty transient map with a fresh hash seed.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(random_seed(), 0, node::empty())
    }

    pub(crate) fn from_parts(seed: u32, length: usize, root: NodeRef<K, V>) -> Self {
        Self {
            seed,
            length,
            root,
            edit: Arc::new(AtomicU32::new(1)),
            not_sync: PhantomData,
        }
    }

    /// Returns the number of entries in the map.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns an iterator over key-value pairs.
    ///
    /// The order is unspecified but deterministic for a given map.
    #[must_use]
    pub fn iter(&self) -> MapIterator<'_, K, V> {
        MapIterator::new(&self.root, self.length)
    }

    /// Visits every entry, stopping early when `visitor` returns `false`.
    pub fn range<F>(&self, mut visitor: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        for (key, value) in self.iter() {
            if !visitor(key, value) {
                break;
            }
        }
    }

    /// Folds every entry into an accumulator.
    pub fn fold<Acc, F>(&self, init: Acc, mut function: F) -> Acc
    where
        F: FnMut(Acc, &K, &V) -> Acc,
    {
        self.iter()
            .fold(init, |accumulator, (key, value)| {
                function(accumulator, key, value)
            })
    }

    /// Panics unless the edit cell is still non-zero.
    fn ensure_editable(&self) {
        assert!(
            self.edit.load(Ordering::Acquire) != 0,
            "{TRANSIENT_AFTER_PERSISTENT}"
        );
    }
}

impl<K: Clone + Hash + Eq, V: Clone> TransientHashMap<K, V> {
    /// Returns a reference to the value corresponding to the key.
    ///
    /// Reads stay valid after [`persistent`](Self::persistent); only
    /// writes require a live edit token.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = hash_key(self.seed, key);
        node::get(&self.root, key, hash, 0).map(|(_, value)| value)
    }

    /// Returns `true` if the map contains a value for the specified key.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Returns the entry stored under the key, or `None` if absent.
    #[must_use]
    pub fn entry_at<Q>(&self, key: &Q) -> Option<MapEntry<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = hash_key(self.seed, key);
        node::get(&self.root, key, hash, 0)
            .map(|(stored_key, stored_value)| {
                MapEntry::new(stored_key.clone(), stored_value.clone())
            })
    }

    /// Inserts a key-value pair, replacing any previous value for the
    /// key, and returns `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics with `"transient used after persistent call"` if
    /// [`persistent`](Self::persistent) has already been called.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::TransientHashMap;
    ///
    /// let mut transient = TransientHashMap::new();
    /// transient
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    /// assert_eq!(transient.len(), 2);
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> &mut Self {
        self.ensure_editable();
        let hash = hash_key(self.seed, &key);
        let added = node::insert(&mut self.root, Some(&self.edit), 0, hash, key, value);
        if added {
            self.length += 1;
        }
        self
    }

    /// Inserts an entry, returning `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics with `"transient used after persistent call"` if
    /// [`persistent`](Self::persistent) has already been called.
    pub fn conj(&mut self, entry: MapEntry<K, V>) -> &mut Self {
        let (key, value) = entry.into_pair();
        self.insert(key, value)
    }

    /// Removes a key, returning `self` for chaining. Removing an absent
    /// key is a no-op.
    ///
    /// # Panics
    ///
    /// Panics with `"transient used after persistent call"` if
    /// [`persistent`](Self::persistent) has already been called.
    pub fn remove<Q>(&mut self, key: &Q) -> &mut Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.ensure_editable();
        let hash = hash_key(self.seed, key);
        if node::get(&self.root, key, hash, 0).is_some() {
            node::remove_root(&mut self.root, Some(&self.edit), hash, key);
            self.length -= 1;
        }
        self
    }

    /// Freezes the transient into a persistent map.
    ///
    /// The edit cell is zeroed with release ordering, so a thread that
    /// receives the returned map observes fully initialized nodes.
    /// Nodes tagged with the now-dead token remain valid as immutable
    /// nodes; the tag is never examined again.
    ///
    /// # Panics
    ///
    /// Panics with `"transient used after persistent call"` if the
    /// transient has already been frozen.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::TransientHashMap;
    ///
    /// let mut transient = TransientHashMap::new();
    /// transient.insert("a".to_string(), 1);
    /// let map = transient.persistent();
    /// assert_eq!(map.get("a"), Some(&1));
    /// ```
    pub fn persistent(&mut self) -> PersistentHashMap<K, V> {
        self.ensure_editable();
        self.edit.store(0, Ordering::Release);
        PersistentHashMap {
            seed: self.seed,
            length: self.length,
            root: self.root.clone(),
        }
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V> Default for TransientHashMap<K, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Hash + Eq, V: Clone> Extend<(K, V)> for TransientHashMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> PartialEq for TransientHashMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length
            && self
                .iter()
                .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> PartialEq<PersistentHashMap<K, V>>
    for TransientHashMap<K, V>
{
    fn eq(&self, other: &PersistentHashMap<K, V>) -> bool {
        self.length == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<K: Clone + Hash + Eq + fmt::Debug, V: Clone + fmt::Debug> fmt::Debug
    for TransientHashMap<K, V>
{
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<K: fmt::Display, V: fmt::Display> fmt::Display for TransientHashMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{{")?;
        for (position, (key, value)) in self.iter().enumerate() {
            if position > 0 {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{key}: {value}")?;
        }
        write!(formatter, "}}")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::ReferenceCounter;
    use rstest::rstest;

    #[rstest]
    fn test_new_transient_is_alive() {
        let transient: TransientHashMap<String, i32> = TransientHashMap::new();
        assert_ne!(transient.edit.load(Ordering::Acquire), 0);
    }

    #[rstest]
    fn test_owned_nodes_are_mutated_in_place() {
        let mut transient: TransientHashMap<i32, i32> = TransientHashMap::new();
        transient.insert(1, 1);
        let root_pointer = ReferenceCounter::as_ptr(&transient.root);
        transient.insert(2, 2);
        transient.insert(1, 100);
        assert_eq!(root_pointer, ReferenceCounter::as_ptr(&transient.root));
        assert_eq!(transient.get(&1), Some(&100));
        assert_eq!(transient.get(&2), Some(&2));
    }

    #[rstest]
    fn test_first_write_copies_the_shared_root() {
        let map = PersistentHashMap::new().insert("a".to_string(), 1);
        let mut transient = map.transient();
        let shared_pointer = ReferenceCounter::as_ptr(&map.root);
        transient.insert("a".to_string(), 2);
        assert_ne!(shared_pointer, ReferenceCounter::as_ptr(&transient.root));
        assert_eq!(map.get("a"), Some(&1));
        assert_eq!(transient.get("a"), Some(&2));
    }

    #[rstest]
    fn test_persistent_zeroes_the_edit_cell() {
        let mut transient: TransientHashMap<String, i32> = TransientHashMap::new();
        let _ = transient.persistent();
        assert_eq!(transient.edit.load(Ordering::Acquire), 0);
    }

    #[rstest]
    #[should_panic(expected = "transient used after persistent call")]
    fn test_insert_after_persistent_panics() {
        let mut transient: TransientHashMap<String, i32> = TransientHashMap::new();
        let _ = transient.persistent();
        transient.insert("x".to_string(), 1);
    }

    #[rstest]
    #[should_panic(expected = "transient used after persistent call")]
    fn test_second_persistent_panics() {
        let mut transient: TransientHashMap<String, i32> = TransientHashMap::new();
        let _ = transient.persistent();
        let _ = transient.persistent();
    }

    #[rstest]
    fn test_reads_remain_valid_after_persistent() {
        let mut transient: TransientHashMap<String, i32> = TransientHashMap::new();
        transient.insert("a".to_string(), 1);
        let map = transient.persistent();
        assert_eq!(transient.get("a"), Some(&1));
        assert_eq!(transient.len(), 1);
        assert!(transient.contains_key("a"));
        assert_eq!(map, transient);
    }
}
