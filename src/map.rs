//! Persistent (immutable) hash map.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::iter::FromIterator;

use crate::entry::MapEntry;
use crate::hash::{hash_key, random_seed};
use crate::iter::{MapIntoIterator, MapIterator};
use crate::node::{self, NodeRef};
use crate::transient::TransientHashMap;

/// A persistent (immutable) hash map based on a hash array mapped trie.
///
/// Every update returns a logically new map that shares almost all of its
/// structure with the original, so persistent operations cost
/// O(log32 N) time and memory instead of a full copy. Batch updates go
/// through [`TransientHashMap`], which mutates in place under a unique
/// edit token and freezes back to a persistent map in O(1).
///
/// Each map carries a random 32-bit hash seed drawn at construction, so
/// two independently constructed maps never share a trie layout and
/// adversarial key sets cannot target a known one.
///
/// # Time Complexity
///
/// | Operation      | Complexity        |
/// |----------------|-------------------|
/// | `new`          | O(1)              |
/// | `get`          | O(log32 N)        |
/// | `insert`       | O(log32 N)        |
/// | `remove`       | O(log32 N)        |
/// | `contains_key` | O(log32 N)        |
/// | `len`          | O(1)              |
///
/// # Examples
///
/// ```rust
/// use permap::PersistentHashMap;
///
/// let map = PersistentHashMap::new()
///     .insert("one".to_string(), 1)
///     .insert("two".to_string(), 2);
///
/// // Structural sharing: the original map is preserved
/// let updated = map.insert("one".to_string(), 100);
/// assert_eq!(map.get("one"), Some(&1));       // Original unchanged
/// assert_eq!(updated.get("one"), Some(&100)); // New version
/// ```
#[derive(Clone)]
pub struct PersistentHashMap<K, V> {
    /// Hash seed shared by every version derived from this map.
    pub(crate) seed: u32,
    /// Number of entries reachable from `root`.
    pub(crate) length: usize,
    /// Root node of the trie.
    pub(crate) root: NodeRef<K, V>,
}

impl<K, V> PersistentHashMap<K, V> {
    /// Creates a new empty map with a fresh hash seed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::PersistentHashMap;
    ///
    /// let map: PersistentHashMap<String, i32> = PersistentHashMap::new();
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            seed: random_seed(),
            length: 0,
            root: node::empty(),
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// # Complexity
    ///
    /// O(1)
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
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    ///
    /// let total: i32 = map.iter().map(|(_, value)| value).sum();
    /// assert_eq!(total, 3);
    /// ```
    #[must_use]
    pub fn iter(&self) -> MapIterator<'_, K, V> {
        MapIterator::new(&self.root, self.length)
    }

    /// Returns an iterator over keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over values.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    /// Visits every entry, stopping early when `visitor` returns `false`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    ///
    /// let mut visited = 0;
    /// map.range(|_, _| {
    ///     visited += 1;
    ///     false // stop after the first entry
    /// });
    /// assert_eq!(visited, 1);
    /// ```
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
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new()
    ///     .insert(1, 1)
    ///     .insert(2, 2)
    ///     .insert(3, 3);
    ///
    /// let total = map.fold(0, |accumulator, _, value| accumulator + value);
    /// assert_eq!(total, 6);
    /// ```
    pub fn fold<Acc, F>(&self, init: Acc, mut function: F) -> Acc
    where
        F: FnMut(Acc, &K, &V) -> Acc,
    {
        self.iter()
            .fold(init, |accumulator, (key, value)| {
                function(accumulator, key, value)
            })
    }
}

impl<K: Clone + Hash + Eq, V: Clone> PersistentHashMap<K, V> {
    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but `Hash`
    /// and `Eq` on the borrowed form must match those for the key type.
    /// `None` means the key is absent; a stored value is always reported,
    /// so a map with `V = Option<_>` distinguishes a stored `None` from
    /// absence.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new().insert("hello".to_string(), 42);
    ///
    /// // Can use &str to look up String keys
    /// assert_eq!(map.get("hello"), Some(&42));
    /// assert_eq!(map.get("world"), None);
    /// ```
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
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Returns the entry stored under the key, or `None` if absent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new().insert("a".to_string(), 1);
    /// let entry = map.entry_at("a").unwrap();
    /// assert_eq!(entry.key(), "a");
    /// assert_eq!(*entry.value(), 1);
    /// ```
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

    /// Removes a key from the map.
    ///
    /// Returns a new map without the key. Removing an absent key returns
    /// a map sharing the same root as `self`.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    /// let removed = map.remove("a");
    ///
    /// assert_eq!(map.len(), 2);     // Original unchanged
    /// assert_eq!(removed.len(), 1); // New version
    /// assert_eq!(removed.get("a"), None);
    /// ```
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = hash_key(self.seed, key);
        if node::get(&self.root, key, hash, 0).is_none() {
            return self.clone();
        }
        let mut root = self.root.clone();
        node::remove_root(&mut root, None, hash, key);
        Self {
            seed: self.seed,
            length: self.length - 1,
            root,
        }
    }

    /// Creates a transient version of the map for efficient batch updates.
    ///
    /// The transient starts with the same contents and hash seed; its
    /// first write to any shared node copies that node, so the original
    /// map is never affected.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::PersistentHashMap;
    ///
    /// let map: PersistentHashMap<i32, i32> = PersistentHashMap::new();
    /// let mut transient = map.transient();
    /// for index in 0..100 {
    ///     transient.insert(index, index * 10);
    /// }
    /// let filled = transient.persistent();
    /// assert_eq!(filled.len(), 100);
    /// assert!(map.is_empty());
    /// ```
    #[must_use]
    pub fn transient(&self) -> TransientHashMap<K, V> {
        TransientHashMap::from_parts(self.seed, self.length, self.root.clone())
    }

    /// Applies a batch of updates through a transient and freezes the
    /// result.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::PersistentHashMap;
    ///
    /// let map: PersistentHashMap<String, String> = PersistentHashMap::new();
    /// let updated = map.transform(|transient| {
    ///     transient
    ///         .insert("foo".to_string(), "bar".to_string())
    ///         .insert("bar".to_string(), "baz".to_string());
    /// });
    /// assert_eq!(updated.get("foo"), Some(&"bar".to_string()));
    /// assert_eq!(updated.get("bar"), Some(&"baz".to_string()));
    /// ```
    #[must_use]
    pub fn transform<F>(&self, operation: F) -> Self
    where
        F: FnOnce(&mut TransientHashMap<K, V>),
    {
        let mut transient = self.transient();
        operation(&mut transient);
        transient.persistent()
    }

    /// Exports the entries into an ordinary `HashMap`.
    ///
    /// The export is one-way; mutating it does not affect this map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    ///
    /// let native = map.to_hash_map();
    /// assert_eq!(native.len(), 2);
    /// assert_eq!(native["a"], 1);
    /// ```
    #[must_use]
    pub fn to_hash_map(&self) -> HashMap<K, V> {
        self.iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> PersistentHashMap<K, V> {
    /// Creates a map containing a single key-value pair.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::singleton("key".to_string(), 42);
    /// assert_eq!(map.len(), 1);
    /// assert_eq!(map.get("key"), Some(&42));
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self {
        Self::new().insert(key, value)
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map already contains the key, the value is replaced.
    /// Inserting a pair that is already present with an equal value
    /// returns a map sharing the same root as `self`, so repeated
    /// identical updates are free.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::PersistentHashMap;
    ///
    /// let map1 = PersistentHashMap::new().insert("key".to_string(), 1);
    /// let map2 = map1.insert("key".to_string(), 2);
    ///
    /// assert_eq!(map1.get("key"), Some(&1)); // Original unchanged
    /// assert_eq!(map2.get("key"), Some(&2)); // New version
    /// ```
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        let hash = hash_key(self.seed, &key);
        if let Some((_, stored_value)) = node::get(&self.root, &key, hash, 0) {
            if *stored_value == value {
                return self.clone();
            }
        }
        let mut root = self.root.clone();
        let added = node::insert(&mut root, None, 0, hash, key, value);
        Self {
            seed: self.seed,
            length: self.length + usize::from(added),
            root,
        }
    }

    /// Inserts an entry into the map.
    ///
    /// Equivalent to [`insert`](Self::insert) with the entry's key and
    /// value.
    #[must_use]
    pub fn conj(&self, entry: MapEntry<K, V>) -> Self {
        let (key, value) = entry.into_pair();
        self.insert(key, value)
    }

    /// Updates the value for a key using a function.
    ///
    /// Returns `None` if the key doesn't exist.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new().insert("count".to_string(), 10);
    /// let updated = map.update("count", |value| value + 1);
    ///
    /// assert_eq!(updated.unwrap().get("count"), Some(&11));
    /// ```
    #[must_use]
    pub fn update<Q, F>(&self, key: &Q, function: F) -> Option<Self>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> V,
    {
        let hash = hash_key(self.seed, key);
        let (stored_key, stored_value) = node::get(&self.root, key, hash, 0)?;
        let stored_key = stored_key.clone();
        let new_value = function(stored_value);
        Some(self.insert(stored_key, new_value))
    }

    /// Updates or removes a value for a key using an updater function.
    ///
    /// The updater receives `Some(&V)` if the key exists, or `None` if it
    /// doesn't. Returning `Some(V)` inserts or updates; returning `None`
    /// removes the key (if it exists).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new().insert("count".to_string(), 10);
    ///
    /// let incremented = map.update_with("count", |value| value.map(|v| v + 1));
    /// assert_eq!(incremented.get("count"), Some(&11));
    ///
    /// let removed = map.update_with("count", |_| None);
    /// assert_eq!(removed.get("count"), None);
    /// ```
    #[must_use]
    pub fn update_with<Q, F>(&self, key: &Q, updater: F) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        let current_value = self.get(key);
        let new_value = updater(current_value);

        match (current_value.is_some(), new_value) {
            (true, Some(value)) => {
                let hash = hash_key(self.seed, key);
                let actual_key = node::get(&self.root, key, hash, 0)
                    .map_or_else(|| key.to_owned(), |(stored_key, _)| stored_key.clone());
                self.insert(actual_key, value)
            }
            (true, None) => self.remove(key),
            (false, Some(value)) => self.insert(key.to_owned(), value),
            (false, None) => self.clone(),
        }
    }

    /// Merges two maps, with values from `other` taking precedence on key
    /// conflicts.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use permap::PersistentHashMap;
    ///
    /// let map1 = PersistentHashMap::new().insert("a".to_string(), 1);
    /// let map2 = PersistentHashMap::new()
    ///     .insert("a".to_string(), 10)
    ///     .insert("b".to_string(), 2);
    ///
    /// let merged = map1.merge(&map2);
    /// assert_eq!(merged.get("a"), Some(&10));
    /// assert_eq!(merged.get("b"), Some(&2));
    /// ```
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (key, value) in other {
            result = result.insert(key.clone(), value.clone());
        }
        result
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V> Default for PersistentHashMap<K, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> PartialEq for PersistentHashMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length
            && self
                .iter()
                .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<K: Clone + Hash + Eq, V: Clone + Eq> Eq for PersistentHashMap<K, V> {}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> PartialEq<TransientHashMap<K, V>>
    for PersistentHashMap<K, V>
{
    fn eq(&self, other: &TransientHashMap<K, V>) -> bool {
        self.length == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<K: Clone + Hash + Eq + fmt::Debug, V: Clone + fmt::Debug> fmt::Debug
    for PersistentHashMap<K, V>
{
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<K: fmt::Display, V: fmt::Display> fmt::Display for PersistentHashMap<K, V> {
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

impl<K: Clone + Hash + Eq, V: Clone> FromIterator<(K, V)> for PersistentHashMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut transient = TransientHashMap::new();
        for (key, value) in iter {
            transient.insert(key, value);
        }
        transient.persistent()
    }
}

impl<K: Clone + Hash + Eq, V: Clone> From<HashMap<K, V>> for PersistentHashMap<K, V> {
    fn from(map: HashMap<K, V>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Clone + Hash + Eq, V: Clone> From<TransientHashMap<K, V>> for PersistentHashMap<K, V> {
    /// Freezes the transient; the consumed handle can no longer be
    /// written through.
    fn from(mut transient: TransientHashMap<K, V>) -> Self {
        transient.persistent()
    }
}

impl<K: Clone, V: Clone> IntoIterator for PersistentHashMap<K, V> {
    type Item = (K, V);
    type IntoIter = MapIntoIterator<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let entries: Vec<(K, V)> = self
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        MapIntoIterator::new(entries)
    }
}

impl<'a, K, V> IntoIterator for &'a PersistentHashMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = MapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<K, V> serde::Serialize for PersistentHashMap<K, V>
where
    K: serde::Serialize + Clone + Hash + Eq,
    V: serde::Serialize + Clone,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(feature = "serde")]
struct PersistentHashMapVisitor<K, V> {
    key_marker: std::marker::PhantomData<K>,
    value_marker: std::marker::PhantomData<V>,
}

#[cfg(feature = "serde")]
impl<K, V> PersistentHashMapVisitor<K, V> {
    const fn new() -> Self {
        Self {
            key_marker: std::marker::PhantomData,
            value_marker: std::marker::PhantomData,
        }
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::de::Visitor<'de> for PersistentHashMapVisitor<K, V>
where
    K: serde::Deserialize<'de> + Clone + Hash + Eq,
    V: serde::Deserialize<'de> + Clone,
{
    type Value = PersistentHashMap<K, V>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a map")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let mut transient = TransientHashMap::new();
        while let Some((key, value)) = access.next_entry()? {
            transient.insert(key, value);
        }
        Ok(transient.persistent())
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::Deserialize<'de> for PersistentHashMap<K, V>
where
    K: serde::Deserialize<'de> + Clone + Hash + Eq,
    V: serde::Deserialize<'de> + Clone,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_map(PersistentHashMapVisitor::new())
    }
}

// =============================================================================
// Tests
// =============================================================================
