//! Property-based tests for `PersistentHashMap`.
//!
//! This module verifies that `PersistentHashMap` satisfies various laws
//! and invariants using proptest.

use std::collections::{HashMap, HashSet};

use permap::{PersistentHashMap, TransientHashMap};
use proptest::prelude::*;

// =============================================================================
// Strategy for generating test data
// =============================================================================

fn arbitrary_key() -> impl Strategy<Value = String> {
    "[a-z]{1,10}".prop_map(|s| s)
}

fn arbitrary_value() -> impl Strategy<Value = i32> {
    any::<i32>()
}

fn arbitrary_entry() -> impl Strategy<Value = (String, i32)> {
    (arbitrary_key(), arbitrary_value())
}

fn arbitrary_entries() -> impl Strategy<Value = Vec<(String, i32)>> {
    prop::collection::vec(arbitrary_entry(), 0..50)
}

// =============================================================================
// Get-Insert Law: map.insert(k, v).get(&k) == Some(&v)
// =============================================================================

proptest! {
    #[test]
    fn prop_get_insert_law(
        entries in arbitrary_entries(),
        key in arbitrary_key(),
        value in arbitrary_value()
    ) {
        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();
        let inserted = map.insert(key.clone(), value);

        prop_assert_eq!(inserted.get(&key), Some(&value));
    }
}

// =============================================================================
// Absent-Key Law: !map.contains_key(&k) => map.get(&k) == None
// =============================================================================

proptest! {
    #[test]
    fn prop_absent_key_law(
        entries in arbitrary_entries(),
        key in arbitrary_key()
    ) {
        let map: PersistentHashMap<String, i32> = entries
            .into_iter()
            .filter(|(entry_key, _)| *entry_key != key)
            .collect();

        prop_assert!(!map.contains_key(&key));
        prop_assert_eq!(map.get(&key), None);
        prop_assert!(map.entry_at(&key).is_none());
    }
}

// =============================================================================
// Get-Insert-Other Law: k1 != k2 => map.insert(k1, v).get(&k2) == map.get(&k2)
// =============================================================================

proptest! {
    #[test]
    fn prop_get_insert_other_law(
        entries in arbitrary_entries(),
        key1 in arbitrary_key(),
        key2 in arbitrary_key(),
        value in arbitrary_value()
    ) {
        prop_assume!(key1 != key2);

        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();
        let inserted = map.insert(key1, value);

        prop_assert_eq!(inserted.get(&key2), map.get(&key2));
    }
}

// =============================================================================
// Remove-Get Law: map.remove(&k).get(&k) == None
// =============================================================================

proptest! {
    #[test]
    fn prop_remove_get_law(
        entries in arbitrary_entries(),
        key in arbitrary_key(),
        value in arbitrary_value()
    ) {
        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();
        let removed = map.insert(key.clone(), value).remove(&key);

        prop_assert!(!removed.contains_key(&key));
        prop_assert_eq!(removed.get(&key), None);
    }
}

// =============================================================================
// Remove-Absent Law: !map.contains_key(&k) => map.remove(&k) == map
// =============================================================================

proptest! {
    #[test]
    fn prop_remove_absent_law(
        entries in arbitrary_entries(),
        key in arbitrary_key()
    ) {
        let map: PersistentHashMap<String, i32> = entries
            .into_iter()
            .filter(|(entry_key, _)| *entry_key != key)
            .collect();
        let removed = map.remove(&key);

        prop_assert_eq!(removed, map);
    }
}

// =============================================================================
// Idempotent-Insert Law: map.insert(k, v).insert(k, v) == map.insert(k, v)
// =============================================================================

proptest! {
    #[test]
    fn prop_idempotent_insert_law(
        entries in arbitrary_entries(),
        key in arbitrary_key(),
        value in arbitrary_value()
    ) {
        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();
        let once = map.insert(key.clone(), value);
        let twice = once.insert(key, value);

        prop_assert_eq!(once, twice);
    }
}

// =============================================================================
// Distinct-Value Law: v1 != v2 => insert(k, v1) and insert(k, v2) differ at k
// =============================================================================

proptest! {
    #[test]
    fn prop_distinct_value_law(
        entries in arbitrary_entries(),
        key in arbitrary_key(),
        value1 in arbitrary_value(),
        value2 in arbitrary_value()
    ) {
        prop_assume!(value1 != value2);

        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();
        let first = map.insert(key.clone(), value1);
        let second = first.insert(key.clone(), value2);

        prop_assert_ne!(first.get(&key), second.get(&key));
        prop_assert_ne!(&first, &second);
    }
}

// =============================================================================
// Length Laws
// =============================================================================

proptest! {
    #[test]
    fn prop_insert_length_law(
        entries in arbitrary_entries(),
        key in arbitrary_key(),
        value in arbitrary_value()
    ) {
        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();
        let expected = map.len() + usize::from(!map.contains_key(&key));

        prop_assert_eq!(map.insert(key, value).len(), expected);
    }
}

proptest! {
    #[test]
    fn prop_remove_length_law(
        entries in arbitrary_entries(),
        key in arbitrary_key()
    ) {
        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();
        let expected = map.len() - usize::from(map.contains_key(&key));

        prop_assert_eq!(map.remove(&key).len(), expected);
    }
}

proptest! {
    #[test]
    fn prop_length_tracks_contains(
        entries in arbitrary_entries(),
        updates in arbitrary_entries()
    ) {
        let mut map: PersistentHashMap<String, i32> = entries.into_iter().collect();
        let mut expected = map.len();
        for (key, value) in updates {
            if !map.contains_key(&key) {
                expected += 1;
            }
            map = map.insert(key, value);
        }

        prop_assert_eq!(map.len(), expected);
    }
}

// =============================================================================
// Native-Export Law: to_hash_map round-trips every entry
// =============================================================================

proptest! {
    #[test]
    fn prop_to_hash_map_roundtrip(
        entries in arbitrary_entries()
    ) {
        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();
        let native: HashMap<String, i32> = map.to_hash_map();

        prop_assert_eq!(native.len(), map.len());
        for (key, value) in &native {
            prop_assert_eq!(map.get(key), Some(value));
        }
    }
}

// =============================================================================
// Equality Laws
// =============================================================================

proptest! {
    #[test]
    fn prop_equality_reflexive(
        entries in arbitrary_entries()
    ) {
        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();

        prop_assert_eq!(map.clone(), map);
    }
}

proptest! {
    #[test]
    fn prop_equality_is_insertion_order_independent(
        entries in arbitrary_entries()
    ) {
        let forward: PersistentHashMap<String, i32> = entries.clone().into_iter().collect();
        let mut reversed_entries: HashMap<String, i32> = entries.into_iter().collect();
        let backward: PersistentHashMap<String, i32> = reversed_entries.drain().collect();

        prop_assert_eq!(forward, backward);
    }
}

proptest! {
    #[test]
    fn prop_real_removal_breaks_equality(
        entries in prop::collection::vec(arbitrary_entry(), 1..50)
    ) {
        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();
        let mut witness = None;
        map.range(|key, _| {
            witness = Some(key.clone());
            false
        });

        if let Some(key) = witness {
            prop_assert_ne!(map.remove(&key), map);
        }
    }
}

// =============================================================================
// Range Laws: totality, no duplicates, early termination
// =============================================================================

proptest! {
    #[test]
    fn prop_range_visits_every_entry_once(
        entries in arbitrary_entries()
    ) {
        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();
        let mut seen = HashSet::new();
        map.range(|key, value| {
            assert_eq!(map.get(key), Some(value));
            assert!(seen.insert(key.clone()));
            true
        });

        prop_assert_eq!(seen.len(), map.len());
    }
}

proptest! {
    #[test]
    fn prop_range_respects_early_termination(
        entries in prop::collection::vec(arbitrary_entry(), 1..50)
    ) {
        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();
        let mut visited = 0usize;
        map.range(|_, _| {
            visited += 1;
            false
        });

        prop_assert_eq!(visited, 1);
    }
}

proptest! {
    #[test]
    fn prop_fold_agrees_with_iter(
        entries in arbitrary_entries()
    ) {
        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();
        let via_fold = map.fold(0i64, |accumulator, _, value| accumulator + i64::from(*value));
        let via_iter: i64 = map.iter().map(|(_, value)| i64::from(*value)).sum();

        prop_assert_eq!(via_fold, via_iter);
    }
}

// =============================================================================
// Transient Roundtrip Laws
// =============================================================================

proptest! {
    #[test]
    fn prop_transient_roundtrip_preserves_content(
        entries in arbitrary_entries()
    ) {
        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();
        let frozen = map.transient().persistent();

        prop_assert_eq!(frozen, map);
    }
}

proptest! {
    #[test]
    fn prop_transient_inserts_agree_with_persistent_inserts(
        entries in arbitrary_entries()
    ) {
        let via_persistent = entries.iter().cloned().fold(
            PersistentHashMap::new(),
            |map, (key, value)| map.insert(key, value),
        );

        let mut transient = TransientHashMap::new();
        for (key, value) in entries {
            transient.insert(key, value);
        }
        let via_transient = transient.persistent();

        prop_assert_eq!(via_transient, via_persistent);
    }
}

proptest! {
    #[test]
    fn prop_transient_writes_leave_the_source_untouched(
        entries in arbitrary_entries(),
        extra in arbitrary_entries()
    ) {
        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();
        let snapshot = map.clone();

        let mut transient = map.transient();
        for (key, value) in extra {
            transient.insert(key, value);
        }
        let _ = transient.persistent();

        prop_assert_eq!(map, snapshot);
    }
}

// =============================================================================
// Transform Law: transform == insert sequence
// =============================================================================

proptest! {
    #[test]
    fn prop_transform_agrees_with_inserts(
        entries in arbitrary_entries(),
        updates in arbitrary_entries()
    ) {
        let map: PersistentHashMap<String, i32> = entries.into_iter().collect();

        let via_transform = map.transform(|transient| {
            for (key, value) in updates.clone() {
                transient.insert(key, value);
            }
        });
        let via_inserts = updates.iter().cloned().fold(
            map,
            |accumulator, (key, value)| accumulator.insert(key, value),
        );

        prop_assert_eq!(via_transform, via_inserts);
    }
}
