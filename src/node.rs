//! Trie node representation and the recursive lookup/insert/remove
//! algorithms shared by the persistent and transient maps.
//!
//! The trie is a closed sum of four node variants. Write algorithms take
//! an optional edit token and follow a single clone-on-write rule: a node
//! is mutated in place only when it is tagged with the caller's token
//! (same cell, compared by pointer). In every other case, including all
//! persistent calls (which pass no token), the node is cloned before
//! modification, so nodes reachable from published maps are never
//! touched. In-place access goes through `make_mut`, which falls back to
//! cloning if a tagged node is somehow still shared.

use std::borrow::Borrow;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use crate::hash::{BITS_PER_LEVEL, BRANCHING_FACTOR, fragment};
use crate::shared::ReferenceCounter;

/// A bitmap node is promoted to an array node when an insert would take
/// its slot count past this bound.
const BITMAP_PROMOTE_THRESHOLD: usize = 16;

/// An array node is demoted back to a bitmap node when a delete drops its
/// child count below this bound.
const ARRAY_DEMOTE_THRESHOLD: usize = 8;

/// The edit cell of a transient.
///
/// Nodes created or adopted by a live transient are tagged with a clone of
/// its cell; ownership is decided by pointer identity, never by the cell's
/// value. The value only distinguishes a live transient (non-zero) from a
/// frozen one (zero).
pub(crate) type EditToken = Arc<AtomicU32>;

/// Shared handle to a trie node.
pub(crate) type NodeRef<K, V> = ReferenceCounter<Node<K, V>>;

/// A trie node.
#[derive(Clone)]
pub(crate) enum Node<K, V> {
    /// Sentinel; matches no key.
    Empty,
    /// Sparse node: bit `i` of the bitmap is set iff a slot for hash
    /// fragment `i` exists; slots are packed by popcount order.
    Bitmap(BitmapNode<K, V>),
    /// Dense node: one optional child per hash fragment.
    Array(ArrayNode<K, V>),
    /// All entries share one full 32-bit hash; linear-scanned.
    Collision(CollisionNode<K, V>),
}

/// A slot of a bitmap node: either a stored entry or a subtree.
#[derive(Clone)]
pub(crate) enum Slot<K, V> {
    Leaf { hash: u32, key: K, value: V },
    Child(NodeRef<K, V>),
}

#[derive(Clone)]
pub(crate) struct BitmapNode<K, V> {
    pub(crate) bitmap: u32,
    pub(crate) edit: Option<EditToken>,
    pub(crate) slots: Vec<Slot<K, V>>,
}

#[derive(Clone)]
pub(crate) struct ArrayNode<K, V> {
    pub(crate) count: u16,
    pub(crate) edit: Option<EditToken>,
    pub(crate) slots: Box<[Option<NodeRef<K, V>>; BRANCHING_FACTOR]>,
}

#[derive(Clone)]
pub(crate) struct CollisionNode<K, V> {
    pub(crate) hash: u32,
    pub(crate) edit: Option<EditToken>,
    pub(crate) entries: Vec<(K, V)>,
}

impl<K, V> Node<K, V> {
    fn edit_token(&self) -> Option<&EditToken> {
        match self {
            Self::Empty => None,
            Self::Bitmap(bitmap_node) => bitmap_node.edit.as_ref(),
            Self::Array(array_node) => array_node.edit.as_ref(),
            Self::Collision(collision_node) => collision_node.edit.as_ref(),
        }
    }

    fn set_edit_token(&mut self, token: Option<EditToken>) {
        match self {
            Self::Empty => {}
            Self::Bitmap(bitmap_node) => bitmap_node.edit = token,
            Self::Array(array_node) => array_node.edit = token,
            Self::Collision(collision_node) => collision_node.edit = token,
        }
    }
}

/// Creates the empty root node.
pub(crate) fn empty<K, V>() -> NodeRef<K, V> {
    ReferenceCounter::new(Node::Empty)
}

// =============================================================================
// Clone-on-write
// =============================================================================

/// Returns a mutable view of the node, cloning it first unless it is
/// tagged with the caller's edit token.
fn make_editable<'a, K: Clone, V: Clone>(
    node: &'a mut NodeRef<K, V>,
    edit: Option<&EditToken>,
) -> &'a mut Node<K, V> {
    let owned = match (edit, node.edit_token()) {
        (Some(token), Some(tag)) => Arc::ptr_eq(token, tag),
        _ => false,
    };
    if !owned {
        let mut cloned = (**node).clone();
        cloned.set_edit_token(edit.cloned());
        *node = ReferenceCounter::new(cloned);
    }
    ReferenceCounter::make_mut(node)
}

// =============================================================================
// Lookup
// =============================================================================

/// Finds the entry stored under `key`, if any.
pub(crate) fn get<'a, K, V, Q>(
    node: &'a Node<K, V>,
    key: &Q,
    hash: u32,
    shift: u32,
) -> Option<(&'a K, &'a V)>
where
    K: Borrow<Q>,
    Q: Eq + ?Sized,
{
    match node {
        Node::Empty => None,
        Node::Bitmap(bitmap_node) => {
            let bit = 1u32 << fragment(hash, shift);
            if bitmap_node.bitmap & bit == 0 {
                return None;
            }
            let index = (bitmap_node.bitmap & (bit - 1)).count_ones() as usize;
            match &bitmap_node.slots[index] {
                Slot::Leaf {
                    hash: leaf_hash,
                    key: leaf_key,
                    value: leaf_value,
                } => {
                    if *leaf_hash == hash && leaf_key.borrow() == key {
                        Some((leaf_key, leaf_value))
                    } else {
                        None
                    }
                }
                Slot::Child(child) => get(child, key, hash, shift + BITS_PER_LEVEL),
            }
        }
        Node::Array(array_node) => array_node.slots[fragment(hash, shift) as usize]
            .as_ref()
            .and_then(|child| get(child, key, hash, shift + BITS_PER_LEVEL)),
        Node::Collision(collision_node) => {
            if collision_node.hash != hash {
                return None;
            }
            collision_node
                .entries
                .iter()
                .find(|(entry_key, _)| entry_key.borrow() == key)
                .map(|(entry_key, entry_value)| (entry_key, entry_value))
        }
    }
}

// =============================================================================
// Insertion
// =============================================================================

/// Inserts `key → value` into the subtree, replacing any previous value
/// for the key. Returns `true` iff a new entry was added.
pub(crate) fn insert<K, V>(
    node: &mut NodeRef<K, V>,
    edit: Option<&EditToken>,
    shift: u32,
    hash: u32,
    key: K,
    value: V,
) -> bool
where
    K: Clone + Eq,
    V: Clone,
{
    // A collision node hit by a key with a different hash is first lifted
    // into a bitmap node wrapping it; the bitmap path below then splices
    // the new leaf next to it.
    lift_collision(node, edit, shift, hash);

    if let Node::Bitmap(bitmap_node) = &**node {
        let bit = 1u32 << fragment(hash, shift);
        if bitmap_node.bitmap & bit == 0 && bitmap_node.slots.len() >= BITMAP_PROMOTE_THRESHOLD {
            let promoted = promote_bitmap(bitmap_node, edit, shift, hash, key, value);
            *node = ReferenceCounter::new(Node::Array(promoted));
            return true;
        }
    }

    let node_mut = make_editable(node, edit);
    match &mut *node_mut {
        Node::Empty => {
            *node_mut = Node::Bitmap(BitmapNode {
                bitmap: 1u32 << fragment(hash, shift),
                edit: edit.cloned(),
                slots: vec![Slot::Leaf { hash, key, value }],
            });
            true
        }
        Node::Bitmap(bitmap_node) => insert_into_bitmap(bitmap_node, edit, shift, hash, key, value),
        Node::Array(array_node) => insert_into_array(array_node, edit, shift, hash, key, value),
        Node::Collision(collision_node) => insert_into_collision(collision_node, key, value),
    }
}

/// Re-parents a collision node under a one-slot bitmap node when a key
/// with a different hash reaches it.
fn lift_collision<K: Clone, V: Clone>(
    node: &mut NodeRef<K, V>,
    edit: Option<&EditToken>,
    shift: u32,
    hash: u32,
) {
    let collision_fragment = match &**node {
        Node::Collision(collision_node) if collision_node.hash != hash => {
            fragment(collision_node.hash, shift)
        }
        _ => return,
    };
    let child = node.clone();
    *node = ReferenceCounter::new(Node::Bitmap(BitmapNode {
        bitmap: 1u32 << collision_fragment,
        edit: edit.cloned(),
        slots: vec![Slot::Child(child)],
    }));
}

enum OccupiedSlot<K, V> {
    Recursed(bool),
    Replaced,
    Split {
        leaf_hash: u32,
        leaf_key: K,
        leaf_value: V,
        key: K,
        value: V,
    },
}

fn insert_into_bitmap<K, V>(
    bitmap_node: &mut BitmapNode<K, V>,
    edit: Option<&EditToken>,
    shift: u32,
    hash: u32,
    key: K,
    value: V,
) -> bool
where
    K: Clone + Eq,
    V: Clone,
{
    let bit = 1u32 << fragment(hash, shift);
    let index = (bitmap_node.bitmap & (bit - 1)).count_ones() as usize;

    if bitmap_node.bitmap & bit == 0 {
        bitmap_node.bitmap |= bit;
        bitmap_node.slots.insert(index, Slot::Leaf { hash, key, value });
        return true;
    }

    let action = match &mut bitmap_node.slots[index] {
        Slot::Child(child) => {
            OccupiedSlot::Recursed(insert(child, edit, shift + BITS_PER_LEVEL, hash, key, value))
        }
        Slot::Leaf {
            hash: leaf_hash,
            key: leaf_key,
            value: leaf_value,
        } => {
            if *leaf_key == key {
                *leaf_value = value;
                OccupiedSlot::Replaced
            } else {
                OccupiedSlot::Split {
                    leaf_hash: *leaf_hash,
                    leaf_key: leaf_key.clone(),
                    leaf_value: leaf_value.clone(),
                    key,
                    value,
                }
            }
        }
    };

    match action {
        OccupiedSlot::Recursed(added) => added,
        OccupiedSlot::Replaced => false,
        OccupiedSlot::Split {
            leaf_hash,
            leaf_key,
            leaf_value,
            key,
            value,
        } => {
            let child = split_leaves(
                edit,
                shift + BITS_PER_LEVEL,
                (leaf_hash, leaf_key, leaf_value),
                (hash, key, value),
            );
            bitmap_node.slots[index] = Slot::Child(child);
            true
        }
    }
}

/// Builds the subtree holding two entries whose paths diverge at or below
/// `shift`. Entries with equal full hashes form a collision node.
fn split_leaves<K: Clone, V: Clone>(
    edit: Option<&EditToken>,
    shift: u32,
    existing: (u32, K, V),
    incoming: (u32, K, V),
) -> NodeRef<K, V> {
    let (existing_hash, existing_key, existing_value) = existing;
    let (incoming_hash, incoming_key, incoming_value) = incoming;

    if existing_hash == incoming_hash {
        return ReferenceCounter::new(Node::Collision(CollisionNode {
            hash: existing_hash,
            edit: edit.cloned(),
            entries: vec![
                (existing_key, existing_value),
                (incoming_key, incoming_value),
            ],
        }));
    }

    let existing_fragment = fragment(existing_hash, shift);
    let incoming_fragment = fragment(incoming_hash, shift);

    if existing_fragment == incoming_fragment {
        let child = split_leaves(
            edit,
            shift + BITS_PER_LEVEL,
            (existing_hash, existing_key, existing_value),
            (incoming_hash, incoming_key, incoming_value),
        );
        return ReferenceCounter::new(Node::Bitmap(BitmapNode {
            bitmap: 1u32 << existing_fragment,
            edit: edit.cloned(),
            slots: vec![Slot::Child(child)],
        }));
    }

    let existing_slot = Slot::Leaf {
        hash: existing_hash,
        key: existing_key,
        value: existing_value,
    };
    let incoming_slot = Slot::Leaf {
        hash: incoming_hash,
        key: incoming_key,
        value: incoming_value,
    };
    let slots = if existing_fragment < incoming_fragment {
        vec![existing_slot, incoming_slot]
    } else {
        vec![incoming_slot, existing_slot]
    };
    ReferenceCounter::new(Node::Bitmap(BitmapNode {
        bitmap: (1u32 << existing_fragment) | (1u32 << incoming_fragment),
        edit: edit.cloned(),
        slots,
    }))
}

fn insert_into_array<K, V>(
    array_node: &mut ArrayNode<K, V>,
    edit: Option<&EditToken>,
    shift: u32,
    hash: u32,
    key: K,
    value: V,
) -> bool
where
    K: Clone + Eq,
    V: Clone,
{
    let index = fragment(hash, shift) as usize;
    match &mut array_node.slots[index] {
        Some(child) => insert(child, edit, shift + BITS_PER_LEVEL, hash, key, value),
        slot @ None => {
            *slot = Some(single_leaf(edit, shift + BITS_PER_LEVEL, hash, key, value));
            array_node.count += 1;
            true
        }
    }
}

fn insert_into_collision<K: Eq, V>(
    collision_node: &mut CollisionNode<K, V>,
    key: K,
    value: V,
) -> bool {
    let existing = collision_node
        .entries
        .iter()
        .position(|(entry_key, _)| *entry_key == key);
    match existing {
        Some(position) => {
            collision_node.entries[position].1 = value;
            false
        }
        None => {
            collision_node.entries.push((key, value));
            true
        }
    }
}

/// Wraps a single entry as a one-slot bitmap node rooted at `shift`.
fn single_leaf<K, V>(
    edit: Option<&EditToken>,
    shift: u32,
    hash: u32,
    key: K,
    value: V,
) -> NodeRef<K, V> {
    ReferenceCounter::new(Node::Bitmap(BitmapNode {
        bitmap: 1u32 << fragment(hash, shift),
        edit: edit.cloned(),
        slots: vec![Slot::Leaf { hash, key, value }],
    }))
}

/// Expands a full bitmap node into an array node and places the new entry
/// in its (previously unset) slot.
#[allow(clippy::cast_possible_truncation)]
fn promote_bitmap<K: Clone, V: Clone>(
    bitmap_node: &BitmapNode<K, V>,
    edit: Option<&EditToken>,
    shift: u32,
    hash: u32,
    key: K,
    value: V,
) -> ArrayNode<K, V> {
    let mut slots: [Option<NodeRef<K, V>>; BRANCHING_FACTOR] = std::array::from_fn(|_| None);

    let mut position = 0usize;
    for fragment_index in 0..BRANCHING_FACTOR {
        if bitmap_node.bitmap & (1u32 << fragment_index) != 0 {
            slots[fragment_index] = Some(match &bitmap_node.slots[position] {
                Slot::Leaf {
                    hash: leaf_hash,
                    key: leaf_key,
                    value: leaf_value,
                } => single_leaf(
                    edit,
                    shift + BITS_PER_LEVEL,
                    *leaf_hash,
                    leaf_key.clone(),
                    leaf_value.clone(),
                ),
                Slot::Child(child) => child.clone(),
            });
            position += 1;
        }
    }

    slots[fragment(hash, shift) as usize] =
        Some(single_leaf(edit, shift + BITS_PER_LEVEL, hash, key, value));

    ArrayNode {
        count: (bitmap_node.slots.len() + 1) as u16,
        edit: edit.cloned(),
        slots: Box::new(slots),
    }
}

// =============================================================================
// Deletion
// =============================================================================

/// What a subtree became after a removal.
pub(crate) enum Removed<K, V> {
    /// Still a node; any changes happened through the handle.
    Kept,
    /// The subtree is now empty; the parent clears the slot.
    Gone,
    /// The subtree collapsed to a single entry; the parent inlines it.
    Leaf(u32, K, V),
}

/// Removes `key` from the subtree. Presence is checked by the caller; an
/// absent key leaves the trie logically unchanged.
pub(crate) fn remove<K, V, Q>(
    node: &mut NodeRef<K, V>,
    edit: Option<&EditToken>,
    shift: u32,
    hash: u32,
    key: &Q,
) -> Removed<K, V>
where
    K: Borrow<Q> + Clone,
    V: Clone,
    Q: Eq + ?Sized,
{
    let node_mut = make_editable(node, edit);
    let outcome = match &mut *node_mut {
        Node::Empty => Removed::Kept,
        Node::Bitmap(bitmap_node) => remove_from_bitmap(bitmap_node, edit, shift, hash, key),
        Node::Array(array_node) => remove_from_array(array_node, edit, shift, hash, key),
        Node::Collision(collision_node) => remove_from_collision(collision_node, key),
    };

    // Demote a thinned-out array node back to bitmap form.
    if let Node::Array(array_node) = &*node_mut {
        if usize::from(array_node.count) < ARRAY_DEMOTE_THRESHOLD {
            let packed = pack_array(array_node, edit);
            *node_mut = Node::Bitmap(packed);
        }
    }

    outcome
}

enum SlotChange<K, V> {
    Keep,
    Drop,
    Inline(u32, K, V),
}

fn remove_from_bitmap<K, V, Q>(
    bitmap_node: &mut BitmapNode<K, V>,
    edit: Option<&EditToken>,
    shift: u32,
    hash: u32,
    key: &Q,
) -> Removed<K, V>
where
    K: Borrow<Q> + Clone,
    V: Clone,
    Q: Eq + ?Sized,
{
    let bit = 1u32 << fragment(hash, shift);
    if bitmap_node.bitmap & bit == 0 {
        return Removed::Kept;
    }
    let index = (bitmap_node.bitmap & (bit - 1)).count_ones() as usize;

    let change = match &mut bitmap_node.slots[index] {
        Slot::Leaf { key: leaf_key, .. } => {
            if (*leaf_key).borrow() == key {
                SlotChange::Drop
            } else {
                SlotChange::Keep
            }
        }
        Slot::Child(child) => match remove(child, edit, shift + BITS_PER_LEVEL, hash, key) {
            Removed::Kept => SlotChange::Keep,
            Removed::Gone => SlotChange::Drop,
            Removed::Leaf(leaf_hash, leaf_key, leaf_value) => {
                SlotChange::Inline(leaf_hash, leaf_key, leaf_value)
            }
        },
    };

    match change {
        SlotChange::Keep => return Removed::Kept,
        SlotChange::Drop => {
            bitmap_node.bitmap &= !bit;
            bitmap_node.slots.remove(index);
        }
        SlotChange::Inline(leaf_hash, leaf_key, leaf_value) => {
            bitmap_node.slots[index] = Slot::Leaf {
                hash: leaf_hash,
                key: leaf_key,
                value: leaf_value,
            };
        }
    }

    if bitmap_node.slots.is_empty() {
        return Removed::Gone;
    }
    if bitmap_node.slots.len() == 1 && matches!(bitmap_node.slots[0], Slot::Leaf { .. }) {
        if let Some(Slot::Leaf {
            hash: leaf_hash,
            key: leaf_key,
            value: leaf_value,
        }) = bitmap_node.slots.pop()
        {
            return Removed::Leaf(leaf_hash, leaf_key, leaf_value);
        }
    }
    Removed::Kept
}

fn remove_from_array<K, V, Q>(
    array_node: &mut ArrayNode<K, V>,
    edit: Option<&EditToken>,
    shift: u32,
    hash: u32,
    key: &Q,
) -> Removed<K, V>
where
    K: Borrow<Q> + Clone,
    V: Clone,
    Q: Eq + ?Sized,
{
    let index = fragment(hash, shift) as usize;
    let mut cleared = false;

    match &mut array_node.slots[index] {
        Some(child) => match remove(child, edit, shift + BITS_PER_LEVEL, hash, key) {
            Removed::Kept => return Removed::Kept,
            Removed::Gone => cleared = true,
            Removed::Leaf(leaf_hash, leaf_key, leaf_value) => {
                *child = single_leaf(edit, shift + BITS_PER_LEVEL, leaf_hash, leaf_key, leaf_value);
            }
        },
        None => return Removed::Kept,
    }

    if cleared {
        array_node.slots[index] = None;
        array_node.count -= 1;
    }
    Removed::Kept
}

fn remove_from_collision<K, V, Q>(
    collision_node: &mut CollisionNode<K, V>,
    key: &Q,
) -> Removed<K, V>
where
    K: Borrow<Q>,
    Q: Eq + ?Sized,
{
    let Some(position) = collision_node
        .entries
        .iter()
        .position(|(entry_key, _)| entry_key.borrow() == key)
    else {
        return Removed::Kept;
    };
    collision_node.entries.remove(position);

    if collision_node.entries.len() == 1 {
        if let Some((leaf_key, leaf_value)) = collision_node.entries.pop() {
            return Removed::Leaf(collision_node.hash, leaf_key, leaf_value);
        }
    }
    Removed::Kept
}

/// Packs the surviving children of an array node into a bitmap node,
/// inlining one-entry subtrees as leaves.
fn pack_array<K: Clone, V: Clone>(
    array_node: &ArrayNode<K, V>,
    edit: Option<&EditToken>,
) -> BitmapNode<K, V> {
    let mut bitmap = 0u32;
    let mut slots = Vec::with_capacity(usize::from(array_node.count));
    for (index, slot) in array_node.slots.iter().enumerate() {
        if let Some(child) = slot {
            bitmap |= 1u32 << index;
            slots.push(match singleton_leaf(child) {
                Some((leaf_hash, leaf_key, leaf_value)) => Slot::Leaf {
                    hash: leaf_hash,
                    key: leaf_key.clone(),
                    value: leaf_value.clone(),
                },
                None => Slot::Child(child.clone()),
            });
        }
    }
    BitmapNode {
        bitmap,
        edit: edit.cloned(),
        slots,
    }
}

/// Returns the single entry of a one-leaf bitmap node, if that is what
/// `node` is.
fn singleton_leaf<K, V>(node: &NodeRef<K, V>) -> Option<(u32, &K, &V)> {
    if let Node::Bitmap(bitmap_node) = &**node {
        if bitmap_node.slots.len() == 1 {
            if let Slot::Leaf { hash, key, value } = &bitmap_node.slots[0] {
                return Some((*hash, key, value));
            }
        }
    }
    None
}

/// Removes `key` from the trie rooted at `node`, restoring the root form
/// (a collapsed last entry becomes a one-leaf root, an emptied trie the
/// empty sentinel). Presence is checked by the caller.
pub(crate) fn remove_root<K, V, Q>(
    node: &mut NodeRef<K, V>,
    edit: Option<&EditToken>,
    hash: u32,
    key: &Q,
) where
    K: Borrow<Q> + Clone,
    V: Clone,
    Q: Eq + ?Sized,
{
    match remove(node, edit, 0, hash, key) {
        Removed::Kept => {}
        Removed::Gone => *node = empty(),
        Removed::Leaf(leaf_hash, leaf_key, leaf_value) => {
            *node = single_leaf(edit, 0, leaf_hash, leaf_key, leaf_value);
        }
    }
}
