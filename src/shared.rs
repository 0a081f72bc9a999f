//! Shared-pointer alias for trie node ownership.

/// Pointer type through which trie nodes are shared.
///
/// Structural sharing means one node may be reachable from many map
/// versions at once, so every node handle is reference-counted. By
/// default this is `std::rc::Rc`: no atomic traffic, but maps stay on
/// one thread. Enabling the `arc` feature switches the alias to
/// `std::sync::Arc`, paying for atomic counts so persistent maps can
/// cross thread boundaries.
#[cfg(feature = "arc")]
pub(crate) type ReferenceCounter<T> = std::sync::Arc<T>;

#[cfg(not(feature = "arc"))]
pub(crate) type ReferenceCounter<T> = std::rc::Rc<T>;
