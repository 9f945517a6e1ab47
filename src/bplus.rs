//! A B+Tree map with a doubly-linked leaf chain.

use alloc::vec::Vec;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::iter::FusedIterator;
use core::ops::{Bound, Index, RangeBounds};

use crate::ordered::{OrderedMap, validate_range_bounds};
use crate::raw::Handle;

mod node;
mod raw;

use node::DEFAULT_ORDER;
use raw::RawBPlusTree;

/// An ordered map implemented as a B+Tree of configurable order.
///
/// Unlike a B-Tree, every key/value pair resides in a leaf; internal nodes
/// hold index-only separator keys. The leaves form a doubly-linked chain in
/// key order, which makes full scans and [`range`](BPlusTree::range) queries
/// sequential walks: O(log n) to find the start, O(1) amortized per element
/// after that.
///
/// Separators are copies made when leaves split, and removals never rewrite
/// them, so a separator may keep naming a key that is no longer in the map.
/// That is invisible through this API - presence is always decided at the
/// leaf - but shows up when inspecting nodes through
/// [`root_view`](BPlusTree::root_view).
///
/// Keys must implement [`Ord`] and [`Clone`] (separator keys are copies).
/// It is a logic error for a key to change its ordering relative to other
/// keys while it is in the map.
///
/// # Examples
///
/// ```
/// use tern_tree::BPlusTree;
///
/// let mut index = BPlusTree::new();
/// index.insert(1001, "first invoice");
/// index.insert(1002, "second invoice");
/// index.insert(1017, "a later invoice");
///
/// assert_eq!(index.get(&1002), Some(&"second invoice"));
///
/// // Range scans walk the leaf chain.
/// let early: Vec<_> = index.range(..=1002).map(|(&id, _)| id).collect();
/// assert_eq!(early, [1001, 1002]);
/// ```
#[derive(Clone)]
pub struct BPlusTree<K, V> {
    raw: RawBPlusTree<K, V>,
}

impl<K, V> BPlusTree<K, V> {
    /// Makes a new, empty `BPlusTree` with the default order (16).
    ///
    /// Does not allocate anything on its own.
    #[must_use]
    pub fn new() -> BPlusTree<K, V> {
        BPlusTree {
            raw: RawBPlusTree::new(DEFAULT_ORDER),
        }
    }

    /// Makes a new, empty `BPlusTree` with the given order (maximum number of
    /// children per internal node).
    ///
    /// # Panics
    ///
    /// Panics if `order < 3`.
    #[must_use]
    pub fn with_order(order: usize) -> BPlusTree<K, V> {
        BPlusTree {
            raw: RawBPlusTree::new(order),
        }
    }

    /// Returns the order of this tree.
    #[must_use]
    pub fn order(&self) -> usize {
        self.raw.order()
    }

    /// Returns the number of elements in the map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns true if the map contains no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Returns the number of node levels from the root down to the leaves.
    /// An empty tree has height 0, a single-leaf tree height 1.
    #[must_use]
    pub fn height(&self) -> usize {
        self.raw.height()
    }

    /// Clears the map, removing all elements.
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Returns a view of the root node for structural traversal, e.g. by an
    /// external tree printer. `None` when the tree is empty.
    #[must_use]
    pub fn root_view(&self) -> Option<NodeView<'_, K, V>> {
        self.raw.root().map(|handle| NodeView { tree: &self.raw, handle })
    }

    /// Returns a view of the leftmost leaf; [`LeafView::next`] walks the
    /// chain in key order.
    #[must_use]
    pub fn first_leaf_view(&self) -> Option<LeafView<'_, K, V>> {
        self.raw.first_leaf().map(|handle| LeafView { tree: &self.raw, handle })
    }

    /// Returns a view of the rightmost leaf; [`LeafView::prev`] walks the
    /// chain in reverse key order.
    #[must_use]
    pub fn last_leaf_view(&self) -> Option<LeafView<'_, K, V>> {
        self.raw.last_leaf().map(|handle| LeafView { tree: &self.raw, handle })
    }

    /// Gets an iterator over the entries of the map, sorted by key. Walks the
    /// leaf chain, so each step is O(1).
    pub fn iter(&self) -> Iter<'_, K, V> {
        let front = self.raw.first_leaf();
        let back = self.raw.last_leaf().map(|leaf| {
            let count = self.raw.node(leaf).as_leaf().key_count();
            (leaf, count - 1)
        });
        Iter {
            tree: &self.raw,
            front_leaf: front,
            front_index: 0,
            back_leaf: back.map(|(leaf, _)| leaf),
            back_index: back.map_or(0, |(_, index)| index),
            remaining: self.raw.len(),
        }
    }

    /// Gets an iterator over the keys of the map, in sorted order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Gets an iterator over the values of the map, in key order.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }
}

impl<K: Clone + Ord, V> BPlusTree<K, V> {
    /// Builds a map with the default order from entries that are strictly
    /// ascending by key, in linear time and without per-key rebalancing.
    /// Leaves are packed to capacity and chained as they are emitted.
    ///
    /// Ascending input is a precondition; it is checked in debug builds only.
    ///
    /// # Examples
    ///
    /// ```
    /// use tern_tree::BPlusTree;
    ///
    /// let map = BPlusTree::from_sorted_iter((0..1000).map(|k| (k, k * 3)));
    /// assert_eq!(map.len(), 1000);
    /// assert_eq!(map.get(&999), Some(&2997));
    /// ```
    #[must_use]
    pub fn from_sorted_iter<I>(iter: I) -> BPlusTree<K, V>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        Self::from_sorted_iter_with_order(DEFAULT_ORDER, iter)
    }

    /// Builds a map of the given order from strictly ascending entries.
    ///
    /// # Panics
    ///
    /// Panics if `order < 3`.
    #[must_use]
    pub fn from_sorted_iter_with_order<I>(order: usize, iter: I) -> BPlusTree<K, V>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        BPlusTree {
            raw: RawBPlusTree::from_sorted_vec(order, iter.into_iter().collect()),
        }
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but the
    /// ordering on the borrowed form *must* match the ordering on the key
    /// type.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get(key)
    }

    /// Returns a mutable reference to the value corresponding to the key.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get_mut(key)
    }

    /// Returns the key-value pair corresponding to the supplied key.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get_key_value(key)
    }

    /// Returns true if the map contains the specified key.
    ///
    /// Presence is decided at the leaf: a key that survives only as a stale
    /// internal separator is reported absent.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.contains_key(key)
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the key was already present its value is replaced and the old value
    /// returned. On leaf overflow the leaf splits and the first key of the
    /// new right sibling is *copied* into the parent as a separator; splits
    /// propagate bottom-up along the insertion path.
    ///
    /// # Examples
    ///
    /// ```
    /// use tern_tree::BPlusTree;
    ///
    /// let mut map = BPlusTree::new();
    /// assert_eq!(map.insert(37, "a"), None);
    /// assert_eq!(map.insert(37, "b"), Some("a"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.raw.insert(key, value)
    }

    /// Inserts a key-value pair only if the key is not already present.
    /// Returns true if the pair was inserted.
    pub fn insert_if_absent(&mut self, key: K, value: V) -> bool {
        self.raw.insert_if_absent(key, value)
    }

    /// Replaces the value of an existing key, returning the old value. An
    /// absent key stays absent and the tree is not restructured.
    pub fn update<Q>(&mut self, key: &Q, value: V) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.update(key, value)
    }

    /// Removes a key from the map, returning its value if it was present.
    ///
    /// For even orders deletion is top-down: before stepping into a child at
    /// its occupancy minimum, the descent borrows through the parent from a
    /// sibling (preferring the left) or merges two siblings, repairing the
    /// leaf chain as leaves fuse. Odd orders cannot host the pre-emptive
    /// merge within the node capacity and repair underflow bottom-up
    /// instead. Separators are not rewritten by the removal itself.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove(key)
    }

    /// Removes a key from the map, returning the stored key and value.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove_entry(key)
    }

    /// Removes and returns the first (minimum-key) entry.
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.raw.pop_first()
    }

    /// Removes and returns the last (maximum-key) entry.
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.raw.pop_last()
    }

    /// Returns the entry with the minimum key. O(1) via the cached leftmost
    /// leaf.
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.raw.first_pos().map(|pos| self.raw.entry_at(pos))
    }

    /// Returns the entry with the maximum key. O(1) via the cached rightmost
    /// leaf.
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.raw.last_pos().map(|pos| self.raw.entry_at(pos))
    }

    /// Returns the entry with the greatest key `<=` the given key. The
    /// descent lands on a leaf and may consult its chain predecessor for the
    /// boundary case.
    pub fn floor<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.upper_bound_inclusive(key).map(|pos| self.raw.entry_at(pos))
    }

    /// Returns the entry with the least key `>=` the given key.
    pub fn ceiling<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.lower_bound(key).map(|pos| self.raw.entry_at(pos))
    }

    /// Returns the entry with the greatest key strictly `<` the given key.
    pub fn predecessor<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.lower_bound_exclusive(key).map(|pos| self.raw.entry_at(pos))
    }

    /// Returns the entry with the least key strictly `>` the given key.
    pub fn successor<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.upper_bound(key).map(|pos| self.raw.entry_at(pos))
    }

    /// Constructs a double-ended iterator over a sub-range of entries in the
    /// map. The descent finds the boundary leaves in O(log n); iteration then
    /// walks the leaf chain, O(1) amortized per element, for O(log n + k)
    /// overall.
    ///
    /// # Panics
    ///
    /// Panics if range `start > end`, or if `start == end` and both bounds
    /// are `Excluded`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tern_tree::BPlusTree;
    ///
    /// let map = BPlusTree::from_sorted_iter((0..100).map(|k| (k, ())));
    /// let picked: Vec<_> = map.range(90..=93).map(|(&k, _)| k).collect();
    /// assert_eq!(picked, [90, 91, 92, 93]);
    /// ```
    pub fn range<T, R>(&self, range: R) -> Range<'_, K, V>
    where
        T: ?Sized + Ord,
        K: Borrow<T>,
        R: RangeBounds<T>,
    {
        validate_range_bounds(&range);

        let front = match range.start_bound() {
            Bound::Unbounded => self.raw.first_pos(),
            Bound::Included(start) => self.raw.lower_bound(start),
            Bound::Excluded(start) => self.raw.upper_bound(start),
        };
        let back = match range.end_bound() {
            Bound::Unbounded => self.raw.last_pos(),
            Bound::Included(end) => self.raw.upper_bound_inclusive(end),
            Bound::Excluded(end) => self.raw.lower_bound_exclusive(end),
        };

        let (front, back, finished) = match (front, back) {
            (Some(front), Some(back)) => {
                let empty = self.raw.entry_at(front).0 > self.raw.entry_at(back).0;
                (front, back, empty)
            }
            _ => ((Handle::new(0), 0), (Handle::new(0), 0), true),
        };

        Range {
            tree: &self.raw,
            front_leaf: front.0,
            front_index: front.1,
            back_leaf: back.0,
            back_index: back.1,
            finished,
        }
    }
}

// ─── Structural views ────────────────────────────────────────────────────────

/// A borrowed view of one B+Tree node, for structural traversal by external
/// collaborators such as tree printers. The view exposes structure only; the
/// core imposes no display format.
pub struct NodeView<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
    handle: Handle,
}

impl<'a, K, V> NodeView<'a, K, V> {
    /// The keys held by this node: data keys for a leaf, index-only separator
    /// keys for an internal node (which may be stale).
    #[must_use]
    pub fn keys(&self) -> &'a [K] {
        match self.tree.node(self.handle) {
            node::Node::Internal(internal) => internal.keys(),
            node::Node::Leaf(leaf) => leaf.keys(),
        }
    }

    /// True if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.tree.node(self.handle).is_leaf()
    }

    /// The number of children (0 for a leaf).
    #[must_use]
    pub fn child_count(&self) -> usize {
        match self.tree.node(self.handle) {
            node::Node::Internal(internal) => internal.child_count(),
            node::Node::Leaf(_) => 0,
        }
    }

    /// A view of the child at `index`.
    ///
    /// # Panics
    ///
    /// Panics if this node is a leaf or `index >= self.child_count()`.
    #[must_use]
    pub fn child(&self, index: usize) -> NodeView<'a, K, V> {
        NodeView {
            tree: self.tree,
            handle: self.tree.node(self.handle).as_internal().child(index),
        }
    }

    /// This node as a leaf view, if it is a leaf.
    #[must_use]
    pub fn as_leaf_view(&self) -> Option<LeafView<'a, K, V>> {
        self.is_leaf().then(|| LeafView {
            tree: self.tree,
            handle: self.handle,
        })
    }
}

impl<K: fmt::Debug, V> fmt::Debug for NodeView<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeView")
            .field("keys", &self.keys())
            .field("children", &self.child_count())
            .finish()
    }
}

/// A borrowed view of one leaf, with access to its chain neighbors.
pub struct LeafView<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
    handle: Handle,
}

impl<'a, K, V> LeafView<'a, K, V> {
    /// The keys held by this leaf, ascending.
    #[must_use]
    pub fn keys(&self) -> &'a [K] {
        self.tree.node(self.handle).as_leaf().keys()
    }

    /// The number of entries in this leaf.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.tree.node(self.handle).as_leaf().key_count()
    }

    /// The entry at `index` within this leaf.
    #[must_use]
    pub fn entry(&self, index: usize) -> (&'a K, &'a V) {
        let leaf = self.tree.node(self.handle).as_leaf();
        (leaf.key(index), self.tree.value(leaf.value(index)))
    }

    /// The next leaf in the chain.
    #[must_use]
    pub fn next(&self) -> Option<LeafView<'a, K, V>> {
        self.tree.node(self.handle).as_leaf().next().map(|handle| LeafView {
            tree: self.tree,
            handle,
        })
    }

    /// The previous leaf in the chain.
    #[must_use]
    pub fn prev(&self) -> Option<LeafView<'a, K, V>> {
        self.tree.node(self.handle).as_leaf().prev().map(|handle| LeafView {
            tree: self.tree,
            handle,
        })
    }
}

impl<K: fmt::Debug, V> fmt::Debug for LeafView<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafView").field("keys", &self.keys()).finish()
    }
}

// ─── Iterators ───────────────────────────────────────────────────────────────

/// An iterator over the entries of a `BPlusTree`, sorted by key.
///
/// Created by [`BPlusTree::iter`]. Walks the leaf chain from both ends.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
    front_leaf: Option<Handle>,
    front_index: usize,
    back_leaf: Option<Handle>,
    back_index: usize,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let handle = self.front_leaf?;
        let tree = self.tree;
        let leaf = tree.node(handle).as_leaf();

        let key = leaf.key(self.front_index);
        let value = tree.value(leaf.value(self.front_index));

        self.remaining -= 1;
        self.front_index += 1;
        if self.front_index >= leaf.key_count() {
            self.front_leaf = leaf.next();
            self.front_index = 0;
        }

        Some((key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K, V> DoubleEndedIterator for Iter<'a, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let handle = self.back_leaf?;
        let tree = self.tree;
        let leaf = tree.node(handle).as_leaf();

        let key = leaf.key(self.back_index);
        let value = tree.value(leaf.value(self.back_index));

        self.remaining -= 1;
        if self.back_index == 0 {
            self.back_leaf = leaf.prev();
            if let Some(prev) = self.back_leaf {
                self.back_index = tree.node(prev).as_leaf().key_count().saturating_sub(1);
            }
        } else {
            self.back_index -= 1;
        }

        Some((key, value))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter {
            tree: self.tree,
            front_leaf: self.front_leaf,
            front_index: self.front_index,
            back_leaf: self.back_leaf,
            back_index: self.back_index,
            remaining: self.remaining,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("remaining", &self.remaining).finish()
    }
}

/// An iterator over the keys of a `BPlusTree`.
///
/// Created by [`BPlusTree::keys`].
#[must_use = "iterators are lazy and do nothing unless consumed"]
#[derive(Clone)]
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Keys<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(k, _)| k)
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}
impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// An iterator over the values of a `BPlusTree`, in key order.
///
/// Created by [`BPlusTree::values`].
#[must_use = "iterators are lazy and do nothing unless consumed"]
#[derive(Clone)]
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Values<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(_, v)| v)
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}
impl<K, V> FusedIterator for Values<'_, K, V> {}

/// A double-ended iterator over a sub-range of entries in a `BPlusTree`.
///
/// Created by [`BPlusTree::range`]. Both cursors walk the leaf chain.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Range<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
    front_leaf: Handle,
    front_index: usize,
    back_leaf: Handle,
    back_index: usize,
    /// True once the cursors have met or the range was empty on arrival.
    finished: bool,
}

impl<'a, K, V> Iterator for Range<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let tree = self.tree;
        let leaf = tree.node(self.front_leaf).as_leaf();
        let key = leaf.key(self.front_index);
        let value = tree.value(leaf.value(self.front_index));

        if (self.front_leaf, self.front_index) == (self.back_leaf, self.back_index) {
            self.finished = true;
        } else {
            self.front_index += 1;
            if self.front_index >= leaf.key_count() {
                match leaf.next() {
                    Some(next) => {
                        self.front_leaf = next;
                        self.front_index = 0;
                    }
                    None => self.finished = true,
                }
            }
        }

        Some((key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished { (0, Some(0)) } else { (0, Some(self.tree.len())) }
    }
}

impl<'a, K, V> DoubleEndedIterator for Range<'a, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let tree = self.tree;
        let leaf = tree.node(self.back_leaf).as_leaf();
        let key = leaf.key(self.back_index);
        let value = tree.value(leaf.value(self.back_index));

        if (self.front_leaf, self.front_index) == (self.back_leaf, self.back_index) {
            self.finished = true;
        } else if self.back_index == 0 {
            match leaf.prev() {
                Some(prev) => {
                    self.back_leaf = prev;
                    self.back_index = tree.node(prev).as_leaf().key_count() - 1;
                }
                None => self.finished = true,
            }
        } else {
            self.back_index -= 1;
        }

        Some((key, value))
    }
}

impl<K, V> FusedIterator for Range<'_, K, V> {}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Range<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Range").field("finished", &self.finished).finish()
    }
}

/// An owning iterator over the entries of a `BPlusTree`, sorted by key.
///
/// Created by [`IntoIterator::into_iter`] on an owned `BPlusTree`.
pub struct IntoIter<K, V> {
    inner: alloc::vec::IntoIter<(K, V)>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for IntoIter<K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}
impl<K, V> FusedIterator for IntoIter<K, V> {}

// ─── Trait implementations ───────────────────────────────────────────────────

impl<K, V> Default for BPlusTree<K, V> {
    fn default() -> Self {
        BPlusTree::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for BPlusTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Clone + Ord, V> FromIterator<(K, V)> for BPlusTree<K, V> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = BPlusTree::new();
        map.extend(iter);
        map
    }
}

impl<K: Clone + Ord, V> Extend<(K, V)> for BPlusTree<K, V> {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'a, K: Clone + Ord + Copy, V: Copy> Extend<(&'a K, &'a V)> for BPlusTree<K, V> {
    fn extend<T: IntoIterator<Item = (&'a K, &'a V)>>(&mut self, iter: T) {
        for (&k, &v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K: Clone + Ord, V, const N: usize> From<[(K, V); N]> for BPlusTree<K, V> {
    fn from(arr: [(K, V); N]) -> Self {
        arr.into_iter().collect()
    }
}

impl<'a, K, V> IntoIterator for &'a BPlusTree<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<K: Clone + Ord, V> IntoIterator for BPlusTree<K, V> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(mut self) -> IntoIter<K, V> {
        IntoIter {
            inner: self.raw.drain_to_vec().into_iter(),
        }
    }
}

impl<K, Q, V> Index<&Q> for BPlusTree<K, V>
where
    K: Borrow<Q> + Clone + Ord,
    Q: ?Sized + Ord,
{
    type Output = V;

    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("no entry found for key")
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for BPlusTree<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq> Eq for BPlusTree<K, V> {}

impl<K: Hash, V: Hash> Hash for BPlusTree<K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for (k, v) in self.iter() {
            k.hash(state);
            v.hash(state);
        }
    }
}

impl<K: Clone + Ord, V> OrderedMap<K, V> for BPlusTree<K, V> {
    fn len(&self) -> usize {
        self.raw.len()
    }

    fn clear(&mut self) {
        self.raw.clear();
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        self.raw.get(key)
    }

    fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.raw.insert(key, value)
    }

    fn insert_if_absent(&mut self, key: K, value: V) -> bool {
        self.raw.insert_if_absent(key, value)
    }

    fn update(&mut self, key: &K, value: V) -> Option<V> {
        self.raw.update(key, value)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        self.raw.remove(key)
    }

    fn first_key_value(&self) -> Option<(&K, &V)> {
        self.raw.first_pos().map(|pos| self.raw.entry_at(pos))
    }

    fn last_key_value(&self) -> Option<(&K, &V)> {
        self.raw.last_pos().map(|pos| self.raw.entry_at(pos))
    }

    fn floor(&mut self, key: &K) -> Option<(&K, &V)> {
        self.raw.upper_bound_inclusive(key).map(|pos| self.raw.entry_at(pos))
    }

    fn ceiling(&mut self, key: &K) -> Option<(&K, &V)> {
        self.raw.lower_bound(key).map(|pos| self.raw.entry_at(pos))
    }

    fn predecessor(&mut self, key: &K) -> Option<(&K, &V)> {
        self.raw.lower_bound_exclusive(key).map(|pos| self.raw.entry_at(pos))
    }

    fn successor(&mut self, key: &K) -> Option<(&K, &V)> {
        self.raw.upper_bound(key).map(|pos| self.raw.entry_at(pos))
    }

    fn for_each<F: FnMut(&K, &V)>(&self, mut f: F) {
        for (k, v) in self.iter() {
            f(k, v);
        }
    }

    fn for_each_rev<F: FnMut(&K, &V)>(&self, mut f: F) {
        for (k, v) in self.iter().rev() {
            f(k, v);
        }
    }

    fn entries_in(&mut self, lo: &K, hi: &K) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        if lo > hi {
            return Vec::new();
        }
        self.range((Bound::Included(lo), Bound::Included(hi)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
