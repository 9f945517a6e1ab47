use alloc::vec::Vec;
use core::borrow::Borrow;
use core::cmp::Ordering;

use smallvec::SmallVec;

use super::node::{BTreeNode, MIN_ORDER, SearchResult};
use crate::raw::{Arena, Handle};

/// The core B-Tree implementation backing `BTree`.
///
/// Key/value pairs live in every node. The default mutation paths are
/// bottom-up insertion and top-down (pre-emptive) deletion; the alternate
/// algorithms are exposed for shape comparison and benchmarking.
#[derive(Clone)]
pub(crate) struct RawBTree<K, V> {
    /// Arena storing all tree nodes.
    nodes: Arena<BTreeNode<K, V>>,
    /// Handle to the root node, if the tree is non-empty.
    root: Option<Handle>,
    /// Total number of key-value pairs in the tree.
    len: usize,
    /// Knuth order: the maximum number of children per node.
    order: usize,
}

/// Path element stack for bottom-up mutations, pre-sized for the worst-case
/// height of a default-order tree.
type Path = SmallVec<[(Handle, usize); 16]>;

impl<K, V> RawBTree<K, V> {
    pub(crate) fn new(order: usize) -> Self {
        assert!(order >= MIN_ORDER, "`RawBTree::new()` - `order` must be at least {MIN_ORDER}!");
        Self {
            nodes: Arena::new(),
            root: None,
            len: 0,
            order,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) const fn order(&self) -> usize {
        self.order
    }

    /// Maximum keys a node may hold in steady state.
    pub(crate) const fn max_keys(&self) -> usize {
        self.order - 1
    }

    /// Minimum keys a non-root node must hold.
    pub(crate) const fn min_keys(&self) -> usize {
        self.order.div_ceil(2) - 1
    }

    /// Index of the pair promoted when a node splits.
    pub(crate) const fn split_index(&self) -> usize {
        self.order.div_ceil(2) - 1
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.len = 0;
    }

    pub(crate) fn root(&self) -> Option<Handle> {
        self.root
    }

    pub(crate) fn node(&self, handle: Handle) -> &BTreeNode<K, V> {
        self.nodes.get(handle)
    }

    /// Number of node levels from the root to the leaves (empty tree = 0).
    pub(crate) fn height(&self) -> usize {
        let mut height = 0;
        let mut current = self.root;
        while let Some(handle) = current {
            height += 1;
            let node = self.nodes.get(handle);
            current = if node.is_leaf() { None } else { Some(node.child(0)) };
        }
        height
    }

    /// Builds a frame stack positioned at the minimum entry.
    pub(crate) fn start_stack(&self) -> Vec<(Handle, usize)> {
        let mut stack = Vec::new();
        let Some(mut current) = self.root else {
            return stack;
        };
        loop {
            stack.push((current, 0));
            let node = self.nodes.get(current);
            if node.is_leaf() {
                return stack;
            }
            current = node.child(0);
        }
    }

    /// Position the stack would emit next, without advancing it.
    pub(crate) fn peek_stack(&self, stack: &[(Handle, usize)]) -> Option<(Handle, usize)> {
        stack.iter().rev().find(|&&(handle, index)| index < self.nodes.get(handle).key_count()).copied()
    }
}

impl<K: Ord, V> RawBTree<K, V> {
    /// Descends to the node and index holding the key.
    pub(crate) fn find<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root?;
        loop {
            let node = self.nodes.get(current);
            match node.search(key) {
                SearchResult::Found(index) => return Some((current, index)),
                SearchResult::NotFound(index) => {
                    if node.is_leaf() {
                        return None;
                    }
                    current = node.child(index);
                }
            }
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (handle, index) = self.find(key)?;
        Some(self.nodes.get(handle).value(index))
    }

    pub(crate) fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (handle, index) = self.find(key)?;
        Some(self.nodes.get_mut(handle).value_mut(index))
    }

    pub(crate) fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (handle, index) = self.find(key)?;
        let node = self.nodes.get(handle);
        Some((node.key(index), node.value(index)))
    }

    pub(crate) fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.find(key).is_some()
    }

    /// Replaces the value for an existing key without structural change.
    pub(crate) fn update<Q>(&mut self, key: &Q, value: V) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (handle, index) = self.find(key)?;
        Some(self.nodes.get_mut(handle).replace_value(index, value))
    }

    /// Inserts a key-value pair (bottom-up), replacing and returning the old
    /// value when the key exists.
    pub(crate) fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.insert_bottom_up(key, value, true).1
    }

    /// Inserts only when the key is absent; returns whether it was inserted.
    pub(crate) fn insert_if_absent(&mut self, key: K, value: V) -> bool {
        self.insert_bottom_up(key, value, false).0
    }

    fn insert_bottom_up(&mut self, key: K, value: V, overwrite: bool) -> (bool, Option<V>) {
        let Some(root) = self.root else {
            let mut leaf = BTreeNode::with_capacity(self.order);
            leaf.push_entry(key, value);
            self.root = Some(self.nodes.alloc(leaf));
            self.len = 1;
            return (true, None);
        };

        // Descend to the leaf, recording the ancestor path.
        let mut path: Path = SmallVec::new();
        let mut current = root;
        let leaf_index = loop {
            let node = self.nodes.get(current);
            match node.search(&key) {
                SearchResult::Found(index) => {
                    if overwrite {
                        let old = self.nodes.get_mut(current).replace_value(index, value);
                        return (false, Some(old));
                    }
                    return (false, None);
                }
                SearchResult::NotFound(index) => {
                    if node.is_leaf() {
                        break index;
                    }
                    path.push((current, index));
                    current = node.child(index);
                }
            }
        };

        self.nodes.get_mut(current).insert_entry(leaf_index, key, value);
        self.len += 1;

        // Split upward while a node holds `order` keys.
        let mut child = current;
        while self.nodes.get(child).key_count() > self.max_keys() {
            let split_index = self.split_index();
            let order = self.order;
            let (promoted_key, promoted_value, right) = self.nodes.get_mut(child).split_off(split_index, order);
            let right_handle = self.nodes.alloc(right);
            match path.pop() {
                Some((parent, index)) => {
                    let parent_node = self.nodes.get_mut(parent);
                    parent_node.insert_entry(index, promoted_key, promoted_value);
                    parent_node.insert_child(index + 1, right_handle);
                    child = parent;
                }
                None => {
                    // The root itself overflowed; grow a level.
                    let mut new_root = BTreeNode::with_capacity(order);
                    new_root.push_entry(promoted_key, promoted_value);
                    new_root.push_child(child);
                    new_root.push_child(right_handle);
                    self.root = Some(self.nodes.alloc(new_root));
                    break;
                }
            }
        }

        (true, None)
    }

    /// Inserts a key-value pair with the pre-emptive top-down algorithm: any
    /// full node met on the descent is split before stepping into it, so the
    /// final leaf insertion never propagates. Equivalent to [`Self::insert`]
    /// in contents; the resulting shape may differ.
    ///
    /// The pre-split of a full node keeps both halves at or above the
    /// occupancy minimum for even orders (a full node has `order - 1` keys;
    /// the halves share `order - 2` of them).
    pub(crate) fn insert_top_down(&mut self, key: K, value: V) -> Option<V> {
        let Some(root) = self.root else {
            let mut leaf = BTreeNode::with_capacity(self.order);
            leaf.push_entry(key, value);
            self.root = Some(self.nodes.alloc(leaf));
            self.len = 1;
            return None;
        };

        // A full root splits into a new root before the descent starts.
        if self.nodes.get(root).key_count() == self.max_keys() {
            let split_index = self.split_index();
            let order = self.order;
            let (promoted_key, promoted_value, right) = self.nodes.get_mut(root).split_off(split_index, order);
            let right_handle = self.nodes.alloc(right);
            let mut new_root = BTreeNode::with_capacity(order);
            new_root.push_entry(promoted_key, promoted_value);
            new_root.push_child(root);
            new_root.push_child(right_handle);
            self.root = Some(self.nodes.alloc(new_root));
        }

        let mut current = self.root.expect("`RawBTree::insert_top_down()` - root vanished!");
        loop {
            let node = self.nodes.get(current);
            match node.search(&key) {
                SearchResult::Found(index) => {
                    return Some(self.nodes.get_mut(current).replace_value(index, value));
                }
                SearchResult::NotFound(index) => {
                    if node.is_leaf() {
                        self.nodes.get_mut(current).insert_entry(index, key, value);
                        self.len += 1;
                        return None;
                    }
                    let child = node.child(index);
                    if self.nodes.get(child).key_count() == self.max_keys() {
                        let split_index = self.split_index();
                        let order = self.order;
                        let (promoted_key, promoted_value, right) =
                            self.nodes.get_mut(child).split_off(split_index, order);
                        let right_handle = self.nodes.alloc(right);
                        let ordering = key.cmp(&promoted_key);
                        let parent = self.nodes.get_mut(current);
                        parent.insert_entry(index, promoted_key, promoted_value);
                        parent.insert_child(index + 1, right_handle);
                        match ordering {
                            Ordering::Less => current = child,
                            Ordering::Equal => {
                                return Some(self.nodes.get_mut(current).replace_value(index, value));
                            }
                            Ordering::Greater => current = right_handle,
                        }
                    } else {
                        current = child;
                    }
                }
            }
        }
    }

    /// Removes a key with the top-down algorithm (the default deletion path).
    pub(crate) fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes a key and returns the entry.
    ///
    /// Even orders use the top-down algorithm. The pre-emptive discipline
    /// needs an even order - fusing two minimal children around a separator
    /// must fit within `max_keys`, and `2 * (ceil(m/2) - 1) + 1` exceeds
    /// `m - 1` when `m` is odd - so odd orders repair underflow bottom-up,
    /// where the fused child is already one key short and the merge fits
    /// exactly.
    pub(crate) fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        if self.order % 2 == 0 {
            self.remove_entry_top_down(key)
        } else {
            self.remove_entry_bottom_up(key)
        }
    }

    /// Top-down removal: rebalances pre-emptively on the way down so the
    /// final leaf removal is always safe. Requires an even order.
    fn remove_entry_top_down<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root?;
        // When the key is found in an internal node, its slot is refilled
        // with the in-order predecessor or successor pulled from a leaf.
        let mut swap_slot: Option<(Handle, usize)> = None;
        let mut toward_max = false;

        loop {
            if let Some((slot_handle, slot_index)) = swap_slot {
                let node = self.nodes.get(current);
                if node.is_leaf() {
                    let (k, v) = if toward_max {
                        self.nodes.get_mut(current).pop_entry()
                    } else {
                        self.nodes.get_mut(current).pop_front_entry()
                    };
                    self.len -= 1;
                    let removed = self.nodes.get_mut(slot_handle).replace_entry(slot_index, k, v);
                    return Some(removed);
                }
                let index = if toward_max { node.child_count() - 1 } else { 0 };
                current = self.prepare_child(current, index);
                continue;
            }

            let node = self.nodes.get(current);
            match node.search(key) {
                SearchResult::Found(index) => {
                    if node.is_leaf() {
                        let (k, v) = self.nodes.get_mut(current).remove_entry(index);
                        self.len -= 1;
                        if self.len == 0 {
                            self.nodes.clear();
                            self.root = None;
                        }
                        return Some((k, v));
                    }
                    let left = node.child(index);
                    let right = node.child(index + 1);
                    let left_count = self.nodes.get(left).key_count();
                    let right_count = self.nodes.get(right).key_count();
                    if left_count > self.min_keys() || right_count > self.min_keys() {
                        // Swap with whichever neighbor subtree is better
                        // stocked; ties go to the predecessor.
                        swap_slot = Some((current, index));
                        if left_count >= right_count {
                            toward_max = true;
                            current = left;
                        } else {
                            toward_max = false;
                            current = right;
                        }
                    } else {
                        // Neither adjacent child can spare a key; fuse them
                        // around the separator and keep searching inside.
                        current = self.merge_children(current, index);
                    }
                }
                SearchResult::NotFound(index) => {
                    if node.is_leaf() {
                        return None;
                    }
                    current = self.prepare_child(current, index);
                }
            }
        }
    }

    /// Removes a key with the bottom-up algorithm: the leaf entry is removed
    /// first and underflow repairs propagate upward. Equivalent to
    /// [`Self::remove_entry`] in contents; the resulting shape may differ.
    pub(crate) fn remove_entry_bottom_up<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let root = self.root?;
        let mut path: Path = SmallVec::new();
        let mut current = root;

        // Locate the key; if it sits in an internal node, continue to the
        // leaf holding its in-order predecessor (or successor).
        let (slot, leaf, leaf_index) = loop {
            let node = self.nodes.get(current);
            match node.search(key) {
                SearchResult::Found(index) => {
                    if node.is_leaf() {
                        break (None, current, index);
                    }
                    let left = node.child(index);
                    let right = node.child(index + 1);
                    let toward_max = self.nodes.get(left).key_count() >= self.nodes.get(right).key_count();
                    let slot = (current, index);
                    path.push((current, if toward_max { index } else { index + 1 }));
                    current = if toward_max { left } else { right };
                    loop {
                        let node = self.nodes.get(current);
                        if node.is_leaf() {
                            break;
                        }
                        let child_index = if toward_max { node.child_count() - 1 } else { 0 };
                        path.push((current, child_index));
                        current = node.child(child_index);
                    }
                    let index = if toward_max {
                        self.nodes.get(current).key_count() - 1
                    } else {
                        0
                    };
                    break (Some(slot), current, index);
                }
                SearchResult::NotFound(index) => {
                    if node.is_leaf() {
                        return None;
                    }
                    path.push((current, index));
                    current = node.child(index);
                }
            }
        };

        let (k, v) = self.nodes.get_mut(leaf).remove_entry(leaf_index);
        self.len -= 1;
        let removed = if let Some((slot_handle, slot_index)) = slot {
            self.nodes.get_mut(slot_handle).replace_entry(slot_index, k, v)
        } else {
            (k, v)
        };

        if self.len == 0 {
            self.nodes.clear();
            self.root = None;
            return Some(removed);
        }

        self.rebalance_upward(leaf, path);
        Some(removed)
    }

    /// Removes and returns the first key-value pair.
    pub(crate) fn pop_first(&mut self) -> Option<(K, V)> {
        self.remove_extreme(false)
    }

    /// Removes and returns the last key-value pair.
    pub(crate) fn pop_last(&mut self) -> Option<(K, V)> {
        self.remove_extreme(true)
    }

    fn remove_extreme(&mut self, toward_max: bool) -> Option<(K, V)> {
        // Same even/odd split as `remove_entry`.
        if self.order % 2 == 0 {
            self.remove_extreme_top_down(toward_max)
        } else {
            self.remove_extreme_bottom_up(toward_max)
        }
    }

    fn remove_extreme_top_down(&mut self, toward_max: bool) -> Option<(K, V)> {
        let mut current = self.root?;
        loop {
            let node = self.nodes.get(current);
            if node.is_leaf() {
                let pair = if toward_max {
                    self.nodes.get_mut(current).pop_entry()
                } else {
                    self.nodes.get_mut(current).pop_front_entry()
                };
                self.len -= 1;
                if self.len == 0 {
                    self.nodes.clear();
                    self.root = None;
                }
                return Some(pair);
            }
            let index = if toward_max { node.child_count() - 1 } else { 0 };
            current = self.prepare_child(current, index);
        }
    }

    fn remove_extreme_bottom_up(&mut self, toward_max: bool) -> Option<(K, V)> {
        let root = self.root?;
        let mut path: Path = SmallVec::new();
        let mut current = root;
        loop {
            let node = self.nodes.get(current);
            if node.is_leaf() {
                break;
            }
            let index = if toward_max { node.child_count() - 1 } else { 0 };
            path.push((current, index));
            current = node.child(index);
        }
        let node = self.nodes.get_mut(current);
        let pair = if toward_max { node.pop_entry() } else { node.pop_front_entry() };
        self.len -= 1;
        if self.len == 0 {
            self.nodes.clear();
            self.root = None;
            return Some(pair);
        }
        self.rebalance_upward(current, path);
        Some(pair)
    }

    /// Ensures the child at `index` can lose a key before the descent steps
    /// into it: borrow from the left sibling, else the right, else merge
    /// (preferring the left). Returns the handle to descend into, which is
    /// the fused node when a merge was needed.
    fn prepare_child(&mut self, parent: Handle, index: usize) -> Handle {
        let child = self.nodes.get(parent).child(index);
        if self.nodes.get(child).key_count() > self.min_keys() {
            return child;
        }
        if index > 0 {
            let left = self.nodes.get(parent).child(index - 1);
            if self.nodes.get(left).key_count() > self.min_keys() {
                self.borrow_from_left(parent, index);
                return child;
            }
        }
        if index + 1 < self.nodes.get(parent).child_count() {
            let right = self.nodes.get(parent).child(index + 1);
            if self.nodes.get(right).key_count() > self.min_keys() {
                self.borrow_from_right(parent, index);
                return child;
            }
        }
        if index > 0 {
            self.merge_children(parent, index - 1)
        } else {
            self.merge_children(parent, index)
        }
    }

    /// Rotates the rightmost entry of the left sibling through the parent
    /// into the head of the child at `index`.
    fn borrow_from_left(&mut self, parent: Handle, index: usize) {
        let left = self.nodes.get(parent).child(index - 1);
        let child = self.nodes.get(parent).child(index);

        let left_node = self.nodes.get_mut(left);
        let (left_key, left_value) = left_node.pop_entry();
        let moved_child = if left_node.is_leaf() { None } else { Some(left_node.pop_child()) };

        let (separator_key, separator_value) = self.nodes.get_mut(parent).replace_entry(index - 1, left_key, left_value);

        let child_node = self.nodes.get_mut(child);
        child_node.push_front_entry(separator_key, separator_value);
        if let Some(grandchild) = moved_child {
            child_node.push_front_child(grandchild);
        }
    }

    /// Mirror of [`Self::borrow_from_left`] for the right sibling.
    fn borrow_from_right(&mut self, parent: Handle, index: usize) {
        let right = self.nodes.get(parent).child(index + 1);
        let child = self.nodes.get(parent).child(index);

        let right_node = self.nodes.get_mut(right);
        let (right_key, right_value) = right_node.pop_front_entry();
        let moved_child = if right_node.is_leaf() { None } else { Some(right_node.pop_front_child()) };

        let (separator_key, separator_value) = self.nodes.get_mut(parent).replace_entry(index, right_key, right_value);

        let child_node = self.nodes.get_mut(child);
        child_node.push_entry(separator_key, separator_value);
        if let Some(grandchild) = moved_child {
            child_node.push_child(grandchild);
        }
    }

    /// Fuses children `index` and `index + 1` around separator `index`,
    /// collapsing the root if the merge empties it. Returns the fused node.
    fn merge_children(&mut self, parent: Handle, index: usize) -> Handle {
        let parent_node = self.nodes.get_mut(parent);
        let (separator_key, separator_value) = parent_node.remove_entry(index);
        let right = parent_node.remove_child(index + 1);
        let left = parent_node.child(index);

        let right_node = self.nodes.take(right);
        self.nodes.get_mut(left).merge_with_right(separator_key, separator_value, right_node);

        if self.root == Some(parent) && self.nodes.get(parent).key_count() == 0 {
            self.nodes.free(parent);
            self.root = Some(left);
        }
        left
    }

    /// Repairs underflow from a leaf upward after a bottom-up removal.
    /// Preference order: left borrow, right borrow, left merge, right merge.
    fn rebalance_upward(&mut self, mut current: Handle, mut path: Path) {
        while self.nodes.get(current).key_count() < self.min_keys() {
            let Some((parent, index)) = path.pop() else {
                // The root is exempt from the minimum; an internal root left
                // with no keys collapses into its only child.
                let node = self.nodes.get(current);
                if !node.is_leaf() && node.key_count() == 0 {
                    let only_child = node.child(0);
                    self.nodes.free(current);
                    self.root = Some(only_child);
                }
                return;
            };
            if index > 0 {
                let left = self.nodes.get(parent).child(index - 1);
                if self.nodes.get(left).key_count() > self.min_keys() {
                    self.borrow_from_left(parent, index);
                    return;
                }
            }
            if index + 1 < self.nodes.get(parent).child_count() {
                let right = self.nodes.get(parent).child(index + 1);
                if self.nodes.get(right).key_count() > self.min_keys() {
                    self.borrow_from_right(parent, index);
                    return;
                }
            }
            let merged = if index > 0 {
                self.merge_children(parent, index - 1)
            } else {
                self.merge_children(parent, index)
            };
            if self.root == Some(merged) {
                // The root collapsed into the fused child.
                return;
            }
            current = parent;
        }
    }

    /// Position of the minimum entry.
    pub(crate) fn first_pos(&self) -> Option<(Handle, usize)> {
        let mut current = self.root?;
        loop {
            let node = self.nodes.get(current);
            if node.is_leaf() {
                return Some((current, 0));
            }
            current = node.child(0);
        }
    }

    /// Position of the maximum entry.
    pub(crate) fn last_pos(&self) -> Option<(Handle, usize)> {
        let mut current = self.root?;
        loop {
            let node = self.nodes.get(current);
            if node.is_leaf() {
                return Some((current, node.key_count() - 1));
            }
            current = node.child(node.child_count() - 1);
        }
    }

    /// Position of the greatest key `<=` the given key. A single descent;
    /// when the answer is not on the descent path it is the last key passed
    /// on the left.
    pub(crate) fn floor_pos<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut best: Option<(Handle, usize)> = None;
        let mut current = self.root?;
        loop {
            let node = self.nodes.get(current);
            match node.search(key) {
                SearchResult::Found(index) => return Some((current, index)),
                SearchResult::NotFound(index) => {
                    if index > 0 {
                        best = Some((current, index - 1));
                    }
                    if node.is_leaf() {
                        return best;
                    }
                    current = node.child(index);
                }
            }
        }
    }

    /// Position of the least key `>=` the given key.
    pub(crate) fn ceiling_pos<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut best: Option<(Handle, usize)> = None;
        let mut current = self.root?;
        loop {
            let node = self.nodes.get(current);
            match node.search(key) {
                SearchResult::Found(index) => return Some((current, index)),
                SearchResult::NotFound(index) => {
                    if index < node.key_count() {
                        best = Some((current, index));
                    }
                    if node.is_leaf() {
                        return best;
                    }
                    current = node.child(index);
                }
            }
        }
    }

    /// Position of the greatest key strictly `<` the given key. An exact hit
    /// keeps descending into the left subtree of the match.
    pub(crate) fn predecessor_pos<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut best: Option<(Handle, usize)> = None;
        let mut current = self.root?;
        loop {
            let node = self.nodes.get(current);
            let index = match node.search(key) {
                SearchResult::Found(index) | SearchResult::NotFound(index) => index,
            };
            if index > 0 {
                best = Some((current, index - 1));
            }
            if node.is_leaf() {
                return best;
            }
            current = node.child(index);
        }
    }

    /// Position of the least key strictly `>` the given key.
    pub(crate) fn successor_pos<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut best: Option<(Handle, usize)> = None;
        let mut current = self.root?;
        loop {
            let node = self.nodes.get(current);
            let index = match node.search(key) {
                SearchResult::Found(index) => index + 1,
                SearchResult::NotFound(index) => index,
            };
            if index < node.key_count() {
                best = Some((current, index));
            }
            if node.is_leaf() {
                return best;
            }
            current = node.child(index);
        }
    }

    /// Returns the entry at a position produced by one of the `_pos` queries.
    pub(crate) fn entry_at(&self, position: (Handle, usize)) -> (&K, &V) {
        let node = self.nodes.get(position.0);
        (node.key(position.1), node.value(position.1))
    }

    /// Builds a frame stack positioned at the first key `>=` the given key
    /// (`inclusive`) or strictly `>` it. Frames record the descent so the
    /// in-order walk resumes correctly after returning from subtrees.
    pub(crate) fn seek_stack<Q>(&self, key: &Q, inclusive: bool) -> Vec<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut stack = Vec::new();
        let Some(mut current) = self.root else {
            return stack;
        };
        loop {
            let node = self.nodes.get(current);
            match node.search(key) {
                SearchResult::Found(index) => {
                    if inclusive {
                        stack.push((current, index));
                    } else if node.is_leaf() {
                        stack.push((current, index + 1));
                    } else {
                        // The next greater key is the minimum of the child to
                        // the right of the match.
                        stack.push((current, index + 1));
                        let mut child = node.child(index + 1);
                        loop {
                            let child_node = self.nodes.get(child);
                            stack.push((child, 0));
                            if child_node.is_leaf() {
                                break;
                            }
                            child = child_node.child(0);
                        }
                    }
                    return stack;
                }
                SearchResult::NotFound(index) => {
                    stack.push((current, index));
                    if node.is_leaf() {
                        return stack;
                    }
                    current = node.child(index);
                }
            }
        }
    }

    /// Drains the tree into an ascending vector of entries.
    pub(crate) fn drain_to_vec(&mut self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.len);
        if let Some(root) = self.root.take() {
            self.drain_node(root, &mut out);
        }
        self.nodes.clear();
        self.len = 0;
        out
    }

    fn drain_node(&mut self, handle: Handle, out: &mut Vec<(K, V)>) {
        let mut node = self.nodes.take(handle);
        let (keys, values) = node.take_entries();
        if node.is_leaf() {
            out.extend(keys.into_iter().zip(values));
            return;
        }
        let children = node.take_children();
        let mut entries = keys.into_iter().zip(values);
        for child in children {
            self.drain_node(child, out);
            if let Some(pair) = entries.next() {
                out.push(pair);
            }
        }
    }

    /// Builds a tree from ascending entries in linear time. The input must be
    /// strictly ascending by key; this is checked in debug builds only.
    pub(crate) fn from_sorted_vec(order: usize, items: Vec<(K, V)>) -> Self {
        let mut tree = Self::new(order);
        debug_assert!(
            items.windows(2).all(|pair| pair[0].0 < pair[1].0),
            "`RawBTree::from_sorted_vec()` - input keys must be strictly ascending!"
        );

        let count = items.len();
        if count == 0 {
            return tree;
        }
        if count <= tree.max_keys() {
            let mut leaf = BTreeNode::with_capacity(order);
            for (k, v) in items {
                leaf.push_entry(k, v);
            }
            tree.root = Some(tree.nodes.alloc(leaf));
            tree.len = count;
            return tree;
        }
        tree.len = count;

        // Leaf level: groups of `order` items; each full group's last pair is
        // promoted as the separator following its leaf.
        let mut level: Vec<(Handle, Option<(K, V)>)> = Vec::new();
        let mut items = items.into_iter();
        let mut remaining = count;
        while remaining > order {
            let mut leaf = BTreeNode::with_capacity(order);
            for _ in 0..order - 1 {
                let (k, v) = items.next().expect("`RawBTree::from_sorted_vec()` - input ended early!");
                leaf.push_entry(k, v);
            }
            let promoted = items.next().expect("`RawBTree::from_sorted_vec()` - input ended early!");
            level.push((tree.nodes.alloc(leaf), Some(promoted)));
            remaining -= order;
        }
        let mut tail = BTreeNode::with_capacity(order);
        for (k, v) in items {
            tail.push_entry(k, v);
        }
        level.push((tree.nodes.alloc(tail), None));
        tree.fix_leaf_tail(&mut level);

        while level.len() > 1 {
            level = tree.build_internal_level(level);
        }
        tree.root = Some(level[0].0);
        tree
    }

    /// Restores occupancy bounds for the final leaf of a bulk load: a packed
    /// tail (input length divisible by the order) splits, an under-filled
    /// tail rebalances with its left neighbor.
    fn fix_leaf_tail(&mut self, level: &mut Vec<(Handle, Option<(K, V)>)>) {
        let order = self.order;
        let min_keys = self.min_keys();
        let split_index = self.split_index();

        let tail = level.last().expect("`RawBTree::fix_leaf_tail()` - empty level!").0;
        let tail_count = self.nodes.get(tail).key_count();

        if tail_count == order {
            let (promoted_key, promoted_value, right) = self.nodes.get_mut(tail).split_off(split_index, order);
            let right_handle = self.nodes.alloc(right);
            let last = level.len() - 1;
            level[last].1 = Some((promoted_key, promoted_value));
            level.push((right_handle, None));
        } else if tail_count < min_keys && level.len() > 1 {
            // Pool the previous leaf, the separator promoted out of it, and
            // the tail; re-split around the median.
            let previous_index = level.len() - 2;
            let previous = level[previous_index].0;
            let (separator_key, separator_value) = level[previous_index]
                .1
                .take()
                .expect("`RawBTree::fix_leaf_tail()` - full groups always promote!");

            let (tail_keys, tail_values) = self.nodes.get_mut(tail).take_entries();
            let previous_node = self.nodes.get_mut(previous);
            previous_node.push_entry(separator_key, separator_value);
            for (k, v) in tail_keys.into_iter().zip(tail_values) {
                previous_node.push_entry(k, v);
            }

            let total = previous_node.key_count();
            let (promoted_key, promoted_value, right) = previous_node.split_off((total - 1) / 2, order);
            level[previous_index].1 = Some((promoted_key, promoted_value));
            *self.nodes.get_mut(tail) = right;
        }
    }

    /// Builds one internal level above `children`: batches of `order` nodes,
    /// separator keys taken from the pairs promoted out of each batch member
    /// except the last, whose pair is promoted further up. The final batch is
    /// rebalanced with its left neighbor when it arrives under-filled.
    fn build_internal_level(&mut self, children: Vec<(Handle, Option<(K, V)>)>) -> Vec<(Handle, Option<(K, V)>)> {
        let order = self.order;
        let min_children = self.min_keys() + 1;

        let mut level: Vec<(Handle, Option<(K, V)>)> = Vec::new();
        let mut remaining = children.len();
        let mut children = children.into_iter();

        loop {
            let batch = if remaining > order { order } else { remaining };
            let mut node = BTreeNode::with_capacity(order);
            let mut promoted = None;
            for position in 0..batch {
                let (child, pair) = children.next().expect("`RawBTree::build_internal_level()` - batch ended early!");
                node.push_child(child);
                if position + 1 < batch {
                    let (k, v) = pair.expect("`RawBTree::build_internal_level()` - interior child missing promotion!");
                    node.push_entry(k, v);
                } else {
                    promoted = pair;
                }
            }
            level.push((self.nodes.alloc(node), promoted));
            remaining -= batch;
            if remaining == 0 {
                break;
            }
        }

        // Rebalance an under-filled final node with its left neighbor by
        // rotating children across, one at a time.
        if level.len() > 1 {
            let tail_index = level.len() - 1;
            let previous_index = tail_index - 1;
            let tail = level[tail_index].0;
            let previous = level[previous_index].0;
            let tail_children = self.nodes.get(tail).child_count();
            let previous_children = self.nodes.get(previous).child_count();
            if tail_children < min_children {
                let target = (tail_children + previous_children).div_ceil(2);
                for _ in 0..target - tail_children {
                    let (separator_key, separator_value) = level[previous_index]
                        .1
                        .take()
                        .expect("`RawBTree::build_internal_level()` - neighbor missing promotion!");
                    let previous_node = self.nodes.get_mut(previous);
                    let moved = previous_node.pop_child();
                    let new_promotion = previous_node.pop_entry();
                    let tail_node = self.nodes.get_mut(tail);
                    tail_node.push_front_entry(separator_key, separator_value);
                    tail_node.push_front_child(moved);
                    level[previous_index].1 = Some(new_promotion);
                }
            }
        }

        level
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::String;
    use alloc::vec;
    use core::fmt::Debug;
    use proptest::prelude::*;

    impl<K: Ord + Debug, V> RawBTree<K, V> {
        /// Validates every structural invariant, panicking with a description
        /// of all violations found. Test-only.
        pub(crate) fn validate_invariants(&self) {
            let mut errors: Vec<String> = Vec::new();
            let Some(root) = self.root else {
                assert_eq!(self.len, 0, "empty tree should have len 0");
                return;
            };

            let mut leaf_depth: Option<usize> = None;
            let mut count = 0usize;
            self.validate_node(root, 0, None, None, &mut leaf_depth, &mut count, &mut errors);

            if count != self.len {
                errors.push(format!("len mismatch: self.len={}, actual count={count}", self.len));
            }
            let root_node = self.nodes.get(root);
            if root_node.key_count() == 0 {
                errors.push(format!("root has no keys (len={})", self.len));
            }
            if !root_node.is_leaf() && root_node.child_count() < 2 {
                errors.push(format!("internal root has {} children", root_node.child_count()));
            }

            assert!(errors.is_empty(), "tree invariant violations:\n{}", errors.join("\n"));
        }

        #[allow(clippy::too_many_arguments)]
        fn validate_node(
            &self,
            handle: Handle,
            depth: usize,
            lower: Option<&K>,
            upper: Option<&K>,
            leaf_depth: &mut Option<usize>,
            count: &mut usize,
            errors: &mut Vec<String>,
        ) {
            let node = self.nodes.get(handle);
            *count += node.key_count();

            if Some(handle) != self.root {
                if node.key_count() < self.min_keys() {
                    errors.push(format!(
                        "node {handle:?} holds {} keys, minimum is {}",
                        node.key_count(),
                        self.min_keys()
                    ));
                }
                if node.key_count() > self.max_keys() {
                    errors.push(format!(
                        "node {handle:?} holds {} keys, maximum is {}",
                        node.key_count(),
                        self.max_keys()
                    ));
                }
            }

            for i in 0..node.key_count() {
                let key = node.key(i);
                if i > 0 && node.key(i - 1) >= key {
                    errors.push(format!("node {handle:?} keys not ascending at {i}"));
                }
                if let Some(lower) = lower
                    && key <= lower
                {
                    errors.push(format!("node {handle:?} key {key:?} violates lower bound {lower:?}"));
                }
                if let Some(upper) = upper
                    && key >= upper
                {
                    errors.push(format!("node {handle:?} key {key:?} violates upper bound {upper:?}"));
                }
            }

            if node.is_leaf() {
                match *leaf_depth {
                    None => *leaf_depth = Some(depth),
                    Some(expected) => {
                        if depth != expected {
                            errors.push(format!("leaf {handle:?} at depth {depth}, expected {expected}"));
                        }
                    }
                }
                return;
            }

            if node.child_count() != node.key_count() + 1 {
                errors.push(format!(
                    "node {handle:?} has {} children for {} keys",
                    node.child_count(),
                    node.key_count()
                ));
                return;
            }
            for i in 0..node.child_count() {
                let child_lower = if i == 0 { lower } else { Some(node.key(i - 1)) };
                let child_upper = if i == node.key_count() { upper } else { Some(node.key(i)) };
                self.validate_node(node.child(i), depth + 1, child_lower, child_upper, leaf_depth, count, errors);
            }
        }

        fn entries_in_order(&self) -> Vec<(K, V)>
        where
            K: Clone,
            V: Clone,
        {
            let mut out = Vec::with_capacity(self.len);
            if let Some(root) = self.root {
                self.collect_node(root, &mut out);
            }
            out
        }

        fn collect_node(&self, handle: Handle, out: &mut Vec<(K, V)>)
        where
            K: Clone,
            V: Clone,
        {
            let node = self.nodes.get(handle);
            if node.is_leaf() {
                for i in 0..node.key_count() {
                    out.push((node.key(i).clone(), node.value(i).clone()));
                }
                return;
            }
            for i in 0..node.child_count() {
                self.collect_node(node.child(i), out);
                if i < node.key_count() {
                    out.push((node.key(i).clone(), node.value(i).clone()));
                }
            }
        }
    }

    #[test]
    #[should_panic(expected = "`order` must be at least 3")]
    fn rejects_tiny_order() {
        let _ = RawBTree::<i32, i32>::new(2);
    }

    #[test]
    fn bulk_load_matches_incremental() {
        for order in [3, 4, 5, 7, 8, 16] {
            for count in [0usize, 1, 2, 5, 15, 16, 17, 31, 32, 33, 64, 100, 255, 256, 257] {
                let items: Vec<(i32, i32)> = (0..count as i32).map(|k| (k, k * 2)).collect();
                let tree = RawBTree::from_sorted_vec(order, items.clone());
                tree.validate_invariants();
                assert_eq!(tree.entries_in_order(), items, "order={order} count={count}");

                let bound = if count <= 1 {
                    1
                } else {
                    let min_children = order.div_ceil(2);
                    (count as f64).log(min_children as f64).ceil() as usize + 1
                };
                assert!(tree.height() <= bound, "order={order} count={count} height={}", tree.height());
            }
        }
    }

    #[test]
    fn delete_algorithms_agree_on_contents() {
        for order in [3, 4, 5, 16] {
            let mut top_down = RawBTree::new(order);
            let mut bottom_up = RawBTree::new(order);
            let keys: Vec<i64> = (0..200).map(|i| (i * 37) % 199).collect();
            for &k in &keys {
                top_down.insert(k, k);
                bottom_up.insert(k, k);
            }
            for &k in keys.iter().step_by(2) {
                assert_eq!(top_down.remove(&k), bottom_up.remove_entry_bottom_up(&k).map(|(_, v)| v));
                top_down.validate_invariants();
                bottom_up.validate_invariants();
            }
            assert_eq!(top_down.entries_in_order(), bottom_up.entries_in_order());
        }
    }

    #[derive(Clone, Debug)]
    enum Op {
        Insert(i32, i32),
        InsertTopDown(i32, i32),
        Remove(i32),
        RemoveBottomUp(i32),
        PopFirst,
        PopLast,
        Update(i32, i32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let key = -300i32..300;
        prop_oneof![
            5 => (key.clone(), any::<i32>()).prop_map(|(k, v)| Op::Insert(k, v)),
            3 => (key.clone(), any::<i32>()).prop_map(|(k, v)| Op::InsertTopDown(k, v)),
            4 => key.clone().prop_map(Op::Remove),
            2 => key.clone().prop_map(Op::RemoveBottomUp),
            1 => Just(Op::PopFirst),
            1 => Just(Op::PopLast),
            1 => (key, any::<i32>()).prop_map(|(k, v)| Op::Update(k, v)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Random operation sequences preserve every structural invariant and
        /// agree with `std::collections::BTreeMap` at each step. Orders are
        /// kept even so the pre-emptive insert path stays in play.
        #[test]
        fn random_ops_hold_invariants(
            order in prop_oneof![Just(4usize), Just(6), Just(8), Just(16)],
            ops in prop::collection::vec(op_strategy(), 1..400),
        ) {
            let mut tree = RawBTree::new(order);
            let mut model = std::collections::BTreeMap::new();
            for op in ops {
                match op {
                    Op::Insert(k, v) => {
                        prop_assert_eq!(tree.insert(k, v), model.insert(k, v));
                    }
                    Op::InsertTopDown(k, v) => {
                        prop_assert_eq!(tree.insert_top_down(k, v), model.insert(k, v));
                    }
                    Op::Remove(k) => {
                        prop_assert_eq!(tree.remove(&k), model.remove(&k));
                    }
                    Op::RemoveBottomUp(k) => {
                        prop_assert_eq!(tree.remove_entry_bottom_up(&k).map(|(_, v)| v), model.remove(&k));
                    }
                    Op::PopFirst => {
                        prop_assert_eq!(tree.pop_first(), model.pop_first());
                    }
                    Op::PopLast => {
                        prop_assert_eq!(tree.pop_last(), model.pop_last());
                    }
                    Op::Update(k, v) => {
                        let expected = model.get_mut(&k).map(|slot| core::mem::replace(slot, v));
                        prop_assert_eq!(tree.update(&k, v), expected);
                    }
                }
                tree.validate_invariants();
                prop_assert_eq!(tree.len(), model.len());
            }
            let entries: Vec<_> = model.into_iter().collect();
            prop_assert_eq!(tree.entries_in_order(), entries);
        }

        /// Odd orders exercise the bottom-up insert and both delete paths.
        #[test]
        fn random_ops_hold_invariants_odd_orders(
            order in prop_oneof![Just(3usize), Just(5), Just(7)],
            ops in prop::collection::vec(op_strategy(), 1..300),
        ) {
            let mut tree = RawBTree::new(order);
            let mut model = std::collections::BTreeMap::new();
            for op in ops {
                match op {
                    Op::Insert(k, v) | Op::InsertTopDown(k, v) => {
                        prop_assert_eq!(tree.insert(k, v), model.insert(k, v));
                    }
                    Op::Remove(k) => {
                        prop_assert_eq!(tree.remove(&k), model.remove(&k));
                    }
                    Op::RemoveBottomUp(k) => {
                        prop_assert_eq!(tree.remove_entry_bottom_up(&k).map(|(_, v)| v), model.remove(&k));
                    }
                    Op::PopFirst => {
                        prop_assert_eq!(tree.pop_first(), model.pop_first());
                    }
                    Op::PopLast => {
                        prop_assert_eq!(tree.pop_last(), model.pop_last());
                    }
                    Op::Update(k, v) => {
                        let expected = model.get_mut(&k).map(|slot| core::mem::replace(slot, v));
                        prop_assert_eq!(tree.update(&k, v), expected);
                    }
                }
                tree.validate_invariants();
            }
        }
    }

    #[test]
    fn neighbor_positions() {
        let tree = RawBTree::from_sorted_vec(4, vec![(10, ()), (20, ()), (30, ()), (40, ()), (50, ())]);
        let key = |pos| *tree.entry_at(pos).0;

        assert_eq!(tree.floor_pos(&30).map(key), Some(30));
        assert_eq!(tree.floor_pos(&35).map(key), Some(30));
        assert_eq!(tree.floor_pos(&9).map(key), None);
        assert_eq!(tree.ceiling_pos(&30).map(key), Some(30));
        assert_eq!(tree.ceiling_pos(&35).map(key), Some(40));
        assert_eq!(tree.ceiling_pos(&51).map(key), None);
        assert_eq!(tree.predecessor_pos(&30).map(key), Some(20));
        assert_eq!(tree.predecessor_pos(&10).map(key), None);
        assert_eq!(tree.successor_pos(&30).map(key), Some(40));
        assert_eq!(tree.successor_pos(&50).map(key), None);
    }
}
