use alloc::vec::Vec;
use core::borrow::Borrow;

use smallvec::SmallVec;

use super::node::{InternalNode, LeafNode, MIN_ORDER, Node, SearchResult};
use crate::raw::{Arena, Handle};

/// The core B+Tree implementation backing `BPlusTree`.
///
/// Key/value pairs live only in leaves; internal nodes hold index-only
/// separator keys. Leaves form a doubly-linked chain in key order. Values are
/// stored in their own arena and referenced from leaves by handle.
///
/// Insertion is bottom-up (split propagation along the recorded path);
/// deletion is top-down (borrow or merge before descending into a minimal
/// child). Separators are never rewritten by plain removals, so a separator
/// may name a key no longer present in any leaf; presence is authoritative at
/// the leaf.
#[derive(Clone)]
pub(crate) struct RawBPlusTree<K, V> {
    /// Arena storing all tree nodes.
    nodes: Arena<Node<K>>,
    /// Arena storing all values, separate from nodes.
    values: Arena<V>,
    /// Handle to the root node, if the tree is non-empty.
    root: Option<Handle>,
    /// Total number of key-value pairs in the tree.
    len: usize,
    /// Knuth order: the maximum number of children per internal node.
    order: usize,
    /// Leftmost leaf, for forward iteration.
    first_leaf: Option<Handle>,
    /// Rightmost leaf, for backward iteration.
    last_leaf: Option<Handle>,
}

/// Path element stack for bottom-up insertion.
type Path = SmallVec<[(Handle, usize); 16]>;

impl<K, V> RawBPlusTree<K, V> {
    pub(crate) fn new(order: usize) -> Self {
        assert!(order >= MIN_ORDER, "`RawBPlusTree::new()` - `order` must be at least {MIN_ORDER}!");
        Self {
            nodes: Arena::new(),
            values: Arena::new(),
            root: None,
            len: 0,
            order,
            first_leaf: None,
            last_leaf: None,
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

    /// Maximum separator keys an internal node may hold.
    pub(crate) const fn max_keys(&self) -> usize {
        self.order - 1
    }

    /// Maximum entries a leaf may hold. Leaves own the data and get one more
    /// slot than internal nodes have separators.
    pub(crate) const fn max_leaf_keys(&self) -> usize {
        self.order
    }

    /// Minimum keys a non-root node must hold.
    pub(crate) const fn min_keys(&self) -> usize {
        self.order.div_ceil(2) - 1
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.values.clear();
        self.root = None;
        self.len = 0;
        self.first_leaf = None;
        self.last_leaf = None;
    }

    pub(crate) fn root(&self) -> Option<Handle> {
        self.root
    }

    pub(crate) fn first_leaf(&self) -> Option<Handle> {
        self.first_leaf
    }

    pub(crate) fn last_leaf(&self) -> Option<Handle> {
        self.last_leaf
    }

    pub(crate) fn node(&self, handle: Handle) -> &Node<K> {
        self.nodes.get(handle)
    }

    pub(crate) fn value(&self, handle: Handle) -> &V {
        self.values.get(handle)
    }

    /// Number of node levels from the root to the leaves (empty tree = 0).
    pub(crate) fn height(&self) -> usize {
        let mut height = 0;
        let mut current = self.root;
        while let Some(handle) = current {
            height += 1;
            current = match self.nodes.get(handle) {
                Node::Internal(internal) => Some(internal.child(0)),
                Node::Leaf(_) => None,
            };
        }
        height
    }

    fn node_key_count(&self, handle: Handle) -> usize {
        self.nodes.get(handle).key_count()
    }
}

impl<K: Clone + Ord, V> RawBPlusTree<K, V> {
    /// Descends to the leaf and index holding the key.
    pub(crate) fn find<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root?;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => {
                    current = internal.child(internal.search_child(key));
                }
                Node::Leaf(leaf) => {
                    if let SearchResult::Found(index) = leaf.search(key) {
                        return Some((current, index));
                    }
                    return None;
                }
            }
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf, index) = self.find(key)?;
        Some(self.values.get(self.nodes.get(leaf).as_leaf().value(index)))
    }

    pub(crate) fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf, index) = self.find(key)?;
        let handle = self.nodes.get(leaf).as_leaf().value(index);
        Some(self.values.get_mut(handle))
    }

    pub(crate) fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf, index) = self.find(key)?;
        let leaf = self.nodes.get(leaf).as_leaf();
        Some((leaf.key(index), self.values.get(leaf.value(index))))
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
        let (leaf, index) = self.find(key)?;
        let handle = self.nodes.get(leaf).as_leaf().value(index);
        Some(core::mem::replace(self.values.get_mut(handle), value))
    }

    /// Inserts a key-value pair (bottom-up), replacing and returning the old
    /// value when the key exists.
    pub(crate) fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.insert_inner(key, value, true).1
    }

    /// Inserts only when the key is absent; returns whether it was inserted.
    pub(crate) fn insert_if_absent(&mut self, key: K, value: V) -> bool {
        self.insert_inner(key, value, false).0
    }

    fn insert_inner(&mut self, key: K, value: V, overwrite: bool) -> (bool, Option<V>) {
        let Some(root) = self.root else {
            let value_handle = self.values.alloc(value);
            let mut leaf = LeafNode::with_capacity(self.order);
            leaf.push(key, value_handle);
            let leaf_handle = self.nodes.alloc(Node::Leaf(leaf));
            self.root = Some(leaf_handle);
            self.first_leaf = Some(leaf_handle);
            self.last_leaf = Some(leaf_handle);
            self.len = 1;
            return (true, None);
        };

        // Descend to the leaf, recording the ancestor path.
        let mut path: Path = SmallVec::new();
        let mut current = root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => {
                    let child_index = internal.search_child(&key);
                    path.push((current, child_index));
                    current = internal.child(child_index);
                }
                Node::Leaf(_) => break,
            }
        }

        let leaf = self.nodes.get_mut(current).as_leaf_mut();
        match leaf.search(&key) {
            SearchResult::Found(index) => {
                if overwrite {
                    // Replace in place to avoid alloc/free churn.
                    let value_handle = leaf.value(index);
                    let old = core::mem::replace(self.values.get_mut(value_handle), value);
                    (false, Some(old))
                } else {
                    (false, None)
                }
            }
            SearchResult::NotFound(index) => {
                let value_handle = self.values.alloc(value);
                let leaf = self.nodes.get_mut(current).as_leaf_mut();
                leaf.insert(index, key, value_handle);
                self.len += 1;
                if self.nodes.get(current).key_count() > self.max_leaf_keys() {
                    self.split_leaf_and_propagate(current, path);
                }
                (true, None)
            }
        }
    }

    /// Splits an overflowing leaf, stitches the chain, and propagates the
    /// split upward. The separator copied into the parent is the first key of
    /// the new right sibling; the leaves keep the data.
    fn split_leaf_and_propagate(&mut self, leaf_handle: Handle, path: Path) {
        let order = self.order;
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let mut right = leaf.split(order);
        let separator = right.key(0).clone();

        let old_next = leaf.next();
        right.set_prev(Some(leaf_handle));
        right.set_next(old_next);
        let right_handle = self.nodes.alloc(Node::Leaf(right));

        self.nodes.get_mut(leaf_handle).as_leaf_mut().set_next(Some(right_handle));
        if let Some(next) = old_next {
            self.nodes.get_mut(next).as_leaf_mut().set_prev(Some(right_handle));
        }
        if self.last_leaf == Some(leaf_handle) {
            self.last_leaf = Some(right_handle);
        }

        self.propagate_split(path, separator, right_handle);
    }

    /// Inserts a separator and child into the parent, splitting internal
    /// nodes upward while they overflow. Internal splits promote (move) the
    /// median key, because internal keys are pure indices.
    fn propagate_split(&mut self, mut path: Path, mut separator: K, mut new_child: Handle) {
        while let Some((parent, index)) = path.pop() {
            let parent_node = self.nodes.get_mut(parent).as_internal_mut();
            parent_node.insert_child(index, separator, new_child);
            if parent_node.key_count() <= self.order - 1 {
                return;
            }
            let order = self.order;
            let (median, right) = self.nodes.get_mut(parent).as_internal_mut().split(order);
            separator = median;
            new_child = self.nodes.alloc(Node::Internal(right));
        }

        // The split reached the old root; grow a level.
        let old_root = self.root.expect("`RawBPlusTree::propagate_split()` - root vanished!");
        let mut new_root = InternalNode::with_capacity(self.order);
        new_root.set_first_child(old_root);
        new_root.push_last(separator, new_child);
        self.root = Some(self.nodes.alloc(Node::Internal(new_root)));
    }

    /// Removes a key, rebalancing top-down on the descent.
    pub(crate) fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes a key and returns the entry. The final leaf removal never
    /// rewrites separators, which may therefore keep naming the removed key.
    ///
    /// Even orders rebalance top-down on the descent: before stepping into a
    /// child at its occupancy minimum, borrow from a sibling or merge, in
    /// preference order left borrow, right borrow, left merge, right merge.
    /// The pre-emptive internal merge (`2 * (ceil(m/2) - 1) + 1` keys) only
    /// fits within `m - 1` when `m` is even; odd orders repair underflow
    /// bottom-up after the removal instead, where the fused child is already
    /// one key short.
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

    fn remove_entry_top_down<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root?;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => {
                    let child_index = internal.search_child(key);
                    current = self.prepare_child(current, child_index);
                }
                Node::Leaf(leaf) => {
                    let index = match leaf.search(key) {
                        SearchResult::Found(index) => index,
                        SearchResult::NotFound(_) => return None,
                    };
                    let (removed_key, value_handle) = self.nodes.get_mut(current).as_leaf_mut().remove(index);
                    let removed_value = self.values.take(value_handle);
                    self.len -= 1;
                    if self.len == 0 {
                        self.nodes.clear();
                        self.root = None;
                        self.first_leaf = None;
                        self.last_leaf = None;
                    }
                    return Some((removed_key, removed_value));
                }
            }
        }
    }

    fn remove_entry_bottom_up<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let root = self.root?;
        let mut path: Path = SmallVec::new();
        let mut current = root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => {
                    let child_index = internal.search_child(key);
                    path.push((current, child_index));
                    current = internal.child(child_index);
                }
                Node::Leaf(_) => break,
            }
        }

        let leaf = self.nodes.get_mut(current).as_leaf_mut();
        let index = match leaf.search(key) {
            SearchResult::Found(index) => index,
            SearchResult::NotFound(_) => return None,
        };
        let (removed_key, value_handle) = leaf.remove(index);
        let removed_value = self.values.take(value_handle);
        self.len -= 1;
        if self.len == 0 {
            self.nodes.clear();
            self.root = None;
            self.first_leaf = None;
            self.last_leaf = None;
            return Some((removed_key, removed_value));
        }

        // Repair underflow from the leaf upward; same preference order as
        // the top-down path.
        loop {
            if self.nodes.get(current).key_count() >= self.min_keys() {
                break;
            }
            let Some((parent, index)) = path.pop() else {
                // The root is exempt from the minimum; an internal root left
                // without keys collapses into its only child.
                if let Node::Internal(internal) = self.nodes.get(current)
                    && internal.key_count() == 0
                {
                    let only_child = internal.child(0);
                    self.nodes.free(current);
                    self.root = Some(only_child);
                }
                break;
            };
            if index > 0 {
                let left = self.nodes.get(parent).as_internal().child(index - 1);
                if self.node_key_count(left) > self.min_keys() {
                    self.borrow_from_left(parent, index);
                    break;
                }
            }
            if index + 1 < self.nodes.get(parent).as_internal().child_count() {
                let right = self.nodes.get(parent).as_internal().child(index + 1);
                if self.node_key_count(right) > self.min_keys() {
                    self.borrow_from_right(parent, index);
                    break;
                }
            }
            let merged = if index > 0 {
                self.merge_children(parent, index - 1)
            } else {
                self.merge_children(parent, index)
            };
            if self.root == Some(merged) {
                // The root collapsed into the fused child.
                break;
            }
            current = parent;
        }

        Some((removed_key, removed_value))
    }

    /// Removes and returns the first key-value pair.
    pub(crate) fn pop_first(&mut self) -> Option<(K, V)> {
        let first = self.first_leaf?;
        let key = self.nodes.get(first).as_leaf().key(0).clone();
        self.remove_entry(&key)
    }

    /// Removes and returns the last key-value pair.
    pub(crate) fn pop_last(&mut self) -> Option<(K, V)> {
        let last = self.last_leaf?;
        let leaf = self.nodes.get(last).as_leaf();
        let key = leaf.key(leaf.key_count() - 1).clone();
        self.remove_entry(&key)
    }

    /// Ensures the child at `index` can lose a key before the descent steps
    /// into it. Returns the handle to descend into, which is the fused node
    /// when a merge was required.
    fn prepare_child(&mut self, parent: Handle, index: usize) -> Handle {
        let child = self.nodes.get(parent).as_internal().child(index);
        if self.node_key_count(child) > self.min_keys() {
            return child;
        }
        if index > 0 {
            let left = self.nodes.get(parent).as_internal().child(index - 1);
            if self.node_key_count(left) > self.min_keys() {
                self.borrow_from_left(parent, index);
                return child;
            }
        }
        if index + 1 < self.nodes.get(parent).as_internal().child_count() {
            let right = self.nodes.get(parent).as_internal().child(index + 1);
            if self.node_key_count(right) > self.min_keys() {
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

    /// Moves the left sibling's last entry (leaf) or edge key and child
    /// (internal) into the child at `index`, refreshing the separator.
    fn borrow_from_left(&mut self, parent: Handle, index: usize) {
        let left = self.nodes.get(parent).as_internal().child(index - 1);
        let child = self.nodes.get(parent).as_internal().child(index);

        if self.nodes.get(child).is_leaf() {
            let (key, value_handle) = self.nodes.get_mut(left).as_leaf_mut().pop();
            let separator = key.clone();
            self.nodes.get_mut(child).as_leaf_mut().push_front(key, value_handle);
            self.nodes.get_mut(parent).as_internal_mut().set_key(index - 1, separator);
        } else {
            let (left_key, left_child) = self.nodes.get_mut(left).as_internal_mut().pop_last();
            let separator = self.nodes.get_mut(parent).as_internal_mut().replace_key(index - 1, left_key);
            self.nodes.get_mut(child).as_internal_mut().push_first(separator, left_child);
        }
    }

    /// Mirror of [`Self::borrow_from_left`] for the right sibling.
    fn borrow_from_right(&mut self, parent: Handle, index: usize) {
        let right = self.nodes.get(parent).as_internal().child(index + 1);
        let child = self.nodes.get(parent).as_internal().child(index);

        if self.nodes.get(child).is_leaf() {
            let (key, value_handle) = self.nodes.get_mut(right).as_leaf_mut().pop_front();
            let separator = self.nodes.get(right).as_leaf().key(0).clone();
            self.nodes.get_mut(child).as_leaf_mut().push(key, value_handle);
            self.nodes.get_mut(parent).as_internal_mut().set_key(index, separator);
        } else {
            let (right_key, right_child) = self.nodes.get_mut(right).as_internal_mut().pop_first();
            let separator = self.nodes.get_mut(parent).as_internal_mut().replace_key(index, right_key);
            self.nodes.get_mut(child).as_internal_mut().push_last(separator, right_child);
        }
    }

    /// Fuses children `index` and `index + 1` around separator `index`,
    /// repairing the leaf chain and collapsing the root if the merge empties
    /// it. Merging leaves discards the separator (it is index-only); merging
    /// internal nodes slots it between the separator lists. Returns the fused
    /// node.
    fn merge_children(&mut self, parent: Handle, index: usize) -> Handle {
        let (separator, right_handle) = self.nodes.get_mut(parent).as_internal_mut().remove_separator(index);
        let left_handle = self.nodes.get(parent).as_internal().child(index);

        match self.nodes.take(right_handle) {
            Node::Leaf(right) => {
                let next = right.next();
                self.nodes.get_mut(left_handle).as_leaf_mut().merge_with_right(right);
                if let Some(next) = next {
                    self.nodes.get_mut(next).as_leaf_mut().set_prev(Some(left_handle));
                }
                if self.last_leaf == Some(right_handle) {
                    self.last_leaf = Some(left_handle);
                }
            }
            Node::Internal(right) => {
                self.nodes.get_mut(left_handle).as_internal_mut().merge_with_right(separator, right);
            }
        }

        if self.root == Some(parent) && self.nodes.get(parent).key_count() == 0 {
            self.nodes.free(parent);
            self.root = Some(left_handle);
        }
        left_handle
    }

    /// Position of the first key `>=` the given key, or `None` when every
    /// key is smaller.
    pub(crate) fn lower_bound<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf, index) = self.descend_to_leaf(key)?;
        match index {
            SearchResult::Found(index) => Some((leaf, index)),
            SearchResult::NotFound(index) => self.position_or_next(leaf, index),
        }
    }

    /// Position of the first key strictly `>` the given key.
    pub(crate) fn upper_bound<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf, index) = self.descend_to_leaf(key)?;
        match index {
            SearchResult::Found(index) => self.position_or_next(leaf, index + 1),
            SearchResult::NotFound(index) => self.position_or_next(leaf, index),
        }
    }

    /// Position of the last key `<=` the given key.
    pub(crate) fn upper_bound_inclusive<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf, index) = self.descend_to_leaf(key)?;
        match index {
            SearchResult::Found(index) => Some((leaf, index)),
            SearchResult::NotFound(index) => self.position_or_prev(leaf, index),
        }
    }

    /// Position of the last key strictly `<` the given key.
    pub(crate) fn lower_bound_exclusive<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf, index) = self.descend_to_leaf(key)?;
        let index = match index {
            SearchResult::Found(index) | SearchResult::NotFound(index) => index,
        };
        self.position_or_prev(leaf, index)
    }

    fn descend_to_leaf<Q>(&self, key: &Q) -> Option<(Handle, SearchResult)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root?;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => {
                    current = internal.child(internal.search_child(key));
                }
                Node::Leaf(leaf) => return Some((current, leaf.search(key))),
            }
        }
    }

    /// Resolves a leaf index to a position, spilling into the next leaf when
    /// the index falls off the end.
    fn position_or_next(&self, leaf: Handle, index: usize) -> Option<(Handle, usize)> {
        let node = self.nodes.get(leaf).as_leaf();
        if index < node.key_count() {
            return Some((leaf, index));
        }
        node.next().map(|next| (next, 0))
    }

    /// Resolves a leaf index to the position just before it, spilling into
    /// the previous leaf at the front edge.
    fn position_or_prev(&self, leaf: Handle, index: usize) -> Option<(Handle, usize)> {
        if index > 0 {
            return Some((leaf, index - 1));
        }
        let node = self.nodes.get(leaf).as_leaf();
        node.prev().map(|prev| {
            let prev_leaf = self.nodes.get(prev).as_leaf();
            (prev, prev_leaf.key_count() - 1)
        })
    }

    /// Position of the minimum entry.
    pub(crate) fn first_pos(&self) -> Option<(Handle, usize)> {
        self.first_leaf.map(|leaf| (leaf, 0))
    }

    /// Position of the maximum entry.
    pub(crate) fn last_pos(&self) -> Option<(Handle, usize)> {
        self.last_leaf.map(|leaf| (leaf, self.nodes.get(leaf).as_leaf().key_count() - 1))
    }

    /// Returns the entry at a position produced by the bound queries.
    pub(crate) fn entry_at(&self, position: (Handle, usize)) -> (&K, &V) {
        let leaf = self.nodes.get(position.0).as_leaf();
        (leaf.key(position.1), self.values.get(leaf.value(position.1)))
    }

    /// Drains all entries in key order by walking the leaf chain; O(n), no
    /// rebalancing.
    pub(crate) fn drain_to_vec(&mut self) -> Vec<(K, V)> {
        let mut result = Vec::with_capacity(self.len);
        let mut current = self.first_leaf;
        while let Some(handle) = current {
            let leaf = self.nodes.get_mut(handle).as_leaf_mut();
            current = leaf.next();
            let (keys, value_handles) = leaf.take_all();
            for (key, value_handle) in keys.into_iter().zip(value_handles) {
                result.push((key, self.values.take(value_handle)));
            }
        }
        self.clear();
        result
    }

    /// Builds a tree from ascending entries in linear time. Leaves are packed
    /// with `order` entries each; the separator preceding each leaf is a copy
    /// of its first key. The input must be strictly ascending by key; this is
    /// checked in debug builds only.
    pub(crate) fn from_sorted_vec(order: usize, items: Vec<(K, V)>) -> Self {
        let mut tree = Self::new(order);
        debug_assert!(
            items.windows(2).all(|pair| pair[0].0 < pair[1].0),
            "`RawBPlusTree::from_sorted_vec()` - input keys must be strictly ascending!"
        );

        let count = items.len();
        if count == 0 {
            return tree;
        }
        tree.len = count;

        // Leaf level, chained as it is emitted. Each level entry carries the
        // minimum key of its subtree; the first child of every parent
        // contributes no separator.
        let mut level: Vec<(Handle, K)> = Vec::new();
        let mut items = items.into_iter();
        let mut remaining = count;
        let mut previous_leaf: Option<Handle> = None;
        while remaining > 0 {
            let chunk = if remaining > order { order } else { remaining };
            let mut leaf = LeafNode::with_capacity(order);
            for _ in 0..chunk {
                let (k, v) = items.next().expect("`RawBPlusTree::from_sorted_vec()` - input ended early!");
                let value_handle = tree.values.alloc(v);
                leaf.push(k, value_handle);
            }
            leaf.set_prev(previous_leaf);
            let first_key = leaf.key(0).clone();
            let handle = tree.nodes.alloc(Node::Leaf(leaf));
            if let Some(previous) = previous_leaf {
                tree.nodes.get_mut(previous).as_leaf_mut().set_next(Some(handle));
            }
            previous_leaf = Some(handle);
            level.push((handle, first_key));
            remaining -= chunk;
        }
        tree.first_leaf = Some(level[0].0);
        tree.last_leaf = previous_leaf;
        tree.fix_leaf_tail(&mut level);

        while level.len() > 1 {
            level = tree.build_internal_level(level);
        }
        tree.root = Some(level[0].0);
        tree
    }

    /// Rebalances an under-filled final leaf with its left neighbor, moving
    /// entries across until both satisfy the occupancy minimum.
    fn fix_leaf_tail(&mut self, level: &mut [(Handle, K)]) {
        let min_keys = self.min_keys();
        if level.len() < 2 {
            return;
        }
        let tail = level[level.len() - 1].0;
        let previous = level[level.len() - 2].0;
        let tail_count = self.nodes.get(tail).key_count();
        if tail_count >= min_keys {
            return;
        }
        let previous_count = self.nodes.get(previous).key_count();
        let target = (tail_count + previous_count).div_ceil(2);
        for _ in 0..target - tail_count {
            let (key, value_handle) = self.nodes.get_mut(previous).as_leaf_mut().pop();
            self.nodes.get_mut(tail).as_leaf_mut().push_front(key, value_handle);
        }
        let last = level.len() - 1;
        level[last].1 = self.nodes.get(tail).as_leaf().key(0).clone();
    }

    /// Builds one internal level above `children`: batches of `order` nodes,
    /// with each batch's separator keys gathered from the minimum keys of its
    /// members after the first. An under-filled final batch is rebalanced
    /// with its left neighbor.
    fn build_internal_level(&mut self, children: Vec<(Handle, K)>) -> Vec<(Handle, K)> {
        let order = self.order;
        let min_children = self.min_keys() + 1;

        let mut level: Vec<(Handle, K)> = Vec::new();
        let mut remaining = children.len();
        let mut children = children.into_iter();
        while remaining > 0 {
            let batch = if remaining > order { order } else { remaining };
            let mut node = InternalNode::with_capacity(order);
            let mut batch_min = None;
            for position in 0..batch {
                let (child, child_min) = children.next().expect("`RawBPlusTree::build_internal_level()` - batch ended early!");
                if position == 0 {
                    node.set_first_child(child);
                    batch_min = Some(child_min);
                } else {
                    node.push_last(child_min, child);
                }
            }
            let batch_min = batch_min.expect("`RawBPlusTree::build_internal_level()` - empty batch!");
            level.push((self.nodes.alloc(Node::Internal(node)), batch_min));
            remaining -= batch;
        }

        // Rebalance an under-filled final node by rotating children across
        // from its left neighbor.
        if level.len() > 1 {
            let tail_index = level.len() - 1;
            let tail = level[tail_index].0;
            let previous = level[tail_index - 1].0;
            let tail_children = self.nodes.get(tail).as_internal().child_count();
            let previous_children = self.nodes.get(previous).as_internal().child_count();
            if tail_children < min_children {
                let target = (tail_children + previous_children).div_ceil(2);
                for _ in 0..target - tail_children {
                    let (key, child) = self.nodes.get_mut(previous).as_internal_mut().pop_last();
                    // The popped separator is the minimum of the moved child's
                    // subtree; the tail's old minimum becomes the separator
                    // between the moved child and the tail's old first child.
                    let old_min = core::mem::replace(&mut level[tail_index].1, key);
                    self.nodes.get_mut(tail).as_internal_mut().push_first(old_min, child);
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
    use core::fmt::Debug;
    use proptest::prelude::*;

    impl<K: Clone + Ord + Debug, V> RawBPlusTree<K, V> {
        /// Validates every structural invariant, panicking with a description
        /// of all violations found. Test-only.
        pub(crate) fn validate_invariants(&self) {
            let mut errors: Vec<String> = Vec::new();
            let Some(root) = self.root else {
                assert_eq!(self.len, 0, "empty tree should have len 0");
                assert!(self.first_leaf.is_none(), "empty tree should have no first leaf");
                assert!(self.last_leaf.is_none(), "empty tree should have no last leaf");
                return;
            };

            let mut leaves: Vec<Handle> = Vec::new();
            let mut leaf_depth: Option<usize> = None;
            self.validate_node(root, 0, None, None, &mut leaf_depth, &mut leaves, &mut errors);

            // Leaf chain and caches agree with the in-order leaf sequence.
            if self.first_leaf != leaves.first().copied() {
                errors.push(format!("first_leaf is {:?}, leftmost leaf is {:?}", self.first_leaf, leaves.first()));
            }
            if self.last_leaf != leaves.last().copied() {
                errors.push(format!("last_leaf is {:?}, rightmost leaf is {:?}", self.last_leaf, leaves.last()));
            }
            for (position, &handle) in leaves.iter().enumerate() {
                let leaf = self.nodes.get(handle).as_leaf();
                let expected_prev = if position > 0 { Some(leaves[position - 1]) } else { None };
                let expected_next = leaves.get(position + 1).copied();
                if leaf.prev() != expected_prev {
                    errors.push(format!("leaf {handle:?} prev is {:?}, expected {expected_prev:?}", leaf.prev()));
                }
                if leaf.next() != expected_next {
                    errors.push(format!("leaf {handle:?} next is {:?}, expected {expected_next:?}", leaf.next()));
                }
            }

            let total: usize = leaves.iter().map(|&h| self.nodes.get(h).key_count()).sum();
            if total != self.len {
                errors.push(format!("len mismatch: self.len={}, leaves hold {total}", self.len));
            }
            if self.values.len() != self.len {
                errors.push(format!("values arena holds {}, len is {}", self.values.len(), self.len));
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
            leaves: &mut Vec<Handle>,
            errors: &mut Vec<String>,
        ) {
            match self.nodes.get(handle) {
                Node::Leaf(leaf) => {
                    match *leaf_depth {
                        None => *leaf_depth = Some(depth),
                        Some(expected) => {
                            if depth != expected {
                                errors.push(format!("leaf {handle:?} at depth {depth}, expected {expected}"));
                            }
                        }
                    }
                    if Some(handle) == self.root {
                        if leaf.key_count() == 0 {
                            errors.push(format!("non-empty tree has empty root leaf {handle:?}"));
                        }
                    } else if leaf.key_count() < self.min_keys() {
                        errors.push(format!("leaf {handle:?} holds {} keys, minimum is {}", leaf.key_count(), self.min_keys()));
                    }
                    if leaf.key_count() > self.max_leaf_keys() {
                        errors.push(format!("leaf {handle:?} holds {} keys, maximum is {}", leaf.key_count(), self.order));
                    }
                    for i in 0..leaf.key_count() {
                        let key = leaf.key(i);
                        if i > 0 && leaf.key(i - 1) >= key {
                            errors.push(format!("leaf {handle:?} keys not ascending at {i}"));
                        }
                        if let Some(lower) = lower
                            && key < lower
                        {
                            errors.push(format!("leaf {handle:?} key {key:?} below separator bound {lower:?}"));
                        }
                        if let Some(upper) = upper
                            && key >= upper
                        {
                            errors.push(format!("leaf {handle:?} key {key:?} not below separator bound {upper:?}"));
                        }
                    }
                    leaves.push(handle);
                }
                Node::Internal(internal) => {
                    if Some(handle) == self.root {
                        if internal.child_count() < 2 {
                            errors.push(format!("internal root {handle:?} has {} children", internal.child_count()));
                        }
                    } else if internal.key_count() < self.min_keys() {
                        errors.push(format!(
                            "internal {handle:?} holds {} keys, minimum is {}",
                            internal.key_count(),
                            self.min_keys()
                        ));
                    }
                    if internal.key_count() > self.max_keys() {
                        errors.push(format!(
                            "internal {handle:?} holds {} keys, maximum is {}",
                            internal.key_count(),
                            self.max_keys()
                        ));
                    }
                    if internal.child_count() != internal.key_count() + 1 {
                        errors.push(format!(
                            "internal {handle:?} has {} children for {} keys",
                            internal.child_count(),
                            internal.key_count()
                        ));
                        return;
                    }
                    for i in 0..internal.key_count() {
                        let key = internal.key(i);
                        if i > 0 && internal.key(i - 1) >= key {
                            errors.push(format!("internal {handle:?} keys not ascending at {i}"));
                        }
                        if let Some(lower) = lower
                            && key < lower
                        {
                            errors.push(format!("internal {handle:?} key {key:?} below bound {lower:?}"));
                        }
                        if let Some(upper) = upper
                            && key > upper
                        {
                            errors.push(format!("internal {handle:?} key {key:?} above bound {upper:?}"));
                        }
                    }
                    for i in 0..internal.child_count() {
                        let child_lower = if i == 0 { lower } else { Some(internal.key(i - 1)) };
                        let child_upper = if i == internal.key_count() { upper } else { Some(internal.key(i)) };
                        self.validate_node(internal.child(i), depth + 1, child_lower, child_upper, leaf_depth, leaves, errors);
                    }
                }
            }
        }

        fn entries_in_order(&self) -> Vec<(K, V)>
        where
            V: Clone,
        {
            let mut out = Vec::with_capacity(self.len);
            let mut current = self.first_leaf;
            while let Some(handle) = current {
                let leaf = self.nodes.get(handle).as_leaf();
                for i in 0..leaf.key_count() {
                    out.push((leaf.key(i).clone(), self.values.get(leaf.value(i)).clone()));
                }
                current = leaf.next();
            }
            out
        }
    }

    #[test]
    #[should_panic(expected = "`order` must be at least 3")]
    fn rejects_tiny_order() {
        let _ = RawBPlusTree::<i32, i32>::new(2);
    }

    #[test]
    fn bulk_load_packs_leaves() {
        for order in [3, 4, 5, 7, 8, 16] {
            for count in [0usize, 1, 2, 5, 15, 16, 17, 31, 32, 33, 64, 100, 255, 256, 257] {
                let items: Vec<(i32, i32)> = (0..count as i32).map(|k| (k, k * 2)).collect();
                let tree = RawBPlusTree::from_sorted_vec(order, items.clone());
                tree.validate_invariants();
                assert_eq!(tree.entries_in_order(), items, "order={order} count={count}");
            }
        }
    }

    #[derive(Clone, Debug)]
    enum Op {
        Insert(i32, i32),
        Remove(i32),
        PopFirst,
        PopLast,
        Update(i32, i32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let key = -300i32..300;
        prop_oneof![
            6 => (key.clone(), any::<i32>()).prop_map(|(k, v)| Op::Insert(k, v)),
            5 => key.clone().prop_map(Op::Remove),
            1 => Just(Op::PopFirst),
            1 => Just(Op::PopLast),
            1 => (key, any::<i32>()).prop_map(|(k, v)| Op::Update(k, v)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Random operation sequences preserve every structural invariant
        /// (including the leaf chain) and agree with
        /// `std::collections::BTreeMap` at each step.
        #[test]
        fn random_ops_hold_invariants(
            order in prop_oneof![Just(3usize), Just(4), Just(5), Just(8), Just(16)],
            ops in prop::collection::vec(op_strategy(), 1..400),
        ) {
            let mut tree = RawBPlusTree::new(order);
            let mut model = std::collections::BTreeMap::new();
            for op in ops {
                match op {
                    Op::Insert(k, v) => {
                        prop_assert_eq!(tree.insert(k, v), model.insert(k, v));
                    }
                    Op::Remove(k) => {
                        prop_assert_eq!(tree.remove(&k), model.remove(&k));
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
    }

    #[test]
    fn bound_queries() {
        let tree = RawBPlusTree::from_sorted_vec(4, (0..40).map(|k| (k * 10, ())).collect());
        let key = |pos| *tree.entry_at(pos).0;

        assert_eq!(tree.lower_bound(&150).map(key), Some(150));
        assert_eq!(tree.lower_bound(&151).map(key), Some(160));
        assert_eq!(tree.lower_bound(&391).map(key), None);
        assert_eq!(tree.upper_bound(&150).map(key), Some(160));
        assert_eq!(tree.upper_bound_inclusive(&150).map(key), Some(150));
        assert_eq!(tree.upper_bound_inclusive(&149).map(key), Some(140));
        assert_eq!(tree.upper_bound_inclusive(&-1).map(key), None);
        assert_eq!(tree.lower_bound_exclusive(&150).map(key), Some(140));
        assert_eq!(tree.lower_bound_exclusive(&0).map(key), None);
    }
}
