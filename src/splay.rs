//! A self-adjusting binary search tree with top-down splay.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::borrow::Borrow;
use core::cmp::Ordering;
use core::fmt;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::mem;
use core::ops::{Bound, RangeBounds};

use crate::ordered::{OrderedMap, validate_range_bounds};

mod node;

use node::{Link, SplayNode};

/// An ordered map implemented as a splay tree.
///
/// A splay tree keeps no balance invariant. Instead, every access-path
/// operation finishes by *splaying*: the touched key (or, when it is absent,
/// the last key met on the descent) is rotated up to the root. Amortized over
/// any operation sequence this gives O(log n) per operation, and recently
/// touched keys sit near the top, so skewed access patterns beat a balanced
/// tree.
///
/// The price is that **reads reshape the tree**. `get`, `contains_key`,
/// `floor`, and the other neighbor queries all take `&mut self`, and no
/// structural stability may be assumed across queries. Only plain traversal
/// ([`iter`](SplayTree::iter), [`first_key_value`](SplayTree::first_key_value),
/// [`last_key_value`](SplayTree::last_key_value)) leaves the shape alone.
///
/// [`split`](SplayTree::split) and [`join`](SplayTree::join) are first-class
/// O(log n) operations (plus an O(n) recount for `split`).
///
/// # Examples
///
/// ```
/// use tern_tree::SplayTree;
///
/// let mut cache = SplayTree::new();
/// cache.insert("alpha", 1);
/// cache.insert("beta", 2);
///
/// // A read moves the key to the root.
/// assert_eq!(cache.get(&"alpha"), Some(&1));
/// assert_eq!(cache.root_view().map(|v| *v.key()), Some("alpha"));
/// ```
pub struct SplayTree<K, V> {
    root: Link<K, V>,
    len: usize,
}

/// Top-down splay. After the call the root holds `key` if present, otherwise
/// the last node touched on the descent path.
///
/// The descent maintains two detached trees: nodes known to be smaller than
/// the key and nodes known to be greater, each with a reattachment hole at
/// its inner edge. Passed-over nodes go to a hole; a zig-zig (two steps in
/// the same direction) first rotates so the skipped level is restructured.
/// At the end the remaining subtrees fill the holes and the two trees become
/// the children of the new root.
fn splay<K, V, Q>(key: &Q, node: &mut Box<SplayNode<K, V>>)
where
    K: Borrow<Q>,
    Q: ?Sized + Ord,
{
    let mut smaller: Link<K, V> = None;
    let mut greater: Link<K, V> = None;

    {
        let mut smaller_hole = &mut smaller;
        let mut greater_hole = &mut greater;

        loop {
            match key.cmp(node.key.borrow()) {
                Ordering::Equal => break,
                Ordering::Less => {
                    let Some(mut left) = node.left.take() else { break };
                    if key < left.key.borrow() {
                        // zig-zig: rotate right before descending
                        node.left = left.right.take();
                        let demoted = mem::replace(node, left);
                        node.right = Some(demoted);
                    } else {
                        node.left = Some(left);
                    }
                    let Some(next) = node.left.take() else { break };
                    let passed = mem::replace(node, next);
                    *greater_hole = Some(passed);
                    let hole = greater_hole;
                    greater_hole = &mut hole.as_mut().expect("`splay()` - greater hole vanished!").left;
                }
                Ordering::Greater => {
                    let Some(mut right) = node.right.take() else { break };
                    if key > right.key.borrow() {
                        // zag-zag: mirror image
                        node.right = right.left.take();
                        let demoted = mem::replace(node, right);
                        node.left = Some(demoted);
                    } else {
                        node.right = Some(right);
                    }
                    let Some(next) = node.right.take() else { break };
                    let passed = mem::replace(node, next);
                    *smaller_hole = Some(passed);
                    let hole = smaller_hole;
                    smaller_hole = &mut hole.as_mut().expect("`splay()` - smaller hole vanished!").right;
                }
            }
        }

        // Reassemble: the root's remaining subtrees fill the inner holes.
        mem::swap(smaller_hole, &mut node.left);
        mem::swap(greater_hole, &mut node.right);
    }

    node.left = smaller;
    node.right = greater;
}

/// Detaches the maximum node of `root`'s subtree and re-roots at it; the
/// result's right child is vacant.
fn detach_max<K, V>(mut root: Box<SplayNode<K, V>>) -> Box<SplayNode<K, V>> {
    if root.right.is_none() {
        return root;
    }
    let mut current = &mut root;
    while current.right.as_ref().expect("`detach_max()` - lost the descent!").right.is_some() {
        current = current.right.as_mut().expect("`detach_max()` - lost the descent!");
    }
    let mut max = current.right.take().expect("`detach_max()` - lost the descent!");
    current.right = max.left.take();
    max.left = Some(root);
    max
}

impl<K, V> SplayTree<K, V> {
    /// Makes a new, empty `SplayTree`.
    ///
    /// Does not allocate anything on its own.
    #[must_use]
    pub fn new() -> SplayTree<K, V> {
        SplayTree { root: None, len: 0 }
    }

    /// Returns the number of elements in the map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the map contains no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Clears the map, removing all elements. Teardown is iterative, so even
    /// a degenerate (linear) tree cannot overflow the stack.
    pub fn clear(&mut self) {
        let mut stack = Vec::new();
        if let Some(root) = self.root.take() {
            stack.push(root);
        }
        while let Some(mut node) = stack.pop() {
            if let Some(left) = node.left.take() {
                stack.push(left);
            }
            if let Some(right) = node.right.take() {
                stack.push(right);
            }
        }
        self.len = 0;
    }

    /// Returns a view of the root node for structural traversal, e.g. by an
    /// external tree printer. `None` when the tree is empty.
    #[must_use]
    pub fn root_view(&self) -> Option<BinaryView<'_, K, V>> {
        self.root.as_deref().map(|node| BinaryView { node })
    }

    /// Returns the entry with the minimum key. Does not splay.
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        let mut current = self.root.as_deref()?;
        while let Some(left) = current.left.as_deref() {
            current = left;
        }
        Some((&current.key, &current.value))
    }

    /// Returns the entry with the maximum key. Does not splay.
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        let mut current = self.root.as_deref()?;
        while let Some(right) = current.right.as_deref() {
            current = right;
        }
        Some((&current.key, &current.value))
    }

    /// Gets an iterator over the entries of the map, sorted by key. Iteration
    /// does not splay.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut iter = Iter {
            front: Vec::new(),
            back: Vec::new(),
            remaining: self.len,
        };
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            iter.front.push(node);
            current = node.left.as_deref();
        }
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            iter.back.push(node);
            current = node.right.as_deref();
        }
        iter
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

impl<K: Ord, V> SplayTree<K, V> {
    /// Splays the tree around `key`; afterwards the root holds `key` if
    /// present, else the last key on the descent path.
    fn splay_to<Q>(&mut self, key: &Q)
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        if let Some(root) = self.root.as_mut() {
            splay(key, root);
        }
    }

    /// Returns a reference to the value corresponding to the key, splaying
    /// it to the root.
    ///
    /// # Examples
    ///
    /// ```
    /// use tern_tree::SplayTree;
    ///
    /// let mut map = SplayTree::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.get(&1), Some(&"a"));
    /// assert_eq!(map.get(&2), None);
    /// ```
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.splay_to(key);
        let root = self.root.as_deref()?;
        (root.key.borrow() == key).then(|| &root.value)
    }

    /// Returns a mutable reference to the value corresponding to the key,
    /// splaying it to the root.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.splay_to(key);
        let root = self.root.as_deref_mut()?;
        (root.key.borrow() == key).then(|| &mut root.value)
    }

    /// Returns the key-value pair corresponding to the supplied key,
    /// splaying it to the root.
    pub fn get_key_value<Q>(&mut self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.splay_to(key);
        let root = self.root.as_deref()?;
        (root.key.borrow() == key).then(|| (&root.key, &root.value))
    }

    /// Returns true if the map contains the specified key, splaying the
    /// touched node to the root.
    pub fn contains_key<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.get(key).is_some()
    }

    /// Inserts a key-value pair into the map.
    ///
    /// The key is splayed first; if present its value is replaced in place,
    /// otherwise a new node becomes the root with the old root hanging off
    /// the matching side.
    ///
    /// # Examples
    ///
    /// ```
    /// use tern_tree::SplayTree;
    ///
    /// let mut map = SplayTree::new();
    /// assert_eq!(map.insert(37, "a"), None);
    /// assert_eq!(map.insert(37, "b"), Some("a"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.splay_to(&key);
        let Some(mut old_root) = self.root.take() else {
            self.root = Some(Box::new(SplayNode::new(key, value)));
            self.len = 1;
            return None;
        };
        match key.cmp(&old_root.key) {
            Ordering::Equal => {
                let old = mem::replace(&mut old_root.value, value);
                self.root = Some(old_root);
                Some(old)
            }
            Ordering::Less => {
                let mut node = Box::new(SplayNode::new(key, value));
                node.left = old_root.left.take();
                node.right = Some(old_root);
                self.root = Some(node);
                self.len += 1;
                None
            }
            Ordering::Greater => {
                let mut node = Box::new(SplayNode::new(key, value));
                node.right = old_root.right.take();
                node.left = Some(old_root);
                self.root = Some(node);
                self.len += 1;
                None
            }
        }
    }

    /// Inserts a key-value pair only if the key is not already present.
    /// Returns true if the pair was inserted. Splays either way.
    pub fn insert_if_absent(&mut self, key: K, value: V) -> bool {
        self.splay_to(&key);
        if let Some(root) = self.root.as_deref()
            && root.key == key
        {
            return false;
        }
        self.insert(key, value);
        true
    }

    /// Replaces the value of an existing key, returning the old value. An
    /// absent key stays absent (though the nearest key is splayed up).
    pub fn update<Q>(&mut self, key: &Q, value: V) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let slot = self.get_mut(key)?;
        Some(mem::replace(slot, value))
    }

    /// Removes a key from the map, returning its value if it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes a key from the map, returning the stored key and value.
    ///
    /// The key is splayed to the root and unlinked there; the maximum of the
    /// left subtree (the in-order predecessor) becomes the new root, with the
    /// old right subtree reattached under it.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.splay_to(key);
        if self.root.as_deref()?.key.borrow() != key {
            return None;
        }
        let root = self.root.take().expect("`SplayTree::remove_entry()` - root vanished!");
        self.len -= 1;
        let SplayNode { key, value, left, right } = *root;
        match left {
            None => self.root = right,
            Some(left_root) => {
                let mut new_root = detach_max(left_root);
                new_root.right = right;
                self.root = Some(new_root);
            }
        }
        Some((key, value))
    }

    /// Removes and returns the first (minimum-key) entry.
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        let mut root = self.root.take()?;
        self.len -= 1;
        if root.left.is_none() {
            self.root = root.right.take();
            let SplayNode { key, value, .. } = *root;
            return Some((key, value));
        }
        let mut current = &mut root;
        while current.left.as_ref().expect("`SplayTree::pop_first()` - lost the descent!").left.is_some() {
            current = current.left.as_mut().expect("`SplayTree::pop_first()` - lost the descent!");
        }
        let mut min = current.left.take().expect("`SplayTree::pop_first()` - lost the descent!");
        current.left = min.right.take();
        self.root = Some(root);
        let SplayNode { key, value, .. } = *min;
        Some((key, value))
    }

    /// Removes and returns the last (maximum-key) entry.
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        let mut root = self.root.take()?;
        self.len -= 1;
        if root.right.is_none() {
            self.root = root.left.take();
            let SplayNode { key, value, .. } = *root;
            return Some((key, value));
        }
        let mut current = &mut root;
        while current.right.as_ref().expect("`SplayTree::pop_last()` - lost the descent!").right.is_some() {
            current = current.right.as_mut().expect("`SplayTree::pop_last()` - lost the descent!");
        }
        let mut max = current.right.take().expect("`SplayTree::pop_last()` - lost the descent!");
        current.right = max.left.take();
        self.root = Some(root);
        let SplayNode { key, value, .. } = *max;
        Some((key, value))
    }

    /// Returns the entry with the greatest key `<=` the given key, splaying
    /// the search path. When the splayed root is too large, the answer is the
    /// maximum of its left subtree.
    pub fn floor<Q>(&mut self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.splay_to(key);
        let root = self.root.as_deref()?;
        if root.key.borrow() <= key {
            Some((&root.key, &root.value))
        } else {
            let mut current = root.left.as_deref()?;
            while let Some(right) = current.right.as_deref() {
                current = right;
            }
            Some((&current.key, &current.value))
        }
    }

    /// Returns the entry with the least key `>=` the given key, splaying the
    /// search path.
    pub fn ceiling<Q>(&mut self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.splay_to(key);
        let root = self.root.as_deref()?;
        if root.key.borrow() >= key {
            Some((&root.key, &root.value))
        } else {
            let mut current = root.right.as_deref()?;
            while let Some(left) = current.left.as_deref() {
                current = left;
            }
            Some((&current.key, &current.value))
        }
    }

    /// Returns the entry with the greatest key strictly `<` the given key,
    /// splaying the search path.
    pub fn predecessor<Q>(&mut self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.splay_to(key);
        let root = self.root.as_deref()?;
        if root.key.borrow() < key {
            Some((&root.key, &root.value))
        } else {
            let mut current = root.left.as_deref()?;
            while let Some(right) = current.right.as_deref() {
                current = right;
            }
            Some((&current.key, &current.value))
        }
    }

    /// Returns the entry with the least key strictly `>` the given key,
    /// splaying the search path.
    pub fn successor<Q>(&mut self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.splay_to(key);
        let root = self.root.as_deref()?;
        if root.key.borrow() > key {
            Some((&root.key, &root.value))
        } else {
            let mut current = root.right.as_deref()?;
            while let Some(left) = current.left.as_deref() {
                current = left;
            }
            Some((&current.key, &current.value))
        }
    }

    /// Splits the tree at `at`: returns `(left, right)` where `left` holds
    /// every key `< at` and `right` every key `>= at`. `self` is left empty.
    ///
    /// The split key is splayed and the tree cut at the root; the element
    /// counts of both results are recomputed by traversal, so this is
    /// O(log n) amortized for the cut plus O(n) for the recount.
    ///
    /// # Examples
    ///
    /// ```
    /// use tern_tree::SplayTree;
    ///
    /// let mut tree: SplayTree<_, _> = (1..=6).map(|k| (k, ())).collect();
    /// let (small, large) = tree.split(&4);
    /// assert!(tree.is_empty());
    /// assert_eq!(small.len(), 3);
    /// assert_eq!(large.len(), 3);
    /// ```
    pub fn split<Q>(&mut self, at: &Q) -> (SplayTree<K, V>, SplayTree<K, V>)
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        if self.root.is_none() {
            return (SplayTree::new(), SplayTree::new());
        }
        self.splay_to(at);
        let mut root = self.root.take().expect("`SplayTree::split()` - root vanished!");
        self.len = 0;

        let (left_root, right_root) = if root.key.borrow() < at {
            let right = root.right.take();
            (Some(root), right)
        } else {
            let left = root.left.take();
            (left, Some(root))
        };

        let mut left = SplayTree { root: left_root, len: 0 };
        left.len = left.count_nodes();
        let mut right = SplayTree { root: right_root, len: 0 };
        right.len = right.count_nodes();
        (left, right)
    }

    /// Joins `other` into `self`, requiring every key of `self` to be
    /// strictly less than every key of `other`. On success `other` is left
    /// empty and true is returned; when the precondition fails, neither tree
    /// is mutated and false is returned. An empty operand joins trivially.
    ///
    /// The maximum of `self` is splayed to the root, leaving its right slot
    /// vacant for `other`'s root.
    ///
    /// # Examples
    ///
    /// ```
    /// use tern_tree::SplayTree;
    ///
    /// let mut low: SplayTree<_, _> = (1..=3).map(|k| (k, ())).collect();
    /// let mut high: SplayTree<_, _> = (4..=7).map(|k| (k, ())).collect();
    /// assert!(low.join(&mut high));
    /// assert_eq!(low.len(), 7);
    /// assert!(high.is_empty());
    ///
    /// let mut overlapping: SplayTree<_, _> = (3..=5).map(|k| (k, ())).collect();
    /// assert!(!low.join(&mut overlapping));
    /// assert_eq!(overlapping.len(), 3);
    /// ```
    pub fn join(&mut self, other: &mut SplayTree<K, V>) -> bool {
        if other.root.is_none() {
            return true;
        }
        if self.root.is_none() {
            self.root = other.root.take();
            self.len = mem::take(&mut other.len);
            return true;
        }

        let (self_max, _) = self.last_key_value().expect("`SplayTree::join()` - non-empty tree has no max!");
        let (other_min, _) = other.first_key_value().expect("`SplayTree::join()` - non-empty tree has no min!");
        if self_max >= other_min {
            return false;
        }

        let root = self.root.take().expect("`SplayTree::join()` - root vanished!");
        let mut root = detach_max(root);
        root.right = other.root.take();
        self.root = Some(root);
        self.len += mem::take(&mut other.len);
        true
    }

    /// Constructs an iterator over a sub-range of entries, ascending. The
    /// start of the range is splayed first (ranges are access-path
    /// operations); iteration itself walks the tree without further
    /// reshaping.
    ///
    /// # Panics
    ///
    /// Panics if range `start > end`, or if `start == end` and both bounds
    /// are `Excluded`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tern_tree::SplayTree;
    ///
    /// let mut map: SplayTree<_, _> = (0..10).map(|k| (k, k * k)).collect();
    /// let picked: Vec<_> = map.range(3..=5).map(|(&k, _)| k).collect();
    /// assert_eq!(picked, [3, 4, 5]);
    /// ```
    pub fn range<T, R>(&mut self, range: R) -> Range<'_, K, V, T, R>
    where
        T: ?Sized + Ord,
        K: Borrow<T>,
        R: RangeBounds<T>,
    {
        validate_range_bounds(&range);
        match range.start_bound() {
            Bound::Included(start) | Bound::Excluded(start) => self.splay_to(start),
            Bound::Unbounded => {}
        }

        let mut iter = Range {
            stack: Vec::new(),
            range,
            _marker: PhantomData,
        };
        iter.seed(self.root.as_deref());
        iter
    }

    fn count_nodes(&self) -> usize {
        let mut count = 0;
        let mut stack = Vec::new();
        if let Some(root) = self.root.as_deref() {
            stack.push(root);
        }
        while let Some(node) = stack.pop() {
            count += 1;
            if let Some(left) = node.left.as_deref() {
                stack.push(left);
            }
            if let Some(right) = node.right.as_deref() {
                stack.push(right);
            }
        }
        count
    }
}

impl<K, V> Drop for SplayTree<K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K: Clone, V: Clone> Clone for SplayTree<K, V> {
    /// Shape-preserving deep copy. Iterative, because a splay tree may be
    /// arbitrarily deep.
    fn clone(&self) -> Self {
        let Some(source_root) = self.root.as_deref() else {
            return SplayTree::new();
        };
        let mut root = Box::new(SplayNode::new(source_root.key.clone(), source_root.value.clone()));
        let mut pending: Vec<(&SplayNode<K, V>, &mut SplayNode<K, V>)> = Vec::new();
        pending.push((source_root, &mut root));
        while let Some((source, target)) = pending.pop() {
            if let Some(left) = source.left.as_deref() {
                target.left = Some(Box::new(SplayNode::new(left.key.clone(), left.value.clone())));
                pending.push((left, target.left.as_deref_mut().expect("`SplayTree::clone()` - child vanished!")));
            }
            if let Some(right) = source.right.as_deref() {
                target.right = Some(Box::new(SplayNode::new(right.key.clone(), right.value.clone())));
                pending.push((right, target.right.as_deref_mut().expect("`SplayTree::clone()` - child vanished!")));
            }
        }
        SplayTree {
            root: Some(root),
            len: self.len,
        }
    }
}

// ─── Structural view ─────────────────────────────────────────────────────────

/// A borrowed view of one splay tree node, for structural traversal by
/// external collaborators such as tree printers.
pub struct BinaryView<'a, K, V> {
    node: &'a SplayNode<K, V>,
}

impl<'a, K, V> BinaryView<'a, K, V> {
    /// The node's key.
    #[must_use]
    pub fn key(&self) -> &'a K {
        &self.node.key
    }

    /// The node's value.
    #[must_use]
    pub fn value(&self) -> &'a V {
        &self.node.value
    }

    /// A view of the left child.
    #[must_use]
    pub fn left(&self) -> Option<BinaryView<'a, K, V>> {
        self.node.left.as_deref().map(|node| BinaryView { node })
    }

    /// A view of the right child.
    #[must_use]
    pub fn right(&self) -> Option<BinaryView<'a, K, V>> {
        self.node.right.as_deref().map(|node| BinaryView { node })
    }
}

impl<K: fmt::Debug, V> fmt::Debug for BinaryView<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryView")
            .field("key", self.key())
            .field("left", &self.node.left.is_some())
            .field("right", &self.node.right.is_some())
            .finish()
    }
}

// ─── Iterators ───────────────────────────────────────────────────────────────

/// An iterator over the entries of a `SplayTree`, sorted by key.
///
/// Created by [`SplayTree::iter`]. Iteration does not splay.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, K, V> {
    front: Vec<&'a SplayNode<K, V>>,
    back: Vec<&'a SplayNode<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.front.pop()?;
        let mut current = node.right.as_deref();
        while let Some(child) = current {
            self.front.push(child);
            current = child.left.as_deref();
        }
        self.remaining -= 1;
        Some((&node.key, &node.value))
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
        let node = self.back.pop()?;
        let mut current = node.left.as_deref();
        while let Some(child) = current {
            self.back.push(child);
            current = child.right.as_deref();
        }
        self.remaining -= 1;
        Some((&node.key, &node.value))
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
            front: self.front.clone(),
            back: self.back.clone(),
            remaining: self.remaining,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("remaining", &self.remaining).finish()
    }
}

/// An iterator over the keys of a `SplayTree`.
///
/// Created by [`SplayTree::keys`].
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

/// An iterator over the values of a `SplayTree`, in key order.
///
/// Created by [`SplayTree::values`].
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

/// An iterator over a sub-range of entries in a `SplayTree`, ascending.
///
/// Created by [`SplayTree::range`], which splays the start of the range
/// before handing out the iterator.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Range<'a, K, V, T: ?Sized, R> {
    stack: Vec<&'a SplayNode<K, V>>,
    range: R,
    _marker: PhantomData<&'a T>,
}

impl<'a, K, V, T, R> Range<'a, K, V, T, R>
where
    T: ?Sized + Ord,
    K: Borrow<T>,
    R: RangeBounds<T>,
{
    fn seed(&mut self, mut node: Option<&'a SplayNode<K, V>>) {
        while let Some(current) = node {
            let above_start = match self.range.start_bound() {
                Bound::Unbounded => true,
                Bound::Included(start) => current.key.borrow() >= start,
                Bound::Excluded(start) => current.key.borrow() > start,
            };
            if above_start {
                self.stack.push(current);
                node = current.left.as_deref();
            } else {
                node = current.right.as_deref();
            }
        }
    }
}

impl<'a, K, V, T, R> Iterator for Range<'a, K, V, T, R>
where
    T: ?Sized + Ord,
    K: Borrow<T>,
    R: RangeBounds<T>,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        let below_end = match self.range.end_bound() {
            Bound::Unbounded => true,
            Bound::Included(end) => node.key.borrow() <= end,
            Bound::Excluded(end) => node.key.borrow() < end,
        };
        if !below_end {
            self.stack.clear();
            return None;
        }
        // Everything to the right of an emitted node clears the start bound.
        let mut current = node.right.as_deref();
        while let Some(child) = current {
            self.stack.push(child);
            current = child.left.as_deref();
        }
        Some((&node.key, &node.value))
    }
}

impl<K, V, T, R> FusedIterator for Range<'_, K, V, T, R>
where
    T: ?Sized + Ord,
    K: Borrow<T>,
    R: RangeBounds<T>,
{
}

/// An owning iterator over the entries of a `SplayTree`, sorted by key.
///
/// Created by [`IntoIterator::into_iter`] on an owned `SplayTree`.
pub struct IntoIter<K, V> {
    stack: Vec<Box<SplayNode<K, V>>>,
    remaining: usize,
}

impl<K, V> IntoIter<K, V> {
    fn push_left_spine(&mut self, mut link: Link<K, V>) {
        while let Some(mut node) = link {
            link = node.left.take();
            self.stack.push(node);
        }
    }
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let mut node = self.stack.pop()?;
        let right = node.right.take();
        self.push_left_spine(right);
        self.remaining -= 1;
        let SplayNode { key, value, .. } = *node;
        Some((key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}
impl<K, V> FusedIterator for IntoIter<K, V> {}

// ─── Trait implementations ───────────────────────────────────────────────────

impl<K, V> Default for SplayTree<K, V> {
    fn default() -> Self {
        SplayTree::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for SplayTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for SplayTree<K, V> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = SplayTree::new();
        map.extend(iter);
        map
    }
}

impl<K: Ord, V> Extend<(K, V)> for SplayTree<K, V> {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'a, K, V> IntoIterator for &'a SplayTree<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<K, V> IntoIterator for SplayTree<K, V> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(mut self) -> IntoIter<K, V> {
        let mut iter = IntoIter {
            stack: Vec::new(),
            remaining: self.len,
        };
        iter.push_left_spine(self.root.take());
        self.len = 0;
        iter
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for SplayTree<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq> Eq for SplayTree<K, V> {}

impl<K: Ord, V> OrderedMap<K, V> for SplayTree<K, V> {
    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        SplayTree::clear(self);
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        SplayTree::get(self, key)
    }

    fn insert(&mut self, key: K, value: V) -> Option<V> {
        SplayTree::insert(self, key, value)
    }

    fn insert_if_absent(&mut self, key: K, value: V) -> bool {
        SplayTree::insert_if_absent(self, key, value)
    }

    fn update(&mut self, key: &K, value: V) -> Option<V> {
        SplayTree::update(self, key, value)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        SplayTree::remove(self, key)
    }

    fn first_key_value(&self) -> Option<(&K, &V)> {
        SplayTree::first_key_value(self)
    }

    fn last_key_value(&self) -> Option<(&K, &V)> {
        SplayTree::last_key_value(self)
    }

    fn floor(&mut self, key: &K) -> Option<(&K, &V)> {
        SplayTree::floor(self, key)
    }

    fn ceiling(&mut self, key: &K) -> Option<(&K, &V)> {
        SplayTree::ceiling(self, key)
    }

    fn predecessor(&mut self, key: &K) -> Option<(&K, &V)> {
        SplayTree::predecessor(self, key)
    }

    fn successor(&mut self, key: &K) -> Option<(&K, &V)> {
        SplayTree::successor(self, key)
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
