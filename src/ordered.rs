use alloc::vec::Vec;
use core::ops::{Bound, RangeBounds};

/// The contract shared by every engine in this crate.
///
/// `OrderedMap` collects the operations common to [`BTree`](crate::BTree),
/// [`BPlusTree`](crate::BPlusTree), and [`SplayTree`](crate::SplayTree):
/// lookup, the insert/update/upsert family, removal, extrema and neighbor
/// queries, and ordered traversal. Materialized bulk forms (`entries_vec`,
/// `fold`, ...) are provided methods defined purely in terms of the
/// primitives.
///
/// Access-path methods take `&mut self` because the splay engine reshapes the
/// tree on every access; the B-family engines implement them without mutating
/// and additionally expose `&self` inherent versions. Traversal
/// (`for_each`/`for_each_rev`) and extrema are read-only for every engine.
///
/// # Examples
///
/// ```
/// use tern_tree::{BTree, OrderedMap, SplayTree};
///
/// fn census<M: OrderedMap<u32, &'static str>>(map: &mut M) -> (usize, Option<u32>) {
///     map.insert(7, "seven");
///     map.insert(3, "three");
///     let floor = map.floor(&5).map(|(&k, _)| k);
///     (map.len(), floor)
/// }
///
/// assert_eq!(census(&mut BTree::new()), (2, Some(3)));
/// assert_eq!(census(&mut SplayTree::new()), (2, Some(3)));
/// ```
pub trait OrderedMap<K: Ord, V> {
    /// Returns the number of key-value pairs in the map.
    fn len(&self) -> usize;

    /// Returns true if the map contains no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears the map, removing all elements.
    fn clear(&mut self);

    /// Returns a reference to the value corresponding to the key.
    fn get(&mut self, key: &K) -> Option<&V>;

    /// Returns true if the map contains the specified key.
    fn contains_key(&mut self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Inserts a key-value pair, replacing and returning the previous value
    /// if the key was already present.
    fn insert(&mut self, key: K, value: V) -> Option<V>;

    /// Inserts a key-value pair only if the key is absent. Returns true if
    /// the pair was inserted; an existing mapping is left untouched.
    fn insert_if_absent(&mut self, key: K, value: V) -> bool;

    /// Replaces the value for an existing key, returning the previous value.
    /// Absent keys are left absent and `None` is returned.
    fn update(&mut self, key: &K, value: V) -> Option<V>;

    /// Removes a key from the map, returning its value if it was present.
    fn remove(&mut self, key: &K) -> Option<V>;

    /// Returns the entry with the minimum key.
    fn first_key_value(&self) -> Option<(&K, &V)>;

    /// Returns the entry with the maximum key.
    fn last_key_value(&self) -> Option<(&K, &V)>;

    /// Returns the entry with the greatest key `<=` the given key.
    fn floor(&mut self, key: &K) -> Option<(&K, &V)>;

    /// Returns the entry with the least key `>=` the given key.
    fn ceiling(&mut self, key: &K) -> Option<(&K, &V)>;

    /// Returns the entry with the greatest key strictly `<` the given key.
    fn predecessor(&mut self, key: &K) -> Option<(&K, &V)>;

    /// Returns the entry with the least key strictly `>` the given key.
    fn successor(&mut self, key: &K) -> Option<(&K, &V)>;

    /// Applies `f` to every entry in ascending key order.
    fn for_each<F: FnMut(&K, &V)>(&self, f: F);

    /// Applies `f` to every entry in descending key order.
    fn for_each_rev<F: FnMut(&K, &V)>(&self, f: F);

    /// Materializes the entries with keys in `[lo, hi]`, ascending.
    /// Empty when `lo > hi` or the range misses the map entirely.
    fn entries_in(&mut self, lo: &K, hi: &K) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone;

    /// Folds every entry in ascending key order into an accumulator.
    fn fold<B, F: FnMut(B, &K, &V) -> B>(&self, init: B, mut f: F) -> B {
        let mut acc = Some(init);
        self.for_each(|k, v| {
            let folded = f(acc.take().expect("`OrderedMap::fold()` - accumulator missing!"), k, v);
            acc = Some(folded);
        });
        acc.expect("`OrderedMap::fold()` - accumulator missing!")
    }

    /// Materializes all entries in ascending key order.
    fn entries_vec(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        let mut out = Vec::with_capacity(self.len());
        self.for_each(|k, v| out.push((k.clone(), v.clone())));
        out
    }

    /// Materializes all entries in descending key order.
    fn entries_rev_vec(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        let mut out = Vec::with_capacity(self.len());
        self.for_each_rev(|k, v| out.push((k.clone(), v.clone())));
        out
    }

    /// Materializes all keys in ascending order.
    fn keys_vec(&self) -> Vec<K>
    where
        K: Clone,
    {
        let mut out = Vec::with_capacity(self.len());
        self.for_each(|k, _| out.push(k.clone()));
        out
    }

    /// Materializes all values in ascending key order.
    fn values_vec(&self) -> Vec<V>
    where
        V: Clone,
    {
        let mut out = Vec::with_capacity(self.len());
        self.for_each(|_, v| out.push(v.clone()));
        out
    }
}

/// Validates that the start bound does not exceed the end bound.
///
/// # Panics
///
/// Panics if `start > end` or if `start == end` and both bounds are `Excluded`.
pub(crate) fn validate_range_bounds<T, R>(range: &R)
where
    T: ?Sized + Ord,
    R: RangeBounds<T>,
{
    if let (Bound::Included(start) | Bound::Excluded(start), Bound::Included(end) | Bound::Excluded(end)) =
        (range.start_bound(), range.end_bound())
    {
        let valid =
            if matches!(range.start_bound(), Bound::Excluded(_)) && matches!(range.end_bound(), Bound::Excluded(_)) {
                start < end
            } else {
                start <= end
            };
        assert!(valid, "range start is greater than range end");
    }
}
