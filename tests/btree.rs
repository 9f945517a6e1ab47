use std::collections::BTreeMap;

use proptest::prelude::*;
use tern_tree::BTree;

/// The number of operations to perform in each proptest case.
const TEST_SIZE: usize = 2_000;

/// Generates keys from a range small enough to force collisions.
fn key_strategy() -> impl Strategy<Value = i64> {
    -2_000i64..2_000i64
}

fn value_strategy() -> impl Strategy<Value = i64> {
    any::<i64>()
}

fn order_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![Just(3usize), Just(4), Just(5), Just(8), Just(16), Just(32)]
}

// ─── Operations enum for driving randomized tests ────────────────────────────

#[derive(Debug, Clone)]
enum MapOp {
    Insert(i64, i64),
    InsertIfAbsent(i64, i64),
    Update(i64, i64),
    Remove(i64),
    Get(i64),
    ContainsKey(i64),
    FirstKeyValue,
    LastKeyValue,
    PopFirst,
    PopLast,
}

fn map_op_strategy() -> impl Strategy<Value = MapOp> {
    prop_oneof![
        5 => (key_strategy(), value_strategy()).prop_map(|(k, v)| MapOp::Insert(k, v)),
        2 => (key_strategy(), value_strategy()).prop_map(|(k, v)| MapOp::InsertIfAbsent(k, v)),
        2 => (key_strategy(), value_strategy()).prop_map(|(k, v)| MapOp::Update(k, v)),
        4 => key_strategy().prop_map(MapOp::Remove),
        2 => key_strategy().prop_map(MapOp::Get),
        1 => key_strategy().prop_map(MapOp::ContainsKey),
        1 => Just(MapOp::FirstKeyValue),
        1 => Just(MapOp::LastKeyValue),
        1 => Just(MapOp::PopFirst),
        1 => Just(MapOp::PopLast),
    ]
}

// ─── Randomized model tests against std::collections::BTreeMap ───────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Replays a random operation sequence on both `BTree` and `BTreeMap`
    /// and asserts identical results at every step.
    #[test]
    fn map_ops_match_btreemap(
        order in order_strategy(),
        ops in proptest::collection::vec(map_op_strategy(), TEST_SIZE),
    ) {
        let mut tree: BTree<i64, i64> = BTree::with_order(order);
        let mut model: BTreeMap<i64, i64> = BTreeMap::new();

        for op in &ops {
            match op {
                MapOp::Insert(k, v) => {
                    prop_assert_eq!(tree.insert(*k, *v), model.insert(*k, *v), "insert({}, {})", k, v);
                }
                MapOp::InsertIfAbsent(k, v) => {
                    let inserted = tree.insert_if_absent(*k, *v);
                    let expected = if model.contains_key(k) {
                        false
                    } else {
                        model.insert(*k, *v);
                        true
                    };
                    prop_assert_eq!(inserted, expected, "insert_if_absent({}, {})", k, v);
                }
                MapOp::Update(k, v) => {
                    let expected = model.get_mut(k).map(|slot| std::mem::replace(slot, *v));
                    prop_assert_eq!(tree.update(k, *v), expected, "update({}, {})", k, v);
                }
                MapOp::Remove(k) => {
                    prop_assert_eq!(tree.remove(k), model.remove(k), "remove({})", k);
                }
                MapOp::Get(k) => {
                    prop_assert_eq!(tree.get(k), model.get(k), "get({})", k);
                }
                MapOp::ContainsKey(k) => {
                    prop_assert_eq!(tree.contains_key(k), model.contains_key(k), "contains_key({})", k);
                }
                MapOp::FirstKeyValue => {
                    prop_assert_eq!(tree.first_key_value(), model.first_key_value(), "first_key_value");
                }
                MapOp::LastKeyValue => {
                    prop_assert_eq!(tree.last_key_value(), model.last_key_value(), "last_key_value");
                }
                MapOp::PopFirst => {
                    prop_assert_eq!(tree.pop_first(), model.pop_first(), "pop_first");
                }
                MapOp::PopLast => {
                    prop_assert_eq!(tree.pop_last(), model.pop_last(), "pop_last");
                }
            }
            prop_assert_eq!(tree.len(), model.len(), "len mismatch after {:?}", op);
        }

        let entries: Vec<_> = tree.iter().map(|(&k, &v)| (k, v)).collect();
        let expected: Vec<_> = model.iter().map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(entries, expected, "final contents");
    }

    /// The alternate algorithm pair maintains the same element sets as the
    /// defaults under a shared operation sequence.
    #[test]
    fn alternate_algorithms_agree(
        order in prop_oneof![Just(4usize), Just(8), Just(16)],
        ops in proptest::collection::vec(map_op_strategy(), TEST_SIZE / 2),
    ) {
        let mut default_paths: BTree<i64, i64> = BTree::with_order(order);
        let mut alternate_paths: BTree<i64, i64> = BTree::with_order(order);

        for op in &ops {
            match op {
                MapOp::Insert(k, v) | MapOp::InsertIfAbsent(k, v) => {
                    prop_assert_eq!(default_paths.insert(*k, *v), alternate_paths.insert_top_down(*k, *v));
                }
                MapOp::Remove(k) => {
                    prop_assert_eq!(default_paths.remove(k), alternate_paths.remove_bottom_up(k));
                }
                _ => {}
            }
        }

        let lhs: Vec<_> = default_paths.iter().map(|(&k, &v)| (k, v)).collect();
        let rhs: Vec<_> = alternate_paths.iter().map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(lhs, rhs);
    }

    /// Iteration order and double-ended behavior match `BTreeMap`.
    #[test]
    fn iter_matches_btreemap(
        order in order_strategy(),
        entries in proptest::collection::vec((key_strategy(), value_strategy()), TEST_SIZE),
    ) {
        let mut tree: BTree<i64, i64> = BTree::with_order(order);
        let mut model: BTreeMap<i64, i64> = BTreeMap::new();
        for (k, v) in &entries {
            tree.insert(*k, *v);
            model.insert(*k, *v);
        }

        let forward: Vec<_> = tree.iter().map(|(&k, &v)| (k, v)).collect();
        let expected: Vec<_> = model.iter().map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&forward, &expected, "iter() mismatch");

        let backward: Vec<_> = tree.iter().rev().map(|(&k, &v)| (k, v)).collect();
        let expected_rev: Vec<_> = model.iter().rev().map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&backward, &expected_rev, "iter().rev() mismatch");

        let keys: Vec<_> = tree.keys().copied().collect();
        let expected_keys: Vec<_> = model.keys().copied().collect();
        prop_assert_eq!(&keys, &expected_keys, "keys() mismatch");

        let values: Vec<_> = tree.values().copied().collect();
        let expected_values: Vec<_> = model.values().copied().collect();
        prop_assert_eq!(&values, &expected_values, "values() mismatch");

        let owned: Vec<_> = tree.clone().into_iter().collect();
        let expected_owned: Vec<_> = model.clone().into_iter().collect();
        prop_assert_eq!(&owned, &expected_owned, "into_iter() mismatch");
    }

    /// Range queries match `BTreeMap` for every bound combination.
    #[test]
    fn range_matches_btreemap(
        order in order_strategy(),
        entries in proptest::collection::vec((key_strategy(), value_strategy()), TEST_SIZE),
        lo in key_strategy(),
        hi in key_strategy(),
    ) {
        let mut tree: BTree<i64, i64> = BTree::with_order(order);
        tree.extend(entries.iter().copied());
        let model: BTreeMap<i64, i64> = entries.iter().copied().collect();
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };

        let got: Vec<_> = tree.range(lo..=hi).map(|(&k, &v)| (k, v)).collect();
        let expected: Vec<_> = model.range(lo..=hi).map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&got, &expected, "closed range mismatch");

        let got: Vec<_> = tree.range(lo..hi).map(|(&k, &v)| (k, v)).collect();
        let expected: Vec<_> = model.range(lo..hi).map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&got, &expected, "half-open range mismatch");

        let got: Vec<_> = tree.range(lo..).map(|(&k, &v)| (k, v)).collect();
        let expected: Vec<_> = model.range(lo..).map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&got, &expected, "from range mismatch");

        let got: Vec<_> = tree.range(..=hi).map(|(&k, &v)| (k, v)).collect();
        let expected: Vec<_> = model.range(..=hi).map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&got, &expected, "to range mismatch");
    }

    /// Neighbor queries match a reference computed from the sorted contents.
    #[test]
    fn neighbor_queries_match_reference(
        order in order_strategy(),
        entries in proptest::collection::vec((key_strategy(), value_strategy()), 1..TEST_SIZE),
        probe in key_strategy(),
    ) {
        let mut tree: BTree<i64, i64> = BTree::with_order(order);
        let mut model: BTreeMap<i64, i64> = BTreeMap::new();
        for (k, v) in &entries {
            tree.insert(*k, *v);
            model.insert(*k, *v);
        }

        let floor = model.range(..=probe).next_back().map(|(&k, _)| k);
        let ceiling = model.range(probe..).next().map(|(&k, _)| k);
        let predecessor = model.range(..probe).next_back().map(|(&k, _)| k);
        let successor = model.range(probe + 1..).next().map(|(&k, _)| k);

        prop_assert_eq!(tree.floor(&probe).map(|(&k, _)| k), floor, "floor({})", probe);
        prop_assert_eq!(tree.ceiling(&probe).map(|(&k, _)| k), ceiling, "ceiling({})", probe);
        prop_assert_eq!(tree.predecessor(&probe).map(|(&k, _)| k), predecessor, "predecessor({})", probe);
        prop_assert_eq!(tree.successor(&probe).map(|(&k, _)| k), successor, "successor({})", probe);
    }

    /// Bulk-loading sorted entries produces the same map as inserting them,
    /// for any order and input length.
    #[test]
    fn bulk_load_matches_insertion(
        order in order_strategy(),
        count in 0usize..600,
    ) {
        let entries: Vec<(i64, i64)> = (0..count as i64).map(|k| (k * 3, k)).collect();
        let loaded = BTree::from_sorted_iter_with_order(order, entries.iter().copied());
        let inserted: BTree<i64, i64> = {
            let mut tree = BTree::with_order(order);
            tree.extend(entries.iter().copied());
            tree
        };

        prop_assert_eq!(loaded.len(), count);
        let lhs: Vec<_> = loaded.iter().map(|(&k, &v)| (k, v)).collect();
        let rhs: Vec<_> = inserted.iter().map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(lhs, rhs);

        // Height stays within the B-Tree bound for the order.
        if count > 1 {
            let min_children = order.div_ceil(2) as f64;
            let bound = (count as f64).log(min_children).ceil() as usize + 1;
            prop_assert!(loaded.height() <= bound, "height {} exceeds bound {}", loaded.height(), bound);
        }
    }
}

// ─── Concrete scenarios ──────────────────────────────────────────────────────

/// Ascending insertion of 1..=10 at order 4: a three-level tree whose
/// in-order traversal is 1..=10, and removal of the maximum keeps it intact.
#[test]
fn ascending_insert_order_four() {
    let mut tree = BTree::with_order(4);
    for k in 1..=10 {
        tree.insert(k, k * 100);
    }

    assert_eq!(tree.len(), 10);
    assert_eq!(tree.height(), 3);
    let keys: Vec<_> = tree.keys().copied().collect();
    assert_eq!(keys, (1..=10).collect::<Vec<_>>());

    assert_eq!(tree.remove(&10), Some(1000));
    assert_eq!(tree.len(), 9);
    assert_eq!(tree.last_key_value(), Some((&9, &900)));
    let keys: Vec<_> = tree.keys().copied().collect();
    assert_eq!(keys, (1..=9).collect::<Vec<_>>());
}

/// The root view exposes the multiway structure: all leaves at one depth,
/// separator keys bounding their subtrees.
#[test]
fn root_view_walks_structure() {
    let tree = BTree::from_sorted_iter_with_order(4, (0..50).map(|k| (k, ())));

    fn leaf_depths(view: tern_tree::btree::NodeView<'_, i32, ()>, depth: usize, out: &mut Vec<usize>) {
        if view.is_leaf() {
            out.push(depth);
            return;
        }
        assert_eq!(view.child_count(), view.key_count() + 1);
        for i in 0..view.child_count() {
            leaf_depths(view.child(i), depth + 1, out);
        }
    }

    let mut depths = Vec::new();
    leaf_depths(tree.root_view().expect("tree is non-empty"), 1, &mut depths);
    assert!(depths.iter().all(|&d| d == depths[0]), "leaves at mixed depths: {depths:?}");
    assert_eq!(depths[0], tree.height());
}

/// Update never restructures: the tree shape before and after is identical.
#[test]
fn update_leaves_shape_alone() {
    let mut tree = BTree::from_sorted_iter_with_order(4, (0..50).map(|k| (k, 0)));
    let before = tree.height();
    for k in 0..50 {
        assert_eq!(tree.update(&k, k), Some(0));
    }
    assert_eq!(tree.update(&99, 99), None);
    assert_eq!(tree.height(), before);
    assert_eq!(tree.len(), 50);
}

/// Removing every element through either deletion algorithm empties the tree
/// and keeps intermediate states consistent.
#[test]
fn drain_by_single_removals() {
    for order in [3usize, 4, 5, 16] {
        let keys: Vec<i64> = (0..200).map(|i| (i * 73) % 211).collect();

        let mut top_down: BTree<i64, i64> = BTree::with_order(order);
        let mut bottom_up: BTree<i64, i64> = BTree::with_order(order);
        top_down.extend(keys.iter().map(|&k| (k, k)));
        bottom_up.extend(keys.iter().map(|&k| (k, k)));

        let mut sorted = keys.clone();
        sorted.sort_unstable();
        sorted.dedup();

        for &k in &sorted {
            assert_eq!(top_down.remove(&k), Some(k));
            assert_eq!(bottom_up.remove_bottom_up(&k), Some(k));
        }
        assert!(top_down.is_empty());
        assert!(bottom_up.is_empty());
        assert_eq!(top_down.first_key_value(), None);
    }
}

/// Borrowed-form lookups work through `Borrow`, as with the standard map.
#[test]
fn string_keys_lookup_by_str() {
    let mut tree: BTree<String, u32> = BTree::with_order(4);
    for name in ["ada", "brian", "dennis", "grace", "ken"] {
        tree.insert(name.to_owned(), name.len() as u32);
    }

    assert_eq!(tree.get("grace"), Some(&5));
    assert_eq!(tree.get_key_value("ken").map(|(k, _)| k.as_str()), Some("ken"));
    assert_eq!(tree.floor("claude").map(|(k, _)| k.as_str()), Some("brian"));
    assert_eq!(tree.remove("brian"), Some(5));
    assert!(!tree.contains_key("brian"));
    assert_eq!(tree[&"ada".to_owned()], 3);
}

/// `get_mut` edits in place without disturbing structure or order.
#[test]
fn get_mut_edits_in_place() {
    let mut tree = BTree::from_sorted_iter_with_order(4, (0..40).map(|k| (k, 0u32)));
    for k in (0..40).step_by(3) {
        *tree.get_mut(&k).expect("key was loaded") += 1;
    }
    assert_eq!(tree.get_mut(&99), None);
    let touched: Vec<_> = tree.iter().filter(|&(_, &v)| v == 1).map(|(&k, _)| k).collect();
    assert_eq!(touched, (0..40).step_by(3).collect::<Vec<_>>());
}

/// Clones are independent: mutating one leaves the other intact.
#[test]
fn clone_is_independent() {
    let mut original: BTree<i32, i32> = (0..100).map(|k| (k, k)).collect();
    let snapshot = original.clone();
    for k in 0..50 {
        original.remove(&k);
    }
    assert_eq!(original.len(), 50);
    assert_eq!(snapshot.len(), 100);
    assert_eq!(snapshot.get(&0), Some(&0));
    assert_eq!(original, (50..100).map(|k| (k, k)).collect::<BTree<_, _>>());
    assert_ne!(original, snapshot);
}

/// A bulk-loaded tree accepts further mutation without losing its balance.
#[test]
fn bulk_load_then_churn() {
    let mut tree = BTree::from_sorted_iter_with_order(4, (0..200).map(|k| (k * 2, k)));
    for k in 0..200 {
        tree.insert(k * 2 + 1, -1);
    }
    for k in (0..400).step_by(4) {
        tree.remove(&k);
    }
    let keys: Vec<_> = tree.keys().copied().collect();
    let expected: Vec<_> = (0..400).filter(|k| k % 4 != 0).collect();
    assert_eq!(keys, expected);
}

#[test]
#[should_panic(expected = "`order` must be at least 3")]
fn tiny_order_panics() {
    let _ = BTree::<i32, i32>::with_order(2);
}
