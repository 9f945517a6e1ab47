//! Ordered key→value containers for Rust.
//!
//! This crate provides three independent ordered-map engines behind one
//! contract, each with a different performance/structural trade-off:
//!
//! - [`BTree`] - a Knuth-order B-Tree. Key/value pairs live in every node;
//!   both bottom-up and pre-emptive top-down mutation algorithms are provided.
//! - [`BPlusTree`] - a B+Tree. Key/value pairs live only in leaves, which form
//!   a doubly-linked chain for O(log n + k) range scans.
//! - [`SplayTree`] - a self-adjusting binary search tree with top-down splay.
//!   Every access moves the touched key to the root; `split`/`join` are
//!   first-class operations.
//!
//! The [`OrderedMap`] trait captures the operations the engines share:
//! lookup, the insert/update/upsert family, removal, neighbor queries
//! (floor/ceiling/predecessor/successor), ordered and reverse traversal, and
//! materialized bulk transforms.
//!
//! # Example
//!
//! ```
//! use tern_tree::{BPlusTree, BTree, OrderedMap, SplayTree};
//!
//! let mut tree = BTree::new();
//! tree.insert(3, "c");
//! tree.insert(1, "a");
//! tree.insert(2, "b");
//!
//! assert_eq!(tree.get(&2), Some(&"b"));
//! assert_eq!(tree.floor(&5), Some((&3, &"c")));
//! let keys: Vec<_> = tree.keys().copied().collect();
//! assert_eq!(keys, [1, 2, 3]);
//!
//! // The same operations through the shared contract, for any engine.
//! fn smallest<M: OrderedMap<i32, &'static str>>(map: &mut M) -> Option<i32> {
//!     map.first_key_value().map(|(&k, _)| k)
//! }
//! assert_eq!(smallest(&mut tree), Some(1));
//! assert_eq!(smallest(&mut BPlusTree::new()), None);
//! assert_eq!(smallest(&mut SplayTree::new()), None);
//! ```
//!
//! # Choosing an engine
//!
//! - `BTree` keeps values on the search path, so point lookups touch the
//!   fewest nodes. Range scans descend and walk an explicit frame stack.
//! - `BPlusTree` pays one extra level on point lookups but its leaf chain
//!   makes in-order and range scans sequential memory walks.
//! - `SplayTree` has no balance invariant and adapts to skewed access
//!   patterns. Reads reshape the tree, so all access-path operations take
//!   `&mut self`; clients must not assume structural stability across queries.
//!
//! # Features
//!
//! - **`no_std` compatible** - only requires `alloc`.
//! - **No unsafe code** - the B-family engines store nodes in an index arena,
//!   which expresses the B+Tree's non-owning sibling links safely; iterators
//!   borrow the tree they walk.
//! - **Bulk-load** - `BTree` and `BPlusTree` build from pre-sorted input in
//!   linear time without per-key rebalancing.

#![no_std]
// These forbid rules and lint groups are meant to be very restrictive.
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;
#[cfg(test)]
extern crate std;

mod ordered;
mod raw;

pub mod bplus;
pub mod btree;
pub mod splay;

pub use bplus::BPlusTree;
pub use btree::BTree;
pub use ordered::OrderedMap;
pub use splay::SplayTree;
