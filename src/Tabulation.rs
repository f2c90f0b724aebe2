//! # In situ adaptive tabulation
//!
//! Memoization of an expensive vector-to-vector map (integration of the chemical kinetics
//! over a time step, for instance) keyed by the query vector. A stored result is reused
//! not only for its own query but for every query inside its *region of validity*.
//!
//! | Module | Content |
//! |--------|---------|
//! | `binary_tree` | space-partitioning index: search, insert, delete, sweep, balance |
//! | `split_node` | internal nodes, hyperplanes, hyperplane construction policy |
//! | `tab_entry` | leaves, region-of-validity interface, evaluation record |
//! | `ball_region` | spherical region with optional linear correction |
//! | `eviction` | pluggable eviction policies |
//! | `tab_config` | JSON configuration |
//! | `tab_error` | error types |
//! | `tabulation_cache` | retrieve / grow / add front end |
//!
//! The index is single-threaded; a multi-threaded caller has to guard the whole cache with
//! one mutex.

/// generational arena with stable indices
pub mod arena;
pub mod ball_region;
/// The index itself.
///
///  # Examples
/// ```
/// use KiTab::Tabulation::binary_tree::BinaryTree;
/// use KiTab::Tabulation::tab_entry::TabEntry;
/// use nalgebra::DVector;
/// let mut tree: BinaryTree<()> = BinaryTree::new(2, 100);
/// let a = tree.insert(None, TabEntry::new(DVector::from_vec(vec![0.0, 0.0]), (), 0));
/// let b = tree.insert(Some(a), TabEntry::new(DVector::from_vec(vec![10.0, 0.0]), (), 0));
/// assert_eq!(tree.search(&DVector::from_vec(vec![1.0, 0.0])), Some(a));
/// assert_eq!(tree.search(&DVector::from_vec(vec![9.0, 0.0])), Some(b));
/// ```
pub mod binary_tree;
pub mod eviction;
pub mod split_node;
pub mod tab_config;
pub mod tab_entry;
pub mod tab_error;
pub mod tabulation_cache;

mod binary_tree_tests;
