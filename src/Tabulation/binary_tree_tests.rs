/////////////////////////////////////////////////////////////////////////////////////////////////
// TESTS
/////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use crate::Tabulation::binary_tree::BinaryTree;
    use crate::Tabulation::split_node::{Child, Handle, SplitPolicy};
    use crate::Tabulation::tab_entry::{EntryId, TabEntry};
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    fn p(x: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(x)
    }

    fn leaf(x: &[f64]) -> TabEntry<()> {
        TabEntry::new(p(x), (), 0)
    }

    /// leaves reachable from the root, counted without the tree's own traversal helpers
    fn count_reachable<R>(tree: &BinaryTree<R>) -> usize {
        let Some(root) = tree.root() else {
            return 0;
        };
        let mut stack = vec![Child::Node(root)];
        let mut n = 0;
        while let Some(child) = stack.pop() {
            match child {
                Child::Empty => {}
                Child::Leaf(_) => n += 1,
                Child::Node(id) => {
                    let node = tree.node(id).unwrap();
                    stack.push(node.left());
                    stack.push(node.right());
                }
            }
        }
        n
    }

    /// points 0, 1, 2, ... on a line, every point anchored under the previous one
    fn chain(n: usize) -> (BinaryTree<()>, Vec<EntryId>) {
        let mut tree = BinaryTree::new(1, 1000);
        let mut ids: Vec<EntryId> = Vec::new();
        for i in 0..n {
            let id = tree.insert(ids.last().copied(), leaf(&[i as f64]));
            ids.push(id);
        }
        (tree, ids)
    }

    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            self.0 >> 33
        }

        fn unit(&mut self) -> f64 {
            (self.next() % 10_000) as f64 / 10_000.0
        }
    }

    #[test]
    fn test_empty_tree() {
        let tree: BinaryTree<()> = BinaryTree::new(2, 10);
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.search(&p(&[1.0, 2.0])), None);
        assert_eq!(tree.tree_min(), None);
        assert!(!tree.is_full());
        assert!(tree.check_integrity().is_ok());
    }

    #[test]
    fn test_singleton() {
        let mut tree = BinaryTree::new(2, 10);
        let a = tree.insert(None, leaf(&[3.0, 4.0]));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.search(&p(&[3.0, 4.0])), Some(a));
        assert_eq!(tree.search(&p(&[-100.0, 7.0])), Some(a));
        let root = tree.node(tree.root().unwrap()).unwrap();
        assert_eq!(root.left(), Child::Leaf(a));
        assert_eq!(root.right(), Child::Empty);
        assert_eq!(tree.entry(a).unwrap().owning_node(), tree.root());
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.sibling_of(Handle::Entry(a)), None);
        assert!(tree.check_integrity().is_ok());
    }

    #[test]
    fn test_two_entries_are_separated_near_midpoint() {
        let mut tree = BinaryTree::new(2, 10);
        let a = tree.insert(None, leaf(&[0.0, 0.0]));
        let b = tree.insert(Some(a), leaf(&[10.0, 0.0]));
        assert_eq!(tree.search(&p(&[1.0, 0.0])), Some(a));
        assert_eq!(tree.search(&p(&[9.0, 0.0])), Some(b));
        assert_eq!(tree.search(&p(&[4.9, 50.0])), Some(a));
        assert_eq!(tree.search(&p(&[5.1, -50.0])), Some(b));

        let root = tree.node(tree.root().unwrap()).unwrap();
        let normal = root.normal().normalize();
        assert_relative_eq!(normal[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(normal[1], 0.0, epsilon = 1e-12);
        assert_eq!(root.left(), Child::Leaf(a));
        assert_eq!(root.right(), Child::Leaf(b));
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.sibling_of(Handle::Entry(a)), Some(Child::Leaf(b)));
    }

    #[test]
    fn test_insert_without_anchor_uses_search() {
        let mut tree = BinaryTree::new(1, 10);
        let a = tree.insert(None, leaf(&[0.0]));
        let b = tree.insert(None, leaf(&[10.0]));
        let c = tree.insert(None, leaf(&[12.0]));
        // c lands right of the 0|10 plane, next to b
        assert_eq!(tree.sibling_of(Handle::Entry(c)), Some(Child::Leaf(b)));
        assert_eq!(tree.search(&p(&[-1.0])), Some(a));
        assert_eq!(tree.search(&p(&[10.5])), Some(b));
        assert_eq!(tree.search(&p(&[11.5])), Some(c));
        assert!(tree.check_integrity().is_ok());
    }

    #[test]
    fn test_size_matches_traversal_under_random_operations() {
        let mut rng = Lcg(7);
        let mut tree = BinaryTree::new(3, 50);
        let mut ids: Vec<EntryId> = Vec::new();
        for _ in 0..400 {
            if !ids.is_empty() && rng.next() % 3 == 0 {
                let k = (rng.next() as usize) % ids.len();
                let id = ids.swap_remove(k);
                assert!(tree.delete(id).is_some());
                assert!(!tree.contains(id));
            } else {
                let x = [rng.unit(), rng.unit(), rng.unit()];
                let anchor = if ids.is_empty() || rng.next() % 2 == 0 {
                    None
                } else {
                    Some(ids[(rng.next() as usize) % ids.len()])
                };
                ids.push(tree.insert(anchor, leaf(&x)));
            }
            assert_eq!(tree.len(), ids.len());
            assert_eq!(count_reachable(&tree), tree.len());
            assert_eq!(tree.iter().count(), tree.len());
            assert_eq!(tree.check_integrity(), Ok(()));
        }
    }

    #[test]
    fn test_search_returns_inserted_entry_for_its_own_position() {
        let mut rng = Lcg(11);
        let mut tree = BinaryTree::new(2, 100);
        let mut points = Vec::new();
        for _ in 0..60 {
            let x = [rng.unit(), rng.unit()];
            let id = tree.insert(None, leaf(&x));
            points.push((id, x));
        }
        // search on an exact position descends along the construction-time hyperplanes
        for (id, x) in points {
            assert_eq!(tree.search(&p(&x)), Some(id));
        }
    }

    #[test]
    #[should_panic]
    fn test_insert_with_stale_anchor_panics() {
        let mut tree = BinaryTree::new(1, 10);
        let a = tree.insert(None, leaf(&[0.0]));
        let _b = tree.insert(Some(a), leaf(&[1.0]));
        tree.delete(a);
        tree.insert(Some(a), leaf(&[2.0]));
    }

    #[test]
    #[should_panic]
    fn test_insert_with_wrong_dimension_panics() {
        let mut tree = BinaryTree::new(2, 10);
        tree.insert(None, leaf(&[0.0, 1.0, 2.0]));
    }

    #[test]
    #[should_panic(expected = "is not a child of its recorded owner")]
    fn test_insert_under_anchor_with_wrong_owner_panics() {
        let (mut tree, ids) = chain(4);
        // p0 sits under the root, but claims the deepest split node as its owner
        let deepest = tree.entry(ids[3]).unwrap().owning_node().unwrap();
        tree.entry_mut(ids[0]).unwrap().set_owning_node(deepest);
        assert!(tree.check_integrity().is_err());
        tree.insert(Some(ids[0]), leaf(&[0.5]));
    }

    #[test]
    fn test_sibling_of_inner_nodes() {
        // root{ A{p0, p2}, B{p1, p3} }
        let mut tree = BinaryTree::new(1, 10);
        let p0 = tree.insert(None, leaf(&[0.0]));
        let p1 = tree.insert(Some(p0), leaf(&[10.0]));
        let p2 = tree.insert(Some(p0), leaf(&[-5.0]));
        let p3 = tree.insert(Some(p1), leaf(&[15.0]));
        let a = tree.entry(p0).unwrap().owning_node().unwrap();
        let b = tree.entry(p1).unwrap().owning_node().unwrap();
        assert_eq!(tree.entry(p2).unwrap().owning_node(), Some(a));
        assert_eq!(tree.entry(p3).unwrap().owning_node(), Some(b));
        assert_ne!(Some(a), tree.root());
        assert_eq!(tree.sibling_of(Handle::Node(a)), Some(Child::Node(b)));
        assert_eq!(tree.sibling_of(Handle::Node(b)), Some(Child::Node(a)));
        assert_eq!(tree.sibling_of(Handle::Entry(p2)), Some(Child::Leaf(p0)));

        // deeper in a chain the sibling of a node is a leaf
        let (chain_tree, ids) = chain(4);
        let deepest = chain_tree.entry(ids[3]).unwrap().owning_node().unwrap();
        assert_eq!(
            chain_tree.sibling_of(Handle::Node(deepest)),
            Some(Child::Leaf(ids[1]))
        );
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (mut tree, ids) = chain(6);
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.node_count(), 0);
        assert!(tree.entry(ids[0]).is_none());
        tree.clear();
        assert!(tree.root().is_none());
        assert_eq!(tree.len(), 0);
        assert!(tree.check_integrity().is_ok());
        // the tree is usable again
        let a = tree.insert(None, leaf(&[1.0]));
        assert_eq!(tree.search(&p(&[5.0])), Some(a));
    }

    #[test]
    fn test_delete_splices_out_the_owner() {
        // root{p0, S1{p1, S2{p2, p3}}}
        let (mut tree, ids) = chain(4);
        assert_eq!(tree.depth(), 3);
        let s2 = tree.entry(ids[2]).unwrap().owning_node().unwrap();
        let s1 = tree.node(s2).unwrap().parent().unwrap();

        tree.delete(ids[2]);
        assert!(tree.node(s2).is_none());
        let s1_node = tree.node(s1).unwrap();
        assert_eq!(s1_node.right(), Child::Leaf(ids[3]));
        assert_eq!(tree.entry(ids[3]).unwrap().owning_node(), Some(s1));
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.sibling_of(Handle::Entry(ids[3])), Some(Child::Leaf(ids[1])));
        assert!(tree.check_integrity().is_ok());
    }

    #[test]
    fn test_delete_at_root_promotes_sibling_node() {
        // root{p0, S{p1, p2}}
        let (mut tree, ids) = chain(3);
        let old_root = tree.root().unwrap();
        let s = tree.entry(ids[1]).unwrap().owning_node().unwrap();
        tree.delete(ids[0]);
        assert_eq!(tree.root(), Some(s));
        assert!(tree.node(old_root).is_none());
        assert!(tree.node(s).unwrap().parent().is_none());
        assert_eq!(tree.sibling_of(Handle::Node(s)), None);
        assert_eq!(tree.depth(), 1);
        assert!(tree.check_integrity().is_ok());
    }

    #[test]
    fn test_delete_walks_back_to_empty() {
        let mut tree = BinaryTree::new(2, 10);
        let a = tree.insert(None, leaf(&[0.0, 0.0]));
        let b = tree.insert(Some(a), leaf(&[1.0, 1.0]));
        // branched -> singleton
        let removed = tree.delete(a).unwrap();
        assert_relative_eq!(removed.position()[0], 0.0);
        assert_eq!(tree.len(), 1);
        let root = tree.node(tree.root().unwrap()).unwrap();
        assert_eq!(root.left(), Child::Leaf(b));
        assert_eq!(root.right(), Child::Empty);
        assert_eq!(tree.search(&p(&[-5.0, -5.0])), Some(b));
        assert!(tree.check_integrity().is_ok());
        // singleton -> empty
        assert!(tree.delete(b).is_some());
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 0);
        assert_eq!(tree.search(&p(&[0.0, 0.0])), None);
        // stale handles are ignored
        assert!(tree.delete(b).is_none());
    }

    #[test]
    fn test_chain_depth_and_alternating_anchors() {
        for n in [2usize, 4, 9, 16] {
            let (tree, _) = chain(n);
            assert_eq!(tree.depth(), n - 1);
        }
        for n in [4usize, 9, 16] {
            let mut tree = BinaryTree::new(1, 1000);
            let mut ids: Vec<EntryId> = Vec::new();
            for i in 0..n {
                let anchor = if i == 0 { None } else { Some(ids[(i - 1) / 2]) };
                ids.push(tree.insert(anchor, leaf(&[i as f64])));
            }
            assert!(tree.depth() < n - 1, "depth {} for {} entries", tree.depth(), n);
            assert!(tree.check_integrity().is_ok());
        }
    }

    #[test]
    fn test_in_order_sweep() {
        let (tree, ids) = chain(7);
        assert_eq!(tree.tree_min(), Some(ids[0]));
        let visited: Vec<EntryId> = tree.iter().map(|(id, _)| id).collect();
        assert_eq!(visited, ids);
        assert_eq!(tree.successor(ids[6]), None);
        assert_eq!(tree.successor(ids[2]), Some(ids[3]));
    }

    #[test]
    fn test_reset_all_retrieve_counts() {
        let (mut tree, ids) = chain(5);
        for (k, id) in ids.iter().enumerate() {
            for _ in 0..k + 1 {
                tree.entry_mut(*id).unwrap().increment_retrieve_count();
            }
        }
        assert_eq!(tree.entry(ids[4]).unwrap().retrieve_count(), 5);
        tree.reset_all_retrieve_counts();
        assert!(tree.iter().all(|(_, entry)| entry.retrieve_count() == 0));
        assert!(tree.usage_snapshot().iter().all(|u| u.retrieve_count == 0));
    }

    #[test]
    fn test_secondary_candidates_nearest_subtrees_first() {
        let (tree, ids) = chain(6);
        let q = p(&[4.0]);
        assert_eq!(
            tree.secondary_candidates(ids[4], &q, 3),
            vec![ids[5], ids[3], ids[2]]
        );
        let all = tree.secondary_candidates(ids[4], &q, 100);
        assert_eq!(all.len(), 5);
        assert!(!all.contains(&ids[4]));
        assert!(tree.secondary_candidates(ids[4], &q, 0).is_empty());
    }

    #[test]
    fn test_balance_shortens_chain() {
        let (mut tree, ids) = chain(16);
        assert_eq!(tree.depth(), 15);
        tree.balance();
        assert_eq!(tree.depth(), 4);
        assert_eq!(tree.len(), 16);
        assert_eq!(tree.node_count(), 15);
        assert!(tree.check_integrity().is_ok());
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(tree.search(&p(&[i as f64])), Some(*id));
        }
    }

    #[test]
    fn test_balance_with_coincident_points() {
        let mut tree = BinaryTree::new(2, 10);
        for _ in 0..3 {
            tree.insert(None, leaf(&[1.0, 1.0]));
        }
        tree.balance();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.iter().count(), 3);
        assert!(tree.check_integrity().is_ok());
        assert!(tree.search(&p(&[1.0, 1.0])).is_some());
    }

    #[test]
    fn test_capacity_is_advisory() {
        let mut tree = BinaryTree::new(1, 2);
        tree.insert(None, leaf(&[0.0]));
        assert!(!tree.is_full());
        tree.insert(None, leaf(&[1.0]));
        assert!(tree.is_full());
        tree.insert(None, leaf(&[2.0]));
        assert_eq!(tree.len(), 3);
        assert!(tree.is_full());
    }

    /// splits along the first coordinate only
    struct FirstAxis;

    impl SplitPolicy for FirstAxis {
        fn separate(&self, old: &DVector<f64>, new: &DVector<f64>) -> (DVector<f64>, f64) {
            let mut v = DVector::zeros(old.len());
            let sign = if new[0] > old[0] { 1.0 } else { -1.0 };
            v[0] = sign;
            (v, sign * 0.5 * (old[0] + new[0]))
        }
    }

    #[test]
    fn test_custom_split_policy() {
        let mut tree: BinaryTree<(), FirstAxis> = BinaryTree::with_policy(2, 10, FirstAxis);
        let a = tree.insert(None, leaf(&[5.0, 0.0]));
        let b = tree.insert(Some(a), leaf(&[1.0, 100.0]));
        // only x matters
        assert_eq!(tree.search(&p(&[4.0, 100.0])), Some(a));
        assert_eq!(tree.search(&p(&[2.0, -100.0])), Some(b));
    }
}
