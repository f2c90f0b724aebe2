//! # Binary tree of the tabulation
//!
//! ## Purpose
//! Space-partitioning index of tabulated entries. Every internal `SplitNode` holds a
//! hyperplane; a query descends by classifying itself against the hyperplanes until it
//! reaches a leaf. The leaf found that way is only a *candidate*: the caller must check
//! the region of validity of the entry before reusing its result.
//!
//! ## Structure
//! - Nodes and entries live in two generational arenas; parent links and child slots are
//!   plain handles (`NodeId`, `EntryId`), ownership is held by the arenas only.
//! - A child slot is `Child::Empty | Child::Leaf(EntryId) | Child::Node(NodeId)`.
//! - With one entry the root is *degenerate*: no hyperplane, entry in the left slot,
//!   right slot empty. With two or more entries every node has two occupied slots.
//!
//! ## Key Methods
//! - `search()`: primary descent, O(depth)
//! - `insert()`: replace the anchor leaf by a new split node holding anchor and newcomer
//! - `delete()`: remove a leaf and splice out its owner node
//! - `tree_min()`/`successor()`/`iter()`: in-order sweep over the leaves
//! - `secondary_candidates()`: leaves near a failed candidate, nearest subtrees first
//! - `balance()`: rebuild by median splits along the direction of largest spread
//!
//! ## Non-obvious
//! The tree is not self-balancing. Always anchoring the newcomer under the most recent
//! entry grows a chain of depth N-1; `balance()` is there for the cache maintenance pass.
//! Traversals use explicit stacks so that such chains do not exhaust the call stack.
use super::arena::Arena;
use super::split_node::{
    BisectingHyperplane, Child, Handle, NodeId, Side, SplitNode, SplitPolicy,
};
use super::tab_entry::{EntryId, LeafUsage, TabEntry};
use super::tab_error::{TreeError, invariant_violation};
use log::debug;
use nalgebra::DVector;

/// upper bound of the entry slots reserved up front; the capacity itself may be huge
const INITIAL_RESERVE: usize = 4096;

#[derive(Debug, Clone)]
pub struct BinaryTree<R, P = BisectingHyperplane> {
    nodes: Arena<SplitNode>,
    entries: Arena<TabEntry<R>>,
    root: Option<NodeId>,
    /// maximum number of leaves, advisory
    capacity: usize,
    /// dimension of the query space
    dim: usize,
    policy: P,
}

impl<R> BinaryTree<R, BisectingHyperplane> {
    pub fn new(dim: usize, capacity: usize) -> Self {
        Self::with_policy(dim, capacity, BisectingHyperplane)
    }
}

impl<R, P: SplitPolicy> BinaryTree<R, P> {
    pub fn with_policy(dim: usize, capacity: usize, policy: P) -> Self {
        Self {
            nodes: Arena::new(),
            entries: Arena::with_capacity(capacity.min(INITIAL_RESERVE)),
            root: None,
            capacity,
            dim,
            policy,
        }
    }

    ////////////////////////////////////ACCESSORS////////////////////////////////////////
    /// number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// advisory: insert never refuses to go beyond the capacity
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&SplitNode> {
        self.nodes.get(id.0)
    }

    pub fn entry(&self, id: EntryId) -> Option<&TabEntry<R>> {
        self.entries.get(id.0)
    }

    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut TabEntry<R>> {
        self.entries.get_mut(id.0)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.entries.contains(id.0)
    }

    fn node_ref(&self, id: NodeId) -> &SplitNode {
        match self.nodes.get(id.0) {
            Some(node) => node,
            None => invariant_violation(format!("dangling link to split node {:?}", id)),
        }
    }

    fn node_mut_ref(&mut self, id: NodeId) -> &mut SplitNode {
        match self.nodes.get_mut(id.0) {
            Some(node) => node,
            None => invariant_violation(format!("dangling link to split node {:?}", id)),
        }
    }

    fn entry_mut_ref(&mut self, id: EntryId) -> &mut TabEntry<R> {
        match self.entries.get_mut(id.0) {
            Some(entry) => entry,
            None => invariant_violation(format!("dangling link to entry {:?}", id)),
        }
    }

    /// owner node of a live entry and the slot it occupies there
    fn owner_slot(&self, id: EntryId) -> (NodeId, Side) {
        let Some(entry) = self.entries.get(id.0) else {
            invariant_violation(format!("entry {:?} is not stored in the tree", id))
        };
        let Some(owner) = entry.owning_node() else {
            invariant_violation(format!("entry {:?} has no owning node", id))
        };
        match self.node_ref(owner).side_of(Child::Leaf(id)) {
            Some(side) => (owner, side),
            None => invariant_violation(format!(
                "entry {:?} is not a child of its recorded owner {:?}",
                id, owner
            )),
        }
    }

    /// put `new` in the slot of `parent` currently holding `old`
    fn replace_child(&mut self, parent: NodeId, old: Child, new: Child) {
        let node = self.node_mut_ref(parent);
        match node.side_of(old) {
            Some(side) => node.set_child(side, new),
            None => invariant_violation(format!(
                "{:?} is not a child of its recorded parent {:?}",
                old, parent
            )),
        }
    }

    ////////////////////////////////////SEARCH////////////////////////////////////////////
    /// Descend from the root following the hyperplanes and return the leaf reached.
    /// `None` on an empty tree. The result is a candidate, not a guaranteed neighbour.
    pub fn search(&self, q: &DVector<f64>) -> Option<EntryId> {
        let mut current = self.root?;
        loop {
            let node = self.node_ref(current);
            let side = node.classify(q);
            let next = match node.child(side) {
                // only the degenerate root has an empty slot
                Child::Empty => node.child(side.opposite()),
                occupied => occupied,
            };
            match next {
                Child::Leaf(id) => return Some(id),
                Child::Node(id) => current = id,
                Child::Empty => {
                    invariant_violation(format!("split node {:?} has no children", current))
                }
            }
        }
    }

    /// Leaves around a candidate whose region did not contain `q`.
    ///
    /// Walks up from the owner of `from`; at every ancestor the subtree on the other side
    /// is explored, the side of each hyperplane containing `q` first. At most `max`
    /// entries are returned, `from` itself is never among them.
    pub fn secondary_candidates(
        &self,
        from: EntryId,
        q: &DVector<f64>,
        max: usize,
    ) -> Vec<EntryId> {
        let mut found = Vec::new();
        if max == 0 || !self.contains(from) {
            return found;
        }
        let (mut parent, mut side) = self.owner_slot(from);
        loop {
            let node = self.node_ref(parent);
            self.collect_leaves(node.child(side.opposite()), q, max, &mut found);
            if found.len() >= max {
                break;
            }
            let Some(grand_parent) = node.parent() else {
                break;
            };
            side = match self.node_ref(grand_parent).side_of(Child::Node(parent)) {
                Some(side) => side,
                None => invariant_violation(format!(
                    "split node {:?} is not a child of its parent {:?}",
                    parent, grand_parent
                )),
            };
            parent = grand_parent;
        }
        found
    }

    fn collect_leaves(
        &self,
        start: Child,
        q: &DVector<f64>,
        max: usize,
        out: &mut Vec<EntryId>,
    ) {
        let mut stack = vec![start];
        while let Some(child) = stack.pop() {
            if out.len() >= max {
                return;
            }
            match child {
                Child::Empty => {}
                Child::Leaf(id) => out.push(id),
                Child::Node(id) => {
                    let node = self.node_ref(id);
                    let near = node.classify(q);
                    stack.push(node.child(near.opposite()));
                    stack.push(node.child(near));
                }
            }
        }
    }

    ////////////////////////////////////INSERT/DELETE/////////////////////////////////////
    /// Insert `entry` next to `anchor`.
    ///
    /// On an empty tree the entry becomes the only leaf of a degenerate root. Otherwise a
    /// split node separating the anchor (left) from the newcomer (right) takes the slot the
    /// anchor occupied. Without an anchor the result of `search` on the newcomer's
    /// position is used.
    /// # Panics
    /// If the anchor is not a child of its recorded owner or the dimension is wrong.
    pub fn insert(&mut self, anchor: Option<EntryId>, mut entry: TabEntry<R>) -> EntryId {
        if entry.position().len() != self.dim {
            invariant_violation(format!(
                "entry of dimension {} inserted into a tree of dimension {}",
                entry.position().len(),
                self.dim
            ));
        }
        let Some(root) = self.root else {
            let root = NodeId(self.nodes.insert(SplitNode::degenerate(self.dim)));
            entry.set_owning_node(root);
            let id = EntryId(self.entries.insert(entry));
            self.node_mut_ref(root).set_child(Side::Left, Child::Leaf(id));
            self.root = Some(root);
            return id;
        };
        let anchor = match anchor.or_else(|| self.search(entry.position())) {
            Some(anchor) => anchor,
            None => invariant_violation("non-empty tree without a reachable leaf".to_string()),
        };
        let (owner, side) = self.owner_slot(anchor);
        let (v, a) = {
            let anchor_position = self.entries.get(anchor.0).map(|e| e.position());
            match anchor_position {
                Some(position) => self.policy.separate(position, entry.position()),
                None => invariant_violation(format!("anchor {:?} vanished", anchor)),
            }
        };
        let singleton = self.len() == 1;
        let new_id = EntryId(self.entries.insert(entry));

        let split_id = if singleton {
            // the degenerate root is replaced by a real split node
            if owner != root {
                invariant_violation(format!(
                    "single entry {:?} is not owned by the root",
                    anchor
                ));
            }
            self.nodes.remove(root.0);
            let split_id = NodeId(self.nodes.insert(SplitNode::new(v, a, None)));
            self.root = Some(split_id);
            split_id
        } else {
            let split_id = NodeId(self.nodes.insert(SplitNode::new(v, a, Some(owner))));
            self.node_mut_ref(owner).set_child(side, Child::Node(split_id));
            split_id
        };
        {
            let split = self.node_mut_ref(split_id);
            split.set_child(Side::Left, Child::Leaf(anchor));
            split.set_child(Side::Right, Child::Leaf(new_id));
        }
        self.entry_mut_ref(anchor).set_owning_node(split_id);
        self.entry_mut_ref(new_id).set_owning_node(split_id);
        new_id
    }

    /// Remove an entry and splice its owner node out of the tree.
    ///
    /// The sibling of the removed entry takes the place of the owner in the grand-parent;
    /// at the root a sibling node becomes the new root and a sibling leaf stays alone under
    /// a degenerate root. Returns `None` for handles of entries that are no longer stored.
    pub fn delete(&mut self, id: EntryId) -> Option<TabEntry<R>> {
        if !self.contains(id) {
            return None;
        }
        let (owner, side) = self.owner_slot(id);
        if self.len() == 1 {
            if Some(owner) != self.root {
                invariant_violation(format!("single entry {:?} is not owned by the root", id));
            }
            self.nodes.remove(owner.0);
            self.root = None;
            return self.entries.remove(id.0);
        }
        let (sibling, parent) = {
            let node = self.node_ref(owner);
            (node.child(side.opposite()), node.parent())
        };
        match (sibling, parent) {
            (Child::Empty, _) => invariant_violation(format!(
                "split node {:?} holds only {:?} although the tree has {} entries",
                owner,
                id,
                self.len()
            )),
            (Child::Leaf(sibling), None) => {
                let dim = self.dim;
                let root = self.node_mut_ref(owner);
                *root = SplitNode::degenerate(dim);
                root.set_child(Side::Left, Child::Leaf(sibling));
            }
            (Child::Leaf(sibling), Some(parent)) => {
                self.replace_child(parent, Child::Node(owner), Child::Leaf(sibling));
                self.entry_mut_ref(sibling).set_owning_node(parent);
                self.nodes.remove(owner.0);
            }
            (Child::Node(sibling), _) => {
                self.transplant(owner, sibling);
                self.nodes.remove(owner.0);
            }
        }
        self.entries.remove(id.0)
    }

    /// put node `with` in the place of node `node`
    fn transplant(&mut self, node: NodeId, with: NodeId) {
        let parent = self.node_ref(node).parent();
        match parent {
            None => self.root = Some(with),
            Some(parent) => self.replace_child(parent, Child::Node(node), Child::Node(with)),
        }
        self.node_mut_ref(with).parent = parent;
    }

    /// The other child of the parent of `handle`; `None` for the root node, for stale
    /// handles and when the other slot is empty.
    pub fn sibling_of(&self, handle: Handle) -> Option<Child> {
        let parent = match handle {
            Handle::Entry(id) => self.entry(id)?.owning_node()?,
            Handle::Node(id) => self.node(id)?.parent()?,
        };
        let parent_node = self.node_ref(parent);
        let side = match parent_node.side_of(Child::from(handle)) {
            Some(side) => side,
            None => invariant_violation(format!(
                "{:?} is not a child of its recorded parent {:?}",
                handle, parent
            )),
        };
        match parent_node.child(side.opposite()) {
            Child::Empty => None,
            other => Some(other),
        }
    }

    ////////////////////////////////////TRAVERSAL/////////////////////////////////////////
    /// leftmost leaf of the whole tree
    pub fn tree_min(&self) -> Option<EntryId> {
        self.subtree_min(Child::Node(self.root?))
    }

    /// leftmost leaf below `start`
    pub fn subtree_min(&self, start: Child) -> Option<EntryId> {
        let mut current = start;
        loop {
            match current {
                Child::Empty => return None,
                Child::Leaf(id) => return Some(id),
                Child::Node(id) => {
                    let node = self.node_ref(id);
                    current = if node.left().is_empty() {
                        node.right()
                    } else {
                        node.left()
                    };
                }
            }
        }
    }

    /// next leaf after `id` in left-to-right order
    pub fn successor(&self, id: EntryId) -> Option<EntryId> {
        if !self.contains(id) {
            return None;
        }
        let (mut parent, mut side) = self.owner_slot(id);
        loop {
            let node = self.node_ref(parent);
            if side == Side::Left && !node.right().is_empty() {
                return self.subtree_min(node.right());
            }
            let grand_parent = node.parent()?;
            side = match self.node_ref(grand_parent).side_of(Child::Node(parent)) {
                Some(side) => side,
                None => invariant_violation(format!(
                    "split node {:?} is not a child of its parent {:?}",
                    parent, grand_parent
                )),
            };
            parent = grand_parent;
        }
    }

    /// all entries in left-to-right order
    pub fn iter(&self) -> Leaves<'_, R, P> {
        Leaves {
            tree: self,
            next: self.tree_min(),
        }
    }

    /// number of split nodes on the longest root-to-leaf path
    pub fn depth(&self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut deepest = 0;
        let mut stack = vec![(root, 1usize)];
        while let Some((id, level)) = stack.pop() {
            deepest = deepest.max(level);
            let node = self.node_ref(id);
            for child in [node.left(), node.right()] {
                if let Child::Node(next) = child {
                    stack.push((next, level + 1));
                }
            }
        }
        deepest
    }

    /// Drop every node and entry reachable from the root. Idempotent.
    pub fn clear(&mut self) {
        let Some(root) = self.root.take() else {
            return;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.remove(id.0) else {
                continue;
            };
            for child in [node.left(), node.right()] {
                match child {
                    Child::Empty => {}
                    Child::Leaf(entry) => {
                        self.entries.remove(entry.0);
                    }
                    Child::Node(next) => stack.push(next),
                }
            }
        }
        debug_assert!(self.nodes.is_empty() && self.entries.is_empty());
    }

    pub fn reset_all_retrieve_counts(&mut self) {
        let mut current = self.tree_min();
        while let Some(id) = current {
            self.entry_mut_ref(id).reset_retrieve_count();
            current = self.successor(id);
        }
    }

    /// usage records of all entries, input of the eviction policies
    pub fn usage_snapshot(&self) -> Vec<LeafUsage> {
        self.iter()
            .map(|(id, entry)| LeafUsage {
                id,
                retrieve_count: entry.retrieve_count(),
                born: entry.born(),
                last_used: entry.last_used(),
            })
            .collect()
    }

    ////////////////////////////////////MAINTENANCE///////////////////////////////////////
    /// Rebuild the split nodes by recursive median cuts along the coordinate of largest
    /// variance. Entries and their ids are kept, only the hyperplanes change.
    pub fn balance(&mut self) {
        if self.len() <= 2 {
            return;
        }
        let depth_before = self.depth();
        let ids: Vec<EntryId> = self.iter().map(|(id, _)| id).collect();
        let old_nodes: Vec<_> = self.nodes.iter().map(|(index, _)| index).collect();
        for index in old_nodes {
            self.nodes.remove(index);
        }
        self.root = None;

        let mut work: Vec<(Vec<EntryId>, Option<(NodeId, Side)>)> = vec![(ids, None)];
        while let Some((group, slot)) = work.pop() {
            if group.len() == 1 {
                let Some((parent, side)) = slot else {
                    invariant_violation("balancing reached a lone entry at the root".to_string())
                };
                self.node_mut_ref(parent).set_child(side, Child::Leaf(group[0]));
                self.entry_mut_ref(group[0]).set_owning_node(parent);
                continue;
            }
            let (v, a, left, right) = self.median_cut(group);
            let id = NodeId(self.nodes.insert(SplitNode::new(v, a, slot.map(|(p, _)| p))));
            match slot {
                None => self.root = Some(id),
                Some((parent, side)) => self.node_mut_ref(parent).set_child(side, Child::Node(id)),
            }
            work.push((right, Some((id, Side::Right))));
            work.push((left, Some((id, Side::Left))));
        }
        debug!(
            "binary tree balanced: {} entries, depth {} -> {}",
            self.len(),
            depth_before,
            self.depth()
        );
    }

    /// split a group of at least two entries into two non-empty halves
    fn median_cut(
        &self,
        mut group: Vec<EntryId>,
    ) -> (DVector<f64>, f64, Vec<EntryId>, Vec<EntryId>) {
        let positions: Vec<&DVector<f64>> = group
            .iter()
            .map(|id| match self.entries.get(id.0) {
                Some(entry) => entry.position(),
                None => invariant_violation(format!("entry {:?} vanished while balancing", id)),
            })
            .collect();
        let n = positions.len() as f64;
        let mut mean = DVector::<f64>::zeros(self.dim);
        for p in &positions {
            mean += *p;
        }
        mean /= n;
        let mut variance = DVector::<f64>::zeros(self.dim);
        for p in &positions {
            let d = *p - &mean;
            variance += d.component_mul(&d);
        }
        let k = variance.imax();

        group.sort_by(|x, y| {
            let xk = self.entries.get(x.0).map_or(0.0, |e| e.position()[k]);
            let yk = self.entries.get(y.0).map_or(0.0, |e| e.position()[k]);
            xk.total_cmp(&yk)
        });
        let coords: Vec<f64> = group
            .iter()
            .map(|id| self.entries.get(id.0).map_or(0.0, |e| e.position()[k]))
            .collect();

        // closest cut to the median between two distinct coordinates
        let mid = coords.len() / 2;
        let cut = (0..coords.len())
            .flat_map(|d| [mid + d, mid.wrapping_sub(d)])
            .find(|&i| i >= 1 && i < coords.len() && coords[i - 1] < coords[i]);
        let mut v = DVector::<f64>::zeros(self.dim);
        v[k] = 1.0;
        let (a, cut) = match cut {
            Some(i) => (0.5 * (coords[i - 1] + coords[i]), i),
            // all points coincide: no hyperplane separates them, the right half is only
            // reachable through traversal
            None => (coords[0], mid),
        };
        let right = group.split_off(cut);
        (v, a, group, right)
    }

    /// Verify the structural invariants by an independent traversal.
    pub fn check_integrity(&self) -> Result<(), TreeError> {
        let violation =
            |msg: String| -> Result<(), TreeError> { Err(TreeError::InvariantViolation(msg)) };
        let Some(root) = self.root else {
            if !self.entries.is_empty() || !self.nodes.is_empty() {
                return violation(format!(
                    "empty tree still stores {} entries and {} nodes",
                    self.entries.len(),
                    self.nodes.len()
                ));
            }
            return Ok(());
        };
        let mut leaves = 0usize;
        let mut nodes = 0usize;
        let mut stack = vec![(root, None)];
        while let Some((id, expected_parent)) = stack.pop() {
            let Some(node) = self.nodes.get(id.0) else {
                return violation(format!("dangling link to split node {:?}", id));
            };
            nodes += 1;
            if node.parent() != expected_parent {
                return violation(format!(
                    "node {:?} records parent {:?}, found under {:?}",
                    id,
                    node.parent(),
                    expected_parent
                ));
            }
            let empty_slots = [node.left(), node.right()]
                .iter()
                .filter(|c| c.is_empty())
                .count();
            let allowed_empty = if id == root && self.entries.len() == 1 { 1 } else { 0 };
            if empty_slots != allowed_empty {
                return violation(format!(
                    "node {:?} has {} empty slots, {} allowed",
                    id, empty_slots, allowed_empty
                ));
            }
            for child in [node.left(), node.right()] {
                match child {
                    Child::Empty => {}
                    Child::Leaf(entry_id) => {
                        let Some(entry) = self.entries.get(entry_id.0) else {
                            return violation(format!("dangling link to entry {:?}", entry_id));
                        };
                        if entry.owning_node() != Some(id) {
                            return violation(format!(
                                "entry {:?} records owner {:?}, found under {:?}",
                                entry_id,
                                entry.owning_node(),
                                id
                            ));
                        }
                        leaves += 1;
                    }
                    Child::Node(next) => stack.push((next, Some(id))),
                }
            }
        }
        if leaves != self.entries.len() {
            return violation(format!(
                "{} reachable leaves, {} stored entries",
                leaves,
                self.entries.len()
            ));
        }
        if nodes != self.nodes.len() {
            return violation(format!(
                "{} reachable nodes, {} stored nodes",
                nodes,
                self.nodes.len()
            ));
        }
        Ok(())
    }
}

/// in-order iterator over the leaves, built on `tree_min`/`successor`
pub struct Leaves<'a, R, P> {
    tree: &'a BinaryTree<R, P>,
    next: Option<EntryId>,
}

impl<'a, R, P: SplitPolicy> Iterator for Leaves<'a, R, P> {
    type Item = (EntryId, &'a TabEntry<R>);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.tree.successor(id);
        self.tree.entry(id).map(|entry| (id, entry))
    }
}
