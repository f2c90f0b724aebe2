//! Internal nodes of the tabulation tree and the hyperplane construction policy.
use super::arena::ArenaIndex;
use super::tab_entry::EntryId;
use nalgebra::DVector;

/// stable handle of a split node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) ArenaIndex);

/// content of one child slot of a split node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child {
    Empty,
    Leaf(EntryId),
    Node(NodeId),
}

impl Child {
    pub fn is_empty(&self) -> bool {
        matches!(self, Child::Empty)
    }
}

/// side of a hyperplane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// anything that can sit in a child slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    Entry(EntryId),
    Node(NodeId),
}

impl From<Handle> for Child {
    fn from(handle: Handle) -> Self {
        match handle {
            Handle::Entry(id) => Child::Leaf(id),
            Handle::Node(id) => Child::Node(id),
        }
    }
}

/// Internal node: hyperplane `v·q = a` and two children.
#[derive(Debug, Clone)]
pub struct SplitNode {
    v: DVector<f64>,
    a: f64,
    pub(crate) parent: Option<NodeId>,
    pub(crate) left: Child,
    pub(crate) right: Child,
}

impl SplitNode {
    pub fn new(v: DVector<f64>, a: f64, parent: Option<NodeId>) -> Self {
        Self {
            v,
            a,
            parent,
            left: Child::Empty,
            right: Child::Empty,
        }
    }

    /// Root of a tree holding a single entry: no hyperplane can be defined yet,
    /// everything classifies LEFT.
    pub fn degenerate(dim: usize) -> Self {
        Self::new(DVector::zeros(dim), 0.0, None)
    }

    pub fn classify(&self, q: &DVector<f64>) -> Side {
        if self.v.dot(q) > self.a {
            Side::Right
        } else {
            Side::Left
        }
    }

    pub fn normal(&self) -> &DVector<f64> {
        &self.v
    }

    pub fn offset(&self) -> f64 {
        self.a
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn left(&self) -> Child {
        self.left
    }

    pub fn right(&self) -> Child {
        self.right
    }

    pub fn child(&self, side: Side) -> Child {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    pub(crate) fn set_child(&mut self, side: Side, child: Child) {
        match side {
            Side::Left => self.left = child,
            Side::Right => self.right = child,
        }
    }

    /// which slot holds `child`, if any
    pub fn side_of(&self, child: Child) -> Option<Side> {
        if child.is_empty() {
            None
        } else if self.left == child {
            Some(Side::Left)
        } else if self.right == child {
            Some(Side::Right)
        } else {
            None
        }
    }
}

/// Construction rule of the separating hyperplane.
///
/// Must return `(v, a)` with `v·old <= a` (old entry goes LEFT) and `v·new > a`
/// (new entry goes RIGHT) whenever the two points differ.
pub trait SplitPolicy {
    fn separate(&self, old: &DVector<f64>, new: &DVector<f64>) -> (DVector<f64>, f64);
}

/// Hyperplane normal to `new - old` through the midpoint of the two points.
#[derive(Debug, Clone, Copy, Default)]
pub struct BisectingHyperplane;

impl SplitPolicy for BisectingHyperplane {
    fn separate(&self, old: &DVector<f64>, new: &DVector<f64>) -> (DVector<f64>, f64) {
        let v = new - old;
        let mid = (old + new) * 0.5;
        let a = v.dot(&mid);
        (v, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bisecting_hyperplane_separates() {
        let old = DVector::from_vec(vec![0.0, 0.0]);
        let new = DVector::from_vec(vec![10.0, 0.0]);
        let (v, a) = BisectingHyperplane.separate(&old, &new);
        assert_relative_eq!(a, 50.0);
        let node = SplitNode::new(v, a, None);
        assert_relative_eq!(node.normal()[0], 10.0);
        assert_relative_eq!(node.offset(), 50.0);
        assert_eq!(node.classify(&old), Side::Left);
        assert_eq!(node.classify(&new), Side::Right);
        assert_eq!(node.classify(&DVector::from_vec(vec![4.9, 3.0])), Side::Left);
        assert_eq!(node.classify(&DVector::from_vec(vec![5.1, -3.0])), Side::Right);
    }

    #[test]
    fn test_identical_points_fall_left() {
        let p = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let (v, a) = BisectingHyperplane.separate(&p, &p);
        let node = SplitNode::new(v, a, None);
        assert_eq!(node.classify(&p), Side::Left);
    }

    #[test]
    fn test_degenerate_node_classifies_left() {
        let node = SplitNode::degenerate(2);
        assert_eq!(node.classify(&DVector::from_vec(vec![5.0, -1.0])), Side::Left);
        assert!(node.parent().is_none());
        assert!(node.left().is_empty() && node.right().is_empty());
    }
}
