//! Leaves of the tabulation tree.
//!
//! A `TabEntry` keeps the query vector it was created for, the region of validity
//! (opaque to the tree, see `RegionOfValidity`) and usage bookkeeping used by the
//! eviction policies.
use super::arena::ArenaIndex;
use super::split_node::NodeId;
use super::tab_config::TabulationConfig;
use nalgebra::{DMatrix, DVector};

/// stable handle of a tabulated entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) ArenaIndex);

/// Result of one call of the expensive evaluator.
/// `gradient` is the mapping gradient d(result)/d(query) if the evaluator can provide it.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub result: DVector<f64>,
    pub gradient: Option<DMatrix<f64>>,
}

impl Evaluation {
    pub fn new(result: DVector<f64>) -> Self {
        Self {
            result,
            gradient: None,
        }
    }

    pub fn with_gradient(result: DVector<f64>, gradient: DMatrix<f64>) -> Self {
        Self {
            result,
            gradient: Some(gradient),
        }
    }
}

/// Capability interface of a region of validity.
///
/// The tree never calls any of these methods; only the cache front end does. Every
/// method receives the position of the owning entry so that the region does not need to
/// duplicate it.
pub trait RegionOfValidity {
    /// build the region of a fresh entry created at `position`
    fn from_evaluation(
        position: &DVector<f64>,
        evaluation: Evaluation,
        config: &TabulationConfig,
    ) -> Self;
    /// is the stored result reusable for `query`?
    fn within_region(&self, position: &DVector<f64>, query: &DVector<f64>) -> bool;
    /// try to enlarge the region so that it covers `query`, given the exact result there.
    /// Returns false if the approximation is not accurate enough at `query`.
    fn grow(
        &mut self,
        position: &DVector<f64>,
        query: &DVector<f64>,
        exact: &DVector<f64>,
    ) -> bool;
    /// cheap approximation of the result at `query`
    fn approximate(&self, position: &DVector<f64>, query: &DVector<f64>) -> DVector<f64>;
}

#[derive(Debug, Clone)]
pub struct TabEntry<R> {
    position: DVector<f64>,
    region: R,
    retrieve_count: u64,
    /// owning split node, a navigation link only
    node: Option<NodeId>,
    /// tick of creation
    born: u64,
    /// tick of the last successful retrieve (or of creation)
    last_used: u64,
}

impl<R> TabEntry<R> {
    pub fn new(position: DVector<f64>, region: R, tick: u64) -> Self {
        Self {
            position,
            region,
            retrieve_count: 0,
            node: None,
            born: tick,
            last_used: tick,
        }
    }

    pub fn position(&self) -> &DVector<f64> {
        &self.position
    }

    pub fn region(&self) -> &R {
        &self.region
    }

    /// position and mutable region at once, for growing the region in place
    pub fn position_and_region_mut(&mut self) -> (&DVector<f64>, &mut R) {
        (&self.position, &mut self.region)
    }

    pub fn owning_node(&self) -> Option<NodeId> {
        self.node
    }

    pub(crate) fn set_owning_node(&mut self, node: NodeId) {
        self.node = Some(node);
    }

    pub fn retrieve_count(&self) -> u64 {
        self.retrieve_count
    }

    pub fn increment_retrieve_count(&mut self) {
        self.retrieve_count += 1;
    }

    pub fn reset_retrieve_count(&mut self) {
        self.retrieve_count = 0;
    }

    pub fn born(&self) -> u64 {
        self.born
    }

    pub fn last_used(&self) -> u64 {
        self.last_used
    }

    pub fn touch(&mut self, tick: u64) {
        self.last_used = tick;
    }
}

/// usage record of one leaf as seen by the eviction policies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafUsage {
    pub id: EntryId,
    pub retrieve_count: u64,
    pub born: u64,
    pub last_used: u64,
}
