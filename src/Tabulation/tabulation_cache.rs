//! # Tabulation cache
//!
//! ## Purpose
//! Front end of the in situ adaptive tabulation. For a query vector it either reuses a
//! tabulated result whose region of validity contains the query (a *retrieve*) or calls
//! the expensive evaluator and tabulates the new result (a *grow* of the nearest entry or
//! an *add* of a new leaf).
//!
//! ## Workflow of `query()`
//! 1. primary search in the binary tree, region check of the candidate
//! 2. optional secondary search among the leaves around the candidate
//! 3. on a miss: evaluate, then try to grow the candidate's region
//! 4. if growing is refused: evict when the table is full, insert a new entry
//! 5. every `check_interval` queries: expire stale entries, balance a degenerated tree
//!
//! ## Example
//! ```rust, ignore
//! let config = TabulationConfig::from_file("tabulation_config.json")?;
//! let evaluator = |q: &DVector<f64>| -> Result<Evaluation, String> { Ok(integrate(q)) };
//! let mut cache: TabulationCache<BallRegion, _> = TabulationCache::new(3, config, evaluator)?;
//! let r = cache.query(&DVector::from_vec(vec![1200.0, 0.1, 0.9]))?;
//! cache.print_summary();
//! ```
use super::binary_tree::BinaryTree;
use super::eviction::Evict;
use super::tab_config::TabulationConfig;
use super::tab_entry::{EntryId, Evaluation, RegionOfValidity, TabEntry};
use super::tab_error::TabulationError;
use log::{debug, info};
use nalgebra::DVector;
use prettytable::{Cell, Row, Table};

/// The expensive computation behind the cache (e.g. integration of the kinetics over a
/// time step). Failures are reported as text.
pub trait Evaluator {
    fn evaluate(&mut self, query: &DVector<f64>) -> Result<Evaluation, String>;
}

impl<F> Evaluator for F
where
    F: FnMut(&DVector<f64>) -> Result<Evaluation, String>,
{
    fn evaluate(&mut self, query: &DVector<f64>) -> Result<Evaluation, String> {
        self(query)
    }
}

/// what `add` did with a freshly evaluated point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// the region of an existing entry was enlarged
    Grown(EntryId),
    /// a new entry was inserted, after evicting `evicted` entries
    Added { id: EntryId, evicted: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabulationStats {
    /// retrieve attempts, direct or through `query`
    pub n_queries: u64,
    pub n_primary_hits: u64,
    pub n_secondary_hits: u64,
    pub n_grown: u64,
    pub n_added: u64,
    pub n_evicted: u64,
    pub n_evaluations: u64,
    pub n_balances: u64,
    pub n_maintenance: u64,
}

impl TabulationStats {
    pub fn n_hits(&self) -> u64 {
        self.n_primary_hits + self.n_secondary_hits
    }

    /// share of the retrieve attempts answered from the table
    pub fn hit_ratio(&self) -> f64 {
        if self.n_queries == 0 {
            return 0.0;
        }
        self.n_hits() as f64 / self.n_queries as f64
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.add_row(Row::new(vec![Cell::new("Statistic"), Cell::new("Value")]));
        let rows = [
            ("queries", self.n_queries.to_string()),
            ("primary retrieves", self.n_primary_hits.to_string()),
            ("secondary retrieves", self.n_secondary_hits.to_string()),
            ("hit ratio", format!("{:.3}", self.hit_ratio())),
            ("evaluations", self.n_evaluations.to_string()),
            ("grown", self.n_grown.to_string()),
            ("added", self.n_added.to_string()),
            ("evicted", self.n_evicted.to_string()),
            ("balances", self.n_balances.to_string()),
            ("maintenance passes", self.n_maintenance.to_string()),
        ];
        for (name, value) in rows {
            table.add_row(Row::new(vec![Cell::new(name), Cell::new(&value)]));
        }
        table
    }
}

pub struct TabulationCache<R, E> {
    tree: BinaryTree<R>,
    evaluator: E,
    config: TabulationConfig,
    /// logical clock, advanced by every retrieve attempt
    tick: u64,
    stats: TabulationStats,
}

impl<R: RegionOfValidity, E: Evaluator> TabulationCache<R, E> {
    pub fn new(
        dimension: usize,
        config: TabulationConfig,
        evaluator: E,
    ) -> Result<Self, TabulationError> {
        if dimension == 0 {
            return Err(TabulationError::InvalidConfig(
                "query dimension must be positive".to_string(),
            ));
        }
        config.validate()?;
        info!(
            "tabulation created: dimension {}, capacity {}, eviction: {}",
            dimension,
            config.max_n_leafs,
            config.eviction.label()
        );
        Ok(Self {
            tree: BinaryTree::new(dimension, config.max_n_leafs),
            evaluator,
            config,
            tick: 0,
            stats: TabulationStats::default(),
        })
    }

    ////////////////////////////////////ACCESSORS////////////////////////////////////////
    pub fn tree(&self) -> &BinaryTree<R> {
        &self.tree
    }

    pub fn config(&self) -> &TabulationConfig {
        &self.config
    }

    pub fn stats(&self) -> &TabulationStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    fn check_dimension(&self, q: &DVector<f64>) -> Result<(), TabulationError> {
        if q.len() != self.tree.dim() {
            return Err(TabulationError::DimensionMismatch {
                expected: self.tree.dim(),
                found: q.len(),
            });
        }
        Ok(())
    }

    ////////////////////////////////////RETRIEVE/ADD//////////////////////////////////////
    /// Approximation of the result at `q` from the table, `None` if no tabulated region
    /// contains `q` (an empty table included).
    pub fn retrieve(&mut self, q: &DVector<f64>) -> Result<Option<DVector<f64>>, TabulationError> {
        self.check_dimension(q)?;
        self.stats.n_queries += 1;
        self.tick += 1;
        let Some(candidate) = self.tree.search(q) else {
            return Ok(None);
        };
        if self.contains_query(candidate, q) {
            self.stats.n_primary_hits += 1;
            return Ok(self.use_entry(candidate, q));
        }
        let max = self.config.max_secondary_searches;
        for id in self.tree.secondary_candidates(candidate, q, max) {
            if self.contains_query(id, q) {
                self.stats.n_secondary_hits += 1;
                return Ok(self.use_entry(id, q));
            }
        }
        Ok(None)
    }

    fn contains_query(&self, id: EntryId, q: &DVector<f64>) -> bool {
        self.tree
            .entry(id)
            .is_some_and(|entry| entry.region().within_region(entry.position(), q))
    }

    fn use_entry(&mut self, id: EntryId, q: &DVector<f64>) -> Option<DVector<f64>> {
        let tick = self.tick;
        let entry = self.tree.entry_mut(id)?;
        entry.increment_retrieve_count();
        entry.touch(tick);
        Some(entry.region().approximate(entry.position(), q))
    }

    /// Tabulate the exact `evaluation` at `q`: grow the region of the search candidate
    /// if it accepts the point, otherwise insert a new entry next to it. A full table is
    /// cleaned by the eviction policy before the insertion.
    pub fn add(
        &mut self,
        q: &DVector<f64>,
        evaluation: Evaluation,
    ) -> Result<AddOutcome, TabulationError> {
        self.check_dimension(q)?;
        let tick = self.tick;
        if let Some(candidate) = self.tree.search(q) {
            if let Some(entry) = self.tree.entry_mut(candidate) {
                let (position, region) = entry.position_and_region_mut();
                if region.grow(position, q, &evaluation.result) {
                    entry.touch(tick);
                    self.stats.n_grown += 1;
                    return Ok(AddOutcome::Grown(candidate));
                }
            }
        }
        let evicted = if self.tree.is_full() { self.evict() } else { 0 };
        let anchor = self.tree.search(q);
        let region = R::from_evaluation(q, evaluation, &self.config);
        let id = self
            .tree
            .insert(anchor, TabEntry::new(q.clone(), region, tick));
        self.stats.n_added += 1;
        debug!("new entry tabulated, table size {}", self.tree.len());
        Ok(AddOutcome::Added { id, evicted })
    }

    /// Result at `q`: from the table if possible, from the evaluator otherwise.
    pub fn query(&mut self, q: &DVector<f64>) -> Result<DVector<f64>, TabulationError> {
        let value = match self.retrieve(q)? {
            Some(value) => value,
            None => {
                let evaluation = self
                    .evaluator
                    .evaluate(q)
                    .map_err(TabulationError::Evaluation)?;
                self.stats.n_evaluations += 1;
                let exact = evaluation.result.clone();
                self.add(q, evaluation)?;
                exact
            }
        };
        let interval = self.config.check_interval;
        if interval > 0 && self.stats.n_queries % interval == 0 {
            self.maintain();
        }
        Ok(value)
    }

    ////////////////////////////////////MAINTENANCE///////////////////////////////////////
    /// Run the eviction policy on the full table. Survivors get their retrieve counters
    /// reset. Returns the number of removed entries.
    pub fn evict(&mut self) -> usize {
        let usage = self.tree.usage_snapshot();
        let victims =
            self.config
                .eviction
                .select_victims(&usage, self.tree.capacity(), self.tick);
        let removed = self.remove_entries(&victims);
        self.tree.reset_all_retrieve_counts();
        info!(
            "eviction ({}): {} entries removed, {} left",
            self.config.eviction.label(),
            removed,
            self.tree.len()
        );
        removed
    }

    /// Routine pass: drop expired entries, balance the tree when it has degenerated.
    /// Returns the number of removed entries.
    pub fn maintain(&mut self) -> usize {
        self.stats.n_maintenance += 1;
        let usage = self.tree.usage_snapshot();
        let expired = self.config.eviction.expired(&usage, self.tick);
        let removed = self.remove_entries(&expired);
        if removed > 0 {
            info!("{} expired entries removed", removed);
        }
        if self.needs_balance() {
            let depth = self.tree.depth();
            self.tree.balance();
            self.stats.n_balances += 1;
            info!(
                "tabulation balanced: {} entries, depth {} -> {}",
                self.tree.len(),
                depth,
                self.tree.depth()
            );
        }
        removed
    }

    fn needs_balance(&self) -> bool {
        let n = self.tree.len();
        if n <= 2 {
            return false;
        }
        self.tree.depth() as f64 > self.config.max_depth_factor * (n as f64).log2()
    }

    fn remove_entries(&mut self, ids: &[EntryId]) -> usize {
        let removed = ids
            .iter()
            .filter(|id| self.tree.delete(**id).is_some())
            .count();
        self.stats.n_evicted += removed as u64;
        removed
    }

    /// Forget every tabulated entry; statistics are kept.
    pub fn clear(&mut self) {
        self.tree.clear();
        info!("tabulation cleared");
    }

    pub fn print_summary(&self) {
        let mut table = self.stats.to_table();
        table.add_row(Row::new(vec![
            Cell::new("entries / capacity"),
            Cell::new(&format!("{} / {}", self.tree.len(), self.tree.capacity())),
        ]));
        table.add_row(Row::new(vec![
            Cell::new("tree depth"),
            Cell::new(&self.tree.depth().to_string()),
        ]));
        table.printstd();
    }
}
