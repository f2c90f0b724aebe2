//! Spherical region of validity.
//!
//! The simplest region that fits the `RegionOfValidity` interface: a ball of radius `r`
//! around the entry position. Inside the ball the stored result is reused, corrected by
//! the mapping gradient when the evaluator supplied one:
//!
//! R(q) ≈ R(q0) + A (q - q0)
//!
//! The ball grows to cover a new query when the approximation error there is within the
//! tolerance. It is isotropic, so it is much more conservative than an ellipsoid of
//! accuracy, but needs no factorisation.
use super::tab_config::TabulationConfig;
use super::tab_entry::{Evaluation, RegionOfValidity};
use log::debug;
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone, PartialEq)]
pub struct BallRegion {
    result: DVector<f64>,
    gradient: Option<DMatrix<f64>>,
    radius: f64,
    tolerance: f64,
    /// 0 - unlimited
    max_growth: usize,
    n_grown: usize,
}

impl BallRegion {
    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn result(&self) -> &DVector<f64> {
        &self.result
    }

    pub fn n_grown(&self) -> usize {
        self.n_grown
    }
}

impl RegionOfValidity for BallRegion {
    fn from_evaluation(
        _position: &DVector<f64>,
        evaluation: Evaluation,
        config: &TabulationConfig,
    ) -> Self {
        Self {
            result: evaluation.result,
            gradient: evaluation.gradient,
            radius: config.initial_radius,
            tolerance: config.tolerance,
            max_growth: config.max_growth,
            n_grown: 0,
        }
    }

    fn within_region(&self, position: &DVector<f64>, query: &DVector<f64>) -> bool {
        (query - position).norm() <= self.radius
    }

    fn grow(
        &mut self,
        position: &DVector<f64>,
        query: &DVector<f64>,
        exact: &DVector<f64>,
    ) -> bool {
        if self.max_growth > 0 && self.n_grown >= self.max_growth {
            return false;
        }
        let error = (self.approximate(position, query) - exact).norm();
        if error > self.tolerance {
            debug!(
                "region refuses to grow: error {:e} > tolerance {:e}",
                error, self.tolerance
            );
            return false;
        }
        self.radius = self.radius.max((query - position).norm());
        self.n_grown += 1;
        true
    }

    fn approximate(&self, position: &DVector<f64>, query: &DVector<f64>) -> DVector<f64> {
        match &self.gradient {
            Some(gradient) => &self.result + gradient * (query - position),
            None => self.result.clone(),
        }
    }
}
