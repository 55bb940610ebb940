//! # Simplex Search
//!
//! $$
//! \min_{\mathbf x}\ f\big(P_{\mathcal C}(\mathbf x)\big)+\rho\,\lVert\mathbf x-P_{\mathcal C}(\mathbf x)\rVert^2
//! $$
//!
//! Derivative-free Nelder-Mead over the projected objective.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::State;
use argmin::solver::neldermead::NelderMead;
use nalgebra::DVector;
use tracing::debug;

use super::Minimization;
use super::Minimizer;
use crate::constraints::ConstraintSet;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::objectives::Objective;
use crate::types::SolverStatus;

/// Weight on the squared distance to the feasible region.
const DISTANCE_PENALTY: f64 = 10.0;
/// Edge length of the initial simplex.
const SIMPLEX_EDGE: f64 = 0.1;

/// Nelder-Mead over the projected objective, for objectives without a
/// usable gradient.
#[derive(Clone, Copy, Debug)]
pub struct SimplexSearch {
  pub max_iterations: u64,
  pub tolerance: f64,
}

impl Default for SimplexSearch {
  fn default() -> Self {
    Self::new(500, 1e-9)
  }
}

impl SimplexSearch {
  pub fn new(max_iterations: u64, tolerance: f64) -> Self {
    Self {
      max_iterations,
      tolerance,
    }
  }
}

struct ProjectedCost<'a> {
  objective: &'a dyn Objective,
  constraints: &'a ConstraintSet,
}

impl CostFunction for ProjectedCost<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let v = DVector::from_column_slice(x);
    let w = self.constraints.project(&v);
    Ok(self.objective.value(&w) + DISTANCE_PENALTY * (&v - &w).norm_squared())
  }
}

impl Minimizer for SimplexSearch {
  fn minimize(
    &self,
    objective: &dyn Objective,
    constraints: &ConstraintSet,
    x0: &DVector<f64>,
  ) -> Result<Minimization> {
    let n = constraints.n();
    if x0.len() != n {
      return Err(PortfolioError::invalid(format!(
        "starting point has {} entries for {n} assets",
        x0.len()
      )));
    }

    let start: Vec<f64> = constraints.project(x0).iter().copied().collect();
    let mut simplex = Vec::with_capacity(n + 1);
    simplex.push(start.clone());
    for i in 0..n {
      let mut point = start.clone();
      point[i] += SIMPLEX_EDGE;
      simplex.push(point);
    }

    let solver = NelderMead::new(simplex)
      .with_sd_tolerance(self.tolerance)
      .map_err(|e| PortfolioError::Numerical(e.to_string()))?;
    let cost = ProjectedCost {
      objective,
      constraints,
    };
    let res = Executor::new(cost, solver)
      .configure(|state| state.max_iters(self.max_iterations))
      .run()
      .map_err(|e| PortfolioError::Numerical(e.to_string()))?;

    let iterations = res.state.get_iter();
    let best = res.state.best_param.unwrap_or(start);
    let weights = constraints.project(&DVector::from_vec(best));
    let value = objective.value(&weights);
    let status = if iterations < self.max_iterations {
      SolverStatus::Converged
    } else {
      SolverStatus::MaxIterations
    };

    debug!(objective = objective.name(), iterations, value, ?status, "nelder-mead finished");
    Ok(Minimization::new(weights, value, iterations, status))
  }

  fn name(&self) -> &'static str {
    "nelder-mead"
  }
}

#[cfg(test)]
mod tests {
  use nalgebra::DMatrix;

  use super::*;
  use crate::objectives::MinVariance;
  use crate::risk_model::RiskModel;
  use crate::solver::equal_weights;

  #[test]
  fn finds_a_feasible_low_variance_portfolio() {
    let m = RiskModel::from_moments(
      vec!["A".into(), "B".into(), "C".into()],
      DVector::from_vec(vec![0.05, 0.1, 0.2]),
      DMatrix::from_row_slice(3, 3, &[0.01, 0.0, 0.0, 0.0, 0.04, 0.0, 0.0, 0.0, 0.09]),
    )
    .unwrap();
    let set = ConstraintSet::long_only(3, 1.0).unwrap();
    let obj = MinVariance::new(&m);

    let res = SimplexSearch::new(2000, 1e-12)
      .minimize(&obj, &set, &equal_weights(3))
      .unwrap();
    assert!(set.is_feasible(&res.weights, 1e-9));
    assert!(res.objective < obj.value(&equal_weights(3)));
    // A has the lowest variance
    assert!(res.weights[0] > res.weights[1] && res.weights[1] > res.weights[2]);
  }
}
