//! # Projected Gradient
//!
//! $$
//! \mathbf w_{k+1}=P_{\mathcal C}\big(\mathbf w_k-t_k\nabla f(\mathbf w_k)\big),\qquad
//! f(\mathbf w_{k+1})\le f(\mathbf w_k)-c\,\nabla f(\mathbf w_k)^\top(\mathbf w_k-\mathbf w_{k+1})
//! $$
//!
//! Projected gradient descent with Armijo backtracking and an adaptive step.
//! Monotone, so the returned point is never worse than the start.

use nalgebra::DVector;
use tracing::debug;

use super::Minimization;
use super::Minimizer;
use crate::constraints::ConstraintSet;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::objectives::Objective;
use crate::types::SolverStatus;

const ARMIJO: f64 = 1e-4;
const MIN_STEP: f64 = 1e-16;
const MAX_STEP: f64 = 1e4;
/// Projected-gradient norm treated as first-order stationary.
const STATIONARY_TOL: f64 = 1e-10;

/// Projected gradient descent with Armijo backtracking.
#[derive(Clone, Copy, Debug)]
pub struct ProjectedGradient {
  pub max_iterations: u64,
  pub tolerance: f64,
}

impl Default for ProjectedGradient {
  fn default() -> Self {
    Self::new(500, 1e-9)
  }
}

impl ProjectedGradient {
  pub fn new(max_iterations: u64, tolerance: f64) -> Self {
    Self {
      max_iterations,
      tolerance,
    }
  }
}

impl Minimizer for ProjectedGradient {
  fn minimize(
    &self,
    objective: &dyn Objective,
    constraints: &ConstraintSet,
    x0: &DVector<f64>,
  ) -> Result<Minimization> {
    if x0.len() != constraints.n() {
      return Err(PortfolioError::invalid(format!(
        "starting point has {} entries for {} assets",
        x0.len(),
        constraints.n()
      )));
    }

    let mut x = constraints.project(x0);
    let mut fx = objective.value(&x);
    let mut step = 1.0;

    for iter in 1..=self.max_iterations {
      let g = objective.gradient(&x);
      if g.iter().any(|v| !v.is_finite()) {
        debug!(objective = objective.name(), iter, "non-finite gradient");
        return Ok(Minimization::new(x, fx, iter - 1, SolverStatus::NumericalFailure));
      }

      let full = constraints.project(&(&x - &g));
      if (&x - full).amax() <= STATIONARY_TOL {
        return Ok(done(objective, x, fx, iter - 1, SolverStatus::Stationary));
      }

      let mut t = step;
      let mut accepted = None;
      while t >= MIN_STEP {
        let candidate = constraints.project(&(&x - &g * t));
        let fc = objective.value(&candidate);
        let decrease = g.dot(&(&x - &candidate));
        if fc.is_finite() && fc <= fx - ARMIJO * decrease {
          accepted = Some((candidate, fc));
          break;
        }
        t *= 0.5;
      }

      let Some((candidate, fc)) = accepted else {
        // no step along the projected arc decreases f
        return Ok(done(objective, x, fx, iter - 1, SolverStatus::Stationary));
      };

      let change = fx - fc;
      let scale = 1.0 + fx.abs();
      x = candidate;
      fx = fc;
      step = (2.0 * t).min(MAX_STEP);

      if change <= self.tolerance * scale {
        return Ok(done(objective, x, fx, iter, SolverStatus::Converged));
      }
    }

    debug!(
      objective = objective.name(),
      max_iterations = self.max_iterations,
      value = fx,
      "projected gradient hit the iteration cap"
    );
    Ok(Minimization::new(x, fx, self.max_iterations, SolverStatus::MaxIterations))
  }

  fn name(&self) -> &'static str {
    "projected-gradient"
  }
}

fn done(
  objective: &dyn Objective,
  x: DVector<f64>,
  fx: f64,
  iterations: u64,
  status: SolverStatus,
) -> Minimization {
  debug!(
    objective = objective.name(),
    iterations,
    value = fx,
    ?status,
    "projected gradient finished"
  );
  Minimization::new(x, fx, iterations, status)
}
