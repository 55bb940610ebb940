//! # Solvers
//!
//! $$
//! \mathbf w^\*=\arg\min_{\mathbf w\in\mathcal C} f(\mathbf w)
//! $$
//!
//! Constrained minimizers over a [`ConstraintSet`]. Every backend starts from
//! the projection of its initial point and only ever returns feasible
//! iterates.

use nalgebra::DVector;
use serde::Deserialize;
use serde::Serialize;

use crate::constraints::ConstraintSet;
use crate::error::Result;
use crate::objectives::Objective;
use crate::types::SolverStatus;

pub mod active_set;
pub mod projected_gradient;
pub mod simplex_search;

pub use active_set::ActiveSetQp;
pub use projected_gradient::ProjectedGradient;
pub use simplex_search::SimplexSearch;

/// Outcome of a constrained minimization.
#[derive(Clone, Debug)]
pub struct Minimization {
  /// Best feasible iterate.
  pub weights: DVector<f64>,
  /// Objective value at `weights`.
  pub objective: f64,
  pub iterations: u64,
  pub converged: bool,
  pub status: SolverStatus,
}

impl Minimization {
  pub(crate) fn new(
    weights: DVector<f64>,
    objective: f64,
    iterations: u64,
    status: SolverStatus,
  ) -> Self {
    Self {
      weights,
      objective,
      iterations,
      converged: status.is_converged(),
      status,
    }
  }
}

/// A constrained minimization backend.
pub trait Minimizer {
  fn minimize(
    &self,
    objective: &dyn Objective,
    constraints: &ConstraintSet,
    x0: &DVector<f64>,
  ) -> Result<Minimization>;

  fn name(&self) -> &'static str;
}

/// Backend selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
  /// Active-set QP for convex quadratics, projected gradient otherwise.
  #[default]
  Auto,
  ProjectedGradient,
  ActiveSet,
  NelderMead,
}

/// Iteration budget and backend choice.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
  pub kind: SolverKind,
  pub max_iterations: u64,
  /// Relative objective change that counts as converged.
  pub tolerance: f64,
}

impl Default for SolverConfig {
  fn default() -> Self {
    Self {
      kind: SolverKind::Auto,
      max_iterations: 500,
      tolerance: 1e-9,
    }
  }
}

impl SolverConfig {
  /// Backend for `objective` under this configuration.
  pub fn minimizer(&self, objective: &dyn Objective) -> Box<dyn Minimizer> {
    match self.kind {
      SolverKind::Auto if objective.is_convex() && objective.quadratic().is_some() => {
        Box::new(ActiveSetQp::new(self.max_iterations, self.tolerance))
      }
      SolverKind::Auto | SolverKind::ProjectedGradient => {
        Box::new(ProjectedGradient::new(self.max_iterations, self.tolerance))
      }
      SolverKind::ActiveSet => Box::new(ActiveSetQp::new(self.max_iterations, self.tolerance)),
      SolverKind::NelderMead => Box::new(SimplexSearch::new(self.max_iterations, self.tolerance)),
    }
  }
}

/// Equal weights, the default starting point.
pub fn equal_weights(n: usize) -> DVector<f64> {
  DVector::from_element(n, 1.0 / n as f64)
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use nalgebra::DMatrix;

  use super::*;
  use crate::objectives::MinVariance;
  use crate::objectives::NegativeSharpe;
  use crate::risk_model::RiskModel;

  fn model() -> RiskModel {
    RiskModel::from_moments(
      vec!["A".into(), "B".into(), "C".into(), "D".into()],
      DVector::from_vec(vec![0.06, 0.09, 0.12, 0.15]),
      DMatrix::from_row_slice(
        4,
        4,
        &[
          0.04, 0.006, 0.004, 0.002, //
          0.006, 0.0625, 0.01, 0.008, //
          0.004, 0.01, 0.09, 0.012, //
          0.002, 0.008, 0.012, 0.16,
        ],
      ),
    )
    .unwrap()
  }

  #[test]
  fn auto_picks_backend_by_objective() {
    let m = model();
    let cfg = SolverConfig::default();
    assert_eq!(cfg.minimizer(&MinVariance::new(&m)).name(), "active-set");
    assert_eq!(cfg.minimizer(&NegativeSharpe::new(&m, 0.0)).name(), "projected-gradient");
    let nm = SolverConfig {
      kind: SolverKind::NelderMead,
      ..cfg
    };
    assert_eq!(nm.minimizer(&MinVariance::new(&m)).name(), "nelder-mead");
  }

  #[test]
  fn backends_agree_on_minimum_variance() {
    let m = model();
    let set = ConstraintSet::long_only(4, 0.5).unwrap();
    let obj = MinVariance::new(&m);
    let x0 = equal_weights(4);

    let qp = ActiveSetQp::default().minimize(&obj, &set, &x0).unwrap();
    let pg = ProjectedGradient::new(5000, 1e-14).minimize(&obj, &set, &x0).unwrap();
    assert!(qp.converged);
    assert_relative_eq!(qp.weights, pg.weights, epsilon = 1e-4);
    assert_relative_eq!(qp.objective, pg.objective, epsilon = 1e-8);
  }

  #[test]
  fn config_parses_from_json() {
    let cfg: SolverConfig = serde_json::from_str(r#"{"kind":"nelder_mead"}"#).unwrap();
    assert_eq!(cfg.kind, SolverKind::NelderMead);
    assert_eq!(cfg.max_iterations, 500);
  }
}
