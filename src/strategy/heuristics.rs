//! # Heuristic Allocations
//!
//! $$
//! w_i\propto\frac1{\sigma_i},\qquad
//! y_i\leftarrow\frac{-c_i+\sqrt{c_i^2+4\Sigma_{ii}b_i}}{2\Sigma_{ii}},\ \ c_i=\sum_{j\ne i}\Sigma_{ij}y_j
//! $$
//!
//! Closed-form and score-based weights, plus cyclical coordinate descent for
//! risk budgeting.

use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Axis;

use crate::data::ReturnsSeries;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::risk_model::RiskModel;

/// Floor applied to momentum scores so every asset keeps some weight.
pub const MOMENTUM_FLOOR: f64 = 0.01;

pub fn equal_weight(n: usize) -> DVector<f64> {
  DVector::from_element(n, 1.0 / n as f64)
}

/// Weights proportional to inverse volatility.
pub fn inverse_volatility(model: &RiskModel) -> DVector<f64> {
  let inv = model.volatilities().map(|s| 1.0 / s);
  let total = inv.sum();
  inv / total
}

/// Annualized trailing mean over the last `lookback` rows, floored at
/// [`MOMENTUM_FLOOR`].
pub fn momentum_scores(
  returns: &ReturnsSeries,
  lookback: usize,
  annualization: f64,
) -> Result<DVector<f64>> {
  if lookback == 0 {
    return Err(PortfolioError::invalid("momentum lookback must be positive"));
  }
  let window = returns.tail(lookback);
  let mean = window
    .values()
    .mean_axis(Axis(0))
    .ok_or_else(|| PortfolioError::invalid("no observations to score"))?;
  Ok(DVector::from_iterator(
    mean.len(),
    mean.iter().map(|m| (m * annualization).max(MOMENTUM_FLOOR)),
  ))
}

/// Weights proportional to `scores`.
pub fn score_weights(scores: &DVector<f64>) -> DVector<f64> {
  scores / scores.sum()
}

/// Result of the risk-budgeting coordinate descent.
#[derive(Clone, Debug)]
pub struct RiskBudgetSolution {
  pub weights: DVector<f64>,
  pub sweeps: u64,
  pub converged: bool,
}

/// Long-only weights whose fractional risk contributions equal `budgets`.
///
/// Minimizes `0.5 y' Sigma y - sum b_i ln y_i` one coordinate at a time; the
/// fixed point satisfies `y_i (Sigma y)_i = b_i`, so `y / sum(y)` has
/// contributions `b`.
pub fn risk_budget_weights(
  covariance: &DMatrix<f64>,
  budgets: &DVector<f64>,
  max_sweeps: u64,
  tolerance: f64,
) -> RiskBudgetSolution {
  let n = covariance.nrows();
  let mut y = DVector::from_fn(n, |i, _| 1.0 / covariance[(i, i)].sqrt());
  let mut sweeps = 0;
  let mut converged = false;

  while sweeps < max_sweeps {
    sweeps += 1;
    let mut delta: f64 = 0.0;
    for i in 0..n {
      let sii = covariance[(i, i)];
      let c = covariance.row(i).dot(&y.transpose()) - sii * y[i];
      let next = (-c + (c * c + 4.0 * sii * budgets[i]).sqrt()) / (2.0 * sii);
      delta = delta.max(((next - y[i]) / next).abs());
      y[i] = next;
    }
    if delta <= tolerance {
      converged = true;
      break;
    }
  }

  let total = y.sum();
  RiskBudgetSolution {
    weights: y / total,
    sweeps,
    converged,
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  fn correlated_model() -> RiskModel {
    RiskModel::from_moments(
      vec!["A".into(), "B".into(), "C".into(), "D".into()],
      DVector::from_vec(vec![0.05, 0.08, 0.1, 0.12]),
      DMatrix::from_row_slice(
        4,
        4,
        &[
          0.0225, 0.009, -0.003, 0.006, //
          0.009, 0.04, 0.012, 0.015, //
          -0.003, 0.012, 0.0625, 0.02, //
          0.006, 0.015, 0.02, 0.09,
        ],
      ),
    )
    .unwrap()
  }

  #[test]
  fn coordinate_descent_equalizes_contributions() {
    let m = correlated_model();
    let sol = risk_budget_weights(m.covariance(), &equal_weight(4), 10_000, 1e-14);
    assert!(sol.converged);
    let rc = m.risk_contributions(&sol.weights);
    for i in 0..4 {
      assert_relative_eq!(rc[i], 0.25, epsilon = 1e-8);
    }
  }

  #[test]
  fn coordinate_descent_matches_custom_budgets() {
    let m = correlated_model();
    let budgets = DVector::from_vec(vec![0.4, 0.3, 0.2, 0.1]);
    let sol = risk_budget_weights(m.covariance(), &budgets, 10_000, 1e-14);
    assert_relative_eq!(m.risk_contributions(&sol.weights), budgets, epsilon = 1e-8);
  }

  #[test]
  fn inverse_volatility_normalizes() {
    let w = inverse_volatility(&correlated_model());
    assert_relative_eq!(w.sum(), 1.0, epsilon = 1e-15);
    // sigma: 0.15, 0.2, 0.25, 0.3
    assert_relative_eq!(w[0] / w[3], 2.0, epsilon = 1e-12);
  }

  #[test]
  fn momentum_scores_are_floored() {
    let series = ReturnsSeries::from_columns(vec![
      ("UP", vec![-0.05, 0.001, 0.001]),
      ("DOWN", vec![0.05, -0.001, -0.001]),
    ])
    .unwrap();
    let scores = momentum_scores(&series, 2, 252.0).unwrap();
    assert_relative_eq!(scores[0], 0.252, epsilon = 1e-12);
    assert_eq!(scores[1], MOMENTUM_FLOOR);
    assert!(momentum_scores(&series, 0, 252.0).is_err());
  }
}
