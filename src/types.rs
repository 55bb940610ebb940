//! # Portfolio Types
//!
//! $$
//! \mathbf w\in\Delta^{N-1}=\{\mathbf w\ge0,\ \mathbf 1^\top\mathbf w=1\}
//! $$
//!
//! Validated weights and the result container returned by every strategy.

use nalgebra::DVector;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::strategy::Strategy;

/// Entries further than this outside `[0, 1]` are rejected.
const BOUND_SLACK: f64 = 1e-10;
/// Allowed deviation of the weight sum from one.
const SUM_TOLERANCE: f64 = 1e-4;

/// Long-only, fully invested allocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct PortfolioWeights(Vec<f64>);

impl PortfolioWeights {
  /// Validate `weights`; tiny bound violations are clamped and the vector
  /// renormalized.
  pub fn new(weights: Vec<f64>) -> Result<Self> {
    if weights.is_empty() {
      return Err(PortfolioError::invalid("empty weight vector"));
    }
    if let Some((i, w)) = weights
      .iter()
      .enumerate()
      .find(|(_, w)| !w.is_finite() || **w < -BOUND_SLACK || **w > 1.0 + BOUND_SLACK)
    {
      return Err(PortfolioError::invalid(format!(
        "weight {i} is {w}, outside [0, 1]"
      )));
    }

    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() > SUM_TOLERANCE {
      return Err(PortfolioError::invalid(format!(
        "weights sum to {total}, expected 1"
      )));
    }

    let clamped: Vec<f64> = weights.iter().map(|w| w.clamp(0.0, 1.0)).collect();
    let total: f64 = clamped.iter().sum();
    Ok(Self(clamped.into_iter().map(|w| w / total).collect()))
  }

  /// `1/N` for each asset.
  pub fn equal(n: usize) -> Result<Self> {
    if n == 0 {
      return Err(PortfolioError::invalid("empty weight vector"));
    }
    Ok(Self(vec![1.0 / n as f64; n]))
  }

  /// Validate a solver iterate, see [`PortfolioWeights::new`].
  pub fn from_vector(w: &DVector<f64>) -> Result<Self> {
    Self::new(w.iter().copied().collect())
  }

  /// Weights in asset order.
  pub fn as_slice(&self) -> &[f64] {
    &self.0
  }

  /// Copy into a column vector for linear algebra.
  pub fn to_vector(&self) -> DVector<f64> {
    DVector::from_column_slice(&self.0)
  }

  /// Number of assets.
  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &f64> {
    self.0.iter()
  }
}

impl TryFrom<Vec<f64>> for PortfolioWeights {
  type Error = PortfolioError;

  fn try_from(value: Vec<f64>) -> Result<Self> {
    Self::new(value)
  }
}

impl From<PortfolioWeights> for Vec<f64> {
  fn from(value: PortfolioWeights) -> Self {
    value.0
  }
}

impl std::ops::Index<usize> for PortfolioWeights {
  type Output = f64;

  fn index(&self, index: usize) -> &f64 {
    &self.0[index]
  }
}

/// How a solve terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
  /// Relative objective change fell below tolerance.
  Converged,
  /// First-order optimality reached (no descent direction left).
  Stationary,
  /// Iteration cap hit; the best iterate is returned.
  MaxIterations,
  /// Closed-form or heuristic allocation, no iterative solve.
  Analytic,
  /// A linear system failed; the last feasible iterate is returned.
  NumericalFailure,
}

impl SolverStatus {
  pub fn is_converged(self) -> bool {
    matches!(self, Self::Converged | Self::Stationary | Self::Analytic)
  }
}

/// Output of a strategy run.
#[derive(Clone, Debug, Serialize)]
pub struct OptimizationResult {
  pub strategy: Strategy,
  pub assets: Vec<String>,
  /// Absent when no valid allocation could be produced.
  pub weights: Option<PortfolioWeights>,
  pub converged: bool,
  pub objective_value: f64,
  pub iterations: u64,
  pub status: SolverStatus,
  /// Annualized `w' mu`.
  pub expected_return: f64,
  /// Annualized `sqrt(w' Sigma w)`.
  pub volatility: f64,
  /// `None` when the volatility is (numerically) zero.
  pub sharpe_ratio: Option<f64>,
  /// Fractional contributions to variance, summing to one.
  pub risk_contributions: Vec<f64>,
  /// Whether the volatility respects the profile's cap, when one applies.
  pub within_volatility_cap: Option<bool>,
}

impl OptimizationResult {
  /// Result carrying no allocation.
  pub fn failed(
    strategy: Strategy,
    assets: Vec<String>,
    iterations: u64,
    status: SolverStatus,
  ) -> Self {
    Self {
      strategy,
      assets,
      weights: None,
      converged: false,
      objective_value: f64::NAN,
      iterations,
      status,
      expected_return: f64::NAN,
      volatility: f64::NAN,
      sharpe_ratio: None,
      risk_contributions: Vec::new(),
      within_volatility_cap: None,
    }
  }

  /// Weight of `asset`, if it is part of the allocation.
  pub fn weight(&self, asset: &str) -> Option<f64> {
    let i = self.assets.iter().position(|a| a == asset)?;
    self.weights.as_ref().map(|w| w[i])
  }

  /// `(asset, weight)` pairs sorted by descending weight.
  pub fn allocations(&self) -> Vec<(&str, f64)> {
    let Some(w) = &self.weights else {
      return Vec::new();
    };
    let mut out: Vec<(&str, f64)> = self
      .assets
      .iter()
      .map(String::as_str)
      .zip(w.iter().copied())
      .collect();
    out.sort_by(|a, b| b.1.total_cmp(&a.1));
    out
  }
}
