//! # Errors
//!
//! $$
//! \mathcal{E} = \{\text{data}, \text{degenerate}, \text{infeasible}, \text{method}, \text{input}, \text{numerical}\}
//! $$
//!
//! Error taxonomy shared by every stage of the allocation pipeline.

use thiserror::Error;

use crate::strategy::Strategy;

/// Errors raised while building a risk model, a constraint set or a strategy.
///
/// Numerical non-convergence is not an error: it is reported through
/// [`crate::OptimizationResult::converged`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PortfolioError {
  /// Too few observations for a stable covariance estimate.
  #[error("insufficient data: {observations} observations, at least {required} required")]
  InsufficientData { observations: usize, required: usize },

  /// One or more assets have zero variance over the sample.
  #[error("degenerate asset(s) with zero variance: {}", .assets.join(", "))]
  DegenerateAsset { assets: Vec<String> },

  /// Bounds, caps or target return leave an empty feasible region.
  #[error("infeasible constraints: {reason}")]
  InfeasibleConstraint { reason: String },

  /// Strategy name that does not map to any [`Strategy`].
  #[error("unknown optimization method '{name}', expected one of: {}", Strategy::names().join(", "))]
  UnknownMethod { name: String },

  /// Malformed input (shape mismatch, non-finite value, bad parameter).
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// A linear system that must be solved is singular.
  #[error("numerical failure: {0}")]
  Numerical(String),
}

impl PortfolioError {
  pub(crate) fn infeasible(reason: impl Into<String>) -> Self {
    Self::InfeasibleConstraint {
      reason: reason.into(),
    }
  }

  pub(crate) fn invalid(reason: impl Into<String>) -> Self {
    Self::InvalidInput(reason.into())
  }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PortfolioError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_method_lists_valid_names() {
    let err = PortfolioError::UnknownMethod {
      name: "kelly".to_string(),
    };
    let msg = err.to_string();
    assert!(msg.contains("'kelly'"));
    assert!(msg.contains("max_sharpe"));
    assert!(msg.contains("black_litterman"));
  }

  #[test]
  fn degenerate_asset_names_every_asset() {
    let err = PortfolioError::DegenerateAsset {
      assets: vec!["USDT".to_string(), "USDC".to_string()],
    };
    assert_eq!(
      err.to_string(),
      "degenerate asset(s) with zero variance: USDT, USDC"
    );
  }
}
