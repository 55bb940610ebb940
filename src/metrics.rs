//! # Metrics
//!
//! $$
//! \mathbb E[R_p]=\mathbf w^\top\mu,\qquad
//! \sigma_p=\sqrt{\mathbf w^\top\Sigma\mathbf w},\qquad
//! S=\frac{\mathbb E[R_p]-r_f}{\sigma_p}
//! $$
//!
//! Ex-ante portfolio statistics and realized performance of weight schedules.

use nalgebra::DVector;
use serde::Serialize;

use crate::objectives::MIN_VOLATILITY;
use crate::risk_model::RiskModel;

pub mod backtest;
pub mod comparison;

pub use backtest::BacktestConfig;
pub use backtest::BacktestReport;
pub use backtest::PerformanceSummary;
pub use backtest::RebalanceFrequency;
pub use backtest::RebalanceSchedule;
pub use backtest::backtest;
pub use backtest::rolling_sharpe;
pub use backtest::rolling_volatility;
pub use comparison::Comparison;
pub use comparison::benchmark_reports;
pub use comparison::compare;

/// Ex-ante statistics of a weight vector.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortfolioMetrics {
  pub expected_return: f64,
  pub volatility: f64,
  /// `None` when the volatility is below `1e-10`.
  pub sharpe_ratio: Option<f64>,
  pub risk_contributions: Vec<f64>,
}

/// Statistics of `w` under the model's own expected returns.
pub fn portfolio_metrics(model: &RiskModel, w: &DVector<f64>, risk_free: f64) -> PortfolioMetrics {
  portfolio_metrics_with_mean(model, model.mean(), w, risk_free)
}

/// Statistics of `w` under an alternative mean, e.g. a Black-Litterman
/// posterior.
pub fn portfolio_metrics_with_mean(
  model: &RiskModel,
  mean: &DVector<f64>,
  w: &DVector<f64>,
  risk_free: f64,
) -> PortfolioMetrics {
  let expected_return = w.dot(mean);
  let volatility = model.portfolio_volatility(w);
  PortfolioMetrics {
    expected_return,
    volatility,
    sharpe_ratio: sharpe_ratio(expected_return, volatility, risk_free),
    risk_contributions: model.risk_contributions(w).iter().copied().collect(),
  }
}

/// `(ret - rf) / vol`, undefined for vanishing volatility.
pub fn sharpe_ratio(ret: f64, vol: f64, risk_free: f64) -> Option<f64> {
  (vol >= MIN_VOLATILITY).then(|| (ret - risk_free) / vol)
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use nalgebra::DMatrix;

  use super::*;

  #[test]
  fn metrics_of_a_two_asset_mix() {
    let m = RiskModel::from_moments(
      vec!["A".into(), "B".into()],
      DVector::from_vec(vec![0.1, 0.2]),
      DMatrix::from_row_slice(2, 2, &[0.04, 0.0, 0.0, 0.09]),
    )
    .unwrap();
    let w = DVector::from_vec(vec![0.5, 0.5]);
    let pm = portfolio_metrics(&m, &w, 0.02);

    assert_relative_eq!(pm.expected_return, 0.15, epsilon = 1e-15);
    let vol = (0.25f64 * 0.04 + 0.25 * 0.09).sqrt();
    assert_relative_eq!(pm.volatility, vol, epsilon = 1e-15);
    assert_relative_eq!(pm.sharpe_ratio.unwrap(), 0.13 / vol, epsilon = 1e-12);
    assert_relative_eq!(pm.risk_contributions[1], 0.09 / 0.13, epsilon = 1e-12);
  }

  #[test]
  fn sharpe_is_undefined_without_risk() {
    assert_eq!(sharpe_ratio(0.1, 0.0, 0.0), None);
    assert_eq!(sharpe_ratio(0.1, 1e-11, 0.0), None);
    assert_eq!(sharpe_ratio(0.1, 0.5, 0.0), Some(0.2));
  }
}
