//! # Benchmark Comparison
//!
//! $$
//! \Delta_m = m(\text{portfolio}) - m(\text{benchmark})
//! $$
//!
//! Realized performance of a portfolio against buy-and-hold and equal-weight
//! benchmarks, with rankings by return, Sharpe and Calmar.

use std::cmp::Ordering;

use serde::Serialize;

use super::backtest::BacktestConfig;
use super::backtest::BacktestReport;
use super::backtest::PerformanceSummary;
use super::backtest::RebalanceFrequency;
use super::backtest::RebalanceSchedule;
use super::backtest::backtest;
use crate::data::ReturnsSeries;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::types::PortfolioWeights;

/// Name of the compared portfolio in rankings.
pub const PORTFOLIO: &str = "portfolio";
/// Equal-weight rebalance interval for undated returns.
const ROWS_PER_MONTH: usize = 21;

/// Summary differences, portfolio minus benchmark.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BenchmarkDiff {
  pub benchmark: String,
  pub return_diff: f64,
  /// `None` when either Sharpe ratio is undefined.
  pub sharpe_diff: Option<f64>,
  pub volatility_diff: f64,
  /// Positive when the portfolio drew down more.
  pub max_drawdown_diff: f64,
}

/// Metric used to order strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMetric {
  TotalReturn,
  SharpeRatio,
  CalmarRatio,
}

impl RankMetric {
  pub const ALL: [RankMetric; 3] = [Self::TotalReturn, Self::SharpeRatio, Self::CalmarRatio];

  fn value(self, s: &PerformanceSummary) -> Option<f64> {
    match self {
      Self::TotalReturn => Some(s.total_return),
      Self::SharpeRatio => s.sharpe_ratio,
      Self::CalmarRatio => s.calmar_ratio,
    }
  }
}

/// Strategy names, best first. Undefined values rank last.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Ranking {
  pub metric: RankMetric,
  pub order: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Comparison {
  pub benchmarks: Vec<BenchmarkDiff>,
  pub rankings: Vec<Ranking>,
}

fn diff(name: &str, p: &PerformanceSummary, b: &PerformanceSummary) -> BenchmarkDiff {
  BenchmarkDiff {
    benchmark: name.to_string(),
    return_diff: p.total_return - b.total_return,
    sharpe_diff: p.sharpe_ratio.zip(b.sharpe_ratio).map(|(p, b)| p - b),
    volatility_diff: p.volatility - b.volatility,
    max_drawdown_diff: p.max_drawdown - b.max_drawdown,
  }
}

/// Compare `portfolio` against named benchmark reports.
pub fn compare(portfolio: &BacktestReport, benchmarks: &[(&str, &BacktestReport)]) -> Comparison {
  let p = &portfolio.summary;
  let diffs = benchmarks
    .iter()
    .map(|(name, report)| diff(name, p, &report.summary))
    .collect();

  let mut entries = vec![(PORTFOLIO, p)];
  entries.extend(benchmarks.iter().map(|(name, report)| (*name, &report.summary)));

  let rankings = RankMetric::ALL
    .iter()
    .map(|&metric| {
      let mut order = entries.clone();
      // stable, so ties keep the portfolio first
      order.sort_by(|a, b| match (metric.value(a.1), metric.value(b.1)) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
      });
      Ranking {
        metric,
        order: order.into_iter().map(|(name, _)| name.to_string()).collect(),
      }
    })
    .collect();

  Comparison {
    benchmarks: diffs,
    rankings,
  }
}

/// Buy-and-hold of `asset` and a monthly-rebalanced equal-weight portfolio.
///
/// Equal weight rebalances on calendar months when `returns` is dated, every
/// 21 rows otherwise.
pub fn benchmark_reports(
  returns: &ReturnsSeries,
  asset: &str,
  config: &BacktestConfig,
) -> Result<Vec<(String, BacktestReport)>> {
  let n = returns.n_assets();
  let i = returns
    .position(asset)
    .ok_or_else(|| PortfolioError::invalid(format!("unknown benchmark asset '{asset}'")))?;
  let mut one_hot = vec![0.0; n];
  one_hot[i] = 1.0;
  let hold = RebalanceSchedule::buy_and_hold(PortfolioWeights::new(one_hot)?);

  let equal = PortfolioWeights::equal(n)?;
  let equal = match returns.dates() {
    Some(_) => RebalanceSchedule::calendar(returns, RebalanceFrequency::Monthly, equal)?,
    None => RebalanceSchedule::periodic(equal, ROWS_PER_MONTH, returns.n_observations())?,
  };

  Ok(vec![
    (format!("{asset} hold"), backtest(returns, &hold, config)?),
    ("equal weight".to_string(), backtest(returns, &equal, config)?),
  ])
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  /// A outgrows B; both have drawdowns.
  fn series() -> ReturnsSeries {
    ReturnsSeries::from_columns(vec![
      ("A", vec![0.02, -0.005, 0.02, -0.005, 0.02, -0.005]),
      ("B", vec![0.004, -0.001, 0.004, -0.001, 0.004, -0.001]),
    ])
    .unwrap()
  }

  #[test]
  fn portfolio_is_compared_with_each_benchmark() {
    let returns = series();
    let config = BacktestConfig::default();
    let all_b = PortfolioWeights::new(vec![0.0, 1.0]).unwrap();
    let portfolio = backtest(&returns, &RebalanceSchedule::buy_and_hold(all_b), &config).unwrap();
    let benchmarks = benchmark_reports(&returns, "A", &config).unwrap();
    let named: Vec<(&str, &BacktestReport)> =
      benchmarks.iter().map(|(name, r)| (name.as_str(), r)).collect();

    let cmp = compare(&portfolio, &named);
    assert_eq!(cmp.benchmarks.len(), 2);
    assert_eq!(cmp.benchmarks[0].benchmark, "A hold");
    let a = &benchmarks[0].1.summary;
    assert_relative_eq!(
      cmp.benchmarks[0].return_diff,
      portfolio.summary.total_return - a.total_return,
      epsilon = 1e-15
    );
    assert!(cmp.benchmarks[0].return_diff < 0.0);
    assert!(cmp.benchmarks[0].max_drawdown_diff < 0.0);
    assert!(cmp.benchmarks[0].sharpe_diff.is_some());

    let metrics: Vec<RankMetric> = cmp.rankings.iter().map(|r| r.metric).collect();
    assert_eq!(metrics, RankMetric::ALL);
    assert_eq!(cmp.rankings[0].order, vec!["A hold", "equal weight", PORTFOLIO]);
    assert!(cmp.rankings.iter().all(|r| r.order.len() == 3));
  }

  #[test]
  fn undefined_metrics_rank_last() {
    let returns = ReturnsSeries::from_columns(vec![
      ("A", vec![0.01, 0.01, 0.01]),
      ("B", vec![0.02, -0.01, 0.02]),
    ])
    .unwrap();
    let config = BacktestConfig::default();
    let flat = PortfolioWeights::new(vec![1.0, 0.0]).unwrap();
    let portfolio = backtest(&returns, &RebalanceSchedule::buy_and_hold(flat), &config).unwrap();
    let benchmarks = benchmark_reports(&returns, "B", &config).unwrap();
    let named: Vec<(&str, &BacktestReport)> =
      benchmarks.iter().map(|(name, r)| (name.as_str(), r)).collect();

    let cmp = compare(&portfolio, &named);
    // constant returns: zero volatility, no drawdown
    assert_eq!(cmp.benchmarks[0].sharpe_diff, None);
    let calmar = &cmp.rankings[2];
    assert_eq!(calmar.metric, RankMetric::CalmarRatio);
    assert_eq!(calmar.order.last().map(String::as_str), Some(PORTFOLIO));
  }

  #[test]
  fn unknown_benchmark_asset_is_rejected() {
    let err = benchmark_reports(&series(), "BTC", &BacktestConfig::default()).unwrap_err();
    assert!(err.to_string().contains("'BTC'"));
  }
}
