//! # Backtest
//!
//! $$
//! V_{t+1}=\sum_i h_{t,i}(1+r_{t,i}),\qquad
//! \mathrm{DD}_t=\frac{\max_{s\le t}V_s-V_t}{\max_{s\le t}V_s}
//! $$
//!
//! Replays a rebalancing schedule over a returns table and summarizes the
//! realized value path.

use chrono::Datelike;
use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::sharpe_ratio;
use crate::data::ReturnsSeries;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::types::PortfolioWeights;

/// Calendar period that triggers a rebalance on its first row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
  Daily,
  /// ISO week.
  Weekly,
  #[default]
  Monthly,
  Quarterly,
}

impl RebalanceFrequency {
  /// Period containing `date`; rows sharing a key share a period.
  fn period(self, date: NaiveDate) -> (i32, u32) {
    match self {
      Self::Daily => (date.year(), date.ordinal()),
      Self::Weekly => {
        let week = date.iso_week();
        (week.year(), week.week())
      }
      Self::Monthly => (date.year(), date.month()),
      Self::Quarterly => (date.year(), date.month0() / 3),
    }
  }
}

/// Target weights by row index of the returns table.
#[derive(Clone, Debug, PartialEq)]
pub struct RebalanceSchedule {
  entries: Vec<(usize, PortfolioWeights)>,
}

impl RebalanceSchedule {
  /// `entries` must start at row 0 and be strictly increasing in row.
  pub fn new(entries: Vec<(usize, PortfolioWeights)>) -> Result<Self> {
    match entries.first() {
      None => return Err(PortfolioError::invalid("empty rebalance schedule")),
      Some((row, _)) if *row != 0 => {
        return Err(PortfolioError::invalid(format!(
          "schedule must start at row 0, starts at {row}"
        )));
      }
      Some(_) => {}
    }
    if entries.windows(2).any(|e| e[1].0 <= e[0].0) {
      return Err(PortfolioError::invalid("schedule rows must be strictly increasing"));
    }
    let n = entries[0].1.len();
    if entries.iter().any(|(_, w)| w.len() != n) {
      return Err(PortfolioError::invalid("schedule entries differ in asset count"));
    }
    Ok(Self { entries })
  }

  /// Buy once at row 0 and let the holdings drift.
  pub fn buy_and_hold(weights: PortfolioWeights) -> Self {
    Self {
      entries: vec![(0, weights)],
    }
  }

  /// Reset to `weights` every `every` rows over `rows` observations.
  pub fn periodic(weights: PortfolioWeights, every: usize, rows: usize) -> Result<Self> {
    if every == 0 {
      return Err(PortfolioError::invalid("rebalance interval must be positive"));
    }
    let entries = (0..rows.max(1))
      .step_by(every)
      .map(|row| (row, weights.clone()))
      .collect();
    Self::new(entries)
  }

  /// Reset to `weights` on the first row of every calendar period.
  ///
  /// Fails with [`PortfolioError::InvalidInput`] when `returns` carries no
  /// row dates.
  pub fn calendar(
    returns: &ReturnsSeries,
    frequency: RebalanceFrequency,
    weights: PortfolioWeights,
  ) -> Result<Self> {
    let dates = returns
      .dates()
      .ok_or_else(|| PortfolioError::invalid("calendar rebalancing needs dated returns"))?;
    let mut last = None;
    let mut entries = Vec::new();
    for (row, date) in dates.iter().enumerate() {
      let period = frequency.period(*date);
      if last != Some(period) {
        entries.push((row, weights.clone()));
        last = Some(period);
      }
    }
    Self::new(entries)
  }

  pub fn entries(&self) -> &[(usize, PortfolioWeights)] {
    &self.entries
  }

  pub fn n_assets(&self) -> usize {
    self.entries[0].1.len()
  }
}

/// Backtest settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
  pub initial_value: f64,
  /// Fraction of traded notional paid on each rebalance.
  pub trading_fee: f64,
  /// Periods per year.
  pub annualization: f64,
  /// Annualized risk-free rate.
  pub risk_free_rate: f64,
}

impl Default for BacktestConfig {
  fn default() -> Self {
    Self {
      initial_value: 1.0,
      trading_fee: 0.0,
      annualization: 252.0,
      risk_free_rate: 0.0,
    }
  }
}

/// Realized path of a backtest.
#[derive(Clone, Debug)]
pub struct BacktestReport {
  /// Portfolio value, `T + 1` points starting at the initial value.
  pub values: Vec<f64>,
  /// Per-period returns, `T` points.
  pub returns: Vec<f64>,
  /// Holdings in currency units, `(T + 1, N)`. Row 0 is the opening
  /// allocation net of the initial fee, row `t` the holdings after period `t`.
  pub holdings: Array2<f64>,
  pub running_max: Vec<f64>,
  /// Fractional decline from the running maximum, non-negative.
  pub drawdowns: Vec<f64>,
  pub max_drawdown: f64,
  /// Total traded notional across rebalances.
  pub turnover: f64,
  pub fees_paid: f64,
  pub summary: PerformanceSummary,
}

/// Replay `schedule` over `returns`.
pub fn backtest(
  returns: &ReturnsSeries,
  schedule: &RebalanceSchedule,
  config: &BacktestConfig,
) -> Result<BacktestReport> {
  let t_len = returns.n_observations();
  let n = returns.n_assets();
  if t_len == 0 {
    return Err(PortfolioError::invalid("no observations to backtest"));
  }
  if schedule.n_assets() != n {
    return Err(PortfolioError::invalid(format!(
      "schedule has {} weights for {n} assets",
      schedule.n_assets()
    )));
  }
  if let Some((row, _)) = schedule.entries().iter().find(|(row, _)| *row >= t_len) {
    return Err(PortfolioError::invalid(format!(
      "rebalance at row {row} beyond {t_len} observations"
    )));
  }
  if !(config.initial_value > 0.0 && config.initial_value.is_finite()) {
    return Err(PortfolioError::invalid("initial value must be positive"));
  }
  if !(0.0..1.0).contains(&config.trading_fee) {
    return Err(PortfolioError::invalid(format!(
      "trading fee must lie in [0, 1), got {}",
      config.trading_fee
    )));
  }

  let r = returns.values();
  let mut holdings = Array2::<f64>::zeros((t_len + 1, n));
  let mut h = Array1::<f64>::zeros(n);
  let mut value = config.initial_value;
  let mut values = Vec::with_capacity(t_len + 1);
  values.push(value);

  let mut turnover = 0.0;
  let mut fees_paid = 0.0;
  let mut next = schedule.entries().iter().peekable();

  for t in 0..t_len {
    if let Some((_, w)) = next.next_if(|(row, _)| *row == t) {
      let target = ArrayView1::from(w.as_slice()).mapv(|x| x * value);
      let traded: f64 = (&target - &h).mapv(f64::abs).sum();
      let fee = config.trading_fee * traded;
      value -= fee;
      h = ArrayView1::from(w.as_slice()).mapv(|x| x * value);
      turnover += traded;
      fees_paid += fee;
      debug!(row = t, traded, fee, "rebalanced");
      if t == 0 {
        holdings.row_mut(0).assign(&h);
      }
    }

    h = &h * &r.row(t).mapv(|x| 1.0 + x);
    value = h.sum();
    holdings.row_mut(t + 1).assign(&h);
    values.push(value);
  }

  let period_returns = period_returns(&values);
  let (running_max, drawdowns) = drawdown_path(&values);
  let max_drawdown = drawdowns.iter().copied().fold(0.0, f64::max);
  let summary =
    PerformanceSummary::from_returns(&period_returns, config.annualization, config.risk_free_rate);

  Ok(BacktestReport {
    values,
    returns: period_returns,
    holdings,
    running_max,
    drawdowns,
    max_drawdown,
    turnover,
    fees_paid,
    summary,
  })
}

fn period_returns(values: &[f64]) -> Vec<f64> {
  values
    .windows(2)
    .map(|v| if v[0] > 0.0 { v[1] / v[0] - 1.0 } else { 0.0 })
    .collect()
}

fn drawdown_path(values: &[f64]) -> (Vec<f64>, Vec<f64>) {
  let mut peak = f64::NEG_INFINITY;
  let mut running_max = Vec::with_capacity(values.len());
  let mut drawdowns = Vec::with_capacity(values.len());
  for &v in values {
    peak = peak.max(v);
    running_max.push(peak);
    drawdowns.push(if peak > 0.0 { (peak - v) / peak } else { 0.0 });
  }
  (running_max, drawdowns)
}

/// Summary statistics of a realized return series.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PerformanceSummary {
  pub total_return: f64,
  pub annualized_return: f64,
  pub volatility: f64,
  pub sharpe_ratio: Option<f64>,
  /// Positive fraction.
  pub max_drawdown: f64,
  /// Annualized return over max drawdown; `None` without a drawdown.
  pub calmar_ratio: Option<f64>,
  /// 5th percentile of period returns.
  pub var_95: f64,
  /// Mean of period returns at or below `var_95`.
  pub cvar_95: f64,
  pub win_rate: f64,
  pub best_period: f64,
  pub worst_period: f64,
}

impl PerformanceSummary {
  pub fn from_returns(returns: &[f64], annualization: f64, risk_free: f64) -> Self {
    if returns.is_empty() {
      return Self {
        total_return: 0.0,
        annualized_return: 0.0,
        volatility: 0.0,
        sharpe_ratio: None,
        max_drawdown: 0.0,
        calmar_ratio: None,
        var_95: 0.0,
        cvar_95: 0.0,
        win_rate: 0.0,
        best_period: 0.0,
        worst_period: 0.0,
      };
    }

    let mut values = Vec::with_capacity(returns.len() + 1);
    values.push(1.0);
    for r in returns {
      let last = values[values.len() - 1];
      values.push(last * (1.0 + r));
    }

    let t_len = returns.len() as f64;
    let total_return = values[values.len() - 1] - 1.0;
    let annualized_return = if total_return > -1.0 {
      (1.0 + total_return).powf(annualization / t_len) - 1.0
    } else {
      -1.0
    };
    let volatility = if returns.len() > 1 {
      ArrayView1::from(returns).std(1.0) * annualization.sqrt()
    } else {
      0.0
    };
    let (_, drawdowns) = drawdown_path(&values);
    let max_drawdown = drawdowns.iter().copied().fold(0.0, f64::max);

    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let var_95 = percentile(&sorted, 5.0);
    let tail: Vec<f64> = sorted.iter().copied().take_while(|r| *r <= var_95).collect();
    let cvar_95 = if tail.is_empty() {
      var_95
    } else {
      tail.iter().sum::<f64>() / tail.len() as f64
    };

    Self {
      total_return,
      annualized_return,
      volatility,
      sharpe_ratio: sharpe_ratio(annualized_return, volatility, risk_free),
      max_drawdown,
      calmar_ratio: (max_drawdown > 0.0).then(|| annualized_return / max_drawdown),
      var_95,
      cvar_95,
      win_rate: returns.iter().filter(|r| **r > 0.0).count() as f64 / t_len,
      best_period: sorted[sorted.len() - 1],
      worst_period: sorted[0],
    }
  }
}

/// Linear-interpolated percentile of ascending `sorted`, `q` in percent.
fn percentile(sorted: &[f64], q: f64) -> f64 {
  let pos = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
  let lo = pos.floor() as usize;
  let hi = pos.ceil() as usize;
  sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn check_window(len: usize, window: usize) -> Result<()> {
  if window < 2 || window > len {
    return Err(PortfolioError::invalid(format!(
      "rolling window {window} needs 2..={len}"
    )));
  }
  Ok(())
}

/// Annualized volatility over each trailing `window`.
pub fn rolling_volatility(returns: &[f64], window: usize, annualization: f64) -> Result<Vec<f64>> {
  check_window(returns.len(), window)?;
  Ok(
    ArrayView1::from(returns)
      .windows(window)
      .into_iter()
      .map(|w| w.std(1.0) * annualization.sqrt())
      .collect(),
  )
}

/// Annualized Sharpe ratio over each trailing `window`.
pub fn rolling_sharpe(
  returns: &[f64],
  window: usize,
  annualization: f64,
  risk_free: f64,
) -> Result<Vec<Option<f64>>> {
  check_window(returns.len(), window)?;
  Ok(
    ArrayView1::from(returns)
      .windows(window)
      .into_iter()
      .map(|w| {
        let mean = w.sum() / window as f64;
        sharpe_ratio(mean * annualization, w.std(1.0) * annualization.sqrt(), risk_free)
      })
      .collect(),
  )
}
