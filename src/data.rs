//! # Returns Data
//!
//! $$
//! R \in \mathbb{R}^{T \times N},\quad r_{t,i} = \frac{P_{t,i}}{P_{t-1,i}} - 1
//! $$
//!
//! Container for an aligned table of periodic asset returns and helpers for
//! callers that still hold prices.

use std::collections::HashSet;

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use ndarray::s;

use crate::error::PortfolioError;
use crate::error::Result;

/// Time-ordered table of periodic fractional returns, one column per asset.
///
/// Rows are observations (oldest first), columns are assets. The table must
/// already be clean: every entry finite, no gaps.
#[derive(Clone, Debug)]
pub struct ReturnsSeries {
  assets: Vec<String>,
  dates: Option<Vec<NaiveDate>>,
  values: Array2<f64>,
}

impl ReturnsSeries {
  /// Build a series from asset identifiers and a `(T, N)` return matrix.
  pub fn new(assets: Vec<String>, values: Array2<f64>) -> Result<Self> {
    if assets.len() != values.ncols() {
      return Err(PortfolioError::invalid(format!(
        "{} asset identifiers for a table with {} columns",
        assets.len(),
        values.ncols()
      )));
    }

    let mut seen = HashSet::with_capacity(assets.len());
    for asset in &assets {
      if !seen.insert(asset.as_str()) {
        return Err(PortfolioError::invalid(format!(
          "duplicate asset identifier '{asset}'"
        )));
      }
    }

    if let Some(((row, col), _)) = values.indexed_iter().find(|(_, v)| !v.is_finite()) {
      return Err(PortfolioError::invalid(format!(
        "non-finite return for '{}' at row {row}",
        assets[col]
      )));
    }

    Ok(Self {
      assets,
      dates: None,
      values,
    })
  }

  /// Build a series from `(asset, returns)` columns of equal length.
  pub fn from_columns<S: Into<String>>(columns: Vec<(S, Vec<f64>)>) -> Result<Self> {
    let n_obs = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
    if columns.iter().any(|(_, c)| c.len() != n_obs) {
      return Err(PortfolioError::invalid("return columns differ in length"));
    }

    let (assets, cols): (Vec<String>, Vec<Vec<f64>>) =
      columns.into_iter().map(|(a, c)| (a.into(), c)).unzip();
    let values = Array2::from_shape_fn((n_obs, cols.len()), |(t, i)| cols[i][t]);

    Self::new(assets, values)
  }

  /// Attach strictly increasing row dates.
  pub fn with_dates(mut self, dates: Vec<NaiveDate>) -> Result<Self> {
    if dates.len() != self.values.nrows() {
      return Err(PortfolioError::invalid(format!(
        "{} dates for {} observations",
        dates.len(),
        self.values.nrows()
      )));
    }
    if let Some(pair) = dates.windows(2).find(|d| d[1] <= d[0]) {
      return Err(PortfolioError::invalid(format!(
        "dates must be strictly increasing, found {} after {}",
        pair[1], pair[0]
      )));
    }

    self.dates = Some(dates);
    Ok(self)
  }

  /// Asset identifiers in column order.
  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  /// Row dates, if attached.
  pub fn dates(&self) -> Option<&[NaiveDate]> {
    self.dates.as_deref()
  }

  /// Raw `(T, N)` return matrix.
  pub fn values(&self) -> ArrayView2<'_, f64> {
    self.values.view()
  }

  /// Number of asset columns.
  pub fn n_assets(&self) -> usize {
    self.values.ncols()
  }

  /// Number of rows.
  pub fn n_observations(&self) -> usize {
    self.values.nrows()
  }

  /// Column index of `asset`.
  pub fn position(&self, asset: &str) -> Option<usize> {
    self.assets.iter().position(|a| a == asset)
  }

  /// Returns of a single asset.
  pub fn column(&self, asset: &str) -> Option<ArrayView1<'_, f64>> {
    self.position(asset).map(|i| self.values.column(i))
  }

  /// Last `n` observations (all of them if `n` exceeds the length).
  pub fn tail(&self, n: usize) -> Self {
    let start = self.values.nrows().saturating_sub(n);
    Self {
      assets: self.assets.clone(),
      dates: self.dates.as_ref().map(|d| d[start..].to_vec()),
      values: self.values.slice(s![start.., ..]).to_owned(),
    }
  }

  /// Sub-table restricted to `assets`, in the requested order. Each asset
  /// may appear once.
  pub fn select(&self, assets: &[&str]) -> Result<Self> {
    let idx = assets
      .iter()
      .map(|a| {
        self
          .position(a)
          .ok_or_else(|| PortfolioError::invalid(format!("unknown asset '{a}'")))
      })
      .collect::<Result<Vec<_>>>()?;

    let mut table = Self::new(
      assets.iter().map(|a| a.to_string()).collect(),
      self.values.select(Axis(1), &idx),
    )?;
    table.dates = self.dates.clone();
    Ok(table)
  }

  /// Per-period returns of a fixed-weight portfolio, `R w`.
  pub fn portfolio_returns(&self, weights: &[f64]) -> Result<Array1<f64>> {
    if weights.len() != self.n_assets() {
      return Err(PortfolioError::invalid(format!(
        "{} weights for {} assets",
        weights.len(),
        self.n_assets()
      )));
    }
    Ok(self.values.dot(&ArrayView1::from(weights)))
  }
}

/// Convert close prices to simple returns. Non-positive prices are skipped.
pub fn simple_returns(closes: &[f64]) -> Vec<f64> {
  closes
    .windows(2)
    .filter(|p| p[0] > 0.0 && p[1] > 0.0)
    .map(|p| p[1] / p[0] - 1.0)
    .collect()
}

/// Convert close prices to log-returns. Non-positive prices are skipped.
pub fn log_returns(closes: &[f64]) -> Vec<f64> {
  let mut out = Vec::with_capacity(closes.len().saturating_sub(1));
  for i in 1..closes.len() {
    if closes[i - 1] > 0.0 && closes[i] > 0.0 {
      out.push((closes[i] / closes[i - 1]).ln());
    }
  }
  out
}
