//! # Risk Model
//!
//! $$
//! \mu = f\,\bar r,\qquad \Sigma = \frac{f}{T-1}\sum_{t}(r_t-\bar r)(r_t-\bar r)^\top
//! $$
//!
//! Annualized sample moments of a returns table.

use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;
use serde::Deserialize;
use serde::Serialize;

use crate::data::ReturnsSeries;
use crate::error::PortfolioError;
use crate::error::Result;

/// Annualized variance below which an asset counts as constant.
const DEGENERATE_VARIANCE: f64 = 1e-14;

/// Estimation settings for [`RiskModel::estimate`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskModelConfig {
  /// Periods per year (252 for daily series).
  pub annualization: f64,
  /// Minimum number of observations for a stable covariance.
  pub min_observations: usize,
}

impl Default for RiskModelConfig {
  fn default() -> Self {
    Self {
      annualization: 252.0,
      min_observations: 60,
    }
  }
}

/// Immutable snapshot of annualized expected returns and covariance.
#[derive(Clone, Debug)]
pub struct RiskModel {
  assets: Vec<String>,
  mean: DVector<f64>,
  covariance: DMatrix<f64>,
  annualization: f64,
  observations: usize,
}

impl RiskModel {
  /// Estimate sample moments from `returns`.
  pub fn estimate(returns: &ReturnsSeries, config: &RiskModelConfig) -> Result<Self> {
    if !(config.annualization > 0.0 && config.annualization.is_finite()) {
      return Err(PortfolioError::invalid(format!(
        "annualization factor must be positive, got {}",
        config.annualization
      )));
    }
    if config.min_observations < 2 {
      return Err(PortfolioError::invalid(
        "at least two observations are needed for a sample covariance",
      ));
    }
    if returns.n_assets() == 0 {
      return Err(PortfolioError::invalid("returns table has no assets"));
    }

    let observations = returns.n_observations();
    if observations < config.min_observations {
      return Err(PortfolioError::InsufficientData {
        observations,
        required: config.min_observations,
      });
    }

    let values = returns.values();
    let n = values.ncols();
    let mean = values
      .mean_axis(Axis(0))
      .ok_or_else(|| PortfolioError::invalid("empty returns table"))?;
    // variables are columns, ndarray-stats wants them as rows
    let cov = values
      .t()
      .cov(1.0)
      .map_err(|e| PortfolioError::invalid(e.to_string()))?;

    let f = config.annualization;
    let mean = DVector::from_iterator(n, mean.iter().map(|m| m * f));
    let mut covariance = DMatrix::from_fn(n, n, |i, j| cov[[i, j]] * f);
    covariance = (&covariance + covariance.transpose()) * 0.5;

    let degenerate = degenerate_assets(returns.assets(), &covariance);
    if !degenerate.is_empty() {
      return Err(PortfolioError::DegenerateAsset { assets: degenerate });
    }

    Ok(Self {
      assets: returns.assets().to_vec(),
      mean,
      covariance,
      annualization: f,
      observations,
    })
  }

  /// Build a model from already annualized moments.
  pub fn from_moments(
    assets: Vec<String>,
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
  ) -> Result<Self> {
    let n = assets.len();
    if n == 0 {
      return Err(PortfolioError::invalid("risk model has no assets"));
    }
    if mean.len() != n || covariance.nrows() != n || covariance.ncols() != n {
      return Err(PortfolioError::invalid(format!(
        "moments do not match {n} assets (mean {}, covariance {}x{})",
        mean.len(),
        covariance.nrows(),
        covariance.ncols()
      )));
    }
    if mean.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
      return Err(PortfolioError::invalid("moments contain non-finite values"));
    }
    let scale = covariance.amax().max(1.0);
    if (&covariance - covariance.transpose()).amax() > 1e-10 * scale {
      return Err(PortfolioError::invalid("covariance matrix is not symmetric"));
    }

    let degenerate = degenerate_assets(&assets, &covariance);
    if !degenerate.is_empty() {
      return Err(PortfolioError::DegenerateAsset { assets: degenerate });
    }

    Ok(Self {
      assets,
      mean,
      covariance,
      annualization: 1.0,
      observations: 0,
    })
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn n_assets(&self) -> usize {
    self.assets.len()
  }

  /// Annualized expected returns.
  pub fn mean(&self) -> &DVector<f64> {
    &self.mean
  }

  /// Annualized covariance matrix.
  pub fn covariance(&self) -> &DMatrix<f64> {
    &self.covariance
  }

  pub fn annualization(&self) -> f64 {
    self.annualization
  }

  /// Number of observations the moments were estimated from (0 when supplied).
  pub fn observations(&self) -> usize {
    self.observations
  }

  /// Annualized per-asset volatilities.
  pub fn volatilities(&self) -> DVector<f64> {
    self.covariance.diagonal().map(|v| v.max(0.0).sqrt())
  }

  /// Correlation matrix implied by the covariance.
  pub fn correlation(&self) -> DMatrix<f64> {
    let sd = self.volatilities();
    let n = self.n_assets();
    DMatrix::from_fn(n, n, |i, j| {
      if i == j {
        1.0
      } else {
        (self.covariance[(i, j)] / (sd[i] * sd[j])).clamp(-1.0, 1.0)
      }
    })
  }

  /// `w' mu`
  pub fn portfolio_return(&self, w: &DVector<f64>) -> f64 {
    w.dot(&self.mean)
  }

  /// `w' Sigma w`
  pub fn portfolio_variance(&self, w: &DVector<f64>) -> f64 {
    w.dot(&(&self.covariance * w))
  }

  pub fn portfolio_volatility(&self, w: &DVector<f64>) -> f64 {
    self.portfolio_variance(w).max(0.0).sqrt()
  }

  /// Fractional risk contributions `w_i (Sigma w)_i / w' Sigma w`, summing to one.
  ///
  /// Returns zeros when the portfolio variance vanishes.
  pub fn risk_contributions(&self, w: &DVector<f64>) -> DVector<f64> {
    let sigma_w = &self.covariance * w;
    let var = w.dot(&sigma_w);
    if var <= f64::MIN_POSITIVE {
      return DVector::zeros(w.len());
    }
    w.component_mul(&sigma_w) / var
  }
}

fn degenerate_assets(assets: &[String], covariance: &DMatrix<f64>) -> Vec<String> {
  assets
    .iter()
    .zip(covariance.diagonal().iter())
    .filter(|(_, &var)| var <= DEGENERATE_VARIANCE)
    .map(|(a, _)| a.clone())
    .collect()
}
