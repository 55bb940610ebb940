//! # Black-Litterman
//!
//! $$
//! \pi=\delta\Sigma\mathbf w_{mkt},\qquad
//! \mu_{BL}=\pi+\tau\Sigma P^\top\left(P\tau\Sigma P^\top+\Omega\right)^{-1}(Q-P\pi)
//! $$
//!
//! Market-implied equilibrium returns blended with investor views.

use impl_new_derive::ImplNew;
use nalgebra::DMatrix;
use nalgebra::DVector;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::risk_model::RiskModel;

/// A view on a linear combination of asset returns.
///
/// `assets[k]` carries pick weight `weights[k]`; the combination is expected
/// to return `target` (annualized). `confidence` in `[0, 1]` scales the view
/// uncertainty: 1 pins the combination to `target`, 0 ignores the view.
#[derive(ImplNew, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct View {
  pub assets: Vec<String>,
  pub weights: Vec<f64>,
  pub target: f64,
  pub confidence: f64,
}

impl View {
  /// "`asset` will return `target`".
  pub fn absolute(asset: impl Into<String>, target: f64, confidence: f64) -> Self {
    Self::new(vec![asset.into()], vec![1.0], target, confidence)
  }

  /// "`long` will outperform `short` by `spread`".
  pub fn relative(
    long: impl Into<String>,
    short: impl Into<String>,
    spread: f64,
    confidence: f64,
  ) -> Self {
    Self::new(
      vec![long.into(), short.into()],
      vec![1.0, -1.0],
      spread,
      confidence,
    )
  }
}

/// Which problem is solved against the posterior mean.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlackLittermanObjective {
  /// Maximize `w' mu_BL - delta/2 w' Sigma w`; reproduces the market weights without views.
  #[default]
  Utility,
  /// Maximize the Sharpe ratio under `mu_BL`.
  MaxSharpe,
  /// Minimize variance subject to `w' mu_BL >= target`.
  MeanVariance,
}

/// Black-Litterman settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlackLittermanConfig {
  pub views: Vec<View>,
  /// Prior uncertainty scale.
  pub tau: f64,
  /// Overrides the risk-profile risk aversion when set.
  pub risk_aversion: Option<f64>,
  /// Market-cap weights for the prior; equal weights when absent.
  pub market_weights: Option<Vec<f64>>,
  pub objective: BlackLittermanObjective,
}

impl Default for BlackLittermanConfig {
  fn default() -> Self {
    Self {
      views: Vec::new(),
      tau: 0.05,
      risk_aversion: None,
      market_weights: None,
      objective: BlackLittermanObjective::Utility,
    }
  }
}

/// Prior and posterior return estimates.
#[derive(Clone, Debug)]
pub struct Posterior {
  pub market_weights: DVector<f64>,
  pub risk_aversion: f64,
  /// Equilibrium returns `pi`.
  pub prior: DVector<f64>,
  /// Posterior expected returns `mu_BL`.
  pub mean: DVector<f64>,
  /// Covariance of returns under the posterior.
  pub covariance: DMatrix<f64>,
  /// Number of views that entered the blend.
  pub views_used: usize,
}

/// Equilibrium returns `delta * Sigma * w_mkt`.
pub fn implied_returns(
  model: &RiskModel,
  market_weights: &DVector<f64>,
  risk_aversion: f64,
) -> DVector<f64> {
  model.covariance() * market_weights * risk_aversion
}

/// Blend the equilibrium prior with `views`.
pub fn posterior(
  model: &RiskModel,
  views: &[View],
  market_weights: Option<&[f64]>,
  tau: f64,
  risk_aversion: f64,
) -> Result<Posterior> {
  let n = model.n_assets();
  if !(tau > 0.0 && tau.is_finite()) {
    return Err(PortfolioError::invalid(format!("tau must be positive, got {tau}")));
  }
  if !(risk_aversion > 0.0 && risk_aversion.is_finite()) {
    return Err(PortfolioError::invalid(format!(
      "risk aversion must be positive, got {risk_aversion}"
    )));
  }

  let w_mkt = match market_weights {
    Some(w) => {
      if w.len() != n {
        return Err(PortfolioError::invalid(format!(
          "{} market weights for {n} assets",
          w.len()
        )));
      }
      if w.iter().any(|x| !(*x >= 0.0 && x.is_finite())) {
        return Err(PortfolioError::invalid("market weights must be non-negative"));
      }
      let total: f64 = w.iter().sum();
      if (total - 1.0).abs() > 1e-6 {
        return Err(PortfolioError::invalid(format!(
          "market weights must sum to 1, got {total}"
        )));
      }
      DVector::from_column_slice(w)
    }
    None => DVector::from_element(n, 1.0 / n as f64),
  };

  let sigma = model.covariance();
  let prior = implied_returns(model, &w_mkt, risk_aversion);
  let tau_sigma = sigma * tau;

  let active = views
    .iter()
    .map(|v| validate_view(model, v).map(|_| v))
    .collect::<Result<Vec<_>>>()?
    .into_iter()
    .filter(|v| v.confidence > 0.0)
    .collect::<Vec<_>>();

  if active.is_empty() {
    return Ok(Posterior {
      market_weights: w_mkt,
      risk_aversion,
      mean: prior.clone(),
      prior,
      covariance: sigma + &tau_sigma,
      views_used: 0,
    });
  }

  let k = active.len();
  let mut p = DMatrix::<f64>::zeros(k, n);
  let mut q = DVector::<f64>::zeros(k);
  for (row, view) in active.iter().enumerate() {
    for (asset, weight) in view.assets.iter().zip(&view.weights) {
      // validated above
      if let Some(col) = model.assets().iter().position(|a| a == asset) {
        p[(row, col)] += weight;
      }
    }
    q[row] = view.target;
  }

  let view_cov = &p * &tau_sigma * p.transpose();
  let mut a = view_cov.clone();
  for (row, view) in active.iter().enumerate() {
    let c = view.confidence.min(1.0);
    a[(row, row)] += view_cov[(row, row)] * (1.0 - c) / c;
  }

  let lu = a.lu();
  let gap = &q - &p * &prior;
  let adj = lu
    .solve(&gap)
    .ok_or_else(|| PortfolioError::Numerical("view covariance is singular".to_string()))?;
  let tau_sigma_pt = &tau_sigma * p.transpose();
  let mean = &prior + &tau_sigma_pt * adj;

  let shrink = lu
    .solve(&(&p * &tau_sigma))
    .ok_or_else(|| PortfolioError::Numerical("view covariance is singular".to_string()))?;
  let covariance = sigma + &tau_sigma - &tau_sigma_pt * shrink;

  Ok(Posterior {
    market_weights: w_mkt,
    risk_aversion,
    prior,
    mean,
    covariance,
    views_used: k,
  })
}

fn validate_view(model: &RiskModel, view: &View) -> Result<()> {
  if view.assets.is_empty() || view.assets.len() != view.weights.len() {
    return Err(PortfolioError::invalid(format!(
      "view needs one pick weight per asset, got {} assets and {} weights",
      view.assets.len(),
      view.weights.len()
    )));
  }
  if let Some(asset) = view
    .assets
    .iter()
    .find(|a| !model.assets().iter().any(|m| m == *a))
  {
    return Err(PortfolioError::invalid(format!("view references unknown asset '{asset}'")));
  }
  if !(0.0..=1.0).contains(&view.confidence) {
    return Err(PortfolioError::invalid(format!(
      "view confidence must lie in [0, 1], got {}",
      view.confidence
    )));
  }
  if !view.target.is_finite() || view.weights.iter().any(|w| !w.is_finite()) {
    return Err(PortfolioError::invalid("view contains non-finite values"));
  }
  Ok(())
}
