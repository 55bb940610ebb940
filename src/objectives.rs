//! # Objectives
//!
//! $$
//! f_{\mathrm{MV}}(\mathbf w)=\mathbf w^\top\Sigma\mathbf w,\qquad
//! f_{\mathrm{SR}}(\mathbf w)=-\frac{\mathbf w^\top\mu-r_f}{\sqrt{\mathbf w^\top\Sigma\mathbf w}},\qquad
//! f_{\mathrm{RP}}(\mathbf w)=\sum_i\Big(\frac{w_i(\Sigma\mathbf w)_i}{\mathbf w^\top\Sigma\mathbf w}-b_i\Big)^2
//! $$
//!
//! Scalar objectives to minimize over portfolio weights, with analytic gradients.

use nalgebra::DMatrix;
use nalgebra::DVector;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::risk_model::RiskModel;

/// Value returned for candidates where an objective is undefined.
pub const INFEASIBLE_PENALTY: f64 = 1e10;

/// Volatility under which a Sharpe ratio is treated as undefined.
pub const MIN_VOLATILITY: f64 = 1e-10;

/// Convex quadratic `0.5 w'Qw + c'w`.
#[derive(Clone, Debug)]
pub struct Quadratic {
  pub q: DMatrix<f64>,
  pub c: DVector<f64>,
}

/// A function of the weights to be minimized.
pub trait Objective {
  fn value(&self, w: &DVector<f64>) -> f64;

  fn gradient(&self, w: &DVector<f64>) -> DVector<f64>;

  fn name(&self) -> &'static str;

  /// Whether every local minimum over a convex set is global.
  fn is_convex(&self) -> bool {
    false
  }

  /// Quadratic form of the objective, when it has one.
  fn quadratic(&self) -> Option<Quadratic> {
    None
  }
}

/// Portfolio variance `w' Sigma w`.
#[derive(Clone, Debug)]
pub struct MinVariance {
  covariance: DMatrix<f64>,
}

impl MinVariance {
  pub fn new(model: &RiskModel) -> Self {
    Self {
      covariance: model.covariance().clone(),
    }
  }
}

impl Objective for MinVariance {
  fn value(&self, w: &DVector<f64>) -> f64 {
    w.dot(&(&self.covariance * w))
  }

  fn gradient(&self, w: &DVector<f64>) -> DVector<f64> {
    (&self.covariance * w) * 2.0
  }

  fn name(&self) -> &'static str {
    "minimum variance"
  }

  fn is_convex(&self) -> bool {
    true
  }

  fn quadratic(&self) -> Option<Quadratic> {
    let n = self.covariance.nrows();
    Some(Quadratic {
      q: &self.covariance * 2.0,
      c: DVector::zeros(n),
    })
  }
}

/// Negative Sharpe ratio.
#[derive(Clone, Debug)]
pub struct NegativeSharpe {
  mean: DVector<f64>,
  covariance: DMatrix<f64>,
  risk_free: f64,
}

impl NegativeSharpe {
  pub fn new(model: &RiskModel, risk_free: f64) -> Self {
    Self::with_mean(model, model.mean().clone(), risk_free)
  }

  /// Sharpe ratio against an alternative expected-return vector.
  pub fn with_mean(model: &RiskModel, mean: DVector<f64>, risk_free: f64) -> Self {
    Self {
      mean,
      covariance: model.covariance().clone(),
      risk_free,
    }
  }
}

impl Objective for NegativeSharpe {
  fn value(&self, w: &DVector<f64>) -> f64 {
    let vol = w.dot(&(&self.covariance * w)).max(0.0).sqrt();
    if vol < MIN_VOLATILITY {
      return INFEASIBLE_PENALTY;
    }
    -(w.dot(&self.mean) - self.risk_free) / vol
  }

  fn gradient(&self, w: &DVector<f64>) -> DVector<f64> {
    let sigma_w = &self.covariance * w;
    let var = w.dot(&sigma_w).max(0.0);
    let vol = var.sqrt();
    if vol < MIN_VOLATILITY {
      return DVector::zeros(w.len());
    }
    let excess = w.dot(&self.mean) - self.risk_free;
    -(&self.mean / vol - sigma_w * (excess / (var * vol)))
  }

  fn name(&self) -> &'static str {
    "maximum sharpe"
  }
}

/// Mean-variance utility `-(w' mu - 0.5 * delta * w' Sigma w)`.
#[derive(Clone, Debug)]
pub struct QuadraticUtility {
  mean: DVector<f64>,
  covariance: DMatrix<f64>,
  risk_aversion: f64,
}

impl QuadraticUtility {
  pub fn new(model: &RiskModel, risk_aversion: f64) -> Result<Self> {
    Self::with_mean(model, model.mean().clone(), risk_aversion)
  }

  pub fn with_mean(model: &RiskModel, mean: DVector<f64>, risk_aversion: f64) -> Result<Self> {
    if !(risk_aversion > 0.0 && risk_aversion.is_finite()) {
      return Err(PortfolioError::invalid(format!(
        "risk aversion must be positive, got {risk_aversion}"
      )));
    }
    Ok(Self {
      mean,
      covariance: model.covariance().clone(),
      risk_aversion,
    })
  }
}

impl Objective for QuadraticUtility {
  fn value(&self, w: &DVector<f64>) -> f64 {
    0.5 * self.risk_aversion * w.dot(&(&self.covariance * w)) - w.dot(&self.mean)
  }

  fn gradient(&self, w: &DVector<f64>) -> DVector<f64> {
    (&self.covariance * w) * self.risk_aversion - &self.mean
  }

  fn name(&self) -> &'static str {
    "quadratic utility"
  }

  fn is_convex(&self) -> bool {
    true
  }

  fn quadratic(&self) -> Option<Quadratic> {
    Some(Quadratic {
      q: &self.covariance * self.risk_aversion,
      c: -self.mean.clone(),
    })
  }
}

/// Squared distance of risk contributions from their budgets.
#[derive(Clone, Debug)]
pub struct RiskParity {
  covariance: DMatrix<f64>,
  budgets: DVector<f64>,
}

impl RiskParity {
  /// Equal risk contribution, `b_i = 1/N`.
  pub fn new(model: &RiskModel) -> Self {
    let n = model.n_assets();
    Self {
      covariance: model.covariance().clone(),
      budgets: DVector::from_element(n, 1.0 / n as f64),
    }
  }

  /// Custom risk budgets; must be positive and sum to one.
  pub fn with_budgets(model: &RiskModel, budgets: &[f64]) -> Result<Self> {
    validate_budgets(budgets, model.n_assets())?;
    Ok(Self {
      covariance: model.covariance().clone(),
      budgets: DVector::from_column_slice(budgets),
    })
  }

  pub fn budgets(&self) -> &DVector<f64> {
    &self.budgets
  }
}

impl Objective for RiskParity {
  fn value(&self, w: &DVector<f64>) -> f64 {
    let sigma_w = &self.covariance * w;
    let var = w.dot(&sigma_w);
    if var < 1e-30 {
      return INFEASIBLE_PENALTY;
    }
    let rc = w.component_mul(&sigma_w) / var;
    (rc - &self.budgets).norm_squared()
  }

  fn gradient(&self, w: &DVector<f64>) -> DVector<f64> {
    let sigma_w = &self.covariance * w;
    let var = w.dot(&sigma_w);
    if var < 1e-30 {
      return DVector::zeros(w.len());
    }
    let rc = w.component_mul(&sigma_w) / var;
    let d = &rc - &self.budgets;
    let dr = d.dot(&rc);
    // d/dw_k sum_i d_i^2 = 2/V [d_k s_k + (Sigma (d o w))_k - 2 s_k (d . rc)]
    let term =
      d.component_mul(&sigma_w) + &self.covariance * d.component_mul(w) - &sigma_w * (2.0 * dr);
    term * (2.0 / var)
  }

  fn name(&self) -> &'static str {
    "risk parity"
  }
}

fn validate_budgets(budgets: &[f64], n: usize) -> Result<()> {
  if budgets.len() != n {
    return Err(PortfolioError::invalid(format!(
      "{} risk budgets for {n} assets",
      budgets.len()
    )));
  }
  if budgets.iter().any(|b| !(*b > 0.0 && b.is_finite())) {
    return Err(PortfolioError::invalid("risk budgets must be positive"));
  }
  let total: f64 = budgets.iter().sum();
  if (total - 1.0).abs() > 1e-6 {
    return Err(PortfolioError::invalid(format!(
      "risk budgets must sum to 1, got {total}"
    )));
  }
  Ok(())
}
