//! # Optimizer Config
//!
//! $$
//! \theta=(s,\ \text{profile},\ r^\*,\ u,\ l,\ \sigma_{\max},\ r_f)
//! $$
//!
//! Run configuration; unset overrides fall back to the risk profile.

use serde::Deserialize;
use serde::Serialize;

use super::RiskProfile;
use super::Strategy;
use crate::black_litterman::BlackLittermanConfig;
use crate::risk_model::RiskModelConfig;
use crate::solver::SolverConfig;

/// Runtime configuration for [`super::PortfolioEngine`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
  pub strategy: Strategy,
  pub risk_profile: RiskProfile,
  /// Overrides the profile target return.
  pub target_return: Option<f64>,
  /// Overrides the profile weight cap.
  pub max_weight: Option<f64>,
  pub min_weight: f64,
  /// Overrides the profile volatility cap.
  pub max_volatility: Option<f64>,
  /// Hold variance-driven strategies to the volatility cap. When unset the
  /// cap is only reported.
  pub enforce_max_volatility: bool,
  /// Annualized risk-free rate.
  pub risk_free_rate: f64,
  pub risk_model: RiskModelConfig,
  pub solver: SolverConfig,
  pub black_litterman: BlackLittermanConfig,
  /// Budgets for [`Strategy::RiskBudget`], one per asset, summing to one.
  pub risk_budgets: Option<Vec<f64>>,
  /// Trailing observations scored by [`Strategy::Momentum`].
  pub momentum_lookback: usize,
}

impl Default for OptimizerConfig {
  fn default() -> Self {
    Self {
      strategy: Strategy::MaxSharpe,
      risk_profile: RiskProfile::Moderate,
      target_return: None,
      max_weight: None,
      min_weight: 0.0,
      max_volatility: None,
      enforce_max_volatility: true,
      risk_free_rate: 0.0,
      risk_model: RiskModelConfig::default(),
      solver: SolverConfig::default(),
      black_litterman: BlackLittermanConfig::default(),
      risk_budgets: None,
      momentum_lookback: 60,
    }
  }
}

impl OptimizerConfig {
  /// Default configuration for `strategy`.
  pub fn for_strategy(strategy: Strategy) -> Self {
    Self {
      strategy,
      ..Self::default()
    }
  }

  pub fn target_return(&self) -> f64 {
    self
      .target_return
      .unwrap_or_else(|| self.risk_profile.target_return())
  }

  pub fn max_weight(&self) -> f64 {
    self
      .max_weight
      .unwrap_or_else(|| self.risk_profile.max_weight())
  }

  pub fn max_volatility(&self) -> f64 {
    self
      .max_volatility
      .unwrap_or_else(|| self.risk_profile.max_volatility())
  }

  /// Black-Litterman risk aversion, else the profile's.
  pub fn risk_aversion(&self) -> f64 {
    self
      .black_litterman
      .risk_aversion
      .unwrap_or_else(|| self.risk_profile.risk_aversion())
  }
}
