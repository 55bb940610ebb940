//! # Strategy
//!
//! $$
//! \mathbf w^\* = \operatorname{Optimize}_{s}(\mu,\Sigma,\mathcal C)
//! $$
//!
//! Allocation strategies, risk profiles and the engine that runs them.

use std::fmt::Display;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::PortfolioError;

pub mod config;
pub mod engine;
pub mod heuristics;

pub use config::OptimizerConfig;
pub use engine::FrontierPoint;
pub use engine::PortfolioEngine;
pub use engine::optimize;

/// Allocation strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
  /// Tangency portfolio, maximum `(w' mu - r_f) / sigma_p`.
  #[default]
  MaxSharpe,
  /// Global minimum variance.
  MinVariance,
  /// Equal risk contribution.
  RiskParity,
  /// Minimum variance subject to a target return.
  MeanVariance,
  /// Equilibrium returns blended with views.
  BlackLitterman,
  /// `1/N`.
  EqualWeight,
  /// `w_i ∝ 1/sigma_i`.
  InverseVolatility,
  /// `w_i ∝ max(recent annualized mean, 0.01)`.
  Momentum,
  /// Risk contributions matching caller budgets.
  RiskBudget,
}

impl Strategy {
  pub const ALL: [Strategy; 9] = [
    Self::MaxSharpe,
    Self::MinVariance,
    Self::RiskParity,
    Self::MeanVariance,
    Self::BlackLitterman,
    Self::EqualWeight,
    Self::InverseVolatility,
    Self::Momentum,
    Self::RiskBudget,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::MaxSharpe => "max_sharpe",
      Self::MinVariance => "min_variance",
      Self::RiskParity => "risk_parity",
      Self::MeanVariance => "mean_variance",
      Self::BlackLitterman => "black_litterman",
      Self::EqualWeight => "equal_weight",
      Self::InverseVolatility => "inverse_volatility",
      Self::Momentum => "momentum",
      Self::RiskBudget => "risk_budget",
    }
  }

  /// Canonical names, as accepted by [`FromStr`].
  pub fn names() -> Vec<&'static str> {
    Self::ALL.iter().map(|s| s.as_str()).collect()
  }

  /// Whether the strategy runs an iterative solver.
  pub fn is_optimized(self) -> bool {
    !matches!(self, Self::EqualWeight | Self::InverseVolatility | Self::Momentum)
  }
}

impl Display for Strategy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Strategy {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let key = s.trim().to_lowercase().replace(['-', ' '], "_");
    let strategy = match key.as_str() {
      "max_sharpe" | "maxsharpe" | "sharpe" | "tangency" => Self::MaxSharpe,
      "min_variance" | "minvariance" | "minimum_variance" | "min_vol" | "gmv" => Self::MinVariance,
      "risk_parity" | "riskparity" | "erc" => Self::RiskParity,
      "mean_variance" | "meanvariance" | "markowitz" | "target_return" => Self::MeanVariance,
      "black_litterman" | "blacklitterman" | "bl" => Self::BlackLitterman,
      "equal_weight" | "equal" | "1/n" | "naive" => Self::EqualWeight,
      "inverse_volatility" | "inverse_vol" | "inv_vol" => Self::InverseVolatility,
      "momentum" => Self::Momentum,
      "risk_budget" | "risk_budgeting" | "budget" => Self::RiskBudget,
      _ => {
        return Err(PortfolioError::UnknownMethod {
          name: s.to_string(),
        });
      }
    };
    Ok(strategy)
  }
}

/// Investor risk profile presets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
  Conservative,
  #[default]
  Moderate,
  Aggressive,
}

impl RiskProfile {
  /// Default return target for [`Strategy::MeanVariance`].
  pub fn target_return(self) -> f64 {
    match self {
      Self::Conservative => 0.08,
      Self::Moderate => 0.15,
      Self::Aggressive => 0.25,
    }
  }

  pub fn max_volatility(self) -> f64 {
    match self {
      Self::Conservative => 0.15,
      Self::Moderate => 0.25,
      Self::Aggressive => 0.40,
    }
  }

  pub fn max_weight(self) -> f64 {
    match self {
      Self::Conservative => 0.3,
      Self::Moderate => 0.4,
      Self::Aggressive => 0.6,
    }
  }

  /// Risk aversion `delta` for utility and Black-Litterman solves.
  pub fn risk_aversion(self) -> f64 {
    match self {
      Self::Conservative => 5.0,
      Self::Moderate => 3.0,
      Self::Aggressive => 1.0,
    }
  }
}

impl FromStr for RiskProfile {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "conservative" => Ok(Self::Conservative),
      "moderate" => Ok(Self::Moderate),
      "aggressive" => Ok(Self::Aggressive),
      other => Err(PortfolioError::invalid(format!("unknown risk profile '{other}'"))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn names_round_trip_through_from_str() {
    for s in Strategy::ALL {
      assert_eq!(s.as_str().parse::<Strategy>().unwrap(), s);
    }
    assert_eq!("Max-Sharpe".parse::<Strategy>().unwrap(), Strategy::MaxSharpe);
    assert_eq!("ERC".parse::<Strategy>().unwrap(), Strategy::RiskParity);
    assert_eq!("bl".parse::<Strategy>().unwrap(), Strategy::BlackLitterman);
  }

  #[test]
  fn unknown_method_is_rejected() {
    let err = "kelly".parse::<Strategy>().unwrap_err();
    assert_eq!(
      err,
      PortfolioError::UnknownMethod {
        name: "kelly".to_string()
      }
    );
    assert!(err.to_string().contains("risk_parity"));
  }

  #[test]
  fn profiles_follow_the_presets() {
    assert_eq!(RiskProfile::default(), RiskProfile::Moderate);
    assert_eq!(RiskProfile::Conservative.max_weight(), 0.3);
    assert_eq!(RiskProfile::Aggressive.risk_aversion(), 1.0);
    assert_eq!("AGGRESSIVE".parse::<RiskProfile>().unwrap(), RiskProfile::Aggressive);
    assert!("reckless".parse::<RiskProfile>().is_err());
  }
}
