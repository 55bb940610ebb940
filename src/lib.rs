//! # portfolio-rs
//!
//! $$
//! \mathbf w^\*=\arg\min_{\mathbf w\in\mathcal C} f(\mathbf w;\mu,\Sigma)
//! $$
//!
//! Constrained long-only portfolio construction over a table of asset
//! returns: risk model estimation, objectives, constraint sets, solvers,
//! strategies and performance metrics.

pub mod black_litterman;
pub mod constraints;
pub mod data;
pub mod error;
pub mod metrics;
pub mod objectives;
pub mod risk_model;
pub mod solver;
pub mod strategy;
pub mod types;

pub use black_litterman::BlackLittermanConfig;
pub use black_litterman::BlackLittermanObjective;
pub use black_litterman::View;
pub use constraints::ConstraintBuilder;
pub use constraints::ConstraintSet;
pub use data::ReturnsSeries;
pub use error::PortfolioError;
pub use error::Result;
pub use metrics::BacktestConfig;
pub use metrics::BacktestReport;
pub use metrics::Comparison;
pub use metrics::PerformanceSummary;
pub use metrics::PortfolioMetrics;
pub use metrics::RebalanceFrequency;
pub use metrics::RebalanceSchedule;
pub use metrics::backtest;
pub use metrics::benchmark_reports;
pub use metrics::compare;
pub use metrics::portfolio_metrics;
pub use objectives::Objective;
pub use risk_model::RiskModel;
pub use risk_model::RiskModelConfig;
pub use solver::Minimizer;
pub use solver::SolverConfig;
pub use solver::SolverKind;
pub use strategy::FrontierPoint;
pub use strategy::OptimizerConfig;
pub use strategy::PortfolioEngine;
pub use strategy::RiskProfile;
pub use strategy::Strategy;
pub use strategy::optimize;
pub use types::OptimizationResult;
pub use types::PortfolioWeights;
pub use types::SolverStatus;
