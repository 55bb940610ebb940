//! # Portfolio Engine
//!
//! $$
//! \text{returns}\ \to\ (\mu,\Sigma)\ \to\ (f,\mathcal C)\ \to\ \mathbf w^\*\ \to\ \text{metrics}
//! $$
//!
//! Orchestrates risk model, constraints, objective and solver for a strategy.

use nalgebra::DVector;
use serde::Serialize;
use tracing::debug;
use tracing::instrument;
use tracing::warn;

use super::OptimizerConfig;
use super::Strategy;
use super::heuristics;
use crate::black_litterman;
use crate::black_litterman::BlackLittermanObjective;
use crate::constraints::ConstraintBuilder;
use crate::constraints::ConstraintSet;
use crate::data::ReturnsSeries;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::metrics::portfolio_metrics_with_mean;
use crate::objectives::MinVariance;
use crate::objectives::NegativeSharpe;
use crate::objectives::Objective;
use crate::objectives::QuadraticUtility;
use crate::objectives::RiskParity;
use crate::risk_model::RiskModel;
use crate::solver::Minimization;
use crate::solver::Minimizer;
use crate::solver::SolverKind;
use crate::solver::equal_weights;
use crate::types::OptimizationResult;
use crate::types::PortfolioWeights;
use crate::types::SolverStatus;

/// Sweep cap for the risk-budgeting coordinate descent.
const RISK_BUDGET_SWEEPS: u64 = 10_000;
const RISK_BUDGET_TOL: f64 = 1e-12;
/// Slack on the volatility cap.
const VOLATILITY_TOL: f64 = 1e-9;
/// Return-target halvings when walking down the frontier to the cap.
const FRONTIER_BISECTIONS: usize = 60;

/// One point of the efficient frontier.
#[derive(Clone, Debug, Serialize)]
pub struct FrontierPoint {
  pub target_return: f64,
  pub expected_return: f64,
  pub volatility: f64,
  pub sharpe_ratio: Option<f64>,
  pub weights: PortfolioWeights,
}

/// Single entry point for running allocation strategies.
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngine {
  config: OptimizerConfig,
}

impl PortfolioEngine {
  pub fn new(config: OptimizerConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &OptimizerConfig {
    &self.config
  }

  /// Estimate the risk model for `returns` under this configuration.
  pub fn risk_model(&self, returns: &ReturnsSeries) -> Result<RiskModel> {
    RiskModel::estimate(returns, &self.config.risk_model)
  }

  /// Run the configured strategy on a returns table.
  #[instrument(skip_all, fields(strategy = %self.config.strategy, assets = returns.n_assets()))]
  pub fn optimize(&self, returns: &ReturnsSeries) -> Result<OptimizationResult> {
    let model = self.risk_model(returns)?;
    self.run(&model, Some(returns))
  }

  /// Run the configured strategy on precomputed moments.
  ///
  /// [`Strategy::Momentum`] needs the return history and is rejected here.
  pub fn optimize_model(&self, model: &RiskModel) -> Result<OptimizationResult> {
    self.run(model, None)
  }

  /// Feasible region implied by the configuration.
  pub fn constraints(&self, n: usize) -> Result<ConstraintSet> {
    ConstraintBuilder::new(n)
      .min_weight(self.config.min_weight)
      .max_weight(self.config.max_weight())
      .build()
  }

  fn run(&self, model: &RiskModel, returns: Option<&ReturnsSeries>) -> Result<OptimizationResult> {
    let cfg = &self.config;
    let n = model.n_assets();
    let set = self.constraints(n)?;
    let x0 = equal_weights(n);
    let strategy = cfg.strategy;
    debug!(%strategy, n, max_weight = cfg.max_weight(), "building allocation");

    let (solution, mean) = match strategy {
      Strategy::MinVariance => {
        let solution = self.solve(&MinVariance::new(model), &set, &x0)?;
        (self.require_volatility(model, solution)?, None)
      }
      Strategy::MaxSharpe => {
        let objective = NegativeSharpe::new(model, cfg.risk_free_rate);
        let solution = self.solve(&objective, &set, &x0)?;
        (self.cap_volatility(model, &set, model.mean(), &objective, solution)?, None)
      }
      Strategy::MeanVariance => {
        let set = set.with_min_return(model.mean().clone(), cfg.target_return())?;
        let solution = self.solve(&MinVariance::new(model), &set, &x0)?;
        (self.require_volatility(model, solution)?, None)
      }
      Strategy::RiskParity => {
        let budgets = DVector::from_element(n, 1.0 / n as f64);
        (self.risk_budget(model, &set, RiskParity::new(model), &budgets)?, None)
      }
      Strategy::RiskBudget => {
        let budgets = cfg
          .risk_budgets
          .as_deref()
          .ok_or_else(|| PortfolioError::invalid("risk budget strategy needs risk_budgets"))?;
        let objective = RiskParity::with_budgets(model, budgets)?;
        let budgets = DVector::from_column_slice(budgets);
        (self.risk_budget(model, &set, objective, &budgets)?, None)
      }
      Strategy::BlackLitterman => {
        let (solution, mean) = self.black_litterman(model, &set, &x0)?;
        (solution, Some(mean))
      }
      Strategy::EqualWeight => {
        let w = heuristics::equal_weight(n);
        (analytic(&MinVariance::new(model), w), None)
      }
      Strategy::InverseVolatility => {
        let w = set.cap_and_redistribute(&heuristics::inverse_volatility(model));
        (analytic(&MinVariance::new(model), w), None)
      }
      Strategy::Momentum => {
        let returns = returns.ok_or_else(|| {
          PortfolioError::invalid("momentum needs the return history, not just moments")
        })?;
        let scores =
          heuristics::momentum_scores(returns, cfg.momentum_lookback, model.annualization())?;
        let w = set.cap_and_redistribute(&heuristics::score_weights(&scores));
        (analytic(&MinVariance::new(model), w), None)
      }
    };

    Ok(self.finish(model, mean.as_ref(), solution))
  }

  fn solve(
    &self,
    objective: &dyn Objective,
    set: &ConstraintSet,
    x0: &DVector<f64>,
  ) -> Result<Minimization> {
    let minimizer = self.config.solver.minimizer(objective);
    debug!(solver = minimizer.name(), objective = objective.name(), "solving");
    minimizer.minimize(objective, set, x0)
  }

  /// Coordinate descent first under [`SolverKind::Auto`]; the configured
  /// backend refines from its projection when the unconstrained solution
  /// breaks a bound or another backend was requested.
  fn risk_budget(
    &self,
    model: &RiskModel,
    set: &ConstraintSet,
    objective: RiskParity,
    budgets: &DVector<f64>,
  ) -> Result<Minimization> {
    let cov = model.covariance();
    let sol = heuristics::risk_budget_weights(cov, budgets, RISK_BUDGET_SWEEPS, RISK_BUDGET_TOL);
    let auto = self.config.solver.kind == SolverKind::Auto;
    if auto && sol.converged && set.is_feasible(&sol.weights, 1e-10) {
      debug!(sweeps = sol.sweeps, "risk budget solved by coordinate descent");
      let value = objective.value(&sol.weights);
      return Ok(Minimization::new(sol.weights, value, sol.sweeps, SolverStatus::Analytic));
    }

    debug!(sweeps = sol.sweeps, auto, "refining risk budget under constraints");
    let x0 = set.project(&sol.weights);
    self.solve(&objective, set, &x0)
  }

  /// Reject a minimum-variance solve whose volatility is above the cap:
  /// nothing in the region is quieter.
  fn require_volatility(&self, model: &RiskModel, solution: Minimization) -> Result<Minimization> {
    let cap = self.config.max_volatility();
    let vol = model.portfolio_volatility(&solution.weights);
    if self.config.enforce_max_volatility && solution.converged && vol > cap + VOLATILITY_TOL {
      return Err(PortfolioError::infeasible(format!(
        "lowest attainable volatility {vol:.4} exceeds the cap {cap:.4}"
      )));
    }
    Ok(solution)
  }

  /// Walk the frontier under `mean` down to the volatility cap when
  /// `solution` breaks it.
  ///
  /// Along the frontier above the minimum-variance portfolio both the Sharpe
  /// ratio and the quadratic utility rise towards their unconstrained optimum,
  /// so the best capped portfolio is the frontier point at the cap. Found by
  /// bisection on the return target.
  fn cap_volatility(
    &self,
    model: &RiskModel,
    set: &ConstraintSet,
    mean: &DVector<f64>,
    objective: &dyn Objective,
    solution: Minimization,
  ) -> Result<Minimization> {
    let cap = self.config.max_volatility();
    if !self.config.enforce_max_volatility
      || model.portfolio_volatility(&solution.weights) <= cap + VOLATILITY_TOL
    {
      return Ok(solution);
    }

    let variance = MinVariance::new(model);
    let gmv = self.require_volatility(
      model,
      self.solve(&variance, set, &equal_weights(model.n_assets()))?,
    )?;
    let mut iterations = solution.iterations + gmv.iterations;
    let mut lo = gmv.weights.dot(mean);
    let mut hi = solution.weights.dot(mean);
    let mut best = gmv;

    for _ in 0..FRONTIER_BISECTIONS {
      if hi - lo <= 1e-12 * (1.0 + hi.abs()) {
        break;
      }
      let target = 0.5 * (lo + hi);
      let floor = set.with_min_return(mean.clone(), target)?;
      let point = self.solve(&variance, &floor, &best.weights)?;
      iterations += point.iterations;
      if model.portfolio_volatility(&point.weights) <= cap {
        lo = target;
        best = point;
      } else {
        hi = target;
      }
    }

    debug!(cap, target = lo, iterations, "capped at the frontier");
    let value = objective.value(&best.weights);
    Ok(Minimization::new(best.weights, value, iterations, best.status))
  }

  fn black_litterman(
    &self,
    model: &RiskModel,
    set: &ConstraintSet,
    x0: &DVector<f64>,
  ) -> Result<(Minimization, DVector<f64>)> {
    let cfg = &self.config;
    let bl = &cfg.black_litterman;
    let delta = cfg.risk_aversion();
    let market = bl.market_weights.as_deref();
    let post = black_litterman::posterior(model, &bl.views, market, bl.tau, delta)?;
    debug!(views = post.views_used, delta, "black-litterman posterior");

    let solution = match bl.objective {
      BlackLittermanObjective::Utility => {
        let objective = QuadraticUtility::with_mean(model, post.mean.clone(), delta)?;
        let solution = self.solve(&objective, set, x0)?;
        self.cap_volatility(model, set, &post.mean, &objective, solution)?
      }
      BlackLittermanObjective::MaxSharpe => {
        let objective = NegativeSharpe::with_mean(model, post.mean.clone(), cfg.risk_free_rate);
        let solution = self.solve(&objective, set, x0)?;
        self.cap_volatility(model, set, &post.mean, &objective, solution)?
      }
      BlackLittermanObjective::MeanVariance => {
        let set = set.with_min_return(post.mean.clone(), cfg.target_return())?;
        let solution = self.solve(&MinVariance::new(model), &set, x0)?;
        self.require_volatility(model, solution)?
      }
    };
    Ok((solution, post.mean))
  }

  fn finish(
    &self,
    model: &RiskModel,
    mean: Option<&DVector<f64>>,
    solution: Minimization,
  ) -> OptimizationResult {
    let cfg = &self.config;
    let assets = model.assets().to_vec();

    let weights = match PortfolioWeights::from_vector(&solution.weights) {
      Ok(w) => w,
      Err(e) => {
        warn!(strategy = %cfg.strategy, error = %e, "solver produced unusable weights");
        let status = SolverStatus::NumericalFailure;
        return OptimizationResult::failed(cfg.strategy, assets, solution.iterations, status);
      }
    };

    let w = weights.to_vector();
    let mean = mean.unwrap_or(model.mean());
    let metrics = portfolio_metrics_with_mean(model, mean, &w, cfg.risk_free_rate);
    let max_volatility = cfg.max_volatility();
    let within = metrics.volatility <= max_volatility + VOLATILITY_TOL;
    if !within {
      warn!(
        strategy = %cfg.strategy,
        volatility = metrics.volatility,
        max_volatility,
        "portfolio volatility exceeds the profile cap"
      );
    }
    if !solution.converged {
      warn!(strategy = %cfg.strategy, status = ?solution.status, "optimizer did not converge");
    }

    OptimizationResult {
      strategy: cfg.strategy,
      assets,
      weights: Some(weights),
      converged: solution.converged,
      objective_value: solution.objective,
      iterations: solution.iterations,
      status: solution.status,
      expected_return: metrics.expected_return,
      volatility: metrics.volatility,
      sharpe_ratio: metrics.sharpe_ratio,
      risk_contributions: metrics.risk_contributions,
      within_volatility_cap: Some(within),
    }
  }

  /// Minimum-variance portfolios on `n_points` return targets between the
  /// global minimum-variance return and the maximum attainable return.
  #[instrument(skip_all, fields(n_points = n_points))]
  pub fn efficient_frontier(
    &self,
    returns: &ReturnsSeries,
    n_points: usize,
  ) -> Result<Vec<FrontierPoint>> {
    if n_points < 2 {
      return Err(PortfolioError::invalid("frontier needs at least two points"));
    }
    let model = self.risk_model(returns)?;
    let n = model.n_assets();
    let set = self.constraints(n)?;
    let mean = model.mean();
    let rf = self.config.risk_free_rate;

    let gmv = self.solve(&MinVariance::new(&model), &set, &equal_weights(n))?;
    let lo = model.portfolio_return(&gmv.weights);
    let hi = set.max_return(mean);

    let mut points = Vec::with_capacity(n_points);
    for k in 0..n_points {
      let target = lo + (hi - lo) * k as f64 / (n_points - 1) as f64;
      let constrained = set.with_min_return(mean.clone(), target)?;
      let sol = self.solve(&MinVariance::new(&model), &constrained, &gmv.weights)?;
      let Ok(weights) = PortfolioWeights::from_vector(&sol.weights) else {
        warn!(target, "skipping frontier point with unusable weights");
        continue;
      };
      let metrics = portfolio_metrics_with_mean(&model, mean, &sol.weights, rf);
      points.push(FrontierPoint {
        target_return: target,
        expected_return: metrics.expected_return,
        volatility: metrics.volatility,
        sharpe_ratio: metrics.sharpe_ratio,
        weights,
      });
    }
    Ok(points)
  }
}

/// Wrap a closed-form allocation as a solve.
fn analytic(objective: &dyn Objective, w: DVector<f64>) -> Minimization {
  let value = objective.value(&w);
  Minimization::new(w, value, 0, SolverStatus::Analytic)
}

/// Run `config` on `returns`.
pub fn optimize(returns: &ReturnsSeries, config: &OptimizerConfig) -> Result<OptimizationResult> {
  PortfolioEngine::new(config.clone()).optimize(returns)
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use rand::SeedableRng;
  use rand::rngs::StdRng;
  use rand_distr::Distribution;
  use rand_distr::Normal;
  use tracing_test::traced_test;

  use super::*;
  use crate::black_litterman::View;
  use crate::solver::ActiveSetQp;

  /// Daily returns with the given `(name, mean, sd)` per asset.
  fn synthetic(specs: &[(&str, f64, f64)], t: usize, seed: u64) -> ReturnsSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let columns = specs
      .iter()
      .map(|(name, mu, sd)| {
        let dist = Normal::new(*mu, *sd).unwrap();
        (*name, (0..t).map(|_| dist.sample(&mut rng)).collect::<Vec<f64>>())
      })
      .collect();
    ReturnsSeries::from_columns(columns).unwrap()
  }

  fn three_assets() -> ReturnsSeries {
    synthetic(&[("A", 0.001, 0.01), ("B", 0.0005, 0.02), ("C", 0.0, 0.005)], 2000, 7)
  }

  fn five_assets() -> ReturnsSeries {
    synthetic(
      &[
        ("BTC", 0.0012, 0.035),
        ("ETH", 0.0010, 0.045),
        ("SOL", 0.0015, 0.06),
        ("BNB", 0.0006, 0.03),
        ("ADA", 0.0004, 0.05),
      ],
      750,
      42,
    )
  }

  fn engine(strategy: Strategy) -> PortfolioEngine {
    PortfolioEngine::new(OptimizerConfig::for_strategy(strategy))
  }

  /// Largest minus smallest risk contribution.
  fn spread(rc: &[f64]) -> f64 {
    let max = rc.iter().copied().fold(f64::MIN, f64::max);
    let min = rc.iter().copied().fold(f64::MAX, f64::min);
    max - min
  }

  fn assert_valid(res: &OptimizationResult, cap: f64) {
    let w = res.weights.as_ref().unwrap();
    assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-6, "{w:?}");
    assert!(w.iter().all(|x| *x >= -1e-8 && *x <= cap + 1e-8), "{w:?}");
    assert_eq!(res.assets.len(), w.len());
  }

  #[test]
  fn every_strategy_sums_to_one_within_bounds() {
    let returns = five_assets();
    let model = engine(Strategy::MeanVariance).risk_model(&returns).unwrap();
    let set = ConstraintSet::long_only(5, 0.4).unwrap();
    let target = 0.5 * (set.min_attainable_return(model.mean()) + set.max_return(model.mean()));
    for strategy in Strategy::ALL {
      let mut cfg = OptimizerConfig::for_strategy(strategy);
      cfg.target_return = Some(target);
      cfg.enforce_max_volatility = false;
      cfg.risk_budgets = Some(vec![0.3, 0.25, 0.2, 0.15, 0.1]);
      let res = PortfolioEngine::new(cfg).optimize(&returns).unwrap();
      assert_valid(&res, 0.4);
      assert_eq!(res.strategy, strategy);
    }
  }

  #[test]
  fn minimum_variance_is_start_independent() {
    let returns = five_assets();
    let model = engine(Strategy::MinVariance).risk_model(&returns).unwrap();
    let set = ConstraintSet::long_only(5, 0.4).unwrap();
    let objective = MinVariance::new(&model);
    let starts = [
      equal_weights(5),
      DVector::from_vec(vec![1.0, 0.0, 0.0, 0.0, 0.0]),
      DVector::from_vec(vec![0.0, 0.1, 0.2, 0.3, 0.4]),
    ];

    let solutions: Vec<_> = starts
      .iter()
      .map(|x0| ActiveSetQp::default().minimize(&objective, &set, x0).unwrap())
      .collect();
    for s in &solutions[1..] {
      assert!(s.converged);
      assert!((&s.weights - &solutions[0].weights).amax() < 1e-6);
    }
  }

  #[test]
  fn risk_parity_equalizes_contributions() {
    let mut cfg = OptimizerConfig::for_strategy(Strategy::RiskParity);
    cfg.max_weight = Some(1.0);
    let res = PortfolioEngine::new(cfg).optimize(&five_assets()).unwrap();

    assert_eq!(res.status, SolverStatus::Analytic);
    let rc = &res.risk_contributions;
    let spread = spread(rc);
    assert!(spread < 1e-3, "{rc:?}");
  }

  #[test]
  fn risk_parity_under_binding_caps_stays_feasible() {
    // ERC puts more than 0.4 on the low-volatility asset
    let res = engine(Strategy::RiskParity).optimize(&three_assets()).unwrap();
    assert_valid(&res, 0.4);
    assert_ne!(res.status, SolverStatus::Analytic);
    assert_relative_eq!(res.weight("C").unwrap(), 0.4, epsilon = 1e-6);
  }

  #[test]
  fn risk_budget_uses_the_configured_solver() {
    let mut cfg = OptimizerConfig::for_strategy(Strategy::RiskParity);
    cfg.max_weight = Some(1.0);
    cfg.solver.kind = SolverKind::NelderMead;
    let res = PortfolioEngine::new(cfg.clone()).optimize(&five_assets()).unwrap();

    assert_ne!(res.status, SolverStatus::Analytic);
    assert_valid(&res, 1.0);
    let rc = &res.risk_contributions;
    let spread = spread(rc);
    assert!(spread < 1e-2, "{rc:?}");

    cfg.strategy = Strategy::RiskBudget;
    cfg.risk_budgets = Some(vec![0.3, 0.25, 0.2, 0.15, 0.1]);
    cfg.solver.kind = SolverKind::ProjectedGradient;
    let res = PortfolioEngine::new(cfg).optimize(&five_assets()).unwrap();
    assert_ne!(res.status, SolverStatus::Analytic);
    assert_valid(&res, 1.0);
  }

  #[test]
  fn volatility_cap_rejects_variance_strategies() {
    let returns = three_assets();
    let model = engine(Strategy::MeanVariance).risk_model(&returns).unwrap();
    let set = ConstraintSet::long_only(3, 0.4).unwrap();
    let mut cfg = OptimizerConfig::for_strategy(Strategy::MeanVariance);
    let (lo, hi) = (set.min_attainable_return(model.mean()), set.max_return(model.mean()));
    cfg.target_return = Some(0.5 * (lo + hi));
    // below the minimum-variance volatility under the 0.4 caps
    cfg.max_volatility = Some(0.05);

    for strategy in [Strategy::MeanVariance, Strategy::MinVariance, Strategy::MaxSharpe] {
      cfg.strategy = strategy;
      let err = PortfolioEngine::new(cfg.clone()).optimize(&returns).unwrap_err();
      assert!(matches!(err, PortfolioError::InfeasibleConstraint { .. }), "{err}");
    }

    cfg.strategy = Strategy::MeanVariance;
    cfg.enforce_max_volatility = false;
    let res = PortfolioEngine::new(cfg).optimize(&returns).unwrap();
    assert_eq!(res.within_volatility_cap, Some(false));
  }

  #[test]
  fn max_sharpe_is_held_to_the_volatility_cap() {
    let returns = three_assets();
    let mut cfg = OptimizerConfig::for_strategy(Strategy::MaxSharpe);
    cfg.max_weight = Some(1.0);
    cfg.enforce_max_volatility = false;
    let free = PortfolioEngine::new(cfg.clone()).optimize(&returns).unwrap();
    cfg.strategy = Strategy::MinVariance;
    let gmv = PortfolioEngine::new(cfg.clone()).optimize(&returns).unwrap();
    assert!(free.volatility > gmv.volatility + 0.01);

    let cap = 0.5 * (free.volatility + gmv.volatility);
    cfg.strategy = Strategy::MaxSharpe;
    cfg.enforce_max_volatility = true;
    cfg.max_volatility = Some(cap);
    let capped = PortfolioEngine::new(cfg).optimize(&returns).unwrap();

    assert_valid(&capped, 1.0);
    assert!(capped.converged);
    assert_eq!(capped.within_volatility_cap, Some(true));
    assert!(capped.volatility <= cap + 1e-9);
    assert!(capped.volatility > cap - 1e-4, "{} vs {cap}", capped.volatility);
    let sharpe = capped.sharpe_ratio.unwrap();
    assert!(sharpe <= free.sharpe_ratio.unwrap() + 1e-9);
    assert!(sharpe >= gmv.sharpe_ratio.unwrap() - 1e-9);
  }

  #[test]
  fn max_sharpe_beats_equal_weight() {
    let returns = five_assets();
    let mut cfg = OptimizerConfig::for_strategy(Strategy::MaxSharpe);
    cfg.enforce_max_volatility = false;
    let best = PortfolioEngine::new(cfg).optimize(&returns).unwrap();
    let naive = engine(Strategy::EqualWeight).optimize(&returns).unwrap();
    assert!(best.sharpe_ratio.unwrap() >= naive.sharpe_ratio.unwrap() - 1e-12);
  }

  #[test]
  fn cap_below_one_over_n_is_rejected() {
    let mut cfg = OptimizerConfig::for_strategy(Strategy::MinVariance);
    cfg.max_weight = Some(0.1);
    let err = PortfolioEngine::new(cfg).optimize(&five_assets()).unwrap_err();
    assert!(matches!(err, PortfolioError::InfeasibleConstraint { .. }), "{err}");
  }

  #[test]
  fn unreachable_target_return_is_rejected() {
    let mut cfg = OptimizerConfig::for_strategy(Strategy::MeanVariance);
    cfg.target_return = Some(5.0);
    let err = PortfolioEngine::new(cfg).optimize(&three_assets()).unwrap_err();
    assert!(matches!(err, PortfolioError::InfeasibleConstraint { .. }), "{err}");
  }

  #[test]
  fn constant_asset_is_named() {
    let returns = three_assets();
    let mut columns: Vec<(String, Vec<f64>)> = returns
      .assets()
      .iter()
      .map(|a| (a.clone(), returns.column(a).unwrap().to_vec()))
      .collect();
    columns.push(("USDT".to_string(), vec![0.0; returns.n_observations()]));
    let returns = ReturnsSeries::from_columns(columns).unwrap();

    let err = engine(Strategy::MaxSharpe).optimize(&returns).unwrap_err();
    assert_eq!(
      err,
      PortfolioError::DegenerateAsset {
        assets: vec!["USDT".to_string()]
      }
    );
  }

  #[test]
  fn minimum_variance_favours_the_quiet_asset() {
    let returns = three_assets();
    let mut cfg = OptimizerConfig::for_strategy(Strategy::MinVariance);
    cfg.max_weight = Some(1.0);
    let res = PortfolioEngine::new(cfg).optimize(&returns).unwrap();

    assert!(res.converged);
    let c = res.weight("C").unwrap();
    assert!(c > res.weight("A").unwrap() && c > res.weight("B").unwrap());
    let model = engine(Strategy::MinVariance).risk_model(&returns).unwrap();
    assert!(res.volatility < model.volatilities().min());
  }

  #[test]
  fn black_litterman_without_views_returns_market_weights() {
    let res = engine(Strategy::BlackLitterman).optimize(&three_assets()).unwrap();
    assert!(res.converged);
    for w in res.weights.unwrap().iter() {
      assert_relative_eq!(*w, 1.0 / 3.0, epsilon = 1e-8);
    }
  }

  #[test]
  fn black_litterman_views_tilt_the_allocation() {
    let mut cfg = OptimizerConfig::for_strategy(Strategy::BlackLitterman);
    cfg.black_litterman.views = vec![View::relative("B", "A", 0.1, 0.8)];
    let res = PortfolioEngine::new(cfg).optimize(&three_assets()).unwrap();
    assert!(res.weight("B").unwrap() > 1.0 / 3.0);
    assert!(res.weight("A").unwrap() < 1.0 / 3.0);
  }

  #[test]
  fn inverse_volatility_is_capped() {
    let res = engine(Strategy::InverseVolatility).optimize(&three_assets()).unwrap();
    assert_eq!(res.status, SolverStatus::Analytic);
    assert_valid(&res, 0.4);
    assert_relative_eq!(res.weight("C").unwrap(), 0.4, epsilon = 1e-12);
  }

  #[test]
  fn momentum_needs_history() {
    let model = engine(Strategy::Momentum).risk_model(&three_assets()).unwrap();
    assert!(engine(Strategy::Momentum).optimize_model(&model).is_err());
  }

  #[test]
  fn risk_budget_requires_budgets() {
    let err = engine(Strategy::RiskBudget).optimize(&three_assets()).unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidInput(_)));
  }

  #[test]
  fn frontier_is_monotone() {
    let mut cfg = OptimizerConfig::for_strategy(Strategy::MeanVariance);
    cfg.max_weight = Some(1.0);
    let points = PortfolioEngine::new(cfg)
      .efficient_frontier(&three_assets(), 8)
      .unwrap();

    assert_eq!(points.len(), 8);
    for pair in points.windows(2) {
      assert!(pair[1].expected_return >= pair[0].expected_return - 1e-9);
      assert!(pair[1].volatility >= pair[0].volatility - 1e-9);
    }
  }

  #[traced_test]
  #[test]
  fn volatility_cap_breach_is_logged() {
    let mut cfg = OptimizerConfig::for_strategy(Strategy::EqualWeight);
    cfg.max_volatility = Some(0.01);
    let res = PortfolioEngine::new(cfg).optimize(&three_assets()).unwrap();
    assert_eq!(res.within_volatility_cap, Some(false));
    assert!(logs_contain("exceeds the profile cap"));
  }

  #[test]
  fn result_serializes() {
    let res = engine(Strategy::EqualWeight).optimize(&three_assets()).unwrap();
    let json = serde_json::to_value(&res).unwrap();
    assert_eq!(json["strategy"], "equal_weight");
    assert_eq!(json["status"], "analytic");
    assert_eq!(json["weights"].as_array().unwrap().len(), 3);
  }
}
