//! # Active-Set QP
//!
//! $$
//! \min_{\mathbf w}\ \tfrac12\mathbf w^\top Q\mathbf w+\mathbf c^\top\mathbf w
//! \quad\text{s.t.}\quad \mathbf 1^\top\mathbf w=1,\ \ \mathbf a_j^\top\mathbf w\ge b_j
//! $$
//!
//! Primal active-set method for convex quadratic programs. Each iteration
//! solves the equality-constrained subproblem on the working set through its
//! KKT system; blocking constraints are added, constraints with negative
//! multipliers dropped.

use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::debug;
use tracing::warn;

use super::Minimization;
use super::Minimizer;
use super::ProjectedGradient;
use crate::constraints::ConstraintSet;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::objectives::Objective;
use crate::objectives::Quadratic;
use crate::types::SolverStatus;

/// Step norm treated as zero.
const STEP_TOL: f64 = 1e-12;
/// Multiplier below which a constraint is released.
const MULTIPLIER_TOL: f64 = 1e-12;
/// Distance at which an inequality counts as active.
const ACTIVE_TOL: f64 = 1e-12;

/// Primal active-set method for convex quadratic objectives.
///
/// Falls back to [`ProjectedGradient`] when the objective has no quadratic
/// form.
#[derive(Clone, Copy, Debug)]
pub struct ActiveSetQp {
  pub max_iterations: u64,
  pub tolerance: f64,
}

impl Default for ActiveSetQp {
  fn default() -> Self {
    Self::new(500, 1e-9)
  }
}

impl ActiveSetQp {
  pub fn new(max_iterations: u64, tolerance: f64) -> Self {
    Self {
      max_iterations,
      tolerance,
    }
  }
}

/// Inequalities in the form `a' w >= b`.
struct Inequalities {
  a: Vec<DVector<f64>>,
  b: Vec<f64>,
  /// Asset index for bound rows, `None` for the return floor.
  coordinate: Vec<Option<usize>>,
}

impl Inequalities {
  fn from_constraints(constraints: &ConstraintSet) -> Self {
    let n = constraints.n();
    let mut rows = Self {
      a: Vec::with_capacity(2 * n + 1),
      b: Vec::with_capacity(2 * n + 1),
      coordinate: Vec::with_capacity(2 * n + 1),
    };
    for i in 0..n {
      let mut e = DVector::zeros(n);
      e[i] = 1.0;
      rows.push(e.clone(), constraints.lower()[i], Some(i));
      rows.push(-e, -constraints.upper()[i], Some(i));
    }
    if let Some(floor) = constraints.min_return() {
      rows.push(floor.mean.clone(), floor.target, None);
    }
    rows
  }

  fn push(&mut self, a: DVector<f64>, b: f64, coordinate: Option<usize>) {
    self.a.push(a);
    self.b.push(b);
    self.coordinate.push(coordinate);
  }

  fn len(&self) -> usize {
    self.a.len()
  }

  fn slack(&self, j: usize, x: &DVector<f64>) -> f64 {
    self.a[j].dot(x) - self.b[j]
  }
}

impl Minimizer for ActiveSetQp {
  fn minimize(
    &self,
    objective: &dyn Objective,
    constraints: &ConstraintSet,
    x0: &DVector<f64>,
  ) -> Result<Minimization> {
    let Some(Quadratic { q, c }) = objective.quadratic() else {
      debug!(objective = objective.name(), "not a quadratic, using projected gradient");
      let fallback = ProjectedGradient::new(self.max_iterations, self.tolerance);
      return fallback.minimize(objective, constraints, x0);
    };

    let n = constraints.n();
    if x0.len() != n {
      return Err(PortfolioError::invalid(format!(
        "starting point has {} entries for {n} assets",
        x0.len()
      )));
    }

    let rows = Inequalities::from_constraints(constraints);
    let mut x = constraints.project(x0);
    let mut working = initial_working_set(&rows, &x, n);

    for iter in 1..=self.max_iterations {
      let g = &q * &x + &c;
      let Some((p, lambda)) = solve_kkt(&q, &g, &rows, &working) else {
        warn!(objective = objective.name(), iter, "singular KKT system");
        let value = objective.value(&x);
        return Ok(Minimization::new(x, value, iter, SolverStatus::NumericalFailure));
      };

      if p.amax() <= STEP_TOL {
        // lambda[0] belongs to the budget equality
        let release = working
          .iter()
          .enumerate()
          .map(|(k, &j)| (k, j, lambda[k + 1]))
          .min_by(|a, b| a.2.total_cmp(&b.2));

        match release {
          Some((k, _, l)) if l < -MULTIPLIER_TOL => {
            working.remove(k);
          }
          _ => {
            let value = objective.value(&x);
            debug!(objective = objective.name(), iterations = iter, value, "active set optimal");
            return Ok(Minimization::new(x, value, iter, SolverStatus::Converged));
          }
        }
        continue;
      }

      let mut alpha = 1.0;
      let mut blocking = None;
      for j in (0..rows.len()).filter(|j| !working.contains(j)) {
        let ap = rows.a[j].dot(&p);
        if ap < -STEP_TOL {
          let step = (-rows.slack(j, &x) / ap).max(0.0);
          if step < alpha {
            alpha = step;
            blocking = Some(j);
          }
        }
      }

      x += &p * alpha;
      if let Some(j) = blocking {
        working.push(j);
      }
    }

    let value = objective.value(&x);
    warn!(
      objective = objective.name(),
      max_iterations = self.max_iterations,
      "active set hit the iteration cap"
    );
    Ok(Minimization::new(x, value, self.max_iterations, SolverStatus::MaxIterations))
  }

  fn name(&self) -> &'static str {
    "active-set"
  }
}

/// Active bounds at `x`, at most one per coordinate and at most `n - 1` in
/// total so the budget row stays independent.
fn initial_working_set(rows: &Inequalities, x: &DVector<f64>, n: usize) -> Vec<usize> {
  let mut used = vec![false; n];
  let mut working = Vec::new();
  for j in 0..rows.len() {
    if working.len() + 1 >= n {
      break;
    }
    let Some(i) = rows.coordinate[j] else {
      continue;
    };
    if !used[i] && rows.slack(j, x).abs() <= ACTIVE_TOL {
      used[i] = true;
      working.push(j);
    }
  }
  working
}

/// Solve `[Q -A'; A 0] [p; lambda] = [-g; 0]` with `A` = budget row plus the
/// working set.
fn solve_kkt(
  q: &DMatrix<f64>,
  g: &DVector<f64>,
  rows: &Inequalities,
  working: &[usize],
) -> Option<(DVector<f64>, DVector<f64>)> {
  let n = q.nrows();
  let m = 1 + working.len();
  let mut kkt = DMatrix::<f64>::zeros(n + m, n + m);
  kkt.view_mut((0, 0), (n, n)).copy_from(q);

  for i in 0..n {
    kkt[(n, i)] = 1.0;
    kkt[(i, n)] = -1.0;
  }
  for (k, &j) in working.iter().enumerate() {
    for i in 0..n {
      kkt[(n + 1 + k, i)] = rows.a[j][i];
      kkt[(i, n + 1 + k)] = -rows.a[j][i];
    }
  }

  let mut rhs = DVector::<f64>::zeros(n + m);
  rhs.rows_mut(0, n).copy_from(&(-g));

  let sol = kkt.lu().solve(&rhs)?;
  if sol.iter().any(|v| !v.is_finite()) {
    return None;
  }
  Some((sol.rows(0, n).into_owned(), sol.rows(n, m).into_owned()))
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;
  use crate::objectives::MinVariance;
  use crate::objectives::NegativeSharpe;
  use crate::objectives::QuadraticUtility;
  use crate::risk_model::RiskModel;
  use crate::solver::equal_weights;

  fn model() -> RiskModel {
    RiskModel::from_moments(
      vec!["A".into(), "B".into(), "C".into()],
      DVector::from_vec(vec![0.04, 0.08, 0.16]),
      DMatrix::from_row_slice(3, 3, &[0.01, 0.0, 0.0, 0.0, 0.04, 0.0, 0.0, 0.0, 0.09]),
    )
    .unwrap()
  }

  #[test]
  fn unconstrained_minimum_variance_is_inverse_variance() {
    let m = model();
    let set = ConstraintSet::long_only(3, 1.0).unwrap();
    let res = ActiveSetQp::default()
      .minimize(&MinVariance::new(&m), &set, &equal_weights(3))
      .unwrap();
    let inv = DVector::from_vec(vec![100.0, 25.0, 100.0 / 9.0]);
    assert!(res.converged);
    assert_relative_eq!(res.weights, &inv / inv.sum(), epsilon = 1e-12);
  }

  #[test]
  fn caps_bind_and_release() {
    let m = model();
    let set = ConstraintSet::long_only(3, 0.5).unwrap();
    let res = ActiveSetQp::default()
      .minimize(&MinVariance::new(&m), &set, &DVector::from_vec(vec![0.0, 0.0, 1.0]))
      .unwrap();
    assert!(res.converged);
    assert_relative_eq!(res.weights[0], 0.5, epsilon = 1e-12);
    // remaining 0.5 split by inverse variance between B and C
    assert_relative_eq!(res.weights[1] / res.weights[2], 0.09 / 0.04, epsilon = 1e-9);
  }

  #[test]
  fn return_floor_is_respected() {
    let m = model();
    let set = ConstraintSet::long_only(3, 1.0)
      .unwrap()
      .with_min_return(m.mean().clone(), 0.12)
      .unwrap();
    let res = ActiveSetQp::default()
      .minimize(&MinVariance::new(&m), &set, &equal_weights(3))
      .unwrap();
    assert!(res.converged);
    assert_relative_eq!(m.portfolio_return(&res.weights), 0.12, epsilon = 1e-10);
    assert!(set.is_feasible(&res.weights, 1e-10));
  }

  #[test]
  fn utility_recovers_reverse_optimized_weights() {
    let m = model();
    let w_mkt = DVector::from_vec(vec![0.2, 0.3, 0.5]);
    let implied = m.covariance() * &w_mkt * 2.5;
    let obj = QuadraticUtility::with_mean(&m, implied, 2.5).unwrap();
    let set = ConstraintSet::long_only(3, 1.0).unwrap();
    let res = ActiveSetQp::default().minimize(&obj, &set, &equal_weights(3)).unwrap();
    assert_relative_eq!(res.weights, w_mkt, epsilon = 1e-10);
  }

  #[test]
  fn non_quadratic_falls_back() {
    let m = model();
    let set = ConstraintSet::long_only(3, 1.0).unwrap();
    let obj = NegativeSharpe::new(&m, 0.0);
    let res = ActiveSetQp::default().minimize(&obj, &set, &equal_weights(3)).unwrap();
    assert!(res.objective <= obj.value(&equal_weights(3)));
  }
}
