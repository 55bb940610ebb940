//! # Constraints
//!
//! $$
//! \mathcal C=\{\mathbf w:\ \mathbf 1^\top\mathbf w=1,\ \ l_i\le w_i\le u_i,\ \ \mu^\top\mathbf w\ge r^\*\}
//! $$
//!
//! Feasible region of a long-only allocation, its analytic feasibility checks
//! and the Euclidean projection onto it.

use nalgebra::DVector;

use crate::error::PortfolioError;
use crate::error::Result;

/// Slack allowed when checking sums and bounds analytically.
const FEASIBILITY_TOL: f64 = 1e-12;
const BISECTION_STEPS: usize = 200;

/// Minimum expected return `mean' w >= target`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnFloor {
  pub mean: DVector<f64>,
  pub target: f64,
}

/// Validated feasible region. Only [`ConstraintBuilder::build`] creates one,
/// so the region is never empty.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstraintSet {
  lower: DVector<f64>,
  upper: DVector<f64>,
  min_return: Option<ReturnFloor>,
}

/// Assembles a [`ConstraintSet`].
#[derive(Clone, Debug)]
pub struct ConstraintBuilder {
  n: usize,
  min_weight: f64,
  max_weight: f64,
  caps: Vec<(usize, f64)>,
  min_return: Option<ReturnFloor>,
}

impl ConstraintBuilder {
  /// Fully invested, long-only, no caps.
  pub fn new(n: usize) -> Self {
    Self {
      n,
      min_weight: 0.0,
      max_weight: 1.0,
      caps: Vec::new(),
      min_return: None,
    }
  }

  /// Lower bound applied to every asset.
  pub fn min_weight(mut self, min_weight: f64) -> Self {
    self.min_weight = min_weight;
    self
  }

  /// Upper bound applied to every asset.
  pub fn max_weight(mut self, max_weight: f64) -> Self {
    self.max_weight = max_weight;
    self
  }

  /// Tighter cap for a single asset.
  pub fn asset_cap(mut self, index: usize, cap: f64) -> Self {
    self.caps.push((index, cap));
    self
  }

  /// Require `mean' w >= target`.
  pub fn min_return(mut self, mean: DVector<f64>, target: f64) -> Self {
    self.min_return = Some(ReturnFloor { mean, target });
    self
  }

  pub fn build(self) -> Result<ConstraintSet> {
    let n = self.n;
    if n == 0 {
      return Err(PortfolioError::invalid("constraint set needs at least one asset"));
    }
    check_cap(self.max_weight, "max weight")?;
    if !(self.min_weight >= 0.0 && self.min_weight.is_finite()) {
      return Err(PortfolioError::invalid(format!(
        "min weight must be non-negative, got {}",
        self.min_weight
      )));
    }

    let lower = DVector::from_element(n, self.min_weight);
    let mut upper = DVector::from_element(n, self.max_weight);
    for &(i, cap) in &self.caps {
      if i >= n {
        return Err(PortfolioError::invalid(format!(
          "cap for asset {i} but only {n} assets"
        )));
      }
      check_cap(cap, "asset cap")?;
      upper[i] = upper[i].min(cap);
    }

    if let Some(i) = (0..n).find(|&i| lower[i] > upper[i]) {
      return Err(PortfolioError::infeasible(format!(
        "asset {i}: lower bound {} exceeds upper bound {}",
        lower[i], upper[i]
      )));
    }
    if lower.sum() > 1.0 + FEASIBILITY_TOL {
      return Err(PortfolioError::infeasible(format!(
        "minimum weights sum to {} > 1",
        lower.sum()
      )));
    }
    if upper.sum() < 1.0 - FEASIBILITY_TOL {
      return Err(PortfolioError::infeasible(format!(
        "caps sum to {} < 1 (max weight {} with {n} assets needs at least {})",
        upper.sum(),
        self.max_weight,
        1.0 / n as f64
      )));
    }

    let set = ConstraintSet {
      lower,
      upper,
      min_return: None,
    };
    match self.min_return {
      Some(floor) => set.with_min_return(floor.mean, floor.target),
      None => Ok(set),
    }
  }
}

fn check_cap(cap: f64, what: &str) -> Result<()> {
  if cap > 0.0 && cap <= 1.0 {
    Ok(())
  } else {
    Err(PortfolioError::invalid(format!("{what} must lie in (0, 1], got {cap}")))
  }
}

impl ConstraintSet {
  /// Long-only, fully invested set with a uniform cap.
  pub fn long_only(n: usize, max_weight: f64) -> Result<Self> {
    ConstraintBuilder::new(n).max_weight(max_weight).build()
  }

  /// Copy of this set with a minimum expected return.
  ///
  /// Fails with [`PortfolioError::InfeasibleConstraint`] when `target` is
  /// above the best return reachable within the bounds.
  pub fn with_min_return(&self, mean: DVector<f64>, target: f64) -> Result<Self> {
    if mean.len() != self.n() {
      return Err(PortfolioError::invalid(format!(
        "{} expected returns for {} assets",
        mean.len(),
        self.n()
      )));
    }
    if !target.is_finite() || mean.iter().any(|m| !m.is_finite()) {
      return Err(PortfolioError::invalid("return target must be finite"));
    }

    let best = self.max_return(&mean);
    if target > best + FEASIBILITY_TOL * (1.0 + best.abs()) {
      return Err(PortfolioError::infeasible(format!(
        "target return {target:.6} exceeds the maximum attainable {best:.6}"
      )));
    }

    Ok(Self {
      lower: self.lower.clone(),
      upper: self.upper.clone(),
      min_return: Some(ReturnFloor { mean, target }),
    })
  }

  /// Number of assets.
  pub fn n(&self) -> usize {
    self.lower.len()
  }

  /// Per-asset lower bounds.
  pub fn lower(&self) -> &DVector<f64> {
    &self.lower
  }

  /// Per-asset upper bounds, caps included.
  pub fn upper(&self) -> &DVector<f64> {
    &self.upper
  }

  pub fn min_return(&self) -> Option<&ReturnFloor> {
    self.min_return.as_ref()
  }

  /// Largest `mean' w` within the bounds (greedy fill by descending mean).
  pub fn max_return(&self, mean: &DVector<f64>) -> f64 {
    let w = self.greedy_fill(mean, true);
    mean.dot(&w)
  }

  /// Smallest `mean' w` within the bounds.
  pub fn min_attainable_return(&self, mean: &DVector<f64>) -> f64 {
    let w = self.greedy_fill(mean, false);
    mean.dot(&w)
  }

  /// Bound-feasible portfolio that maximizes (or minimizes) `mean' w`.
  pub fn greedy_fill(&self, mean: &DVector<f64>, descending: bool) -> DVector<f64> {
    let mut order: Vec<usize> = (0..self.n()).collect();
    order.sort_by(|&a, &b| {
      let ord = mean[a]
        .partial_cmp(&mean[b])
        .unwrap_or(std::cmp::Ordering::Equal);
      if descending { ord.reverse() } else { ord }
    });

    let mut w = self.lower.clone();
    let mut remaining = 1.0 - w.sum();
    for i in order {
      if remaining <= 0.0 {
        break;
      }
      let add = (self.upper[i] - w[i]).min(remaining);
      w[i] += add;
      remaining -= add;
    }
    w
  }

  /// Whether `w` satisfies every constraint within `tol`.
  pub fn is_feasible(&self, w: &DVector<f64>, tol: f64) -> bool {
    if w.len() != self.n() || w.iter().any(|x| !x.is_finite()) {
      return false;
    }
    let in_bounds =
      (0..self.n()).all(|i| w[i] >= self.lower[i] - tol && w[i] <= self.upper[i] + tol);
    let budget = (w.sum() - 1.0).abs() <= tol;
    let floor = self
      .min_return
      .as_ref()
      .is_none_or(|f| f.mean.dot(w) >= f.target - tol);
    in_bounds && budget && floor
  }

  /// Euclidean projection of `v` onto the feasible region.
  ///
  /// The minimizer has the form `clip(v + a 1 + b mean, l, u)` with `b >= 0`;
  /// `a` and `b` are found by nested bisection.
  pub fn project(&self, v: &DVector<f64>) -> DVector<f64> {
    let base = self.project_budget(v);
    let Some(floor) = &self.min_return else {
      return base;
    };
    if floor.mean.dot(&base) >= floor.target {
      return base;
    }

    let shifted = |b: f64| self.project_budget(&(v + &floor.mean * b));
    let mut lo = 0.0;
    let mut hi = 1.0;
    let mut w_hi = shifted(hi);
    for _ in 0..BISECTION_STEPS {
      if floor.mean.dot(&w_hi) >= floor.target {
        break;
      }
      lo = hi;
      hi *= 2.0;
      w_hi = shifted(hi);
    }

    for _ in 0..BISECTION_STEPS {
      if hi - lo <= f64::EPSILON * hi {
        break;
      }
      let mid = 0.5 * (lo + hi);
      let w = shifted(mid);
      if floor.mean.dot(&w) < floor.target {
        lo = mid;
      } else {
        hi = mid;
        w_hi = w;
      }
    }
    w_hi
  }

  /// Projection onto `{1'w = 1, l <= w <= u}`.
  fn project_budget(&self, u: &DVector<f64>) -> DVector<f64> {
    let n = self.n();
    let (l, h) = (&self.lower, &self.upper);
    let clip = |shift: f64| DVector::from_fn(n, |i, _| (u[i] + shift).clamp(l[i], h[i]));

    let mut lo = (l - u).min();
    let mut hi = (h - u).max();
    for _ in 0..BISECTION_STEPS {
      let mid = 0.5 * (lo + hi);
      if clip(mid).sum() < 1.0 {
        lo = mid;
      } else {
        hi = mid;
      }
      if hi - lo <= f64::EPSILON * (1.0 + hi.abs()) {
        break;
      }
    }

    let w = clip(0.5 * (lo + hi));
    // the sum is linear in the shift on the coordinates left unclipped
    let free: Vec<usize> = (0..n).filter(|&i| w[i] > l[i] && w[i] < h[i]).collect();
    if free.is_empty() {
      return w;
    }
    let fixed: f64 = (0..n).filter(|i| !free.contains(i)).map(|i| w[i]).sum();
    let shift = (1.0 - fixed - free.iter().map(|&i| u[i]).sum::<f64>()) / free.len() as f64;
    let polished = clip(shift);
    if (polished.sum() - 1.0).abs() <= (w.sum() - 1.0).abs() {
      polished
    } else {
      w
    }
  }

  /// Cap weights at their upper bounds and hand the excess to uncapped
  /// assets pro rata, keeping relative proportions among them.
  pub fn cap_and_redistribute(&self, w: &DVector<f64>) -> DVector<f64> {
    let n = self.n();
    let total = w.sum();
    let mut w = if total > 0.0 && w.iter().all(|x| *x >= 0.0) {
      w / total
    } else {
      DVector::from_element(n, 1.0 / n as f64)
    };

    let mut capped = vec![false; n];
    for _ in 0..n {
      let over: Vec<usize> = (0..n).filter(|&i| w[i] > self.upper[i] + 1e-12).collect();
      if over.is_empty() {
        break;
      }
      let mut excess = 0.0;
      for &i in &over {
        excess += w[i] - self.upper[i];
        w[i] = self.upper[i];
        capped[i] = true;
      }

      let open: Vec<usize> = (0..n).filter(|&i| !capped[i]).collect();
      if open.is_empty() {
        break;
      }
      let open_sum: f64 = open.iter().map(|&i| w[i]).sum();
      for &i in &open {
        w[i] += if open_sum > 0.0 {
          excess * w[i] / open_sum
        } else {
          excess / open.len() as f64
        };
      }
    }

    if self.is_feasible(&w, 1e-9) {
      w
    } else {
      self.project(&w)
    }
  }
}
