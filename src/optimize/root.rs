//! Scalar root finding with automatic bracket discovery
//!
//! [`RootFinder`] inverts a monotone black-box function without requiring the
//! caller to supply a bracket. A bracket is discovered by geometric expansion
//! around a starting point, then refined with Brent's method
//! ([`argmin::solver::brent::BrentRoot`]).
//!
//! The objective must cross zero from negative to positive: while the lower
//! candidate is positive it is divided by the expansion factor, while the upper
//! candidate is negative it is multiplied by it. The search domain is therefore
//! the positive reals, which is where every rate, half-life and time lives.
//!
//! ```rust,ignore
//! use pkcurve::optimize::{RootFinder, RootFinderOptions};
//!
//! let finder = RootFinder::new(RootFinderOptions::default());
//! let root = finder.solve(|x| x * x - 2.0)?;
//! assert!((root - 2f64.sqrt()).abs() < 1e-10);
//! ```

use argmin::core::{CostFunction, Error, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::brent::BrentRoot;
use serde::{Deserialize, Serialize};

use super::error::RootError;

/// Configuration for bracket expansion and the bracketed solve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RootFinderOptions {
    /// First candidate, used as both bounds before any expansion (default: 1.0)
    pub start: f64,
    /// Factor applied to a bound at each expansion (default: 10.0)
    pub expansion_factor: f64,
    /// Maximum number of expansions before giving up (default: 64)
    pub max_expansions: usize,
    /// Tolerance of the Brent solve, relative to the upper bound of the bracket (default: 1e-12)
    pub tolerance: f64,
    /// Maximum number of Brent iterations (default: 200)
    pub max_iters: u64,
}

impl Default for RootFinderOptions {
    fn default() -> Self {
        Self {
            start: 1.0,
            expansion_factor: 10.0,
            max_expansions: 64,
            tolerance: 1e-12,
            max_iters: 200,
        }
    }
}

impl RootFinderOptions {
    /// Set the first candidate
    pub fn with_start(mut self, start: f64) -> Self {
        self.start = start;
        self
    }

    /// Set the geometric expansion factor
    pub fn with_expansion_factor(mut self, factor: f64) -> Self {
        self.expansion_factor = factor;
        self
    }

    /// Set the maximum number of bracket expansions
    pub fn with_max_expansions(mut self, max_expansions: usize) -> Self {
        self.max_expansions = max_expansions;
        self
    }

    /// Set the relative tolerance of the bracketed solve
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the iteration bound of the bracketed solve
    pub fn with_max_iters(mut self, max_iters: u64) -> Self {
        self.max_iters = max_iters;
        self
    }

    fn validate(&self) -> Result<(), RootError> {
        if !(self.start.is_finite() && self.start > 0.0) {
            return Err(RootError::InvalidOption(format!(
                "start must be positive and finite, got {}",
                self.start
            )));
        }
        if !(self.expansion_factor.is_finite() && self.expansion_factor > 1.0) {
            return Err(RootError::InvalidOption(format!(
                "expansion_factor must be greater than 1, got {}",
                self.expansion_factor
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(RootError::InvalidOption(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iters == 0 {
            return Err(RootError::InvalidOption(
                "max_iters must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Adapts a plain closure to argmin's [`CostFunction`]
struct Objective<F> {
    f: F,
}

impl<F: Fn(f64) -> f64> CostFunction for Objective<F> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, Error> {
        let y = (self.f)(*x);
        if !y.is_finite() {
            return Err(RootError::NonFinite { x: *x }.into());
        }
        Ok(y)
    }
}

/// Finds the zero crossing of a function that goes from negative to positive
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RootFinder {
    options: RootFinderOptions,
}

impl RootFinder {
    pub fn new(options: RootFinderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RootFinderOptions {
        &self.options
    }

    /// Discover `(lo, hi)` with `f(lo) <= 0 <= f(hi)` by geometric expansion.
    ///
    /// Both bounds start at [`RootFinderOptions::start`]. Whenever a bound is
    /// moved, the previous position of that bound becomes the opposite bound,
    /// so the returned bracket spans exactly one expansion step.
    pub fn bracket<F: Fn(f64) -> f64>(&self, f: F) -> Result<(f64, f64), RootError> {
        self.options.validate()?;
        let eval = |x: f64| {
            let y = f(x);
            if y.is_finite() {
                Ok(y)
            } else {
                Err(RootError::NonFinite { x })
            }
        };

        let factor = self.options.expansion_factor;
        let max_expansions = self.options.max_expansions;

        let mut lo = self.options.start;
        let mut f_lo = eval(lo)?;
        let mut hi = lo;
        let mut f_hi = f_lo;
        let mut expansions = 0;

        while f_lo > 0.0 {
            if expansions == max_expansions {
                return Err(RootError::NoBracket { lo, hi, expansions });
            }
            hi = lo;
            f_hi = f_lo;
            lo /= factor;
            f_lo = eval(lo)?;
            expansions += 1;
        }

        while f_hi < 0.0 {
            if expansions == max_expansions {
                return Err(RootError::NoBracket { lo, hi, expansions });
            }
            lo = hi;
            hi *= factor;
            f_hi = eval(hi)?;
            expansions += 1;
        }

        tracing::trace!(lo, hi, expansions, "root bracket found");
        Ok((lo, hi))
    }

    /// Locate the root of `f`, discovering the bracket first.
    pub fn solve<F: Fn(f64) -> f64>(&self, f: F) -> Result<f64, RootError> {
        let (lo, hi) = self.bracket(&f)?;
        self.solve_within(f, lo, hi)
    }

    /// Locate the root of `f` inside a known bracket `[lo, hi]`.
    pub fn solve_within<F: Fn(f64) -> f64>(
        &self,
        f: F,
        lo: f64,
        hi: f64,
    ) -> Result<f64, RootError> {
        self.options.validate()?;
        if lo == hi {
            return Ok(lo);
        }

        let tolerance = self.options.tolerance * lo.abs().max(hi.abs());
        let solver = BrentRoot::new(lo, hi, tolerance);
        let max_iters = self.options.max_iters;
        let res = Executor::new(Objective { f }, solver)
            .configure(|state| state.param(hi).max_iters(max_iters))
            .run()
            .map_err(solver_error)?;

        let state = res.state();
        let estimate = state
            .get_param()
            .copied()
            .ok_or_else(|| RootError::Solver("solver returned no estimate".to_string()))?;

        match state.get_termination_status() {
            TerminationStatus::Terminated(TerminationReason::SolverConverged) => Ok(estimate),
            TerminationStatus::Terminated(TerminationReason::MaxItersReached) => Err(RootError::NotConverged {
                iterations: state.get_iter(),
                estimate,
            }),
            other => Err(RootError::Solver(format!(
                "unexpected termination: {:?}",
                other
            ))),
        }
    }
}

fn solver_error(err: Error) -> RootError {
    match err.downcast_ref::<RootError>() {
        Some(root_error) => root_error.clone(),
        None => RootError::Solver(err.to_string()),
    }
}
