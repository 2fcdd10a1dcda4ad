//! Discrete-time propagation of constant-coefficient linear systems
//!
//! A linear time-invariant system `dx/dt = G x` advanced in fixed steps of size
//! `dt` has the exact discrete solution `x[i] = exp(G dt) x[i-1]`. Because the
//! transition operator `exp(G dt)` does not depend on the step, it is computed
//! once and applied repeatedly. Exogenous input (for instance a bolus dose) is
//! added to the state at the steps listed in an [`InjectionSchedule`].

use std::collections::BTreeMap;

use crate::PkError;

use super::{M, T, V};

/// State increments to apply at given (possibly negative) steps.
///
/// Several injections at the same step accumulate.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectionSchedule {
    dim: usize,
    injections: BTreeMap<i64, V>,
}

impl InjectionSchedule {
    /// Create an empty schedule for a state of dimension `dim`
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            injections: BTreeMap::new(),
        }
    }

    /// Add `amount` to `component` of the state at `step`
    ///
    /// # Errors
    /// [`PkError::InvalidParameter`] if `component` is out of range for the
    /// state dimension.
    pub fn add(&mut self, step: i64, component: usize, amount: T) -> Result<(), PkError> {
        if component >= self.dim {
            return Err(PkError::invalid("component", component));
        }
        let dim = self.dim;
        self.injections
            .entry(step)
            .or_insert_with(|| V::zeros(dim))[component] += amount;
        Ok(())
    }

    /// Dimension of the state the schedule applies to
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Earliest step with an injection
    pub fn first_step(&self) -> Option<i64> {
        self.injections.keys().next().copied()
    }

    /// Accumulated increment at `step`, if any
    pub fn at(&self, step: i64) -> Option<&V> {
        self.injections.get(&step)
    }

    /// Injections at steps before 0, earliest first
    fn before_window(&self) -> impl Iterator<Item = (i64, &V)> {
        self.injections.range(..0).map(|(&step, increment)| (step, increment))
    }

    pub fn len(&self) -> usize {
        self.injections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.injections.is_empty()
    }
}

/// Applies a fixed transition operator step after step.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearPropagator {
    transition: M,
}

impl LinearPropagator {
    /// Wrap a precomputed (square) transition operator
    pub fn new(transition: M) -> Self {
        debug_assert!(transition.is_square(), "transition operator must be square");
        Self { transition }
    }

    /// Build the transition operator `exp(generator * dt)`
    pub fn from_generator(generator: &M, dt: T) -> Self {
        Self::new((generator * dt).exp())
    }

    pub fn transition(&self) -> &M {
        &self.transition
    }

    pub fn dim(&self) -> usize {
        self.transition.nrows()
    }

    /// Advance `state` by `steps` transitions.
    ///
    /// Powers of the transition are built by repeated squaring, so the cost
    /// is logarithmic in `steps`.
    pub fn advance(&self, state: &V, steps: u64) -> V {
        let mut state = state.clone();
        let mut power = self.transition.clone();
        let mut remaining = steps;
        while remaining > 0 {
            if remaining & 1 == 1 {
                state = &power * &state;
            }
            remaining >>= 1;
            if remaining > 0 {
                power = &power * &power;
            }
        }
        state
    }

    /// Visit the state at each of the `num_steps` reported steps.
    ///
    /// At step `i` the state is `transition * state[i-1] + injection[i]`.
    /// Injections before step 0 are carried into the window with
    /// [`LinearPropagator::advance`]; those steps are not visited.
    pub fn run_with<F>(&self, injections: &InjectionSchedule, num_steps: usize, mut visit: F)
    where
        F: FnMut(usize, &V),
    {
        debug_assert_eq!(injections.dim(), self.dim());
        let mut state = V::zeros(self.dim());
        let mut next = V::zeros(self.dim());

        let mut last: Option<i64> = None;
        for (step, increment) in injections.before_window() {
            if let Some(previous) = last {
                state = self.advance(&state, step.abs_diff(previous));
            }
            state += increment;
            last = Some(step);
        }
        if let Some(previous) = last {
            state = self.advance(&state, previous.unsigned_abs());
        }

        for step in 0..num_steps {
            if step > 0 {
                next.gemv(1.0, &self.transition, &state, 0.0);
                std::mem::swap(&mut state, &mut next);
            }
            if let Some(increment) = injections.at(step as i64) {
                state += increment;
            }
            visit(step, &state);
        }
    }

    /// Full state at each reported step
    pub fn run(&self, injections: &InjectionSchedule, num_steps: usize) -> Vec<V> {
        let mut states = Vec::with_capacity(num_steps);
        self.run_with(injections, num_steps, |_, state| states.push(state.clone()));
        states
    }

    /// A single component of the state at each reported step
    pub fn observe(
        &self,
        injections: &InjectionSchedule,
        num_steps: usize,
        component: usize,
    ) -> Vec<T> {
        let mut values = Vec::with_capacity(num_steps);
        self.run_with(injections, num_steps, |_, state| values.push(state[component]));
        values
    }
}
