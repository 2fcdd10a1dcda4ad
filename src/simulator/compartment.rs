//! One-compartment model with first-order absorption, in discrete time.
//!
//! The state holds three amounts:
//!
//! | Index | Compartment | Leaves at rate |
//! |-------|-------------|----------------|
//! | [`DOSING`] | dosing reservoir (gut) | absorption rate `ka` |
//! | [`OBSERVED`] | observed (central) compartment | elimination rate `ke` |
//! | [`ELIMINATED`] | eliminated sink | never |
//!
//! Doses enter the reservoir, flow into the observed compartment and from
//! there into the sink. An infinite absorption rate means there is no
//! absorption phase: doses go straight into the observed compartment.

use crate::data::DoseSchedule;
use crate::PkError;

use super::propagator::{InjectionSchedule, LinearPropagator};
use super::{M, T, V};

pub const DOSING: usize = 0;
pub const OBSERVED: usize = 1;
pub const ELIMINATED: usize = 2;
pub const NUM_STATES: usize = 3;

/// Rate matrix `R` of `dx/dt = R x`, for column state vectors.
pub fn rate_matrix(absorption_rate: T, elimination_rate: T) -> M {
    let ka = if absorption_rate.is_finite() {
        absorption_rate
    } else {
        0.0
    };
    let ke = elimination_rate;
    M::from_row_slice(
        NUM_STATES,
        NUM_STATES,
        &[
            -ka, 0.0, 0.0, //
            ka, -ke, 0.0, //
            0.0, ke, 0.0,
        ],
    )
}

/// Grid step a dose at `offset` is injected at.
///
/// The offset is rounded to the nearest step, ties to even. With a zero step
/// size the grid is a single instant and every dose lands on step 0.
pub fn dose_step(offset: T, step_size: T) -> i64 {
    if step_size == 0.0 {
        return 0;
    }
    (offset / step_size).round_ties_even() as i64
}

fn dose_compartment(absorption_rate: T) -> usize {
    if absorption_rate.is_infinite() {
        OBSERVED
    } else {
        DOSING
    }
}

fn validate_rates(absorption_rate: T, elimination_rate: T) -> Result<(), PkError> {
    if absorption_rate.is_nan() || absorption_rate < 0.0 {
        return Err(PkError::invalid("absorption_rate", absorption_rate));
    }
    if !(elimination_rate.is_finite() && elimination_rate > 0.0) {
        return Err(PkError::invalid("elimination_rate", elimination_rate));
    }
    Ok(())
}

/// Amount in the observed compartment at each of `num_steps` grid points
/// `0, step_size, 2 * step_size, ...` for the given doses.
///
/// Doses are rounded onto the grid with [`dose_step`]; doses landing on the
/// same step are summed. Doses before the window are propagated into it,
/// doses past the last step have no effect.
pub fn propagate(
    num_steps: usize,
    step_size: T,
    absorption_rate: T,
    elimination_rate: T,
    doses: &DoseSchedule,
) -> Result<Vec<T>, PkError> {
    if num_steps == 0 {
        return Err(PkError::invalid("num_steps", num_steps));
    }
    if !(step_size.is_finite() && step_size >= 0.0) {
        return Err(PkError::invalid("step_size", step_size));
    }
    validate_rates(absorption_rate, elimination_rate)?;
    doses.validate()?;

    let compartment = dose_compartment(absorption_rate);
    let mut injections = InjectionSchedule::new(NUM_STATES);
    for dose in doses {
        injections.add(
            dose_step(dose.offset(), step_size),
            compartment,
            dose.magnitude(),
        )?;
    }

    let propagator = LinearPropagator::from_generator(
        &rate_matrix(absorption_rate, elimination_rate),
        step_size,
    );
    let scale = doses.iter().map(|dose| dose.magnitude().abs()).sum::<T>();
    let values = propagator
        .observe(&injections, num_steps, OBSERVED)
        .into_iter()
        .map(|value| clamp_residue(value, scale))
        .collect();

    Ok(values)
}

/// Zero out negative round-off no larger than machine epsilon relative to the
/// injected mass.
pub(crate) fn clamp_residue(value: T, scale: T) -> T {
    if value < 0.0 && -value <= f64::EPSILON * scale.max(1.0) {
        0.0
    } else {
        value
    }
}

/// Observed amount at time `t` after a unit dose at time 0.
pub fn concentration_at_time(t: T, absorption_rate: T, elimination_rate: T) -> Result<T, PkError> {
    let values = propagate(
        2,
        t,
        absorption_rate,
        elimination_rate,
        &DoseSchedule::default(),
    )?;
    Ok(values[1])
}

/// Time derivative of the observed amount at time `t` after a unit dose.
///
/// The state after a single transition of length `t` is `x(t) = exp(R t) x0`;
/// its tangent is `R x(t)`.
pub fn observed_slope(t: T, absorption_rate: T, elimination_rate: T) -> Result<T, PkError> {
    if !(t.is_finite() && t >= 0.0) {
        return Err(PkError::invalid("time", t));
    }
    validate_rates(absorption_rate, elimination_rate)?;

    let generator = rate_matrix(absorption_rate, elimination_rate);
    let propagator = LinearPropagator::from_generator(&generator, t);
    let mut injections = InjectionSchedule::new(NUM_STATES);
    injections.add(0, dose_compartment(absorption_rate), 1.0)?;

    let mut state = V::zeros(NUM_STATES);
    propagator.run_with(&injections, 2, |step, x| {
        if step == 1 {
            state.copy_from(x);
        }
    });
    let tangent = &generator * &state;
    Ok(tangent[OBSERVED])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doses;
    use approx::assert_relative_eq;
    use std::f64::consts::LN_2;

    /// Closed-form amount in the observed compartment after a unit dose
    fn bateman(t: f64, ka: f64, ke: f64) -> f64 {
        ka / (ka - ke) * ((-ke * t).exp() - (-ka * t).exp())
    }

    #[test]
    fn test_rate_matrix_conserves_mass() {
        let r = rate_matrix(1.3, 0.2);
        for j in 0..NUM_STATES {
            assert_relative_eq!(r.column(j).sum(), 0.0, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_matches_closed_form() {
        let (ka, ke, step) = (1.2, LN_2 / 6.0, 0.1);
        let values = propagate(200, step, ka, ke, &DoseSchedule::default()).unwrap();
        assert_eq!(values.len(), 200);
        assert_eq!(values[0], 0.0);
        for (i, &value) in values.iter().enumerate() {
            assert_relative_eq!(value, bateman(i as f64 * step, ka, ke), epsilon = 1e-10);
        }
    }

    #[test]
    fn test_concentration_at_time() {
        let (ka, ke) = (0.9, 0.15);
        let value = concentration_at_time(2.5, ka, ke).unwrap();
        assert_relative_eq!(value, bateman(2.5, ka, ke), epsilon = 1e-12);
    }

    #[test]
    fn test_dose_step_rounding() {
        assert_eq!(dose_step(0.0, 0.5), 0);
        assert_eq!(dose_step(1.24, 0.5), 2);
        assert_eq!(dose_step(1.26, 0.5), 3);
        // ties go to the even step
        assert_eq!(dose_step(0.25, 0.5), 0);
        assert_eq!(dose_step(0.75, 0.5), 2);
        assert_eq!(dose_step(-1.0, 0.5), -2);
        assert_eq!(dose_step(123.0, 0.0), 0);
    }

    #[test]
    fn test_near_simultaneous_doses_merge() {
        let (ka, ke) = (1.0, 0.1);
        let split = propagate(50, 0.5, ka, ke, &doses! { 1.9 => 1.0, 2.1 => 2.0 }).unwrap();
        let merged = propagate(50, 0.5, ka, ke, &doses! { 2.0 => 3.0 }).unwrap();
        for (a, b) in split.iter().zip(merged.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_zero_step_collapses_doses() {
        let schedule = doses! { 0.0 => 1.0, 5.0 => 2.0 };
        let values = propagate(3, 0.0, 1.0, 0.1, &schedule).unwrap();
        for value in values {
            assert_relative_eq!(value, 0.0, epsilon = 1e-15);
        }

        let values = propagate(3, 0.0, f64::INFINITY, 0.1, &schedule).unwrap();
        for value in values {
            assert_relative_eq!(value, 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_instantaneous_absorption() {
        let ke = 0.3;
        let values = propagate(5, 1.0, f64::INFINITY, ke, &DoseSchedule::default()).unwrap();
        for (i, &value) in values.iter().enumerate() {
            assert_relative_eq!(value, (-ke * i as f64).exp(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_absorption_never_reaches_observed() {
        let values = propagate(10, 1.0, 0.0, 0.3, &DoseSchedule::default()).unwrap();
        assert!(values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_dose_before_window() {
        let (ka, ke) = (0.8, 0.2);
        let values = propagate(4, 1.0, ka, ke, &doses! { -3.0 => 1.0 }).unwrap();
        for (i, &value) in values.iter().enumerate() {
            assert_relative_eq!(value, bateman(i as f64 + 3.0, ka, ke), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_dose_far_before_window() {
        let (ka, ke) = (0.8, 0.2);
        for &offset in &[-1e12, -1e20, f64::MIN] {
            let values = propagate(10, 1.0 / 60.0, ka, ke, &doses! { offset => 1.0 }).unwrap();
            assert_eq!(values.len(), 10);
            assert!(values.iter().all(|&v| (0.0..1e-300).contains(&v)));
        }

        let values = propagate(5, 1.0, ka, ke, &doses! { -1e6 => 1.0, 0.0 => 1.0 }).unwrap();
        for (i, &value) in values.iter().enumerate() {
            assert_relative_eq!(value, bateman(i as f64, ka, ke), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_invalid_inputs() {
        let unit = DoseSchedule::default();
        assert!(matches!(
            propagate(0, 1.0, 1.0, 0.1, &unit),
            Err(PkError::InvalidParameter { .. })
        ));
        assert!(propagate(10, -1.0, 1.0, 0.1, &unit).is_err());
        assert!(propagate(10, 1.0, -1.0, 0.1, &unit).is_err());
        assert!(propagate(10, 1.0, 1.0, 0.0, &unit).is_err());
        assert!(propagate(10, 1.0, 1.0, f64::NAN, &unit).is_err());
        assert!(propagate(10, f64::NAN, 1.0, 0.1, &unit).is_err());
    }

    #[test]
    fn test_slope_matches_closed_form() {
        let (ka, ke) = (1.5, 0.25);
        let derivative = |t: f64| ka / (ka - ke) * (ka * (-ka * t).exp() - ke * (-ke * t).exp());
        for &t in &[0.0, 0.3, 1.0, 1.4, 5.0, 20.0] {
            assert_relative_eq!(
                observed_slope(t, ka, ke).unwrap(),
                derivative(t),
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn test_clamp_residue() {
        assert_eq!(clamp_residue(-1e-18, 1.0), 0.0);
        assert_eq!(clamp_residue(-1e-3, 1.0), -1e-3);
        assert_eq!(clamp_residue(1e-18, 1.0), 1e-18);
    }
}
