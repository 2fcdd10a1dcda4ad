//! Recovering the absorption phase from a reported time-to-peak.
//!
//! For a one-compartment model with first-order absorption, the time at which
//! a single dose peaks depends on both rate constants but has no convenient
//! inverse. Calibration therefore nests two root searches:
//!
//! 1. [`peak_time`]: for a candidate absorption half-life, find the time at
//!    which the slope of the observed compartment crosses zero.
//! 2. [`calibrate`]: find the absorption half-life whose peak time equals the
//!    requested one.
//!
//! Peak time grows monotonically with the absorption half-life, from 0 at a
//! half-life of 0 (instantaneous absorption) towards infinity, so the outer
//! search always has a root for a positive time-to-peak.

use std::f64::consts::LN_2;
use std::hash::{Hash, Hasher};

use cached::proc_macro::cached;
use cached::SizedCache;
use serde::{Deserialize, Serialize};

use crate::optimize::{RootError, RootFinder, RootFinderOptions};
use crate::simulator::{concentration_at_time, observed_slope};
use crate::PkError;

/// Number of calibrations kept by the memoization cache; the least recently
/// used entry is evicted beyond that.
pub const CALIBRATION_CACHE_SIZE: usize = 4_096;

/// Options for [`calibrate`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOptions {
    /// Root finder for the absorption half-life (default: [`RootFinderOptions::default`])
    pub calibration: RootFinderOptions,
    /// Root finder for the peak time of each candidate (default: [`RootFinderOptions::default`])
    pub peak_search: RootFinderOptions,
    /// Reuse results of earlier calibrations with the same inputs (default: true).
    /// At most [`CALIBRATION_CACHE_SIZE`] results are kept per process.
    pub cache: bool,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            calibration: RootFinderOptions::default(),
            peak_search: RootFinderOptions::default(),
            cache: true,
        }
    }
}

impl CalibrationOptions {
    /// Set the options of the absorption half-life search
    pub fn with_calibration(mut self, options: RootFinderOptions) -> Self {
        self.calibration = options;
        self
    }

    /// Set the options of the peak time search
    pub fn with_peak_search(mut self, options: RootFinderOptions) -> Self {
        self.peak_search = options;
        self
    }

    /// Enable or disable memoization
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    fn cache_key(&self) -> u64 {
        let mut hasher = std::hash::DefaultHasher::new();
        for options in [&self.calibration, &self.peak_search] {
            options.start.to_bits().hash(&mut hasher);
            options.expansion_factor.to_bits().hash(&mut hasher);
            options.max_expansions.hash(&mut hasher);
            options.tolerance.to_bits().hash(&mut hasher);
            options.max_iters.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// The fitted absorption phase of a drug
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Absorption half-life reproducing the requested time-to-peak
    pub absorption_half_life: f64,
    /// `ln(2) / absorption_half_life`
    pub absorption_rate: f64,
    /// Factor that makes a unit dose peak at exactly 1
    pub normalization: f64,
}

/// Rate constant of a process with the given half-life.
///
/// A half-life of 0 is an instantaneous process (infinite rate).
pub fn rate_from_half_life(half_life: f64) -> f64 {
    if half_life == 0.0 {
        f64::INFINITY
    } else {
        LN_2 / half_life
    }
}

/// Time at which a unit dose peaks, with default search options.
pub fn peak_time(absorption_half_life: f64, elimination_rate: f64) -> Result<f64, PkError> {
    peak_time_with(
        absorption_half_life,
        elimination_rate,
        &RootFinderOptions::default(),
    )
}

/// Time at which a unit dose peaks in the observed compartment.
///
/// An absorption half-life of 0 peaks immediately. A negative (or infinite)
/// half-life never peaks; this returns `f64::INFINITY`.
pub fn peak_time_with(
    absorption_half_life: f64,
    elimination_rate: f64,
    options: &RootFinderOptions,
) -> Result<f64, PkError> {
    if absorption_half_life.is_nan() {
        return Err(PkError::invalid(
            "absorption_half_life",
            absorption_half_life,
        ));
    }
    if !(elimination_rate.is_finite() && elimination_rate > 0.0) {
        return Err(PkError::invalid("elimination_rate", elimination_rate));
    }
    if absorption_half_life == 0.0 {
        return Ok(0.0);
    }
    if absorption_half_life < 0.0 || absorption_half_life.is_infinite() {
        return Ok(f64::INFINITY);
    }

    let absorption_rate = rate_from_half_life(absorption_half_life);
    // The slope is positive while absorption dominates and negative after
    // the peak, so its negation crosses zero from below.
    let descent = |t: f64| match observed_slope(t, absorption_rate, elimination_rate) {
        Ok(slope) => -slope,
        Err(_) => f64::NAN,
    };
    Ok(RootFinder::new(*options).solve(descent)?)
}

/// Fit the absorption phase so that a single dose peaks at `time_to_peak`.
///
/// # Errors
/// - [`PkError::InvalidParameter`] if either input is not positive and finite
/// - [`PkError::CalibrationFailure`] if the root search fails
pub fn calibrate(
    elimination_half_life: f64,
    time_to_peak: f64,
    options: &CalibrationOptions,
) -> Result<Calibration, PkError> {
    if !(elimination_half_life.is_finite() && elimination_half_life > 0.0) {
        return Err(PkError::invalid(
            "elimination_half_life",
            elimination_half_life,
        ));
    }
    if !(time_to_peak.is_finite() && time_to_peak > 0.0) {
        return Err(PkError::invalid("time_to_peak", time_to_peak));
    }

    if options.cache {
        _calibrate(elimination_half_life, time_to_peak, options)
    } else {
        _calibrate_no_cache(elimination_half_life, time_to_peak, options)
    }
}

#[cached(
    ty = "SizedCache<(u64, u64, u64), Calibration>",
    create = "{ SizedCache::with_size(CALIBRATION_CACHE_SIZE) }",
    convert = r#"{ (elimination_half_life.to_bits(), time_to_peak.to_bits(), options.cache_key()) }"#,
    result = "true"
)]
fn _calibrate(
    elimination_half_life: f64,
    time_to_peak: f64,
    options: &CalibrationOptions,
) -> Result<Calibration, PkError> {
    let elimination_rate = rate_from_half_life(elimination_half_life);

    let mismatch = |absorption_half_life: f64| {
        match peak_time_with(absorption_half_life, elimination_rate, &options.peak_search) {
            Ok(t) => t - time_to_peak,
            Err(err) => {
                tracing::warn!(
                    absorption_half_life,
                    elimination_rate,
                    "peak time search failed: {}",
                    err
                );
                f64::NAN
            }
        }
    };
    let absorption_half_life = RootFinder::new(options.calibration).solve(mismatch)?;
    let absorption_rate = rate_from_half_life(absorption_half_life);

    let peak = concentration_at_time(time_to_peak, absorption_rate, elimination_rate)?;
    if !(peak.is_finite() && peak > 0.0) {
        return Err(RootError::NonFinite {
            x: absorption_half_life,
        }
        .into());
    }

    let calibration = Calibration {
        absorption_half_life,
        absorption_rate,
        normalization: 1.0 / peak,
    };
    tracing::debug!(
        elimination_half_life,
        time_to_peak,
        absorption_half_life,
        normalization = calibration.normalization,
        "calibrated absorption phase"
    );
    Ok(calibration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Closed-form peak time of the Bateman function
    fn analytic_peak(ka: f64, ke: f64) -> f64 {
        (ka / ke).ln() / (ka - ke)
    }

    #[test]
    fn test_peak_time_edge_cases() {
        assert_eq!(peak_time(0.0, 0.1).unwrap(), 0.0);
        assert_eq!(peak_time(-1.0, 0.1).unwrap(), f64::INFINITY);
        assert!(peak_time(f64::NAN, 0.1).is_err());
        assert!(peak_time(1.0, 0.0).is_err());
    }

    #[test]
    fn test_peak_time_matches_closed_form() {
        let ke = LN_2 / 6.0;
        for &hl_a in &[1e-3, 0.05, 0.5, 1.0, 7.0, 40.0] {
            let ka = LN_2 / hl_a;
            assert_relative_eq!(
                peak_time(hl_a, ke).unwrap(),
                analytic_peak(ka, ke),
                max_relative = 1e-8
            );
        }
    }

    #[test]
    fn test_peak_time_equal_rates() {
        // ka == ke: the curve is k t exp(-k t), peaking at 1 / k
        let k = LN_2 / 6.0;
        assert_relative_eq!(peak_time(6.0, k).unwrap(), 1.0 / k, max_relative = 1e-8);
    }

    #[test]
    fn test_peak_time_increases_with_half_life() {
        let ke = 0.2;
        let times: Vec<f64> = [0.01, 0.1, 1.0, 10.0, 100.0]
            .iter()
            .map(|&hl_a| peak_time(hl_a, ke).unwrap())
            .collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_calibration_reproduces_peak() {
        let options = CalibrationOptions::default().with_cache(false);
        let calibration = calibrate(6.0, 1.5, &options).unwrap();
        let ke = LN_2 / 6.0;
        assert_relative_eq!(
            analytic_peak(calibration.absorption_rate, ke),
            1.5,
            max_relative = 1e-8
        );
        let peak = concentration_at_time(1.5, calibration.absorption_rate, ke).unwrap();
        assert_relative_eq!(calibration.normalization * peak, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_calibration_across_scales() {
        let options = CalibrationOptions::default().with_cache(false);
        for &(hl, tmax) in &[(0.5, 0.01), (6.0, 1.5), (24.0, 4.0), (200.0, 30.0), (2.0, 9.0)] {
            let calibration = calibrate(hl, tmax, &options).unwrap();
            let found = peak_time(calibration.absorption_half_life, LN_2 / hl).unwrap();
            assert_relative_eq!(found, tmax, max_relative = 1e-7);
        }
    }

    #[test]
    fn test_cached_and_uncached_agree() {
        let cached = calibrate(8.0, 2.0, &CalibrationOptions::default()).unwrap();
        let again = calibrate(8.0, 2.0, &CalibrationOptions::default()).unwrap();
        let fresh = calibrate(8.0, 2.0, &CalibrationOptions::default().with_cache(false)).unwrap();
        assert_eq!(cached, again);
        assert_eq!(cached, fresh);
    }

    #[test]
    fn test_cache_is_bounded() {
        use cached::Cached;

        let options = CalibrationOptions::default();
        for i in 1..=8 {
            calibrate(10.0 + i as f64, 2.0, &options).unwrap();
        }
        let cache = _CALIBRATE.lock().unwrap();
        assert_eq!(cache.cache_capacity(), Some(CALIBRATION_CACHE_SIZE));
        assert!(cache.cache_size() <= CALIBRATION_CACHE_SIZE);
        assert!(cache.cache_size() >= 1);
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        let options = CalibrationOptions::default();
        for &(hl, tmax) in &[(0.0, 1.0), (-2.0, 1.0), (6.0, 0.0), (6.0, -1.0), (f64::NAN, 1.0)] {
            assert!(matches!(
                calibrate(hl, tmax, &options),
                Err(PkError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_bounded_expansion_fails_calibration() {
        let options = CalibrationOptions::default()
            .with_cache(false)
            .with_calibration(RootFinderOptions::default().with_max_expansions(1));
        assert!(matches!(
            calibrate(6.0, 1e-6, &options),
            Err(PkError::CalibrationFailure(RootError::NoBracket { .. }))
        ));
    }

    #[test]
    fn test_rate_from_half_life() {
        assert_eq!(rate_from_half_life(0.0), f64::INFINITY);
        assert_relative_eq!(rate_from_half_life(2.0), LN_2 / 2.0);
    }
}
