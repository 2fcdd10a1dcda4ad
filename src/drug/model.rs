use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::{num_steps_for, ConcentrationTrace, DoseSchedule};
use crate::simulator::compartment::clamp_residue;
use crate::simulator::{dose_step, propagate};
use crate::PkError;

use super::calibration::{calibrate, rate_from_half_life, CalibrationOptions};

/// How a dose schedule is turned into a concentration curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvaluationStrategy {
    /// Inject every dose into a single propagation run
    #[default]
    SingleRun,
    /// Propagate one unit dose and sum shifted, scaled copies of it
    Superposition,
}

/// A drug described by its elimination half-life and time-to-peak.
///
/// Construction fits the absorption phase (see [`calibrate`]) once; the model
/// is immutable afterwards and can evaluate any number of dose schedules.
/// Concentrations are normalized so that a unit dose peaks at exactly 1.
///
/// ```rust,ignore
/// use pkcurve::prelude::*;
///
/// let drug = DrugModel::new(6.0, 1.5)?;
/// let trace = drug.simulate(24.0, 1.0 / 60.0, &doses! { 0.0 => 1.0, 8.0 => 0.5 })?;
/// println!("{}", drug);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrugModel {
    elimination_half_life: f64,
    time_to_peak: f64,
    absorption_half_life: f64,
    absorption_rate: f64,
    elimination_rate: f64,
    normalization: f64,
}

impl DrugModel {
    /// Calibrate a model with default [`CalibrationOptions`].
    pub fn new(elimination_half_life: f64, time_to_peak: f64) -> Result<Self, PkError> {
        Self::with_options(
            elimination_half_life,
            time_to_peak,
            &CalibrationOptions::default(),
        )
    }

    /// Calibrate a model.
    ///
    /// # Errors
    /// - [`PkError::InvalidParameter`] if either input is not positive and finite
    /// - [`PkError::CalibrationFailure`] if no absorption phase reproduces `time_to_peak`
    pub fn with_options(
        elimination_half_life: f64,
        time_to_peak: f64,
        options: &CalibrationOptions,
    ) -> Result<Self, PkError> {
        let calibration = calibrate(elimination_half_life, time_to_peak, options)?;
        Ok(DrugModel {
            elimination_half_life,
            time_to_peak,
            absorption_half_life: calibration.absorption_half_life,
            absorption_rate: calibration.absorption_rate,
            elimination_rate: rate_from_half_life(elimination_half_life),
            normalization: calibration.normalization,
        })
    }

    pub fn elimination_half_life(&self) -> f64 {
        self.elimination_half_life
    }

    pub fn time_to_peak(&self) -> f64 {
        self.time_to_peak
    }

    pub fn absorption_half_life(&self) -> f64 {
        self.absorption_half_life
    }

    pub fn absorption_rate(&self) -> f64 {
        self.absorption_rate
    }

    pub fn elimination_rate(&self) -> f64 {
        self.elimination_rate
    }

    /// Scale applied to every dose magnitude
    pub fn normalization(&self) -> f64 {
        self.normalization
    }

    /// Concentration at `0, step_size, ..., (num_steps - 1) * step_size`
    /// for the given doses.
    ///
    /// Pass [`DoseSchedule::default()`] for a single unit dose at time 0.
    pub fn concentration(
        &self,
        num_steps: usize,
        step_size: f64,
        doses: &DoseSchedule,
    ) -> Result<Vec<f64>, PkError> {
        self.concentration_with(num_steps, step_size, doses, EvaluationStrategy::default())
    }

    /// [`DrugModel::concentration`] with an explicit evaluation strategy.
    ///
    /// Both strategies round dose offsets onto the grid the same way and
    /// agree to within floating point round-off.
    pub fn concentration_with(
        &self,
        num_steps: usize,
        step_size: f64,
        doses: &DoseSchedule,
        strategy: EvaluationStrategy,
    ) -> Result<Vec<f64>, PkError> {
        match strategy {
            EvaluationStrategy::SingleRun => propagate(
                num_steps,
                step_size,
                self.absorption_rate,
                self.elimination_rate,
                &doses.scaled(self.normalization),
            ),
            EvaluationStrategy::Superposition => self.superpose(num_steps, step_size, doses),
        }
    }

    /// Observed amount after a unit dose at `offset`, on the reported grid
    fn unit_response(
        &self,
        num_steps: usize,
        step_size: f64,
        offset: f64,
    ) -> Result<Vec<f64>, PkError> {
        propagate(
            num_steps,
            step_size,
            self.absorption_rate,
            self.elimination_rate,
            &DoseSchedule::single(offset, 1.0),
        )
    }

    fn superpose(
        &self,
        num_steps: usize,
        step_size: f64,
        doses: &DoseSchedule,
    ) -> Result<Vec<f64>, PkError> {
        doses.validate()?;
        let unit = self.unit_response(num_steps, step_size, 0.0)?;

        // A dose before the window enters it part way along its curve, so
        // each distinct step before 0 gets a response of its own.
        let mut earlier: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
        let mut values = vec![0.0; num_steps];
        let mut scale = 0.0;
        for dose in doses {
            let step = dose_step(dose.offset(), step_size);
            let magnitude = dose.magnitude() * self.normalization;
            scale += magnitude.abs();

            if step < 0 {
                let response = match earlier.entry(step) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        entry.insert(self.unit_response(num_steps, step_size, dose.offset())?)
                    }
                };
                for (value, unit_value) in values.iter_mut().zip(response.iter()) {
                    *value += magnitude * unit_value;
                }
            } else {
                let start = usize::try_from(step).unwrap_or(usize::MAX);
                for (value, unit_value) in values.iter_mut().skip(start).zip(unit.iter()) {
                    *value += magnitude * unit_value;
                }
            }
        }

        Ok(values
            .into_iter()
            .map(|value| clamp_residue(value, scale))
            .collect())
    }

    /// [`DrugModel::concentration`] paired with its time grid
    pub fn trace(
        &self,
        num_steps: usize,
        step_size: f64,
        doses: &DoseSchedule,
    ) -> Result<ConcentrationTrace, PkError> {
        let values = self.concentration(num_steps, step_size, doses)?;
        Ok(ConcentrationTrace::new(step_size, values))
    }

    /// Trace covering `[0, duration]`, both ends included
    pub fn simulate(
        &self,
        duration: f64,
        step_size: f64,
        doses: &DoseSchedule,
    ) -> Result<ConcentrationTrace, PkError> {
        self.trace(num_steps_for(duration, step_size)?, step_size, doses)
    }

    /// Evaluate several schedules on the same grid in parallel.
    ///
    /// Row `i` of the result is the concentration curve of `schedules[i]`.
    pub fn concentration_matrix(
        &self,
        num_steps: usize,
        step_size: f64,
        schedules: &[DoseSchedule],
    ) -> Result<Array2<f64>, PkError> {
        if num_steps == 0 {
            return Err(PkError::invalid("num_steps", num_steps));
        }
        let mut matrix = Array2::zeros((schedules.len(), num_steps));
        matrix
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .try_for_each(|(i, mut row)| {
                let values = self.concentration(num_steps, step_size, &schedules[i])?;
                row.assign(&Array1::from(values));
                Ok::<(), PkError>(())
            })?;
        Ok(matrix)
    }
}

impl fmt::Display for DrugModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DrugModel(normalization={}, absorption_half_life={}, elimination_half_life={}, time_to_peak={})",
            self.normalization, self.absorption_half_life, self.elimination_half_life, self.time_to_peak
        )
    }
}

/// Calibrate several independent models in parallel.
///
/// Each entry of `parameters` is `(elimination_half_life, time_to_peak)`;
/// results are returned in the same order.
pub fn calibrate_many(
    parameters: &[(f64, f64)],
    options: &CalibrationOptions,
) -> Vec<Result<DrugModel, PkError>> {
    parameters
        .par_iter()
        .map(|&(elimination_half_life, time_to_peak)| {
            DrugModel::with_options(elimination_half_life, time_to_peak, options)
        })
        .collect()
}
