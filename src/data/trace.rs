use serde::{Deserialize, Serialize};

use crate::PkError;

/// Concentrations sampled on the uniform grid `0, step, 2 * step, ...`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConcentrationTrace {
    step: f64,
    values: Vec<f64>,
}

impl ConcentrationTrace {
    pub fn new(step: f64, values: Vec<f64>) -> Self {
        ConcentrationTrace { step, values }
    }

    /// Grid spacing
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Concentration at each grid point
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Time of the `index`-th sample
    pub fn time(&self, index: usize) -> f64 {
        index as f64 * self.step
    }

    /// Time of the last sample
    pub fn duration(&self) -> f64 {
        self.time(self.values.len().saturating_sub(1))
    }

    pub fn times(&self) -> Vec<f64> {
        (0..self.values.len()).map(|i| self.time(i)).collect()
    }

    /// `(time, concentration)` pairs in grid order
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(i, &value)| (self.time(i), value))
    }

    /// `(time, concentration)` of the first maximum, `None` for an empty trace
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.samples()
            .fold(None, |best: Option<(f64, f64)>, sample| match best {
                Some((_, value)) if value >= sample.1 => best,
                _ => Some(sample),
            })
    }
}

/// Number of grid points needed to cover `[0, duration]` with spacing `step`,
/// endpoints included.
pub fn num_steps_for(duration: f64, step: f64) -> Result<usize, PkError> {
    if !(duration.is_finite() && duration >= 0.0) {
        return Err(PkError::invalid("duration", duration));
    }
    if !(step.is_finite() && step > 0.0) {
        return Err(PkError::invalid("step_size", step));
    }
    Ok((duration / step + 1.0).round_ties_even() as usize)
}
