use serde::{Deserialize, Serialize};

use crate::PkError;

/// An instantaneous dose given at `offset` time units from the start of the
/// observation window.
///
/// The offset may be negative (a dose given before the window opens) and does
/// not need to line up with any sampling grid.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Dose {
    offset: f64,
    magnitude: f64,
}

impl Dose {
    /// Create a new dose
    ///
    /// # Arguments
    ///
    /// * `offset` - Time of administration, relative to the start of the window
    /// * `magnitude` - Amount administered (arbitrary units)
    pub fn new(offset: f64, magnitude: f64) -> Self {
        Dose { offset, magnitude }
    }

    /// Get the time of administration
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Get the amount administered
    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    /// The same dose with its magnitude multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        Dose::new(self.offset, self.magnitude * factor)
    }
}

impl From<(f64, f64)> for Dose {
    fn from((offset, magnitude): (f64, f64)) -> Self {
        Dose::new(offset, magnitude)
    }
}

/// An ordered collection of [Dose]s.
///
/// Doses are kept in the order they were added; doses sharing an offset are
/// not merged here; the simulator sums them.
///
/// The default schedule is a single unit dose at offset 0.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DoseSchedule {
    doses: Vec<Dose>,
}

impl Default for DoseSchedule {
    fn default() -> Self {
        DoseSchedule::single(0.0, 1.0)
    }
}

impl DoseSchedule {
    /// Create an empty schedule
    pub fn new() -> Self {
        DoseSchedule { doses: Vec::new() }
    }

    /// A schedule holding one dose
    pub fn single(offset: f64, magnitude: f64) -> Self {
        DoseSchedule {
            doses: vec![Dose::new(offset, magnitude)],
        }
    }

    /// Pair a column of offsets with a column of magnitudes.
    ///
    /// When the columns differ in length, the last value of the shorter one is
    /// repeated. If either column is empty the schedule is empty.
    pub fn from_columns(offsets: &[f64], magnitudes: &[f64]) -> Self {
        let (Some(&last_offset), Some(&last_magnitude)) = (offsets.last(), magnitudes.last())
        else {
            return DoseSchedule::new();
        };
        let n = offsets.len().max(magnitudes.len());
        (0..n)
            .map(|i| {
                (
                    offsets.get(i).copied().unwrap_or(last_offset),
                    magnitudes.get(i).copied().unwrap_or(last_magnitude),
                )
            })
            .collect()
    }

    /// Add a dose, builder style
    pub fn with_dose(mut self, offset: f64, magnitude: f64) -> Self {
        self.push(offset, magnitude);
        self
    }

    /// Add a dose
    pub fn push(&mut self, offset: f64, magnitude: f64) {
        self.doses.push(Dose::new(offset, magnitude));
    }

    pub fn doses(&self) -> &[Dose] {
        &self.doses
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Dose> {
        self.doses.iter()
    }

    pub fn len(&self) -> usize {
        self.doses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doses.is_empty()
    }

    /// Sum of all magnitudes
    pub fn total(&self) -> f64 {
        self.doses.iter().map(Dose::magnitude).sum()
    }

    /// Every magnitude multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        self.doses.iter().map(|dose| dose.scaled(factor)).collect()
    }

    /// Every offset moved by `delta`
    pub fn shifted(&self, delta: f64) -> Self {
        self.doses
            .iter()
            .map(|dose| Dose::new(dose.offset + delta, dose.magnitude))
            .collect()
    }

    /// Union of two schedules
    pub fn merged(&self, other: &DoseSchedule) -> Self {
        self.doses.iter().chain(other.doses.iter()).copied().collect()
    }

    pub(crate) fn validate(&self) -> Result<(), PkError> {
        for dose in &self.doses {
            if !dose.offset.is_finite() {
                return Err(PkError::invalid("dose offset", dose.offset));
            }
            if !dose.magnitude.is_finite() {
                return Err(PkError::invalid("dose magnitude", dose.magnitude));
            }
        }
        Ok(())
    }
}

impl FromIterator<Dose> for DoseSchedule {
    fn from_iter<I: IntoIterator<Item = Dose>>(iter: I) -> Self {
        DoseSchedule {
            doses: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<(f64, f64)> for DoseSchedule {
    fn from_iter<I: IntoIterator<Item = (f64, f64)>>(iter: I) -> Self {
        iter.into_iter().map(Dose::from).collect()
    }
}

impl From<Vec<(f64, f64)>> for DoseSchedule {
    fn from(pairs: Vec<(f64, f64)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl<const N: usize> From<[(f64, f64); N]> for DoseSchedule {
    fn from(pairs: [(f64, f64); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<Dose> for DoseSchedule {
    fn from(dose: Dose) -> Self {
        DoseSchedule { doses: vec![dose] }
    }
}

impl<'a> IntoIterator for &'a DoseSchedule {
    type Item = &'a Dose;
    type IntoIter = std::slice::Iter<'a, Dose>;

    fn into_iter(self) -> Self::IntoIter {
        self.doses.iter()
    }
}

/// Build a [DoseSchedule] from `offset => magnitude` pairs.
///
/// ```ignore
/// let schedule = doses! { 0.0 => 1.0, 8.0 => 0.5 };
/// ```
#[macro_export]
macro_rules! doses {
    ($($offset:expr => $magnitude:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut schedule = $crate::data::DoseSchedule::new();
        $(schedule.push($offset, $magnitude);)*
        schedule
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unit_dose_at_zero() {
        let schedule = DoseSchedule::default();
        assert_eq!(schedule.doses(), &[Dose::new(0.0, 1.0)]);
    }

    #[test]
    fn test_doses_macro() {
        let schedule = doses! { 0.0 => 1.0, 8.0 => 0.5 };
        assert_eq!(schedule, DoseSchedule::from([(0.0, 1.0), (8.0, 0.5)]));
        assert!(doses! {}.is_empty());
    }

    #[test]
    fn test_from_columns_repeats_last_value() {
        let schedule = DoseSchedule::from_columns(&[0.0, 12.0, 24.0], &[2.0]);
        assert_eq!(
            schedule,
            DoseSchedule::from([(0.0, 2.0), (12.0, 2.0), (24.0, 2.0)])
        );

        let schedule = DoseSchedule::from_columns(&[6.0], &[1.0, 0.5]);
        assert_eq!(schedule, DoseSchedule::from([(6.0, 1.0), (6.0, 0.5)]));
    }

    #[test]
    fn test_from_columns_empty() {
        assert!(DoseSchedule::from_columns(&[], &[1.0]).is_empty());
        assert!(DoseSchedule::from_columns(&[1.0], &[]).is_empty());
    }

    #[test]
    fn test_transformations() {
        let schedule = doses! { 0.0 => 1.0, 4.0 => 3.0 };
        assert_eq!(schedule.total(), 4.0);
        assert_eq!(schedule.scaled(2.0), doses! { 0.0 => 2.0, 4.0 => 6.0 });
        assert_eq!(schedule.shifted(-1.0), doses! { -1.0 => 1.0, 3.0 => 3.0 });
        assert_eq!(
            schedule.merged(&doses! { 8.0 => 0.5 }),
            doses! { 0.0 => 1.0, 4.0 => 3.0, 8.0 => 0.5 }
        );
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        assert!(doses! { f64::NAN => 1.0 }.validate().is_err());
        assert!(doses! { 0.0 => f64::INFINITY }.validate().is_err());
        assert!(doses! { -3.0 => -1.0 }.validate().is_ok());
    }
}
