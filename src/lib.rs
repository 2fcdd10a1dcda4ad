//! Drug concentration curves from an elimination half-life and a time-to-peak.
//!
//! A [`DrugModel`] is calibrated once from two clinically reported numbers;
//! it then turns any [`DoseSchedule`] into a concentration curve on a uniform
//! time grid, normalized so that a unit dose peaks at 1.
//!
//! ```rust,ignore
//! use pkcurve::prelude::*;
//!
//! let drug = DrugModel::new(6.0, 1.5)?;
//! let values = drug.concentration(1441, 1.0 / 60.0, &doses! { 0.0 => 1.0, 8.0 => 0.5 })?;
//! ```

pub mod data;
pub mod drug;
pub mod error;
pub mod optimize;
pub mod simulator;

pub use crate::data::*;
pub use crate::drug::*;
pub use error::PkError;

pub mod prelude {
    pub mod data {
        pub use crate::data::{num_steps_for, ConcentrationTrace, Dose, DoseSchedule};
    }
    pub mod simulator {
        pub use crate::simulator::{
            concentration_at_time, observed_slope, propagate, InjectionSchedule, LinearPropagator,
        };
    }
    pub mod optimize {
        pub use crate::optimize::{RootError, RootFinder, RootFinderOptions};
    }

    pub use crate::data::{num_steps_for, ConcentrationTrace, Dose, DoseSchedule};
    pub use crate::doses;
    pub use crate::drug::{
        calibrate_many, CalibrationOptions, DrugModel, EvaluationStrategy,
    };
    pub use crate::PkError;
}
