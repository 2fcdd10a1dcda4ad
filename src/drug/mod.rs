pub mod calibration;
mod model;

pub use calibration::{
    calibrate, peak_time, peak_time_with, rate_from_half_life, Calibration, CalibrationOptions,
    CALIBRATION_CACHE_SIZE,
};
pub use model::{calibrate_many, DrugModel, EvaluationStrategy};
