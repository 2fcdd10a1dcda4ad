use thiserror::Error;

use crate::optimize::RootError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PkError {
    /// A caller-supplied value is outside the domain of the model
    #[error("Invalid parameter: {param} = {value}")]
    InvalidParameter { param: String, value: String },

    /// The absorption phase could not be fitted to the requested time-to-peak
    #[error("Calibration failed: {0}")]
    CalibrationFailure(#[from] RootError),
}

impl PkError {
    pub(crate) fn invalid(param: &str, value: impl ToString) -> Self {
        PkError::InvalidParameter {
            param: param.to_string(),
            value: value.to_string(),
        }
    }
}
