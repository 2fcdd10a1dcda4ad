pub mod compartment;
pub mod propagator;

pub use compartment::{concentration_at_time, dose_step, observed_slope, propagate};
pub use propagator::{InjectionSchedule, LinearPropagator};

pub type T = f64;
pub type V = nalgebra::DVector<T>;
pub type M = nalgebra::DMatrix<T>;
