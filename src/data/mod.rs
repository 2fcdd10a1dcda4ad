pub mod dose;
pub mod trace;

pub use dose::{Dose, DoseSchedule};
pub use trace::{num_steps_for, ConcentrationTrace};
