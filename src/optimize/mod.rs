mod error;
pub mod root;

pub use error::RootError;
pub use root::{RootFinder, RootFinderOptions};
