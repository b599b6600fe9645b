pub mod error;
pub mod trigger;

pub use error::*;
pub use trigger::*;
