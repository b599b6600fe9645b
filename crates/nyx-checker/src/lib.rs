pub mod checker;
pub mod nyx;
pub mod registry;

pub use checker::*;
pub use nyx::*;
pub use registry::*;
