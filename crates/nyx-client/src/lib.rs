pub mod client;
pub mod config;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::*;
pub use config::*;
pub use transport::*;

#[cfg(any(test, feature = "test-util"))]
pub use mock::*;
