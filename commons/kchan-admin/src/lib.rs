pub mod config;
pub mod error;
pub mod traits;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "strimzi")]
pub mod strimzi;

pub use config::*;
pub use error::*;
pub use traits::*;
