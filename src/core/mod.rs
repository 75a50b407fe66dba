pub mod breaker;
pub mod config;
pub mod error;
pub mod registry;
pub mod stats;

pub use breaker::*;
pub use config::*;
pub use error::*;
pub use registry::*;
pub use stats::*;
