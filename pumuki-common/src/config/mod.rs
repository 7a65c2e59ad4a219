//! Configuration primitives shared by the Pumuki binaries.
//!
//! - Environment variable parsing with type safety and error accumulation
//! - Source tracking (default, config file, environment) for every value

pub mod env;
pub mod source;

pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, Sourced};
