//! Local development configuration

mod local;

pub use local::*;
