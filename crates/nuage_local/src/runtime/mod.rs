//! Runtime components for process management

pub mod process;

pub use process::*;
