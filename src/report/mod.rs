//! Report rendering modules.

pub mod generator;

pub use generator::*;
