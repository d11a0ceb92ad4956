//! CLI command implementations.

pub mod compile;
pub mod find;
pub mod sync;
