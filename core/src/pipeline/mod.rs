// presswork/src/pipeline/mod.rs

//! Defines `Pipeline`, its construction and modification, and the stage runner
//! that executes a planned pipeline.

pub mod definition;
pub(crate) mod execution;

pub use definition::Pipeline;
