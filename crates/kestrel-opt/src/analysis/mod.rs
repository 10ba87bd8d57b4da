//! Standalone graph analyses
//!
//! Analyses run over a read-only input graph in a distinct preparatory
//! phase and hand their result tables to the reducer stages that consume
//! them.

pub mod dead_code;

pub use dead_code::{ControlState, DeadCodeAnalysis, DeadCodeResult, Liveness};
