//! Kestrel optimizing JIT middle tier
//!
//! Graph-based intermediate representation plus a composable rewrite
//! pipeline for the Kestrel VM's JIT compiler:
//! - **IR**: SSA-form graph of blocks and operations, addressed by stable
//!   indices (`ir` module)
//! - **Snapshot table**: versioned key/value scopes shaped like the control
//!   flow (`snapshot` module)
//! - **Variables**: per-path logical slots resolved to values or fresh phis
//!   (`variables` module)
//! - **Dead-code analysis**: backward fixpoint liveness and branch-redirect
//!   computation (`analysis` module)
//! - **Pipeline**: statically chained reducer stages driving one
//!   graph-to-graph copy (`pipeline` module)
//!
//! The front end hands in a graph in valid SSA form; the instruction
//! selector receives the output graph with dead operations absent and
//! eligible branches rewritten to jumps.
//!
//! # Example
//!
//! ```rust,ignore
//! use kestrel_opt::ir::GraphBuilder;
//! use kestrel_opt::pipeline::OptPipeline;
//!
//! let mut builder = GraphBuilder::new();
//! let x = builder.word32_constant(3);
//! let y = builder.word32_constant(5);
//! let sum = builder.word32_add(x, y);
//! builder.return_value(sum);
//!
//! let optimized = OptPipeline::new().run(&builder.finish()).unwrap();
//! ```

#![warn(rust_2018_idioms)]

pub mod analysis;
pub mod ir;
pub mod pipeline;
pub mod snapshot;
pub mod variables;

pub use analysis::{ControlState, DeadCodeAnalysis, DeadCodeResult, Liveness};
pub use ir::{Block, BlockIndex, BlockKind, Graph, GraphBuilder, Opcode, Operation, OpIndex, ValueRep};
pub use pipeline::{BailoutReason, OptPipeline, TierConfig};
pub use snapshot::{Snapshot, SnapshotTable};
pub use variables::{Variable, VariableResolver};
