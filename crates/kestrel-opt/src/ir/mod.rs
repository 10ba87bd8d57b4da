//! Graph intermediate representation
//!
//! SSA-form graph of basic blocks, addressed by stable indices. Includes
//! the append-only store, construction helpers, value representations, and
//! pretty-printing.

pub mod builder;
pub mod display;
pub mod graph;
pub mod types;

pub use builder::GraphBuilder;
pub use graph::{Block, BlockIndex, BlockKind, FrameConstantKind, Graph, Opcode, Operation, OpIndex};
pub use types::ValueRep;
