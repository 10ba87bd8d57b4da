//! Reducer stage contract
//!
//! One pass over the input graph runs a statically composed chain of
//! stages: each stage is a generic struct parameterized by the next stage,
//! terminated by `Identity`, so the whole chain monomorphizes and inlines.
//! A stage may decline an operation (forward to the next stage and
//! ultimately the default copy), suppress it entirely, or emit replacement
//! operations into the output graph. Declining is the default, not an
//! error; aborting a copy is reserved for structural invariant violations,
//! which panic.

use crate::ir::graph::{Block, BlockIndex, Graph, Operation, OpIndex};

use super::copier::CopyCtx;

/// What a stage decided about one input operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// No opinion; the next stage (or the default copy) handles it
    NoChange,
    /// Suppress the operation: nothing is emitted and no mapping is made
    Eliminated,
    /// The operation was rewritten; the input index maps to this output
    /// operation
    Replaced(OpIndex),
}

/// One stage in the transformation chain.
///
/// Stages run in a fixed total order; a later stage only sees operations
/// already passed over by earlier ones. A stage that needs whole-graph
/// information runs its analysis in a preparatory phase (at construction,
/// before the copier starts) and only consumes the result here.
pub trait Reducer {
    /// Called once per emitted block, before any of its operations are
    /// reduced. `origin` is the input-graph block being copied.
    fn bind_block(&mut self, cx: &mut CopyCtx<'_>, new_block: BlockIndex, origin: &Block) {
        let _ = (cx, new_block, origin);
    }

    /// Decide what to do with one input operation. The default declines.
    fn reduce(&mut self, cx: &mut CopyCtx<'_>, index: OpIndex, op: &Operation) -> Reduction {
        let _ = (cx, index, op);
        Reduction::NoChange
    }

    /// The effective successors of an input block, after any control-flow
    /// rewriting this stage will perform. The copier's reachability
    /// pre-pass walks these; stages that rewrite terminators override,
    /// everything else forwards down the chain.
    fn block_successors(&mut self, input: &Graph, block: BlockIndex) -> Vec<BlockIndex> {
        input.successors(block)
    }
}

/// Terminal stage: declines everything, so the default copy applies
pub struct Identity;

impl Reducer for Identity {}
