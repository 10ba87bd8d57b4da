//! Constant folding stage
//!
//! Optional peer stage: folds word32 and float64 arithmetic whose inputs
//! already resolved to constants in the output graph, and declines on
//! everything else.
//!
//! `Word32Add(Word32Constant(3), Word32Constant(5))` → `Word32Constant(8)`

use crate::ir::graph::{Block, BlockIndex, Graph, Opcode, Operation, OpIndex};

use super::copier::CopyCtx;
use super::reduce::{Reducer, Reduction};

/// Stage that folds arithmetic on constant operands
pub struct ConstFoldReducer<N> {
    next: N,
}

impl<N> ConstFoldReducer<N> {
    /// Build the stage in front of `next`
    pub fn new(next: N) -> Self {
        ConstFoldReducer { next }
    }
}

impl<N: Reducer> Reducer for ConstFoldReducer<N> {
    fn bind_block(&mut self, cx: &mut CopyCtx<'_>, new_block: BlockIndex, origin: &Block) {
        self.next.bind_block(cx, new_block, origin);
    }

    fn reduce(&mut self, cx: &mut CopyCtx<'_>, index: OpIndex, op: &Operation) -> Reduction {
        let folded = match op.opcode {
            Opcode::Word32Add | Opcode::Word32Sub | Opcode::Word32Mul => {
                match (word32_input(cx, op, 0), word32_input(cx, op, 1)) {
                    (Some(left), Some(right)) => {
                        let value = match op.opcode {
                            Opcode::Word32Add => left.wrapping_add(right),
                            Opcode::Word32Sub => left.wrapping_sub(right),
                            _ => left.wrapping_mul(right),
                        };
                        Some(Opcode::Word32Constant { value })
                    }
                    _ => None,
                }
            }
            Opcode::Float64Add | Opcode::Float64Mul => {
                match (float64_input(cx, op, 0), float64_input(cx, op, 1)) {
                    (Some(left), Some(right)) => {
                        let value = match op.opcode {
                            Opcode::Float64Add => left + right,
                            _ => left * right,
                        };
                        Some(Opcode::Float64Constant { value })
                    }
                    _ => None,
                }
            }
            _ => None,
        };

        match folded {
            Some(opcode) => Reduction::Replaced(cx.emit(Operation::new(opcode, vec![]))),
            None => self.next.reduce(cx, index, op),
        }
    }

    fn block_successors(&mut self, input: &Graph, block: BlockIndex) -> Vec<BlockIndex> {
        self.next.block_successors(input, block)
    }
}

/// The nth input of `op`, if it resolved to a word32 constant in the output
fn word32_input(cx: &CopyCtx<'_>, op: &Operation, nth: usize) -> Option<u32> {
    match cx.output.get(cx.map_op(op.inputs[nth])).opcode {
        Opcode::Word32Constant { value } => Some(value),
        _ => None,
    }
}

/// The nth input of `op`, if it resolved to a float64 constant in the output
fn float64_input(cx: &CopyCtx<'_>, op: &Operation, nth: usize) -> Option<f64> {
    match cx.output.get(cx.map_op(op.inputs[nth])).opcode {
        Opcode::Float64Constant { value } => Some(value),
        _ => None,
    }
}
