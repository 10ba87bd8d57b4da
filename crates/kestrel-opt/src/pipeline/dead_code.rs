//! Dead-code elimination stage
//!
//! Consumes the tables of the backward liveness analysis: dead operations
//! are suppressed, redirectable branches become unconditional jumps, and
//! gotos are forwarded through blocks that can be skipped. The analysis
//! itself runs as a preparatory phase at construction, before the copier
//! starts.

use crate::analysis::dead_code::{DeadCodeAnalysis, DeadCodeResult};
use crate::ir::graph::{Block, BlockIndex, Graph, Opcode, Operation, OpIndex};

use super::copier::CopyCtx;
use super::reduce::{Reducer, Reduction};

/// Stage that drops dead operations and simplifies control flow
pub struct DeadCodeReducer<N> {
    result: DeadCodeResult,
    next: N,
}

impl<N> DeadCodeReducer<N> {
    /// Analyze `input` (the preparatory phase) and build the stage
    pub fn new(input: &Graph, next: N) -> Self {
        DeadCodeReducer {
            result: DeadCodeAnalysis::new(input).run(),
            next,
        }
    }

    /// The analysis tables this stage consumes
    pub fn result(&self) -> &DeadCodeResult {
        &self.result
    }
}

impl<N: Reducer> Reducer for DeadCodeReducer<N> {
    fn bind_block(&mut self, cx: &mut CopyCtx<'_>, new_block: BlockIndex, origin: &Block) {
        self.next.bind_block(cx, new_block, origin);
    }

    fn reduce(&mut self, cx: &mut CopyCtx<'_>, index: OpIndex, op: &Operation) -> Reduction {
        if self.result.is_dead(index) {
            return Reduction::Eliminated;
        }
        match op.opcode {
            Opcode::Branch { .. } => {
                if let Some(&target) = self.result.branch_targets.get(&index) {
                    let target = cx.map_block(target);
                    let goto = cx.emit(Operation::new(Opcode::Goto { target }, vec![]));
                    return Reduction::Replaced(goto);
                }
            }
            Opcode::Goto { target } => {
                if let Some(forwarded) = self.result.forward_target(target) {
                    let target = cx.map_block(forwarded);
                    let goto = cx.emit(Operation::new(Opcode::Goto { target }, vec![]));
                    return Reduction::Replaced(goto);
                }
            }
            _ => {}
        }
        self.next.reduce(cx, index, op)
    }

    /// Successors after branch rewriting and goto forwarding; this is what
    /// the copier's reachability pre-pass walks, so blocks that become
    /// unreferenced are never emitted.
    fn block_successors(&mut self, input: &Graph, block: BlockIndex) -> Vec<BlockIndex> {
        if let Some(term) = input.terminator(block) {
            if let Some(&target) = self.result.branch_targets.get(&term) {
                return vec![target];
            }
            if let Opcode::Goto { target } = input.get(term).opcode {
                if let Some(forwarded) = self.result.forward_target(target) {
                    return vec![forwarded];
                }
            }
        }
        input.successors(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::GraphBuilder;
    use crate::ir::graph::BlockKind;
    use crate::pipeline::copier::GraphCopier;
    use crate::pipeline::reduce::Identity;

    #[test]
    fn test_dead_ops_not_emitted() {
        let mut b = GraphBuilder::new();
        let x = b.word32_constant(1);
        let y = b.word32_constant(2);
        b.word32_add(x, y);
        b.return_value(x);
        let input = b.finish();

        let chain = DeadCodeReducer::new(&input, Identity);
        let output = GraphCopier::new(chain).run(&input);

        // Only the returned constant and the return survive.
        assert_eq!(output.op_count(), 2);
        assert!(!output
            .blocks()
            .iter()
            .flat_map(|block| block.ops.iter())
            .any(|&i| matches!(output.get(i).opcode, Opcode::Word32Add)));
    }

    #[test]
    fn test_branch_over_empty_diamond_becomes_goto() {
        let mut b = GraphBuilder::new();
        let left = b.create_block(BlockKind::Plain);
        let right = b.create_block(BlockKind::Plain);
        let merge = b.create_block(BlockKind::Merge);

        let cond = b.parameter(0);
        b.branch(cond, left, right);
        b.switch_to_block(left);
        b.goto(merge);
        b.switch_to_block(right);
        b.goto(merge);
        b.switch_to_block(merge);
        let ret = b.word32_constant(0);
        b.return_value(ret);
        let input = b.finish();

        let chain = DeadCodeReducer::new(&input, Identity);
        let output = GraphCopier::new(chain).run(&input);

        // Entry jumps straight to the merge; the empty arms are gone.
        assert_eq!(output.block_count(), 2);
        let entry_term = output.terminator(BlockIndex(0)).unwrap();
        assert!(matches!(
            output.get(entry_term).opcode,
            Opcode::Goto { target: BlockIndex(1) }
        ));
        // The merge has a single predecessor now, and the condition died
        // with the branch.
        assert_eq!(output.predecessors(BlockIndex(1)).len(), 1);
        assert!(!output
            .blocks()
            .iter()
            .flat_map(|block| block.ops.iter())
            .any(|&i| matches!(output.get(i).opcode, Opcode::Parameter { .. })));
    }

    #[test]
    fn test_goto_forwarded_through_empty_block() {
        let mut b = GraphBuilder::new();
        let hop = b.create_block(BlockKind::Plain);
        let merge_a = b.create_block(BlockKind::Merge);

        // entry -> hop -> merge_a, where hop is empty. A single-pred
        // "merge" models a join whose other edge was already folded away
        // upstream.
        b.goto(hop);
        b.switch_to_block(hop);
        b.goto(merge_a);
        b.switch_to_block(merge_a);
        let ret = b.word32_constant(3);
        b.return_value(ret);
        let input = b.finish();

        let chain = DeadCodeReducer::new(&input, Identity);
        let output = GraphCopier::new(chain).run(&input);

        // hop is skipped: entry jumps directly to the merge.
        assert_eq!(output.block_count(), 2);
        let entry_term = output.terminator(BlockIndex(0)).unwrap();
        assert!(matches!(
            output.get(entry_term).opcode,
            Opcode::Goto { target: BlockIndex(1) }
        ));
    }

    #[test]
    fn test_live_branch_kept() {
        use crate::ir::types::ValueRep;
        let mut b = GraphBuilder::new();
        let left = b.create_block(BlockKind::Plain);
        let right = b.create_block(BlockKind::Plain);
        let merge = b.create_block(BlockKind::Merge);

        let cond = b.parameter(0);
        b.branch(cond, left, right);
        b.switch_to_block(left);
        let one = b.word32_constant(1);
        b.goto(merge);
        b.switch_to_block(right);
        let two = b.word32_constant(2);
        b.goto(merge);
        b.switch_to_block(merge);
        let phi = b.phi(vec![one, two], ValueRep::Word32);
        b.return_value(phi);
        let input = b.finish();

        let chain = DeadCodeReducer::new(&input, Identity);
        let output = GraphCopier::new(chain).run(&input);

        assert_eq!(output.block_count(), 4);
        assert_eq!(output.op_count(), input.op_count());
        let entry_term = output.terminator(BlockIndex(0)).unwrap();
        assert!(matches!(output.get(entry_term).opcode, Opcode::Branch { .. }));
    }
}
