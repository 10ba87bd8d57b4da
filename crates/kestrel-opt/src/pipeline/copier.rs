//! Graph-to-graph copier
//!
//! Performs one full pass: every reachable input block is visited once, in
//! index order; every operation is offered to the reducer chain and
//! default-copied when all stages decline. Input blocks that no emitted
//! terminator references are skipped entirely. The variable resolver is
//! bound once per emitted block and is available to every stage through
//! the copy context.

use crate::ir::graph::{Block, BlockIndex, Graph, Opcode, Operation, OpIndex};
use crate::variables::VariableResolver;

use super::reduce::{Reducer, Reduction};

/// Shared state of one copy pass: the read-only input graph, the output
/// graph under construction, and the input→output mappings.
pub struct CopyCtx<'a> {
    /// The graph being copied; read-only for the duration of the pass
    pub input: &'a Graph,
    /// The graph being built
    pub output: Graph,
    /// Variables introduced by stages, resolved per control-flow path
    pub variables: VariableResolver,
    op_map: Vec<OpIndex>,
    block_map: Vec<BlockIndex>,
    /// Loop-phi back-edge inputs awaiting their mapping
    pending_loop_phis: Vec<(OpIndex, usize, OpIndex)>,
}

impl<'a> CopyCtx<'a> {
    fn new(input: &'a Graph) -> Self {
        CopyCtx {
            input,
            output: Graph::new(),
            variables: VariableResolver::new(),
            op_map: vec![OpIndex::INVALID; input.op_count()],
            block_map: vec![BlockIndex::INVALID; input.block_count()],
            pending_loop_phis: Vec::new(),
        }
    }

    /// The output operation an input operation was copied to.
    ///
    /// Asking for an operation that was suppressed (or not yet visited) is
    /// a structural bug in the caller.
    pub fn map_op(&self, index: OpIndex) -> OpIndex {
        let mapped = self.op_map[index.0 as usize];
        debug_assert!(mapped.is_valid(), "use of {} which has no output mapping", index);
        mapped
    }

    /// Record the output mapping of an input operation
    pub fn map_to(&mut self, index: OpIndex, output: OpIndex) {
        self.op_map[index.0 as usize] = output;
    }

    /// The output block an input block was allocated to.
    ///
    /// Only reachable blocks have one; referencing a skipped block is a
    /// structural bug.
    pub fn map_block(&self, block: BlockIndex) -> BlockIndex {
        let mapped = self.block_map[block.0 as usize];
        debug_assert!(mapped.is_valid(), "reference to skipped block {}", block);
        mapped
    }

    /// Emit an operation into the bound output block
    pub fn emit(&mut self, op: Operation) -> OpIndex {
        self.output.emit(op)
    }

    /// Copy one input operation unchanged: block targets and value inputs
    /// are remapped, everything else is preserved.
    pub fn copy_default(&mut self, index: OpIndex) -> OpIndex {
        let op = self.input.get(index);
        let opcode = match &op.opcode {
            Opcode::Goto { target } => Opcode::Goto { target: self.map_block(*target) },
            Opcode::Branch { if_true, if_false } => Opcode::Branch {
                if_true: self.map_block(*if_true),
                if_false: self.map_block(*if_false),
            },
            Opcode::Switch { cases, default } => Opcode::Switch {
                cases: cases.iter().map(|(value, b)| (*value, self.map_block(*b))).collect(),
                default: self.map_block(*default),
            },
            other => other.clone(),
        };

        let mut fixups: Vec<(usize, OpIndex)> = Vec::new();
        let inputs: Vec<OpIndex> = op
            .inputs
            .iter()
            .enumerate()
            .map(|(nth, &input)| {
                let mapped = self.op_map[input.0 as usize];
                if !mapped.is_valid() && matches!(op.opcode, Opcode::Phi) && input.0 > index.0 {
                    // Loop-phi back edge: the producer has not been copied
                    // yet; patched once the loop body lands.
                    fixups.push((nth, input));
                    return OpIndex::INVALID;
                }
                debug_assert!(mapped.is_valid(), "use of {} which has no output mapping", input);
                mapped
            })
            .collect();

        let new_index = self.output.emit(Operation {
            opcode,
            inputs,
            rep: op.rep,
            required_when_unused: op.required_when_unused,
            saturated_use_count: 0,
        });
        for (nth, input) in fixups {
            self.pending_loop_phis.push((new_index, nth, input));
        }
        new_index
    }

    fn bind_block(&mut self, new_block: BlockIndex, origin: &Block) {
        self.output.bind(new_block);
        self.variables.bind(&mut self.output, new_block, origin);
    }

    fn finish(mut self) -> Graph {
        for (phi, nth, input) in std::mem::take(&mut self.pending_loop_phis) {
            let mapped = self.op_map[input.0 as usize];
            debug_assert!(mapped.is_valid(), "loop-phi back edge {} was never copied", input);
            self.output.replace_input(phi, nth, mapped);
        }
        self.output
    }
}

/// Drives one copy pass with a fixed reducer chain
pub struct GraphCopier<R: Reducer> {
    reducer: R,
}

impl<R: Reducer> GraphCopier<R> {
    /// Create a copier over an already-constructed chain
    pub fn new(reducer: R) -> Self {
        GraphCopier { reducer }
    }

    /// Copy `input` into a fresh graph, consulting the chain for every
    /// block and operation.
    pub fn run(mut self, input: &Graph) -> Graph {
        let mut cx = CopyCtx::new(input);

        // Reachability over the stage-rewritten control flow: a block only
        // exists in the output if some emitted terminator will reach it.
        let block_count = input.block_count();
        let mut reachable = vec![false; block_count];
        if block_count > 0 {
            reachable[0] = true;
            let mut stack = vec![BlockIndex(0)];
            while let Some(block) = stack.pop() {
                for succ in self.reducer.block_successors(input, block) {
                    if !reachable[succ.0 as usize] {
                        reachable[succ.0 as usize] = true;
                        stack.push(succ);
                    }
                }
            }
        }
        for index in 0..block_count {
            if reachable[index] {
                let kind = input.block(BlockIndex(index as u32)).kind;
                cx.block_map[index] = cx.output.add_block(kind);
            }
        }

        for index in 0..block_count {
            let out_block = cx.block_map[index];
            if !out_block.is_valid() {
                continue;
            }
            let origin = input.block(BlockIndex(index as u32));
            cx.bind_block(out_block, origin);
            self.reducer.bind_block(&mut cx, out_block, origin);

            for &op_index in &origin.ops {
                let op = input.get(op_index);
                match self.reducer.reduce(&mut cx, op_index, op) {
                    Reduction::NoChange => {
                        let new_index = cx.copy_default(op_index);
                        cx.map_to(op_index, new_index);
                    }
                    Reduction::Replaced(new_index) => cx.map_to(op_index, new_index),
                    Reduction::Eliminated => {}
                }
            }
        }

        cx.finish()
    }
}
