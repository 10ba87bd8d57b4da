//! Graph construction helpers
//!
//! Convenience layer the front end (and the tests) use to build well-formed
//! input graphs. The builder tracks a current block and offers one emit
//! helper per opcode family; it is a thin wrapper over `Graph::emit`.

use super::graph::{BlockIndex, BlockKind, FrameConstantKind, Graph, Opcode, Operation, OpIndex};
use super::types::ValueRep;

/// Builder that simplifies graph construction
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    /// Create a builder with a bound entry block
    pub fn new() -> Self {
        let mut graph = Graph::new();
        let entry = graph.add_block(BlockKind::Plain);
        graph.bind(entry);
        GraphBuilder { graph }
    }

    /// Create a new basic block
    pub fn create_block(&mut self, kind: BlockKind) -> BlockIndex {
        self.graph.add_block(kind)
    }

    /// Switch to emitting into a different block
    pub fn switch_to_block(&mut self, block: BlockIndex) {
        self.graph.bind(block);
    }

    /// The block currently receiving operations
    pub fn current_block(&self) -> BlockIndex {
        self.graph.current_block().expect("builder always has a bound block")
    }

    /// Emit a raw operation
    pub fn emit(&mut self, op: Operation) -> OpIndex {
        self.graph.emit(op)
    }

    /// Finish construction and return the graph
    pub fn finish(self) -> Graph {
        self.graph
    }

    /// Read access to the graph under construction
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    // ===== Values =====

    pub fn parameter(&mut self, index: u16) -> OpIndex {
        self.emit(Operation::new(Opcode::Parameter { index }, vec![]))
    }

    pub fn word32_constant(&mut self, value: u32) -> OpIndex {
        self.emit(Operation::new(Opcode::Word32Constant { value }, vec![]))
    }

    pub fn word64_constant(&mut self, value: u64) -> OpIndex {
        self.emit(Operation::new(Opcode::Word64Constant { value }, vec![]))
    }

    pub fn float64_constant(&mut self, value: f64) -> OpIndex {
        self.emit(Operation::new(Opcode::Float64Constant { value }, vec![]))
    }

    pub fn frame_constant(&mut self, kind: FrameConstantKind) -> OpIndex {
        self.emit(Operation::new(Opcode::FrameConstant { kind }, vec![]))
    }

    pub fn stack_pointer_greater_than(&mut self, limit: OpIndex) -> OpIndex {
        self.emit(Operation::new(Opcode::StackPointerGreaterThan, vec![limit]))
    }

    pub fn word32_add(&mut self, left: OpIndex, right: OpIndex) -> OpIndex {
        self.emit(Operation::new(Opcode::Word32Add, vec![left, right]))
    }

    pub fn word32_sub(&mut self, left: OpIndex, right: OpIndex) -> OpIndex {
        self.emit(Operation::new(Opcode::Word32Sub, vec![left, right]))
    }

    pub fn word32_mul(&mut self, left: OpIndex, right: OpIndex) -> OpIndex {
        self.emit(Operation::new(Opcode::Word32Mul, vec![left, right]))
    }

    pub fn word32_equal(&mut self, left: OpIndex, right: OpIndex) -> OpIndex {
        self.emit(Operation::new(Opcode::Word32Equal, vec![left, right]))
    }

    pub fn word32_less_than(&mut self, left: OpIndex, right: OpIndex) -> OpIndex {
        self.emit(Operation::new(Opcode::Word32LessThan, vec![left, right]))
    }

    pub fn float64_add(&mut self, left: OpIndex, right: OpIndex) -> OpIndex {
        self.emit(Operation::new(Opcode::Float64Add, vec![left, right]))
    }

    pub fn float64_mul(&mut self, left: OpIndex, right: OpIndex) -> OpIndex {
        self.emit(Operation::new(Opcode::Float64Mul, vec![left, right]))
    }

    pub fn load(&mut self, base: OpIndex, offset: i32) -> OpIndex {
        self.emit(Operation::new(Opcode::Load { offset }, vec![base]))
    }

    pub fn store(&mut self, base: OpIndex, value: OpIndex, offset: i32) -> OpIndex {
        self.emit(Operation::new(Opcode::Store { offset }, vec![base, value]))
    }

    pub fn call(&mut self, callee: u32, args: Vec<OpIndex>) -> OpIndex {
        self.emit(Operation::new(Opcode::Call { callee }, args))
    }

    pub fn deoptimize(&mut self, frame_state: OpIndex) -> OpIndex {
        self.emit(Operation::new(Opcode::Deoptimize, vec![frame_state]))
    }

    /// Emit a frame state over the given values; `parent` prepends an
    /// inlined parent frame state.
    pub fn frame_state(&mut self, parent: Option<OpIndex>, values: Vec<OpIndex>) -> OpIndex {
        let has_parent = parent.is_some();
        let mut inputs = Vec::with_capacity(values.len() + 1);
        if let Some(p) = parent {
            inputs.push(p);
        }
        inputs.extend(values);
        self.emit(Operation::new(Opcode::FrameState { has_parent }, inputs))
    }

    pub fn tuple(&mut self, elements: Vec<OpIndex>) -> OpIndex {
        self.emit(Operation::new(Opcode::Tuple, elements))
    }

    pub fn projection(&mut self, tuple: OpIndex, index: u16) -> OpIndex {
        self.emit(Operation::new(Opcode::Projection { index }, vec![tuple]))
    }

    pub fn select(&mut self, cond: OpIndex, if_true: OpIndex, if_false: OpIndex) -> OpIndex {
        self.emit(Operation::new(Opcode::Select, vec![cond, if_true, if_false]))
    }

    /// Emit a phi; one input per predecessor of the current block, in
    /// predecessor order.
    pub fn phi(&mut self, inputs: Vec<OpIndex>, rep: ValueRep) -> OpIndex {
        self.emit(Operation::with_rep(Opcode::Phi, inputs, rep))
    }

    // ===== Control =====

    pub fn goto(&mut self, target: BlockIndex) -> OpIndex {
        self.emit(Operation::new(Opcode::Goto { target }, vec![]))
    }

    pub fn branch(&mut self, cond: OpIndex, if_true: BlockIndex, if_false: BlockIndex) -> OpIndex {
        self.emit(Operation::new(Opcode::Branch { if_true, if_false }, vec![cond]))
    }

    pub fn switch(
        &mut self,
        selector: OpIndex,
        cases: Vec<(u32, BlockIndex)>,
        default: BlockIndex,
    ) -> OpIndex {
        self.emit(Operation::new(Opcode::Switch { cases, default }, vec![selector]))
    }

    pub fn return_value(&mut self, value: OpIndex) -> OpIndex {
        self.emit(Operation::new(Opcode::Return, vec![value]))
    }

    pub fn return_void(&mut self) -> OpIndex {
        self.emit(Operation::new(Opcode::Return, vec![]))
    }

    pub fn unreachable(&mut self) -> OpIndex {
        self.emit(Operation::new(Opcode::Unreachable, vec![]))
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_diamond() {
        let mut b = GraphBuilder::new();
        let then_block = b.create_block(BlockKind::Plain);
        let else_block = b.create_block(BlockKind::Plain);
        let merge = b.create_block(BlockKind::Merge);

        let cond = b.parameter(0);
        b.branch(cond, then_block, else_block);

        b.switch_to_block(then_block);
        let one = b.word32_constant(1);
        b.goto(merge);

        b.switch_to_block(else_block);
        let two = b.word32_constant(2);
        b.goto(merge);

        b.switch_to_block(merge);
        let phi = b.phi(vec![one, two], ValueRep::Word32);
        b.return_value(phi);

        let graph = b.finish();
        assert_eq!(graph.block_count(), 4);
        assert_eq!(graph.predecessors(merge), &[then_block, else_block]);
        assert_eq!(graph.get(phi).inputs.len(), 2);
    }

    #[test]
    fn test_builder_loop_back_edge_last() {
        let mut b = GraphBuilder::new();
        let header = b.create_block(BlockKind::Loop);
        let body = b.create_block(BlockKind::Plain);
        let exit = b.create_block(BlockKind::Plain);

        b.goto(header);

        b.switch_to_block(header);
        let cond = b.parameter(0);
        b.branch(cond, body, exit);

        b.switch_to_block(body);
        b.goto(header);

        b.switch_to_block(exit);
        b.return_void();

        let graph = b.finish();
        // Forward edge first, back edge last.
        assert_eq!(graph.predecessors(header), &[BlockIndex(0), body]);
    }
}
