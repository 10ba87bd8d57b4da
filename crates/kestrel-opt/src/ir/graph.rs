//! Graph IR: operations, blocks, and the graph store
//!
//! The IR is a graph of basic blocks in SSA form. Operations are immutable
//! once emitted and addressed by position-stable `OpIndex`, never by
//! pointer, so one graph can be read while a second is being built from it.
//! Construction is append-only: `bind` a block, then `emit` operations into
//! it; each block ends with exactly one control operation.

use super::types::ValueRep;

/// Stable identifier of an operation in a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpIndex(pub u32);

impl OpIndex {
    /// Sentinel for "no operation" (unset variable, missing mapping)
    pub const INVALID: OpIndex = OpIndex(u32::MAX);

    /// Whether this index refers to an actual operation
    pub fn is_valid(&self) -> bool {
        *self != OpIndex::INVALID
    }
}

impl std::fmt::Display for OpIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "n{}", self.0)
        } else {
            write!(f, "n<invalid>")
        }
    }
}

/// Stable identifier of a basic block in a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockIndex(pub u32);

impl BlockIndex {
    /// Sentinel for "no block"
    pub const INVALID: BlockIndex = BlockIndex(u32::MAX);

    /// Whether this index refers to an actual block
    pub fn is_valid(&self) -> bool {
        *self != BlockIndex::INVALID
    }
}

impl std::fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Which runtime-provided constant a `FrameConstant` produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameConstantKind {
    /// Current frame pointer
    FramePointer,
    /// Caller's frame pointer
    ParentFramePointer,
}

/// The opcode of an operation, with its immediates.
///
/// Value inputs live in `Operation::inputs`, in fixed order per opcode;
/// immediates (constants, offsets, block targets) live here.
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    // ===== Values =====
    /// Function parameter by index
    Parameter { index: u16 },
    Word32Constant { value: u32 },
    Word64Constant { value: u64 },
    Float64Constant { value: f64 },
    /// Frame pointer / parent frame pointer
    FrameConstant { kind: FrameConstantKind },
    /// Stack check: is the stack pointer above the given limit (input 0)
    StackPointerGreaterThan,

    // ===== Word32 arithmetic / comparison =====
    Word32Add,
    Word32Sub,
    Word32Mul,
    Word32Equal,
    Word32LessThan,

    // ===== Float64 arithmetic =====
    Float64Add,
    Float64Mul,

    // ===== Memory =====
    /// Load from input 0 (base) at a fixed offset
    Load { offset: i32 },
    /// Store input 1 (value) to input 0 (base) at a fixed offset
    Store { offset: i32 },

    // ===== Runtime =====
    /// Call to a function by index; inputs are the arguments
    Call { callee: u32 },
    /// Exit to the interpreter; input 0 is the frame state
    Deoptimize,
    /// Snapshot of the abstract interpreter frame. When `has_parent`,
    /// input 0 is the inlined parent frame state; remaining inputs are the
    /// frame's values in slot order.
    FrameState { has_parent: bool },

    // ===== Composites =====
    /// Grouping of values; inputs are the elements
    Tuple,
    /// Extract element `index` of a tuple (input 0)
    Projection { index: u16 },
    /// input 0 ? input 1 : input 2
    Select,
    /// SSA merge; one input per predecessor, in predecessor order
    Phi,

    // ===== Control (block terminators) =====
    Goto { target: BlockIndex },
    /// Conditional branch on input 0
    Branch { if_true: BlockIndex, if_false: BlockIndex },
    /// Multi-way dispatch on input 0
    Switch { cases: Vec<(u32, BlockIndex)>, default: BlockIndex },
    /// Return; input 0 is the value, if any
    Return,
    /// Control never reaches past this point
    Unreachable,
}

impl Opcode {
    /// Whether this opcode terminates a block
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Opcode::Goto { .. }
                | Opcode::Branch { .. }
                | Opcode::Switch { .. }
                | Opcode::Return
                | Opcode::Unreachable
        )
    }

    /// Whether an operation with this opcode must be kept even with zero
    /// uses. The upstream builder relies on this default; eliminating any
    /// of these would drop an observable effect.
    pub fn is_required_when_unused(&self) -> bool {
        matches!(
            self,
            Opcode::Store { .. }
                | Opcode::Call { .. }
                | Opcode::Deoptimize
                | Opcode::Switch { .. }
                | Opcode::Return
        )
    }

    /// Successor blocks if this is a control opcode
    pub fn successors(&self) -> Vec<BlockIndex> {
        match self {
            Opcode::Goto { target } => vec![*target],
            Opcode::Branch { if_true, if_false } => vec![*if_true, *if_false],
            Opcode::Switch { cases, default } => {
                let mut succs: Vec<BlockIndex> = cases.iter().map(|(_, b)| *b).collect();
                succs.push(*default);
                succs
            }
            _ => vec![],
        }
    }

    /// The representation an operation with this opcode produces, if fixed
    /// by the opcode itself.
    pub fn result_rep(&self) -> Option<ValueRep> {
        match self {
            Opcode::Word32Constant { .. }
            | Opcode::StackPointerGreaterThan
            | Opcode::Word32Add
            | Opcode::Word32Sub
            | Opcode::Word32Mul
            | Opcode::Word32Equal
            | Opcode::Word32LessThan => Some(ValueRep::Word32),
            Opcode::Word64Constant { .. } | Opcode::FrameConstant { .. } => Some(ValueRep::Word64),
            Opcode::Float64Constant { .. } | Opcode::Float64Add | Opcode::Float64Mul => {
                Some(ValueRep::Float64)
            }
            Opcode::Parameter { .. } | Opcode::Load { .. } | Opcode::Call { .. } => {
                Some(ValueRep::Tagged)
            }
            _ => None,
        }
    }
}

/// An IR operation: opcode, value inputs, and bookkeeping flags.
///
/// Inputs always reference operations earlier in the same block or in a
/// dominating block (the graph is in SSA form).
#[derive(Debug, Clone)]
pub struct Operation {
    pub opcode: Opcode,
    pub inputs: Vec<OpIndex>,
    /// Representation of the result, if the operation produces a value
    pub rep: Option<ValueRep>,
    /// Must never be eliminated even with zero uses
    pub required_when_unused: bool,
    /// Number of uses, saturating at `u8::MAX`
    pub saturated_use_count: u8,
}

impl Operation {
    /// Create an operation; the flags and representation come from the
    /// opcode defaults.
    pub fn new(opcode: Opcode, inputs: Vec<OpIndex>) -> Self {
        let rep = opcode.result_rep();
        let required_when_unused = opcode.is_required_when_unused();
        Operation {
            opcode,
            inputs,
            rep,
            required_when_unused,
            saturated_use_count: 0,
        }
    }

    /// Create an operation with an explicit result representation
    pub fn with_rep(opcode: Opcode, inputs: Vec<OpIndex>, rep: ValueRep) -> Self {
        let required_when_unused = opcode.is_required_when_unused();
        Operation {
            opcode,
            inputs,
            rep: Some(rep),
            required_when_unused,
            saturated_use_count: 0,
        }
    }

    /// Whether this operation terminates a block
    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }
}

/// What shape of control flow enters a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Entry block or single-predecessor branch target
    Plain,
    /// Join of several forward edges; may contain phis
    Merge,
    /// Loop header; the last predecessor is the back edge
    Loop,
}

/// A basic block: an ordered run of operations ending in one control op
#[derive(Debug, Clone)]
pub struct Block {
    pub index: BlockIndex,
    pub kind: BlockKind,
    /// Operations in emission order; the last one is the terminator
    pub ops: Vec<OpIndex>,
    /// Predecessors in edge order; for loop headers the back edge is last
    pub predecessors: Vec<BlockIndex>,
}

/// A graph of blocks under construction or being read.
///
/// The graph owns all operation and block storage; everything is addressed
/// by index so that side tables can be plain `Vec`s. `emit` maintains
/// predecessor lists (from control-op targets) and saturating use counts
/// (from inputs).
#[derive(Debug, Default)]
pub struct Graph {
    ops: Vec<Operation>,
    blocks: Vec<Block>,
    current: Option<BlockIndex>,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Graph::default()
    }

    /// Add a new, unbound block and return its index
    pub fn add_block(&mut self, kind: BlockKind) -> BlockIndex {
        let index = BlockIndex(self.blocks.len() as u32);
        self.blocks.push(Block {
            index,
            kind,
            ops: vec![],
            predecessors: vec![],
        });
        index
    }

    /// Direct emission into the given block from now on.
    ///
    /// Blocks must be bound in index order during a copy pass; re-binding a
    /// block that already has a terminator is a structural bug.
    pub fn bind(&mut self, block: BlockIndex) {
        debug_assert!((block.0 as usize) < self.blocks.len(), "bind of unknown block");
        self.current = Some(block);
    }

    /// The block currently bound for emission
    pub fn current_block(&self) -> Option<BlockIndex> {
        self.current
    }

    /// Append an operation to the bound block and return its index.
    ///
    /// Control operations record the emitting block as a predecessor of
    /// each of their targets.
    pub fn emit(&mut self, op: Operation) -> OpIndex {
        let block = self.current.expect("emit with no block bound");
        let index = OpIndex(self.ops.len() as u32);

        for &input in &op.inputs {
            if let Some(producer) = self.ops.get_mut(input.0 as usize) {
                producer.saturated_use_count = producer.saturated_use_count.saturating_add(1);
            } else {
                // Only loop phis may reference their back-edge input before
                // it exists (forward index or a placeholder patched via
                // `replace_input`); that use is not counted.
                debug_assert!(
                    matches!(op.opcode, Opcode::Phi),
                    "dangling input reference on a non-phi operation"
                );
            }
        }

        if op.is_control() {
            for succ in op.opcode.successors() {
                self.blocks[succ.0 as usize].predecessors.push(block);
            }
        }

        self.ops.push(op);
        self.blocks[block.0 as usize].ops.push(index);
        index
    }

    /// Get an operation by index
    pub fn get(&self, index: OpIndex) -> &Operation {
        &self.ops[index.0 as usize]
    }

    /// Get a block by index
    pub fn block(&self, index: BlockIndex) -> &Block {
        &self.blocks[index.0 as usize]
    }

    /// All blocks in index order
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of operations
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// The terminator of a block, if it has one yet
    pub fn terminator(&self, block: BlockIndex) -> Option<OpIndex> {
        let last = *self.blocks[block.0 as usize].ops.last()?;
        self.ops[last.0 as usize].is_control().then_some(last)
    }

    /// Successor blocks of a block (empty until its terminator is emitted)
    pub fn successors(&self, block: BlockIndex) -> Vec<BlockIndex> {
        match self.terminator(block) {
            Some(term) => self.get(term).opcode.successors(),
            None => vec![],
        }
    }

    /// Predecessor blocks of a block, in edge order
    pub fn predecessors(&self, block: BlockIndex) -> &[BlockIndex] {
        &self.blocks[block.0 as usize].predecessors
    }

    /// Saturating use count of an operation
    pub fn use_count(&self, index: OpIndex) -> u8 {
        self.ops[index.0 as usize].saturated_use_count
    }

    /// Patch a loop phi's back-edge input once its producer exists. The
    /// only sanctioned mutation of an emitted operation.
    pub fn replace_input(&mut self, op: OpIndex, nth: usize, with: OpIndex) {
        debug_assert!(with.is_valid(), "replace_input with an invalid index");
        debug_assert!(
            matches!(self.ops[op.0 as usize].opcode, Opcode::Phi),
            "replace_input on a non-phi operation"
        );
        self.ops[op.0 as usize].inputs[nth] = with;
        let producer = &mut self.ops[with.0 as usize];
        producer.saturated_use_count = producer.saturated_use_count.saturating_add(1);
    }
}
