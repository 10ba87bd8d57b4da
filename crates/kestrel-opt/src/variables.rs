//! Variable resolution across control flow
//!
//! Pipeline stages can introduce logical slots ("variables") whose concrete
//! value differs per control-flow path while an output graph is being
//! built. The resolver tracks one snapshot-table key per variable, seals a
//! scope per emitted block, and resolves reads after a merge to the correct
//! value, synthesizing phis (or recursively merged frame states) when the
//! predecessors disagree.

use rustc_hash::FxHashMap;

use crate::ir::graph::{Block, BlockIndex, BlockKind, Graph, Opcode, Operation, OpIndex};
use crate::ir::types::ValueRep;
use crate::snapshot::{Key, Snapshot, SnapshotTable};

/// A logical slot whose SSA value differs by control-flow path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variable(pub u32);

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Resolves variables to output-graph values, one scope per emitted block
#[derive(Debug, Default)]
pub struct VariableResolver {
    table: SnapshotTable<OpIndex>,
    /// Snapshot-table key per variable, created in lockstep
    keys: Vec<Key>,
    /// Declared representation hint per variable
    reps: Vec<Option<ValueRep>>,
    /// Sealed snapshot of every block emitted so far
    block_snapshots: FxHashMap<BlockIndex, Snapshot>,
    /// Block whose scope is currently open
    current_block: Option<BlockIndex>,
}

impl VariableResolver {
    /// Create a resolver with no variables and no open scope
    pub fn new() -> Self {
        VariableResolver::default()
    }

    /// Create a fresh variable, optionally declaring the representation its
    /// values will have. Variables without a representation can only be
    /// merged when one can be inferred from their value's opcode.
    pub fn new_fresh_variable(&mut self, rep: Option<ValueRep>) -> Variable {
        let variable = Variable(self.keys.len() as u32);
        let key = self.table.new_key(OpIndex::INVALID);
        self.keys.push(key);
        self.reps.push(rep);
        variable
    }

    /// Open the scope for `new_block`, sealing whichever block was
    /// previously open and merging the sealed snapshots of `new_block`'s
    /// predecessors. Must be called exactly once per block, before any
    /// `get`/`set` targeting it; `origin` is the input-graph block being
    /// copied.
    ///
    /// At a loop header only the forward predecessors have sealed
    /// snapshots; the back edge is not merged (snapshots form a tree).
    pub fn bind(&mut self, graph: &mut Graph, new_block: BlockIndex, origin: &Block) {
        if let Some(previous) = self.current_block.take() {
            let snapshot = self.table.seal();
            self.block_snapshots.insert(previous, snapshot);
        }

        let mut snapshots = Vec::new();
        for pred in graph.predecessors(new_block) {
            match self.block_snapshots.get(pred) {
                Some(&snapshot) => snapshots.push(snapshot),
                None => debug_assert!(
                    origin.kind == BlockKind::Loop,
                    "forward predecessor {} of {} has no sealed snapshot",
                    pred,
                    new_block
                ),
            }
        }

        let reps = &self.reps;
        self.table.start_new_snapshot(&snapshots, |key, values| {
            merge_values(graph, reps[key.index()], values)
        });
        self.current_block = Some(new_block);
    }

    /// The value of a variable in the current block.
    ///
    /// Reading a variable that was never set on some predecessor path, or
    /// whose values were non-mergeable across a merge, is a contract
    /// violation; checked in debug builds.
    pub fn get(&self, variable: Variable) -> OpIndex {
        let value = self.table.get(self.keys[variable.0 as usize]);
        debug_assert!(
            value.is_valid(),
            "read of {} with no value on this path",
            variable
        );
        value
    }

    /// The value of a variable, or `None` where `get` would be a contract
    /// violation.
    pub fn try_get(&self, variable: Variable) -> Option<OpIndex> {
        let value = self.table.get(self.keys[variable.0 as usize]);
        value.is_valid().then_some(value)
    }

    /// Assign a variable in the current block
    pub fn set(&mut self, variable: Variable, value: OpIndex) {
        self.table.set(self.keys[variable.0 as usize], value);
    }
}

/// Merge one variable's per-predecessor values at a block entry.
///
/// `values` is in predecessor order. Invalid on any path poisons the merge;
/// identical values are shared; otherwise a phi is synthesized with the
/// declared or inferred representation, and frame states are merged
/// structurally.
fn merge_values(graph: &mut Graph, rep: Option<ValueRep>, values: &[OpIndex]) -> OpIndex {
    if values.iter().any(|value| !value.is_valid()) {
        return OpIndex::INVALID;
    }
    if values.iter().all(|value| *value == values[0]) {
        return values[0];
    }
    if let Some(rep) = rep {
        return graph.emit(Operation::with_rep(Opcode::Phi, values.to_vec(), rep));
    }

    let first = graph.get(values[0]);
    let (opcode_class, first_rep) = (classify(&first.opcode), first.rep);
    match opcode_class {
        // Address-free opcodes with a known representation
        MergeClass::StackCheck => {
            graph.emit(Operation::with_rep(Opcode::Phi, values.to_vec(), ValueRep::Word32))
        }
        MergeClass::FrameConstant => {
            graph.emit(Operation::with_rep(Opcode::Phi, values.to_vec(), ValueRep::Word64))
        }
        MergeClass::FrameState => merge_frame_states(graph, values),
        // Unique, non-mergeable identity: reading such a variable across a
        // merge is a caller contract violation.
        MergeClass::NonMergeable => OpIndex::INVALID,
        MergeClass::Plain => match first_rep {
            Some(rep) => graph.emit(Operation::with_rep(Opcode::Phi, values.to_vec(), rep)),
            None => OpIndex::INVALID,
        },
    }
}

/// How a value's opcode behaves under a merge
enum MergeClass {
    StackCheck,
    FrameConstant,
    FrameState,
    NonMergeable,
    Plain,
}

fn classify(opcode: &Opcode) -> MergeClass {
    match opcode {
        Opcode::StackPointerGreaterThan => MergeClass::StackCheck,
        Opcode::FrameConstant { .. } => MergeClass::FrameConstant,
        Opcode::FrameState { .. } => MergeClass::FrameState,
        Opcode::Store { .. }
        | Opcode::Call { .. }
        | Opcode::Deoptimize
        | Opcode::Tuple
        | Opcode::Projection { .. }
        | Opcode::Select
        | Opcode::Goto { .. }
        | Opcode::Branch { .. }
        | Opcode::Switch { .. }
        | Opcode::Return
        | Opcode::Unreachable => MergeClass::NonMergeable,
        _ => MergeClass::Plain,
    }
}

/// Merge frame states field by field.
///
/// Fields that are pointer-identical across all predecessors are shared
/// untouched; differing fields are merged recursively (sub-frame-states
/// included), so phis are only synthesized for the slots that actually
/// diverge.
fn merge_frame_states(graph: &mut Graph, values: &[OpIndex]) -> OpIndex {
    let (has_parent, arity) = match &graph.get(values[0]).opcode {
        Opcode::FrameState { has_parent } => (*has_parent, graph.get(values[0]).inputs.len()),
        _ => return OpIndex::INVALID,
    };
    for &value in values {
        let op = graph.get(value);
        match op.opcode {
            Opcode::FrameState { has_parent: p } if p == has_parent && op.inputs.len() == arity => {}
            _ => {
                debug_assert!(false, "frame-state merge over mismatched frame states");
                return OpIndex::INVALID;
            }
        }
    }

    let mut inputs = Vec::with_capacity(arity);
    for field in 0..arity {
        let field_values: Vec<OpIndex> =
            values.iter().map(|&value| graph.get(value).inputs[field]).collect();
        if field_values.iter().all(|value| *value == field_values[0]) {
            inputs.push(field_values[0]);
            continue;
        }
        let first = graph.get(field_values[0]);
        let (is_frame_state, first_rep) =
            (matches!(first.opcode, Opcode::FrameState { .. }), first.rep);
        let merged = if is_frame_state {
            merge_frame_states(graph, &field_values)
        } else {
            match first_rep {
                Some(rep) => graph.emit(Operation::with_rep(Opcode::Phi, field_values, rep)),
                None => OpIndex::INVALID,
            }
        };
        if !merged.is_valid() {
            return OpIndex::INVALID;
        }
        inputs.push(merged);
    }
    graph.emit(Operation::new(Opcode::FrameState { has_parent }, inputs))
}
